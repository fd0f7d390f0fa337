//! Inbound message channel for the dispatcher.
//!
//! Terminal input and the results of background tasks all arrive as
//! [`AppEvent`]s on one unbounded channel, in the order they were sent.

use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::{ProviderError, ReviewError, Severity};
use crate::review::{ReviewCommand, ReviewOutcome};
use crate::types::PullRequestSnapshot;

#[derive(Debug)]
pub enum AppEvent {
    /// A key press (`KeyEventKind::Press` only)
    Key(KeyEvent),
    /// Terminal was resized to (columns, rows)
    Resize(u16, u16),
    /// A snapshot load finished. `retried` is set once a fetch-and-retry ran.
    /// `load_id` orders loads; only the latest one issued is applied.
    SnapshotLoaded {
        load_id: u64,
        result: Box<Result<PullRequestSnapshot, ProviderError>>,
        retried: bool,
    },
    /// `git fetch` finished ahead of a retried load
    CommitsFetched(Result<(), ProviderError>),
    ReviewDone {
        command: ReviewCommand,
        result: Result<ReviewOutcome, ReviewError>,
    },
    ShowStatus {
        text: String,
        severity: Severity,
        timeout: Option<Duration>,
    },
    /// Clear the status bar if it still shows message `id`
    ClearStatus(u64),
    Quit,
}

pub type EventSender = mpsc::UnboundedSender<AppEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AppEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Forward terminal input to the channel until the receiver goes away.
///
/// Release and repeat events are dropped so each keystroke is seen once.
pub fn spawn_input_task(tx: EventSender) {
    tokio::spawn(async move {
        let mut reader = EventStream::new();
        loop {
            let event = match reader.next().fuse().await {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    log::warn!("Terminal input error: {}", e);
                    continue;
                }
                None => break,
            };
            let sent = match event {
                Event::Key(key) if key.kind == KeyEventKind::Press => tx.send(key_event(key)),
                Event::Resize(w, h) => tx.send(AppEvent::Resize(w, h)),
                _ => Ok(()),
            };
            if sent.is_err() {
                break;
            }
        }
    });
}

/// Ctrl+C quits even while an overlay has the keyboard
fn key_event(key: KeyEvent) -> AppEvent {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        AppEvent::Quit
    } else {
        AppEvent::Key(key)
    }
}

/// Post `ClearStatus(id)` after `delay`
pub fn schedule_clear(tx: EventSender, id: u64, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(AppEvent::ClearStatus(id));
    });
}
