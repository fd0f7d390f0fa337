//! One-line status bar with id-tagged messages.

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};

use super::helpers::{fill_area, truncate_or_pad};
use crate::error::Severity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub id: u64,
    pub text: String,
    pub severity: Severity,
}

/// Holds at most one message. Every new message gets a larger id, so a
/// delayed clear for an older message can be recognized and ignored.
#[derive(Debug, Default)]
pub struct StatusBar {
    message: Option<StatusMessage>,
    last_id: u64,
}

impl StatusBar {
    /// Show `text`, replacing any current message. Returns the message id.
    pub fn set(&mut self, text: impl Into<String>, severity: Severity) -> u64 {
        self.last_id += 1;
        self.message = Some(StatusMessage {
            id: self.last_id,
            text: text.into(),
            severity,
        });
        self.last_id
    }

    /// Clear the bar if it still shows message `id`. Returns true when cleared.
    pub fn clear_if(&mut self, id: u64) -> bool {
        if self.message.as_ref().is_some_and(|m| m.id == id) {
            self.message = None;
            return true;
        }
        false
    }

    pub fn message(&self) -> Option<&StatusMessage> {
        self.message.as_ref()
    }

    /// Draw the message, or `hint` when there is none
    pub fn render(&self, buf: &mut Buffer, area: Rect, hint: &str) {
        let bg = Color::Rgb(30, 30, 40);
        fill_area(buf, area, bg);
        let (text, style) = match &self.message {
            Some(StatusMessage {
                text,
                severity: Severity::Severe,
                ..
            }) => (
                text.as_str(),
                Style::default()
                    .fg(Color::White)
                    .bg(Color::Red)
                    .add_modifier(Modifier::BOLD),
            ),
            Some(StatusMessage { text, .. }) => (text.as_str(), Style::default().fg(Color::Gray).bg(bg)),
            None => (hint, Style::default().fg(Color::DarkGray).bg(bg)),
        };
        let line = truncate_or_pad(&format!(" {}", text), area.width as usize);
        buf.set_string(area.x, area.y, line, style);
    }
}
