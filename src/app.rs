//! The dispatcher: the single owner of all session state.
//!
//! One event is handled at a time. Anything that may block (provider calls,
//! git, status timeouts) runs on a spawned task that reports back through the
//! event channel.

use std::io::Stdout;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use log::{debug, info, warn};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::Terminal;

use crate::config::Config;
use crate::error::{ProviderError, Severity};
use crate::event::{schedule_clear, AppEvent, EventReceiver, EventSender};
use crate::github::{load_snapshot, Provider};
use crate::navigation::{BookmarkCategory, BookmarkTarget, FocusState, HeadingLevel, Pane};
use crate::render::RenderEngine;
use crate::review::{ReviewCommand, ReviewPhase, ReviewStateMachine};
use crate::syntax::Highlighter;
use crate::types::{Comment, LineTarget, PullRequestSnapshot, ReviewEvent};
use crate::ui::editor::{Editor, EditorAction};
use crate::ui::file_list::FileList;
use crate::ui::status::StatusBar;
use crate::ui::{self, layout, AppLayout};

/// What the editor text will be used for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorPurpose {
    Reply(Comment),
    TopLevel,
    LineComment(LineTarget),
    Close(ReviewEvent),
}

impl EditorPurpose {
    fn title(&self) -> String {
        match self {
            EditorPurpose::Reply(c) => format!("Reply to {} [{}]", c.author, c.id),
            EditorPurpose::TopLevel => "New comment".to_string(),
            EditorPurpose::LineComment(t) => format!("Comment on {}:{}", t.path, t.line),
            EditorPurpose::Close(ReviewEvent::Approve) => "Approve".to_string(),
            EditorPurpose::Close(ReviewEvent::RequestChanges) => "Request changes".to_string(),
            EditorPurpose::Close(ReviewEvent::Comment) => "Submit review".to_string(),
        }
    }

    fn command(self, body: String) -> ReviewCommand {
        match self {
            EditorPurpose::Reply(parent) => ReviewCommand::Reply { parent, body },
            EditorPurpose::TopLevel => ReviewCommand::TopLevelComment { body },
            EditorPurpose::LineComment(target) => ReviewCommand::LineComment { target, body },
            EditorPurpose::Close(event) => ReviewCommand::Close { event, body },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    None,
    Help,
    Editor(Editor, EditorPurpose),
    ConfirmMerge,
}

pub struct App {
    provider: Arc<dyn Provider>,
    tx: EventSender,
    config: Config,
    snapshot: PullRequestSnapshot,
    review: ReviewStateMachine,
    engine: RenderEngine,
    focus: FocusState,
    file_list: FileList,
    status: StatusBar,
    overlay: Overlay,
    /// Top line of the content viewport
    scroll: usize,
    viewport_height: usize,
    /// Content line under the selection cursor
    selection: Option<usize>,
    loading: bool,
    /// Id of the most recent snapshot load
    load_id: u64,
    should_quit: bool,
}

impl App {
    pub fn new(
        provider: Arc<dyn Provider>,
        tx: EventSender,
        config: Config,
        snapshot: PullRequestSnapshot,
    ) -> Self {
        let highlighter = config
            .display
            .syntax_highlighting
            .then(|| Highlighter::new(&config.display.theme, config.display.min_brightness));
        let engine = RenderEngine::new(config.render_config(80), highlighter);
        let focus = FocusState::new(config.navigation.show_file_list);
        let mut app = Self {
            provider,
            tx,
            review: ReviewStateMachine::from_snapshot(&snapshot),
            snapshot,
            engine,
            focus,
            file_list: FileList::default(),
            status: StatusBar::default(),
            overlay: Overlay::None,
            scroll: 0,
            viewport_height: 20,
            selection: None,
            loading: false,
            load_id: 0,
            should_quit: false,
            config,
        };
        app.refresh_view();
        app
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Draw, then handle one event, until quit or the channel closes
    pub async fn run(
        mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
        mut rx: EventReceiver,
    ) -> Result<()> {
        loop {
            let size = terminal.size()?;
            self.resize(size.width, size.height);
            terminal.draw(|f| self.draw(f))?;

            match rx.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
            if self.should_quit {
                break;
            }
        }
        Ok(())
    }

    fn layout(&self, area: Rect) -> AppLayout {
        let file_list = self
            .focus
            .is_visible(Pane::FileList)
            .then_some(self.config.navigation.file_list_width);
        layout(area, self.engine.view().header.len(), file_list)
    }

    /// Fit the render width and viewport to a terminal of `width` x `height`
    pub fn resize(&mut self, width: u16, height: u16) {
        let l = self.layout(Rect::new(0, 0, width, height));
        self.viewport_height = (l.content.height as usize).max(1);
        self.engine.set_width(l.content.width as usize);
        self.refresh_view();
    }

    /// Re-render if needed and keep derived navigation state in step
    fn refresh_view(&mut self) {
        if self.engine.render(&self.snapshot) {
            let len = self.engine.view().content.len();
            self.scroll = self.scroll.min(len.saturating_sub(1));
            self.selection = self.selection.filter(|s| *s < len);
        }
        self.sync_position();
    }

    fn sync_position(&mut self) {
        let scroll = self.scroll;
        self.engine.view_mut().headings.rederive(scroll);
        if self.focus.focused() != Pane::FileList {
            if let Some(index) = self.current_file() {
                self.file_list.select(index, self.snapshot.files.len());
            }
        }
    }

    /// File whose section contains the viewport top
    fn current_file(&self) -> Option<usize> {
        match self
            .engine
            .view()
            .bookmarks
            .covering(BookmarkCategory::File, self.scroll)
            .map(|b| &b.target)
        {
            Some(BookmarkTarget::File(index)) => Some(*index),
            _ => None,
        }
    }

    fn content_len(&self) -> usize {
        self.engine.view().content.len()
    }

    fn scroll_to(&mut self, line: usize) {
        self.scroll = line.min(self.content_len().saturating_sub(1));
        self.sync_position();
    }

    fn scroll_by(&mut self, delta: isize) {
        let target = self.scroll.saturating_add_signed(delta);
        self.scroll_to(target);
    }

    fn move_selection(&mut self, delta: isize) {
        let Some(current) = self.selection else {
            self.scroll_by(delta);
            return;
        };
        let last = self.content_len().saturating_sub(1);
        let next = current.saturating_add_signed(delta).min(last);
        self.selection = Some(next);
        if next < self.scroll {
            self.scroll_to(next);
        } else if next >= self.scroll + self.viewport_height {
            self.scroll_to(next + 1 - self.viewport_height);
        }
    }

    /// Line whose comment or code is being acted on
    fn focus_line(&self) -> usize {
        self.selection.unwrap_or(self.scroll)
    }

    // ========================================================================
    // Status
    // ========================================================================

    fn show_status(&mut self, text: impl Into<String>, severity: Severity, timeout: Option<Duration>) {
        let text = text.into();
        match severity {
            Severity::Severe => warn!("{}", text),
            Severity::Normal => info!("{}", text),
        }
        let id = self.status.set(text, severity);
        if let Some(delay) = timeout {
            schedule_clear(self.tx.clone(), id, delay);
        }
    }

    fn status_timeout(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.config.status.timeout_ms))
    }

    fn flash(&mut self, text: impl Into<String>, severity: Severity) {
        let timeout = self.status_timeout();
        self.show_status(text, severity, timeout);
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Key(key) => self.handle_key(key),
            AppEvent::Resize(w, h) => self.resize(w, h),
            AppEvent::SnapshotLoaded {
                load_id,
                result,
                retried,
            } => self.on_snapshot(load_id, *result, retried),
            AppEvent::CommitsFetched(Ok(())) => self.start_load(true),
            AppEvent::CommitsFetched(Err(e)) => {
                self.loading = false;
                self.flash(format!("git fetch failed: {}", e), Severity::Severe);
            }
            AppEvent::ReviewDone { command, result } => match result {
                Ok(outcome) => {
                    self.review.apply(&outcome);
                    self.flash(outcome.message(), Severity::Normal);
                    self.start_load(false);
                }
                Err(e) => {
                    self.flash(format!("Failed to {}: {}", command.label(), e), e.severity());
                }
            },
            AppEvent::ShowStatus {
                text,
                severity,
                timeout,
            } => self.show_status(text, severity, timeout),
            AppEvent::ClearStatus(id) => {
                if !self.status.clear_if(id) {
                    debug!("Ignoring stale status clear {}", id);
                }
            }
            AppEvent::Quit => self.should_quit = true,
        }
        self.refresh_view();
    }

    fn on_snapshot(
        &mut self,
        load_id: u64,
        result: Result<PullRequestSnapshot, ProviderError>,
        retried: bool,
    ) {
        if load_id < self.load_id {
            debug!("Ignoring stale snapshot load {} (latest {})", load_id, self.load_id);
            return;
        }
        match result {
            Ok(snapshot) => {
                self.loading = false;
                self.snapshot = snapshot;
                self.review.sync(&self.snapshot);
                self.engine.mark_dirty();
                debug!("Snapshot replaced");
            }
            Err(e) if e.is_missing_commit() && !retried => {
                self.show_status(format!("{}; fetching...", e), Severity::Normal, None);
                let provider = self.provider.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = provider.fetch_commits().await;
                    let _ = tx.send(AppEvent::CommitsFetched(result));
                });
            }
            Err(e) => {
                self.loading = false;
                self.flash(format!("Reload failed: {}", e), Severity::Severe);
            }
        }
    }

    /// Reload the snapshot in the background
    pub fn start_load(&mut self, retried: bool) {
        self.loading = true;
        self.load_id += 1;
        let load_id = self.load_id;
        let provider = self.provider.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = load_snapshot(provider.as_ref()).await;
            let _ = tx.send(AppEvent::SnapshotLoaded {
                load_id,
                result: Box::new(result),
                retried,
            });
        });
    }

    /// Check a command and run it in the background
    fn dispatch(&mut self, command: ReviewCommand) {
        let task = match self.review.prepare(command, &self.snapshot.node_id) {
            Ok(task) => task,
            Err(e) => {
                self.flash(e.to_string(), e.severity());
                return;
            }
        };
        let command = task.command.clone();
        self.show_status(format!("Running {}...", command.label()), Severity::Normal, None);
        let provider = self.provider.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = task.execute(provider).await;
            let _ = tx.send(AppEvent::ReviewDone { command, result });
        });
    }

    fn open_editor(&mut self, purpose: EditorPurpose) {
        self.overlay = Overlay::Editor(Editor::new(purpose.title()), purpose);
    }

    // ========================================================================
    // Keys
    // ========================================================================

    fn handle_key(&mut self, key: KeyEvent) {
        match std::mem::replace(&mut self.overlay, Overlay::None) {
            Overlay::None => {}
            Overlay::Help => return,
            Overlay::ConfirmMerge => {
                if key.code == KeyCode::Char('y') {
                    self.dispatch(ReviewCommand::Merge);
                } else {
                    self.flash("Merge aborted", Severity::Normal);
                }
                return;
            }
            Overlay::Editor(mut editor, purpose) => {
                match editor.handle_key(key) {
                    EditorAction::Continue => self.overlay = Overlay::Editor(editor, purpose),
                    EditorAction::Cancel => {
                        if !editor.text().trim().is_empty() {
                            self.flash("Draft discarded", Severity::Normal);
                        }
                    }
                    EditorAction::Submit(text) => self.dispatch(purpose.command(text)),
                }
                return;
            }
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('?') => self.overlay = Overlay::Help,
            KeyCode::Tab => self.focus.cycle(),
            KeyCode::Char('f') => self.focus.toggle_file_list(),
            KeyCode::Char('R') => {
                self.show_status("Reloading...", Severity::Normal, None);
                self.start_load(false);
            }
            _ if self.focus.focused() == Pane::FileList => self.handle_file_list_key(key),
            _ => self.handle_content_key(key),
        }
    }

    fn handle_file_list_key(&mut self, key: KeyEvent) {
        let len = self.snapshot.files.len();
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.file_list.move_down(len),
            KeyCode::Char('k') | KeyCode::Up => self.file_list.move_up(),
            _ => return,
        }
        let position = self
            .engine
            .view()
            .bookmarks
            .file_position(self.file_list.selected());
        if let Some(position) = position {
            self.scroll_to(position);
        }
    }

    fn handle_content_key(&mut self, key: KeyEvent) {
        let page = self.config.navigation.scroll_lines as isize;
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::PageDown => self.scroll_by(page),
            KeyCode::PageUp => self.scroll_by(-page),
            KeyCode::Char('g') => self.scroll_to(0),
            KeyCode::Char('G') => self.scroll_to(self.content_len().saturating_sub(1)),
            KeyCode::Left => {
                let step = self.config.navigation.horizontal_scroll_columns;
                let offset = self.engine.x_offset().saturating_sub(step);
                self.engine.set_x_offset(offset);
            }
            KeyCode::Right => {
                let step = self.config.navigation.horizontal_scroll_columns;
                let offset = self.engine.x_offset() + step;
                self.engine.set_x_offset(offset);
            }
            KeyCode::Char('n') => self.jump_heading(HeadingLevel::Hunk, true),
            KeyCode::Char('p') => self.jump_heading(HeadingLevel::Hunk, false),
            KeyCode::Char('N') => self.jump_heading(HeadingLevel::File, true),
            KeyCode::Char('P') => self.jump_heading(HeadingLevel::File, false),
            KeyCode::Char('c') => self.jump_comment(true),
            KeyCode::Char('C') => self.jump_comment(false),
            KeyCode::Char(' ') => {
                self.selection = match self.selection {
                    Some(_) => None,
                    None => Some(self.scroll),
                };
            }
            KeyCode::Char('+') => self.comment_on_selection(),
            KeyCode::Char('r') => self.reply_to_focused(),
            KeyCode::Char('t') => self.open_editor(EditorPurpose::TopLevel),
            KeyCode::Char('s') => self.dispatch(ReviewCommand::Start),
            KeyCode::Char('a') => self.close_review(ReviewEvent::Approve),
            KeyCode::Char('x') => self.close_review(ReviewEvent::RequestChanges),
            KeyCode::Char('S') => self.close_review(ReviewEvent::Comment),
            KeyCode::Char('X') => self.dispatch(ReviewCommand::Cancel),
            KeyCode::Char('M') => self.overlay = Overlay::ConfirmMerge,
            _ => {}
        }
    }

    fn jump_heading(&mut self, level: HeadingLevel, forward: bool) {
        let headings = &mut self.engine.view_mut().headings;
        let target = if forward {
            headings.next(level)
        } else {
            headings.prev(level)
        };
        if let Some(start) = target {
            self.scroll_to(start);
        }
    }

    fn jump_comment(&mut self, forward: bool) {
        let bookmarks = &self.engine.view().bookmarks;
        let target = if forward {
            bookmarks.next(BookmarkCategory::Comment, self.scroll)
        } else {
            bookmarks.prev(BookmarkCategory::Comment, self.scroll)
        };
        match target.map(|b| b.position) {
            Some(position) => self.scroll_to(position),
            None => self.flash("No comments", Severity::Normal),
        }
    }

    fn comment_on_selection(&mut self) {
        let Some(line) = self.selection else {
            self.flash("Select a line first (Space)", Severity::Normal);
            return;
        };
        match self.engine.view().code_lines.get(&line) {
            Some(code) => {
                let target = LineTarget {
                    path: code.path.clone(),
                    line: code.line,
                    is_new: code.is_new,
                };
                self.open_editor(EditorPurpose::LineComment(target));
            }
            None => self.flash("Selected line is not a diff line", Severity::Normal),
        }
    }

    fn reply_to_focused(&mut self) {
        let line = self.focus_line();
        let bookmarks = &self.engine.view().bookmarks;
        let focused = bookmarks
            .at(BookmarkCategory::Comment, line)
            .or_else(|| bookmarks.covering(BookmarkCategory::Comment, line))
            .map(|b| b.target.clone());
        match focused {
            Some(BookmarkTarget::Comment(comment)) => {
                self.open_editor(EditorPurpose::Reply(comment))
            }
            _ => self.flash("No comment focused", Severity::Normal),
        }
    }

    fn close_review(&mut self, event: ReviewEvent) {
        if self.review.pending().is_none() {
            self.flash("No pending review", Severity::Normal);
            return;
        }
        self.open_editor(EditorPurpose::Close(event));
    }

    // ========================================================================
    // Drawing
    // ========================================================================

    /// Right-hand side of the status bar: position, review phase, help key
    fn hint(&self) -> String {
        if self.loading {
            return "Loading...".to_string();
        }
        let headings = &self.engine.view().headings;
        let mut parts = Vec::new();
        for (name, level) in [("file", HeadingLevel::File), ("hunk", HeadingLevel::Hunk)] {
            let list = headings.level(level);
            if list.is_empty() {
                continue;
            }
            let at = list.current_index().map_or(0, |i| i + 1);
            parts.push(format!("{} {}/{}", name, at, list.len()));
        }
        match self.review.phase() {
            ReviewPhase::Pending(review) => parts.push(format!("review {} pending", review.id)),
            ReviewPhase::Closed(state) => parts.push(format!("review {}", state.label())),
            ReviewPhase::None => {}
        }
        parts.push("? help".to_string());
        parts.join("  ")
    }

    fn draw(&mut self, frame: &mut ratatui::Frame) {
        let l = self.layout(frame.area());
        let palette = self.engine.palette();
        let view = self.engine.view();

        ui::render_lines(frame.buffer_mut(), l.header, &view.header, 0, None);
        let file = view
            .headings
            .level(HeadingLevel::File)
            .active(self.scroll)
            .map(|h| h.text.as_str());
        let hunk = view
            .headings
            .level(HeadingLevel::Hunk)
            .active(self.scroll)
            .map(|h| h.text.as_str());
        ui::render_sticky(frame.buffer_mut(), l.sticky, file, hunk, palette.accent);
        ui::render_lines(
            frame.buffer_mut(),
            l.content,
            &view.content,
            self.scroll,
            self.selection.map(|s| (s, palette.cursor_bg)),
        );

        if let Some(area) = l.file_list {
            let focused = self.focus.focused() == Pane::FileList;
            self.file_list.render(
                frame.buffer_mut(),
                area,
                &self.snapshot.files,
                focused,
                palette.accent,
            );
        }

        let hint = self.hint();
        self.status.render(frame.buffer_mut(), l.status, &hint);

        match &self.overlay {
            Overlay::None => {}
            Overlay::Help => ui::render_help(frame),
            Overlay::Editor(editor, _) => editor.render(frame, l.content),
            Overlay::ConfirmMerge => {
                ui::render_confirm(frame, &format!("Merge PR #{}?", self.snapshot.number))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::insert_thread;
    use crate::event;
    use crate::github::mock::{review, MockProvider};
    use crate::types::fixtures::{file, hunk, snapshot, thread};
    use crate::types::{FileKind, Op};
    use crossterm::event::KeyModifiers;
    use pretty_assertions::assert_eq;

    fn sample() -> PullRequestSnapshot {
        let mut pr = snapshot(vec![
            file(
                "a.rs",
                FileKind::Modified,
                vec![
                    hunk(1, 1, &[(Op::Context, "a1"), (Op::Add, "a2")]),
                    hunk(20, 21, &[(Op::Delete, "a3"), (Op::Context, "a4")]),
                ],
            ),
            file("b.rs", FileKind::Modified, vec![hunk(5, 5, &[(Op::Add, "b1")])]),
        ]);
        insert_thread(&mut pr.threads, "a.rs", -2, thread(7, "bob", "nit"));
        pr
    }

    // Content of `sample()`:
    //  0 a.rs:                    6 hunk heading (-1)
    //  1 hunk heading (+1)        7 a3 (deleted)
    //  2 a1                       8 a4
    //  3 a2 (added, new line 2)   9 b.rs:
    //  4 comment heading [7] bob 10 hunk heading (+1)
    //  5   nit                   11 b1

    struct Harness {
        app: App,
        rx: EventReceiver,
        provider: Arc<MockProvider>,
    }

    impl Harness {
        fn new(provider: MockProvider, pr: PullRequestSnapshot) -> Self {
            let provider = Arc::new(provider);
            let (tx, rx) = event::channel();
            let mut config = Config::default();
            config.navigation.show_file_list = false;
            let mut app = App::new(provider.clone(), tx, config, pr);
            app.resize(60, 30);
            Self { app, rx, provider }
        }

        fn key(&mut self, code: KeyCode) {
            self.app
                .handle_event(AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)));
        }

        fn ctrl(&mut self, c: char) {
            self.app.handle_event(AppEvent::Key(KeyEvent::new(
                KeyCode::Char(c),
                KeyModifiers::CONTROL,
            )));
        }

        fn type_text(&mut self, text: &str) {
            for c in text.chars() {
                self.key(KeyCode::Char(c));
            }
        }

        /// Feed the next background result back into the dispatcher
        async fn pump(&mut self) -> String {
            let event = self.rx.recv().await.unwrap();
            let name = format!("{:?}", event)
                .split(|c: char| !c.is_alphanumeric())
                .next()
                .unwrap_or_default()
                .to_string();
            self.app.handle_event(event);
            name
        }

        fn status(&self) -> Option<String> {
            self.app.status.message().map(|m| m.text.clone())
        }
    }

    fn harness() -> Harness {
        Harness::new(MockProvider::new("alice"), sample())
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    #[tokio::test]
    async fn test_hunk_navigation_wraps() {
        let mut h = harness();
        h.key(KeyCode::Char('n'));
        assert_eq!(h.app.scroll, 2);
        h.key(KeyCode::Char('n'));
        assert!(h.app.scroll > 2);
        let last = h.app.engine.view().headings.level(HeadingLevel::Hunk).len();
        for _ in 2..last {
            h.key(KeyCode::Char('n'));
        }
        h.key(KeyCode::Char('n'));
        assert_eq!(h.app.scroll, 2);
        h.key(KeyCode::Char('p'));
        assert_eq!(h.app.scroll, 11);
    }

    #[tokio::test]
    async fn test_file_navigation_and_file_list_follow() {
        let mut h = harness();
        h.key(KeyCode::Char('N'));
        h.key(KeyCode::Char('N'));
        assert_eq!(h.app.scroll, 10);
        assert_eq!(h.app.file_list.selected(), 1);
        h.key(KeyCode::Char('P'));
        assert_eq!(h.app.scroll, 1);
        assert_eq!(h.app.file_list.selected(), 0);
    }

    #[tokio::test]
    async fn test_file_navigation_over_bodiless_files() {
        let mut renamed = file("new.rs", FileKind::Renamed, vec![]);
        renamed.old_name = "old.rs".to_string();
        let pr = snapshot(vec![
            file("a.rs", FileKind::Modified, vec![hunk(1, 1, &[(Op::Add, "a1")])]),
            renamed,
            file("gone.rs", FileKind::Deleted, vec![hunk(1, 0, &[(Op::Delete, "x")])]),
            file("logo.png", FileKind::Binary, vec![]),
            file("b.rs", FileKind::Modified, vec![hunk(1, 1, &[(Op::Add, "b1")])]),
        ]);
        // 0 a.rs:  1 hunk  2 a1  3 old.rs -> new.rs:  4 DELETED gone.rs
        // 5 logo.png:  6 BINARY FILE  7 b.rs:  8 hunk  9 b1
        let mut h = Harness::new(MockProvider::new("alice"), pr);
        let mut visited = Vec::new();
        for _ in 0..6 {
            h.key(KeyCode::Char('N'));
            let view = h.app.engine.view();
            let label = view
                .headings
                .level(HeadingLevel::File)
                .active(h.app.scroll)
                .map(|heading| heading.text.clone());
            visited.push((h.app.scroll, h.app.file_list.selected(), label));
        }
        let label = |s: &str| Some(s.to_string());
        assert_eq!(
            visited,
            vec![
                (1, 0, label("a.rs:")),
                (3, 1, label("old.rs -> new.rs:")),
                (4, 2, label("DELETED gone.rs")),
                (6, 3, label("logo.png:")),
                (8, 4, label("b.rs:")),
                (1, 0, label("a.rs:")),
            ]
        );
        h.key(KeyCode::Char('N'));
        h.key(KeyCode::Char('N'));
        assert_eq!(h.app.hint(), "file 3/5  hunk 1/2  ? help");
        h.key(KeyCode::Char('P'));
        assert_eq!(h.app.scroll, 3);
    }

    #[tokio::test]
    async fn test_comment_jump() {
        let mut h = harness();
        h.key(KeyCode::Char('c'));
        assert_eq!(h.app.scroll, 5);
        h.key(KeyCode::Char('C'));
        assert_eq!(h.app.scroll, 5);
    }

    #[tokio::test]
    async fn test_scroll_rederives_headings() {
        let mut h = harness();
        for _ in 0..8 {
            h.key(KeyCode::Down);
        }
        let view = h.app.engine.view();
        let active = view.headings.level(HeadingLevel::Hunk).active(8).unwrap();
        assert!(active.text.starts_with("==O== ==N== (+0, -1"));
        assert_eq!(view.headings.level(HeadingLevel::File).active(8).unwrap().text, "a.rs:");
    }

    #[tokio::test]
    async fn test_horizontal_scroll_rerenders() {
        let mut h = harness();
        h.key(KeyCode::Right);
        assert_eq!(h.app.engine.x_offset(), 4);
        h.key(KeyCode::Left);
        h.key(KeyCode::Left);
        assert_eq!(h.app.engine.x_offset(), 0);
    }

    #[tokio::test]
    async fn test_focus_cycles_through_visible_panes() {
        let mut h = harness();
        h.key(KeyCode::Tab);
        assert_eq!(h.app.focus.focused(), Pane::Content);
        h.key(KeyCode::Char('f'));
        h.key(KeyCode::Tab);
        assert_eq!(h.app.focus.focused(), Pane::FileList);
        h.key(KeyCode::Down);
        assert_eq!(h.app.scroll, 10);
        h.key(KeyCode::Char('f'));
        assert_eq!(h.app.focus.focused(), Pane::Content);
    }

    #[tokio::test]
    async fn test_resize_changes_render_width() {
        let mut h = harness();
        h.app.handle_event(AppEvent::Resize(100, 40));
        assert_eq!(h.app.engine.width(), 100);
        let line = &h.app.engine.view().content_text()[2];
        assert_eq!(line.chars().count(), 100);
    }

    // ========================================================================
    // Status bar
    // ========================================================================

    #[tokio::test]
    async fn test_stale_status_clear_keeps_newer_message() {
        let mut h = harness();
        h.app.handle_event(AppEvent::ShowStatus {
            text: "first".to_string(),
            severity: Severity::Normal,
            timeout: Some(Duration::from_millis(1)),
        });
        h.app.handle_event(AppEvent::ShowStatus {
            text: "second".to_string(),
            severity: Severity::Normal,
            timeout: None,
        });
        // The first message's clear arrives after the second was shown
        assert_eq!(h.pump().await, "ClearStatus");
        assert_eq!(h.status(), Some("second".to_string()));
    }

    #[tokio::test]
    async fn test_status_clears_after_timeout() {
        let mut h = harness();
        h.app.handle_event(AppEvent::ShowStatus {
            text: "saved".to_string(),
            severity: Severity::Normal,
            timeout: Some(Duration::from_millis(1)),
        });
        h.pump().await;
        assert_eq!(h.status(), None);
    }

    // ========================================================================
    // Comments and review
    // ========================================================================

    #[tokio::test]
    async fn test_comment_on_selected_line() {
        let mut h = harness();
        h.key(KeyCode::Char(' '));
        h.key(KeyCode::Down);
        h.key(KeyCode::Down);
        h.key(KeyCode::Down);
        assert_eq!(h.app.selection, Some(3));
        h.key(KeyCode::Char('+'));
        assert!(matches!(
            h.app.overlay,
            Overlay::Editor(_, EditorPurpose::LineComment(_))
        ));
        h.type_text("why?");
        h.ctrl('s');
        assert_eq!(h.pump().await, "ReviewDone");
        assert_eq!(
            h.provider.calls(),
            vec!["create_comment a.rs:2 RIGHT abc123 why?"]
        );
        assert_eq!(h.status(), Some("Comment posted".to_string()));
        assert!(h.app.loading);
        assert_eq!(h.pump().await, "SnapshotLoaded");
        assert!(!h.app.loading);
    }

    #[tokio::test]
    async fn test_plus_without_selection_is_rejected() {
        let mut h = harness();
        h.key(KeyCode::Char('+'));
        assert_eq!(h.app.overlay, Overlay::None);
        assert_eq!(h.status(), Some("Select a line first (Space)".to_string()));
    }

    #[tokio::test]
    async fn test_reply_to_focused_comment() {
        let mut h = harness();
        h.key(KeyCode::Char('c'));
        h.key(KeyCode::Char('r'));
        h.type_text("done");
        h.ctrl('s');
        h.pump().await;
        assert_eq!(
            h.provider.calls(),
            vec![
                "pending_review alice",
                "start_review PR_kwDO42",
                "reply_in_review R_new PRRC_7 done",
                "close_review R_new COMMENT ",
            ]
        );
    }

    #[tokio::test]
    async fn test_reply_without_focused_comment() {
        let mut h = harness();
        h.key(KeyCode::Char('r'));
        assert_eq!(h.status(), Some("No comment focused".to_string()));
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_rejected_without_call() {
        let mut h = harness();
        h.key(KeyCode::Char('c'));
        h.key(KeyCode::Char('r'));
        h.ctrl('s');
        assert_eq!(h.status(), Some("A reply needs some text".to_string()));
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_escape_closes_editor_not_app() {
        let mut h = harness();
        h.key(KeyCode::Char('t'));
        h.key(KeyCode::Esc);
        assert_eq!(h.app.overlay, Overlay::None);
        assert!(!h.app.should_quit());
        h.key(KeyCode::Esc);
        assert!(h.app.should_quit());
    }

    #[tokio::test]
    async fn test_quit_event_with_editor_open() {
        let mut h = harness();
        h.key(KeyCode::Char('t'));
        h.app.handle_event(AppEvent::Quit);
        assert!(h.app.should_quit());
    }

    #[tokio::test]
    async fn test_hint_shows_position_and_review() {
        let mut pr = sample();
        pr.pending_review = Some(review("R1", "alice"));
        let mut h = Harness::new(MockProvider::new("alice"), pr);
        h.key(KeyCode::Char('N'));
        assert_eq!(h.app.hint(), "file 1/2  hunk 0/4  review R1 pending  ? help");
    }

    #[tokio::test]
    async fn test_hint_after_cancel() {
        let mut pr = sample();
        pr.pending_review = Some(review("R1", "alice"));
        let mut h = Harness::new(MockProvider::new("alice"), pr);
        h.key(KeyCode::Char('X'));
        assert_eq!(h.pump().await, "ReviewDone");
        assert_eq!(h.status(), Some("Review cancelled".to_string()));
        assert_eq!(h.pump().await, "SnapshotLoaded");
        // The mock reload has no files, only the review state is left
        assert_eq!(h.app.hint(), "review CANCELLED  ? help");
    }

    #[tokio::test]
    async fn test_discarding_draft_is_reported() {
        let mut h = harness();
        h.key(KeyCode::Char('t'));
        h.type_text("half a thought");
        h.key(KeyCode::Esc);
        assert_eq!(h.status(), Some("Draft discarded".to_string()));
    }

    #[tokio::test]
    async fn test_approve_requires_pending_review() {
        let mut h = harness();
        h.key(KeyCode::Char('a'));
        assert_eq!(h.app.overlay, Overlay::None);
        assert_eq!(h.status(), Some("No pending review".to_string()));
    }

    #[tokio::test]
    async fn test_approve_pending_review() {
        let mut pr = sample();
        pr.pending_review = Some(review("R1", "alice"));
        let mut h = Harness::new(MockProvider::new("alice"), pr);
        h.key(KeyCode::Char('a'));
        h.ctrl('s');
        h.pump().await;
        assert_eq!(h.provider.calls(), vec!["close_review R1 APPROVE "]);
        assert_eq!(h.status(), Some("PR approved".to_string()));
    }

    #[tokio::test]
    async fn test_failed_call_shows_severe_status() {
        let mut provider = MockProvider::new("alice");
        provider.fail_with = Some("HTTP 502".to_string());
        let mut h = Harness::new(provider, sample());
        h.key(KeyCode::Char('s'));
        h.pump().await;
        let message = h.app.status.message().unwrap();
        assert_eq!(message.text, "Failed to start review: HTTP 502");
        assert_eq!(message.severity, Severity::Severe);
    }

    #[tokio::test]
    async fn test_merge_needs_confirmation() {
        let mut h = harness();
        h.key(KeyCode::Char('M'));
        h.key(KeyCode::Char('n'));
        assert_eq!(h.status(), Some("Merge aborted".to_string()));
        h.key(KeyCode::Char('M'));
        h.key(KeyCode::Char('y'));
        h.pump().await;
        assert_eq!(h.provider.calls(), vec!["merge PR_kwDO42"]);
    }

    // ========================================================================
    // Loading
    // ========================================================================

    #[tokio::test]
    async fn test_missing_commit_fetches_and_retries_once() {
        let mut h = harness();
        *h.provider.missing_until_fetch.lock().unwrap() = true;
        h.app.start_load(false);
        assert_eq!(h.pump().await, "SnapshotLoaded");
        assert!(h.status().unwrap().contains("fetching"));
        assert_eq!(h.pump().await, "CommitsFetched");
        assert_eq!(h.pump().await, "SnapshotLoaded");
        assert!(!h.app.loading);
        let fetches = h.provider.calls().iter().filter(|c| *c == "fetch_commits").count();
        assert_eq!(fetches, 1);
    }

    #[tokio::test]
    async fn test_missing_commit_after_retry_is_reported() {
        let mut provider = MockProvider::new("alice");
        provider.fetch_never_helps = true;
        let mut h = Harness::new(provider, sample());
        *h.provider.missing_until_fetch.lock().unwrap() = true;
        h.app.start_load(false);
        h.pump().await;
        h.pump().await;
        h.pump().await;
        let message = h.app.status.message().unwrap();
        assert!(message.text.starts_with("Reload failed: cannot find commit"));
        assert_eq!(message.severity, Severity::Severe);
    }

    #[tokio::test]
    async fn test_stale_load_is_ignored() {
        let mut pr = sample();
        pr.pending_review = Some(review("R1", "alice"));
        let mut h = Harness::new(MockProvider::new("alice"), pr.clone());
        h.app.start_load(false);
        h.app.start_load(false);
        // Drain the mock results; the test delivers its own below
        h.rx.recv().await.unwrap();
        h.rx.recv().await.unwrap();

        let mut after = sample();
        after.title = "after approve".to_string();
        h.app.handle_event(AppEvent::SnapshotLoaded {
            load_id: 2,
            result: Box::new(Ok(after)),
            retried: false,
        });
        assert!(!h.app.loading);
        assert_eq!(h.app.review.pending(), None);

        pr.title = "before approve".to_string();
        h.app.handle_event(AppEvent::SnapshotLoaded {
            load_id: 1,
            result: Box::new(Ok(pr)),
            retried: false,
        });
        assert_eq!(h.app.snapshot.title, "after approve");
        assert_eq!(h.app.review.pending(), None);
        assert_eq!(h.app.engine.view().header_text()[0], "#42 after approve (alice)");
    }

    #[tokio::test]
    async fn test_stale_missing_commit_does_not_fetch() {
        let mut h = harness();
        h.app.start_load(false);
        h.app.start_load(false);
        h.rx.recv().await.unwrap();
        h.rx.recv().await.unwrap();
        h.app.handle_event(AppEvent::SnapshotLoaded {
            load_id: 1,
            result: Box::new(Err(ProviderError::MissingCommit {
                sha: "abc123".to_string(),
                cause: "object not found".to_string(),
            })),
            retried: false,
        });
        assert!(h.app.loading);
        assert_eq!(h.status(), None);
        assert!(!h.provider.calls().contains(&"fetch_commits".to_string()));
    }

    #[tokio::test]
    async fn test_reload_replaces_snapshot() {
        let mut replacement = sample();
        replacement.title = "Renamed".to_string();
        let provider = MockProvider::new("alice").with_snapshot(replacement);
        let mut h = Harness::new(provider, sample());
        h.key(KeyCode::Char('R'));
        h.pump().await;
        assert_eq!(h.app.snapshot.title, "Renamed");
        assert_eq!(h.app.engine.view().header_text()[0], "#42 Renamed (alice)");
    }
}
