//! Projects a snapshot into the flat line buffer shown by the content view.
//!
//! The buffer is rebuilt only when the engine is dirty. Given the same
//! snapshot, config and horizontal offset the output is identical.

use std::collections::BTreeMap;

use log::{debug, warn};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::comments::{reaction_summary, CommentPlacementEngine};
use crate::config::TabWidths;
use crate::indexer::{index_file, DiffLine};
use crate::navigation::{BookmarkCategory, BookmarkTarget, Bookmarks, HeadingLevel, Headings};
use crate::syntax::{window_spans, Highlighter};
use crate::types::{Comment, CommentThread, DiffFile, FileKind, Op, PullRequestSnapshot};
use crate::ui::helpers::{format_timestamp, truncate_or_pad, wrap_text_with_code};

/// Colors used by the content view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub add: Color,
    pub del: Color,
    pub context: Color,
    pub file_heading: Color,
    pub hunk_heading: Color,
    pub comment: Color,
    pub cursor_bg: Color,
    pub accent: Color,
}

/// Everything the render engine needs besides the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    pub width: usize,
    pub palette: Palette,
    pub tabs: TabWidths,
    pub syntax_highlighting: bool,
    pub show_orphaned_comments: bool,
}

/// A rendered diff line that can take a new comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    pub path: String,
    pub line: u32,
    pub is_new: bool,
    pub op: Op,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedView {
    /// PR summary shown above the sticky headings
    pub header: Vec<Line<'static>>,
    pub content: Vec<Line<'static>>,
    pub headings: Headings,
    pub bookmarks: Bookmarks,
    /// Content index -> commentable diff line
    pub code_lines: BTreeMap<usize, CodeLine>,
}

#[cfg(test)]
impl RenderedView {
    /// Plain text of the content buffer, one entry per line
    pub fn content_text(&self) -> Vec<String> {
        self.content.iter().map(line_text).collect()
    }

    pub fn header_text(&self) -> Vec<String> {
        self.header.iter().map(line_text).collect()
    }
}

#[cfg(test)]
fn line_text(line: &Line) -> String {
    line.spans.iter().map(|s| s.content.as_ref()).collect()
}

pub struct RenderEngine {
    config: RenderConfig,
    highlighter: Option<Highlighter>,
    x_offset: usize,
    dirty: bool,
    view: RenderedView,
}

impl RenderEngine {
    pub fn new(config: RenderConfig, highlighter: Option<Highlighter>) -> Self {
        Self {
            config,
            highlighter,
            x_offset: 0,
            dirty: true,
            view: RenderedView::default(),
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn width(&self) -> usize {
        self.config.width
    }

    pub fn set_width(&mut self, width: usize) {
        if self.config.width != width {
            self.config.width = width;
            self.dirty = true;
        }
    }

    pub fn x_offset(&self) -> usize {
        self.x_offset
    }

    pub fn set_x_offset(&mut self, x_offset: usize) {
        if self.x_offset != x_offset {
            self.x_offset = x_offset;
            self.dirty = true;
        }
    }

    pub fn palette(&self) -> Palette {
        self.config.palette
    }

    pub fn view(&self) -> &RenderedView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut RenderedView {
        &mut self.view
    }

    /// Rebuild the buffer if dirty. Returns true when a new buffer was built.
    pub fn render(&mut self, snapshot: &PullRequestSnapshot) -> bool {
        if !self.dirty {
            return false;
        }
        let started = std::time::Instant::now();
        self.view = self.build(snapshot);
        self.dirty = false;
        debug!(
            "Rendered {} lines in {:?}",
            self.view.content.len(),
            started.elapsed()
        );
        true
    }

    fn build(&self, snapshot: &PullRequestSnapshot) -> RenderedView {
        let mut b = Builder::new(&self.config, self.highlighter.as_ref(), self.x_offset);
        b.header(snapshot);
        for comment in &snapshot.comments {
            b.comment_block(comment);
        }
        for (index, file) in snapshot.files.iter().enumerate() {
            b.file(index, file, snapshot);
        }
        for (path, reason) in &snapshot.skipped_files {
            b.skipped_file(path, reason);
        }
        b.finish()
    }
}

/// Accumulates one render pass
struct Builder<'a> {
    config: &'a RenderConfig,
    highlighter: Option<&'a Highlighter>,
    x_offset: usize,
    view: RenderedView,
    /// Text of the diff hunk heading to restore after a comment block
    hunk_text: Option<String>,
}

impl<'a> Builder<'a> {
    fn new(config: &'a RenderConfig, highlighter: Option<&'a Highlighter>, x_offset: usize) -> Self {
        Self {
            config,
            highlighter: if config.syntax_highlighting {
                highlighter
            } else {
                None
            },
            x_offset,
            view: RenderedView::default(),
            hunk_text: None,
        }
    }

    fn width(&self) -> usize {
        self.config.width
    }

    fn palette(&self) -> &Palette {
        &self.config.palette
    }

    fn push(&mut self, line: Line<'static>) {
        self.view.content.push(line);
    }

    fn push_styled(&mut self, text: String, style: Style) {
        self.push(Line::from(Span::styled(text, style)));
    }

    fn header(&mut self, pr: &PullRequestSnapshot) {
        let accent = Style::default()
            .fg(self.palette().accent)
            .add_modifier(Modifier::BOLD);
        let mut lines = vec![
            Line::from(Span::styled(
                format!("#{} {} ({})", pr.number, pr.title, pr.author),
                accent,
            )),
            Line::from(format!(
                "{} -> {}  Status: {}",
                pr.source_branch, pr.base_branch, pr.state
            )),
        ];
        for check in &pr.checks {
            lines.push(Line::from(format!(
                "* {} : {} ({})",
                check.status, check.name, check.url
            )));
        }
        for review in &pr.reviews {
            lines.push(Line::from(format!(
                "* {} : {} ({})",
                review.state.label(),
                review.author,
                review.submitted_at
            )));
        }
        if let Some(pending) = &pr.pending_review {
            lines.push(Line::from(Span::styled(
                format!(
                    "PENDING REVIEW by {}  [a]pprove  [x] request changes  [S]ubmit  [X] cancel",
                    pending.author
                ),
                Style::default()
                    .fg(Color::Black)
                    .bg(self.palette().accent)
                    .add_modifier(Modifier::BOLD),
            )));
        }
        self.view.header = lines;
    }

    fn heading(&mut self, level: HeadingLevel, text: String) {
        let p = *self.palette();
        let style = match level {
            HeadingLevel::File => Style::default()
                .fg(Color::Black)
                .bg(p.file_heading)
                .add_modifier(Modifier::BOLD),
            HeadingLevel::Hunk => Style::default().fg(Color::Black).bg(p.hunk_heading),
        };
        let line = self.view.content.len();
        self.push_styled(truncate_or_pad(&text, self.width()), style);
        self.view.headings.open(level, line, text);
    }

    fn file(&mut self, index: usize, file: &DiffFile, pr: &PullRequestSnapshot) {
        let heading = match file.kind {
            FileKind::Renamed => format!("{} -> {}:", file.old_name, file.new_name),
            FileKind::Deleted => format!("DELETED {}", file.old_name),
            FileKind::Added => format!("NEW {}:", file.new_name),
            FileKind::Copied => format!("COPY {} -> {}:", file.old_name, file.new_name),
            FileKind::Modified | FileKind::Binary => format!("{}:", file.new_name),
        };
        self.view.bookmarks.close(BookmarkCategory::File, self.view.content.len());
        self.heading(HeadingLevel::File, heading);
        self.hunk_text = None;
        self.view.bookmarks.push(
            BookmarkCategory::File,
            self.view.content.len(),
            BookmarkTarget::File(index),
        );

        match file.kind {
            FileKind::Deleted => return,
            FileKind::Binary => {
                let style = Style::default().fg(self.palette().context);
                self.push_styled(truncate_or_pad("BINARY FILE", self.width()), style);
                return;
            }
            _ => {}
        }

        let hunks = match index_file(file) {
            Ok(hunks) => hunks,
            Err(e) => {
                warn!("Skipping {}: {}", file.display_name(), e);
                let style = Style::default().fg(self.palette().del);
                self.push_styled(truncate_or_pad(&format!("  {}", e), self.width()), style);
                return;
            }
        };

        let path = file.comment_path();
        let mut placement = CommentPlacementEngine::for_file(&pr.threads, path);

        for indexed in &hunks {
            let h = indexed.hunk;
            let text = format!(
                "==O== ==N== (+{}, -{},  O={}, N={})",
                h.added, h.deleted, h.old_lines, h.new_lines
            );
            self.heading(HeadingLevel::Hunk, text.clone());
            self.hunk_text = Some(text);

            for line in &indexed.lines {
                self.diff_line(path, line);
                for thread in placement.take_for_line(line) {
                    self.thread_block(&thread);
                }
            }
        }

        let orphans = placement.into_orphans();
        if !orphans.is_empty() {
            debug!(
                "{} thread(s) on {} match no diff line",
                orphans.len(),
                path
            );
            if self.config.show_orphaned_comments {
                self.heading(HeadingLevel::Hunk, "ORPHANED COMMENTS".to_string());
                self.hunk_text = Some("ORPHANED COMMENTS".to_string());
                for thread in &orphans {
                    self.thread_block(thread);
                }
            }
        }
    }

    fn skipped_file(&mut self, path: &str, reason: &str) {
        self.view.bookmarks.close(BookmarkCategory::File, self.view.content.len());
        self.heading(HeadingLevel::File, format!("SKIPPED {}", path));
        self.hunk_text = None;
        let style = Style::default().fg(self.palette().del);
        self.push_styled(truncate_or_pad(&format!("  {}", reason), self.width()), style);
    }

    fn diff_line(&mut self, path: &str, line: &DiffLine<'_>) {
        let p = *self.palette();
        let style = match line.op {
            Op::Add => Style::default().fg(p.add).add_modifier(Modifier::BOLD),
            Op::Delete => Style::default().fg(p.del).add_modifier(Modifier::BOLD),
            Op::Context => Style::default().fg(p.context),
        };
        let prefix = format!("{:05} {:05} {}  ", line.old, line.new, line.op.marker());
        let text = self.config.tabs.expand(line.text, path);
        let width = self.width();

        let rendered = match self.highlighter {
            Some(h) if prefix.len() < width => {
                let room = width - prefix.len();
                let mut spans = vec![Span::styled(prefix, style)];
                spans.extend(window_spans(
                    h.highlight_line(&text, path),
                    self.x_offset,
                    room,
                    Style::default(),
                ));
                Line::from(spans)
            }
            _ => {
                let visible: String = text.chars().skip(self.x_offset).collect();
                Line::from(Span::styled(
                    truncate_or_pad(&format!("{}{}", prefix, visible), width),
                    style,
                ))
            }
        };

        let (number, is_new) = line.comment_anchor();
        self.view.code_lines.insert(
            self.view.content.len(),
            CodeLine {
                path: path.to_string(),
                line: number,
                is_new,
                op: line.op,
            },
        );
        self.push(rendered);
    }

    fn thread_block(&mut self, thread: &CommentThread) {
        for comment in thread.comments() {
            self.comment_block(comment);
        }
    }

    /// One comment: hunk-level heading, wrapped body and reaction summary,
    /// bracketed by a comment bookmark.
    fn comment_block(&mut self, comment: &Comment) {
        let p = *self.palette();
        let reply = comment
            .parent_id
            .map(|id| format!(" <- {}", id))
            .unwrap_or_default();
        let heading = format!(
            "------- [{}{}] {} at {} ------",
            comment.id,
            reply,
            comment.author,
            format_timestamp(&comment.created_at)
        );

        let heading_line = self.view.content.len();
        self.view.bookmarks.push(
            BookmarkCategory::Comment,
            heading_line + 1,
            BookmarkTarget::Comment(comment.clone()),
        );
        let style = Style::default()
            .fg(Color::White)
            .bg(p.comment)
            .add_modifier(Modifier::ITALIC);
        self.push_styled(truncate_or_pad(&heading, self.width()), style);
        self.view.headings.open(HeadingLevel::Hunk, heading_line, heading);

        let body_width = self.width().saturating_sub(4).max(1);
        let body_style = Style::default().fg(p.comment);
        let code_style = Style::default().fg(p.context);
        for (text, is_code) in wrap_text_with_code(&comment.body, body_width) {
            let style = if is_code { code_style } else { body_style };
            self.push_styled(truncate_or_pad(&format!("  {}", text), self.width()), style);
        }
        if let Some(summary) = reaction_summary(&comment.reactions) {
            let style = Style::default().fg(p.accent);
            self.push_styled(truncate_or_pad(&format!("  {}", summary), self.width()), style);
        }

        let end = self.view.content.len();
        self.view.bookmarks.close(BookmarkCategory::Comment, end);
        match self.hunk_text.clone() {
            Some(text) => self.view.headings.resume(HeadingLevel::Hunk, end, text),
            None => self.view.headings.close(HeadingLevel::Hunk, end),
        }
    }

    fn finish(mut self) -> RenderedView {
        let end = self.view.content.len();
        self.view.bookmarks.close(BookmarkCategory::File, end);
        self.view.headings.finish(end);
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::insert_thread;
    use crate::config::Config;
    use crate::types::fixtures::{comment, file, hunk, snapshot, thread};
    use crate::types::{Check, ReactionKind, Review, ReviewState};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    const WIDTH: usize = 60;

    fn engine() -> RenderEngine {
        RenderEngine::new(Config::default().render_config(WIDTH), None)
    }

    fn render(pr: &PullRequestSnapshot) -> RenderedView {
        let mut e = engine();
        e.render(pr);
        e.view().clone()
    }

    fn trimmed(view: &RenderedView) -> Vec<String> {
        view.content_text()
            .into_iter()
            .map(|l| l.trim_end().to_string())
            .collect()
    }

    fn sample() -> PullRequestSnapshot {
        snapshot(vec![file(
            "src/lib.rs",
            FileKind::Modified,
            vec![hunk(
                10,
                10,
                &[
                    (Op::Context, "a"),
                    (Op::Context, "b"),
                    (Op::Delete, "c"),
                    (Op::Add, "C"),
                    (Op::Context, "d"),
                ],
            )],
        )])
    }

    // ========================================================================
    // Header
    // ========================================================================

    #[test]
    fn test_header_lines() {
        let mut pr = sample();
        pr.checks.push(Check {
            name: "ci/build".to_string(),
            status: "SUCCESS".to_string(),
            url: "https://ci.example/1".to_string(),
        });
        pr.reviews.push(Review {
            id: "R1".to_string(),
            state: ReviewState::Approved,
            author: "bob".to_string(),
            submitted_at: "2024-01-15T10:00:00Z".to_string(),
        });
        let view = render(&pr);
        assert_eq!(
            view.header_text(),
            vec![
                "#42 Fix the widget (alice)",
                "fix-widget -> main  Status: OPEN",
                "* SUCCESS : ci/build (https://ci.example/1)",
                "* APPROVED : bob (2024-01-15T10:00:00Z)",
            ]
        );
    }

    #[test]
    fn test_header_pending_banner() {
        let mut pr = sample();
        pr.pending_review = Some(Review {
            id: "R2".to_string(),
            state: ReviewState::Pending,
            author: "alice".to_string(),
            submitted_at: String::new(),
        });
        let view = render(&pr);
        assert!(view.header_text()[2].starts_with("PENDING REVIEW by alice"));
    }

    // ========================================================================
    // Diff lines
    // ========================================================================

    #[test]
    fn test_render_diff_lines() {
        let view = render(&sample());
        assert_eq!(
            trimmed(&view),
            vec![
                "src/lib.rs:",
                "==O== ==N== (+1, -1,  O=4, N=4)",
                "00010 00010    a",
                "00011 00011    b",
                "00012 00012 -  c",
                "00013 00012 +  C",
                "00013 00013    d",
            ]
        );
    }

    #[test]
    fn test_every_line_has_viewport_width() {
        let view = render(&sample());
        for line in view.content_text() {
            assert_eq!(line.chars().count(), WIDTH);
        }
    }

    #[test]
    fn test_horizontal_offset_drops_text_prefix() {
        let pr = snapshot(vec![file(
            "a.txt",
            FileKind::Modified,
            vec![hunk(1, 1, &[(Op::Add, "abcdef")])],
        )]);
        let mut e = engine();
        e.set_x_offset(2);
        e.render(&pr);
        assert_eq!(e.view().content_text()[2].trim_end(), "00001 00001 +  cdef");

        e.set_x_offset(50);
        e.render(&pr);
        assert_eq!(e.view().content_text()[2].trim_end(), "00001 00001 +");
    }

    #[test]
    fn test_tabs_expanded_before_offset() {
        let pr = snapshot(vec![file(
            "a.rs",
            FileKind::Modified,
            vec![hunk(1, 1, &[(Op::Context, "\tx")])],
        )]);
        let mut e = engine();
        e.set_x_offset(3);
        e.render(&pr);
        assert_eq!(e.view().content_text()[2].trim_end(), "00001 00001     x");
    }

    #[test]
    fn test_code_lines_anchor_sides() {
        let view = render(&sample());
        let delete = &view.code_lines[&4];
        assert_eq!((delete.line, delete.is_new), (12, false));
        let add = &view.code_lines[&5];
        assert_eq!((add.line, add.is_new, add.path.as_str()), (12, true, "src/lib.rs"));
        assert!(!view.code_lines.contains_key(&0));
    }

    // ========================================================================
    // File kinds
    // ========================================================================

    #[test]
    fn test_file_headings_by_kind() {
        let mut renamed = file("new.rs", FileKind::Renamed, vec![]);
        renamed.old_name = "old.rs".to_string();
        let mut copied = file("copy.rs", FileKind::Copied, vec![]);
        copied.old_name = "orig.rs".to_string();
        let pr = snapshot(vec![
            renamed,
            file("gone.rs", FileKind::Deleted, vec![hunk(1, 0, &[(Op::Delete, "x")])]),
            file("fresh.rs", FileKind::Added, vec![]),
            copied,
            file("logo.png", FileKind::Binary, vec![]),
        ]);
        let view = render(&pr);
        assert_eq!(
            trimmed(&view),
            vec![
                "old.rs -> new.rs:",
                "DELETED gone.rs",
                "NEW fresh.rs:",
                "COPY orig.rs -> copy.rs:",
                "logo.png:",
                "BINARY FILE",
            ]
        );
        assert_eq!(view.headings.level(HeadingLevel::File).len(), 5);
        let files = view.headings.level(HeadingLevel::File);
        let ranges: Vec<_> = (0..files.len())
            .filter_map(|i| files.get(i))
            .map(|h| (h.start, h.end))
            .collect();
        assert_eq!(
            ranges,
            vec![
                (0, Some(1)),
                (1, Some(2)),
                (2, Some(3)),
                (3, Some(4)),
                (5, Some(6)),
            ]
        );
        assert_eq!(view.bookmarks.file_position(1), Some(1));
        assert_eq!(view.bookmarks.file_position(4), Some(5));
    }

    #[test]
    fn test_malformed_hunk_only_breaks_its_file() {
        let mut bad = hunk(1, 1, &[(Op::Context, "a")]);
        bad.old_lines = 5;
        let pr = snapshot(vec![
            file("bad.rs", FileKind::Modified, vec![bad]),
            file("good.rs", FileKind::Modified, vec![hunk(1, 1, &[(Op::Add, "ok")])]),
        ]);
        let lines = trimmed(&render(&pr));
        assert_eq!(lines[0], "bad.rs:");
        assert!(lines[1].starts_with("  malformed hunk"));
        assert_eq!(lines[2], "good.rs:");
        assert_eq!(lines[4], "00001 00001 +  ok");
    }

    #[test]
    fn test_skipped_files_listed() {
        let mut pr = snapshot(vec![]);
        pr.skipped_files
            .push(("weird.rs".to_string(), "invalid hunk header".to_string()));
        let lines = trimmed(&render(&pr));
        assert_eq!(lines, vec!["SKIPPED weird.rs", "  invalid hunk header"]);
    }

    // ========================================================================
    // Comments
    // ========================================================================

    #[test]
    fn test_thread_rendered_after_its_line() {
        let mut pr = sample();
        let mut t = thread(7, "bob", "please rename");
        t.root.created_at = "not-a-date".to_string();
        t.root
            .reactions
            .insert(ReactionKind::ThumbsUp, BTreeSet::from(["carol".to_string()]));
        insert_thread(&mut pr.threads, "src/lib.rs", -12, t);

        let view = render(&pr);
        let lines = trimmed(&view);
        assert_eq!(lines[5], "00013 00012 +  C");
        assert_eq!(lines[6], "------- [7] bob at not-a-date ------");
        assert_eq!(lines[7], "  please rename");
        assert_eq!(lines[8], "  [+1 x1: carol]");
        assert_eq!(lines[9], "00013 00013    d");

        let bookmarks = view.bookmarks.list(BookmarkCategory::Comment);
        assert_eq!(bookmarks.len(), 1);
        assert_eq!(bookmarks[0].position, 7);
        assert_eq!(bookmarks[0].end, Some(9));
    }

    #[test]
    fn test_comment_heading_restores_hunk_heading() {
        let mut pr = sample();
        insert_thread(&mut pr.threads, "src/lib.rs", -12, thread(7, "bob", "x"));
        let mut view = render(&pr);

        view.headings.rederive(7);
        let hunk = view.headings.level(HeadingLevel::Hunk).active(7).unwrap();
        assert!(hunk.text.starts_with("------- [7]"));

        view.headings.rederive(8);
        let hunk = view.headings.level(HeadingLevel::Hunk).active(8).unwrap();
        assert!(hunk.text.starts_with("==O== ==N=="));
    }

    #[test]
    fn test_replies_show_parent() {
        let mut pr = sample();
        let mut t = thread(1, "bob", "root");
        let mut reply = comment(2, "alice", "done");
        reply.parent_id = Some(1);
        reply.created_at = "later".to_string();
        t.root.created_at = "earlier".to_string();
        t.replies.push(reply);
        insert_thread(&mut pr.threads, "src/lib.rs", -10, t);

        let lines = trimmed(&render(&pr));
        assert_eq!(lines[3], "------- [1] bob at earlier ------");
        assert_eq!(lines[5], "------- [2 <- 1] alice at later ------");
    }

    #[test]
    fn test_top_level_comments_before_files() {
        let mut pr = sample();
        let mut c = comment(3, "carol", "LGTM");
        c.created_at = "t".to_string();
        pr.comments.push(c);
        let view = render(&pr);
        let lines = trimmed(&view);
        assert_eq!(lines[0], "------- [3] carol at t ------");
        assert_eq!(lines[1], "  LGTM");
        assert_eq!(lines[2], "src/lib.rs:");
        // No hunk heading is active after a top-level comment
        assert_eq!(view.headings.level(HeadingLevel::Hunk).len(), 2);
    }

    #[test]
    fn test_orphans_hidden_by_default() {
        let mut pr = sample();
        insert_thread(&mut pr.threads, "src/lib.rs", -99, thread(5, "bob", "stale"));
        let view = render(&pr);
        assert_eq!(view.content.len(), 7);
        assert!(view.bookmarks.list(BookmarkCategory::Comment).is_empty());
    }

    #[test]
    fn test_orphans_shown_when_enabled() {
        let mut pr = sample();
        insert_thread(&mut pr.threads, "src/lib.rs", -99, thread(5, "bob", "stale"));
        let mut config = Config::default();
        config.display.show_orphaned_comments = true;
        let mut e = RenderEngine::new(config.render_config(WIDTH), None);
        e.render(&pr);
        let lines = trimmed(e.view());
        assert_eq!(lines[7], "ORPHANED COMMENTS");
        assert_eq!(lines[9], "  stale");
    }

    // ========================================================================
    // Engine
    // ========================================================================

    #[test]
    fn test_render_is_idempotent() {
        let mut pr = sample();
        insert_thread(&mut pr.threads, "src/lib.rs", -12, thread(7, "bob", "x"));
        insert_thread(&mut pr.threads, "src/lib.rs", 12, thread(8, "bob", "y"));
        let mut e = engine();
        e.render(&pr);
        let first = e.view().clone();
        e.mark_dirty();
        assert!(e.render(&pr));
        assert_eq!(&first, e.view());
    }

    #[test]
    fn test_render_only_when_dirty() {
        let pr = sample();
        let mut e = engine();
        assert!(e.render(&pr));
        assert!(!e.render(&pr));
        e.set_x_offset(0);
        assert!(!e.render(&pr));
        e.set_width(80);
        assert!(e.render(&pr));
    }

    #[test]
    fn test_bookmarks_sorted_after_render() {
        let mut pr = snapshot(vec![
            file("a.rs", FileKind::Modified, vec![hunk(1, 1, &[(Op::Add, "x"), (Op::Add, "y")])]),
            file("b.rs", FileKind::Modified, vec![hunk(1, 1, &[(Op::Add, "z")])]),
        ]);
        insert_thread(&mut pr.threads, "a.rs", -2, thread(1, "bob", "one"));
        insert_thread(&mut pr.threads, "a.rs", -1, thread(2, "bob", "two"));
        insert_thread(&mut pr.threads, "b.rs", -1, thread(3, "bob", "three"));
        pr.comments.push(comment(4, "carol", "top"));

        let view = render(&pr);
        for category in [BookmarkCategory::Comment, BookmarkCategory::File] {
            let positions: Vec<_> = view.bookmarks.list(category).iter().map(|b| b.position).collect();
            let mut sorted = positions.clone();
            sorted.sort();
            assert_eq!(positions, sorted);
        }
        assert_eq!(view.bookmarks.list(BookmarkCategory::Comment).len(), 4);
        assert_eq!(view.bookmarks.list(BookmarkCategory::File).len(), 2);
    }
}
