//! Headings, bookmarks and pane focus for the rendered buffer.
//!
//! All positions are indices into the flat content buffer produced by the
//! render engine. Headings and bookmarks are rebuilt on every render pass.

use crate::types::Comment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingLevel {
    File,
    Hunk,
}

/// A navigable section. `start` is the first line after the heading text, so a
/// jump puts the section body at the top while the sticky area shows `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub text: String,
    pub start: usize,
    /// Exclusive end, `None` while the section is still open
    pub end: Option<usize>,
    /// Line holding `text`; `None` for a resumed section
    text_line: Option<usize>,
}

impl Heading {
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && self.end.map_or(true, |end| offset < end)
    }
}

/// Headings of one level plus the index of the current one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadingList {
    headings: Vec<Heading>,
    current: Option<usize>,
}

impl HeadingList {
    pub fn len(&self) -> usize {
        self.headings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Heading> {
        self.headings.get(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Heading> {
        self.current.and_then(|i| self.get(i))
    }

    /// Current heading, but only while `offset` is still inside its section
    pub fn active(&self, offset: usize) -> Option<&Heading> {
        self.current().filter(|h| h.contains(offset))
    }

    fn push(&mut self, start: usize, text: String, text_line: Option<usize>) {
        self.close(start);
        self.headings.push(Heading {
            text,
            start,
            end: None,
            text_line,
        });
    }

    /// Close the open heading, if any. An empty section shrinks to its heading
    /// line; an empty resumed section has none and is dropped.
    fn close(&mut self, end: usize) {
        let Some(last) = self.headings.last_mut() else {
            return;
        };
        if last.end.is_some() {
            return;
        }
        if end > last.start {
            last.end = Some(end);
            return;
        }
        match last.text_line {
            Some(line) => {
                last.start = line;
                last.end = Some(end.max(line + 1));
            }
            None => {
                self.headings.pop();
            }
        }
    }

    /// Move to the next heading, wrapping to the first. Returns its start.
    pub fn next(&mut self) -> Option<usize> {
        if self.headings.is_empty() {
            return None;
        }
        let index = match self.current {
            Some(i) if i + 1 < self.headings.len() => i + 1,
            Some(_) => 0,
            None => 0,
        };
        self.current = Some(index);
        Some(self.headings[index].start)
    }

    /// Move to the previous heading, wrapping to the last. Returns its start.
    pub fn prev(&mut self) -> Option<usize> {
        if self.headings.is_empty() {
            return None;
        }
        let index = match self.current {
            Some(i) if i > 0 => i - 1,
            _ => self.headings.len() - 1,
        };
        self.current = Some(index);
        Some(self.headings[index].start)
    }

    /// Recompute the current heading from the top-of-viewport line: the last
    /// heading starting at or before `offset`.
    pub fn rederive(&mut self, offset: usize) {
        let after = self.headings.partition_point(|h| h.start <= offset);
        self.current = after.checked_sub(1);
    }
}

/// File and hunk headings of the rendered buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headings {
    file: HeadingList,
    hunk: HeadingList,
}

impl Headings {
    pub fn level(&self, level: HeadingLevel) -> &HeadingList {
        match level {
            HeadingLevel::File => &self.file,
            HeadingLevel::Hunk => &self.hunk,
        }
    }

    pub fn level_mut(&mut self, level: HeadingLevel) -> &mut HeadingList {
        match level {
            HeadingLevel::File => &mut self.file,
            HeadingLevel::Hunk => &mut self.hunk,
        }
    }

    /// Open a heading whose text sits on `text_line`. A file heading also closes
    /// the open hunk heading.
    pub fn open(&mut self, level: HeadingLevel, text_line: usize, text: impl Into<String>) {
        if level == HeadingLevel::File {
            self.hunk.close(text_line);
        }
        let list = self.level_mut(level);
        list.close(text_line);
        list.push(text_line + 1, text.into(), Some(text_line));
    }

    /// Reopen a section that has no heading line of its own, starting at `start`.
    /// Used to restore the hunk label after an inlined comment block.
    pub fn resume(&mut self, level: HeadingLevel, start: usize, text: impl Into<String>) {
        self.level_mut(level).push(start, text.into(), None);
    }

    pub fn close(&mut self, level: HeadingLevel, end: usize) {
        self.level_mut(level).close(end);
    }

    /// Close everything still open at the end of the buffer
    pub fn finish(&mut self, end: usize) {
        self.hunk.close(end);
        self.file.close(end);
    }

    pub fn next(&mut self, level: HeadingLevel) -> Option<usize> {
        self.level_mut(level).next()
    }

    pub fn prev(&mut self, level: HeadingLevel) -> Option<usize> {
        self.level_mut(level).prev()
    }

    pub fn rederive(&mut self, offset: usize) {
        self.file.rederive(offset);
        self.hunk.rederive(offset);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkCategory {
    Comment,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookmarkTarget {
    Comment(Comment),
    /// Index into the snapshot's file list
    File(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub position: usize,
    pub end: Option<usize>,
    pub target: BookmarkTarget,
}

impl Bookmark {
    fn covers(&self, offset: usize) -> bool {
        offset >= self.position && self.end.map_or(offset == self.position, |end| offset < end)
    }
}

/// Jump targets by category, each list sorted by position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bookmarks {
    comment: Vec<Bookmark>,
    file: Vec<Bookmark>,
}

impl Bookmarks {
    pub fn list(&self, category: BookmarkCategory) -> &[Bookmark] {
        match category {
            BookmarkCategory::Comment => &self.comment,
            BookmarkCategory::File => &self.file,
        }
    }

    fn list_mut(&mut self, category: BookmarkCategory) -> &mut Vec<Bookmark> {
        match category {
            BookmarkCategory::Comment => &mut self.comment,
            BookmarkCategory::File => &mut self.file,
        }
    }

    /// Add an open bookmark, keeping the list sorted
    pub fn push(&mut self, category: BookmarkCategory, position: usize, target: BookmarkTarget) {
        let list = self.list_mut(category);
        let at = list.partition_point(|b| b.position <= position);
        list.insert(
            at,
            Bookmark {
                position,
                end: None,
                target,
            },
        );
    }

    /// Set the end of the most recently pushed open bookmark
    pub fn close(&mut self, category: BookmarkCategory, end: usize) {
        if let Some(last) = self
            .list_mut(category)
            .iter_mut()
            .rev()
            .find(|b| b.end.is_none())
        {
            // An empty section is anchored on its heading, the line before it
            if end <= last.position {
                last.position = end.saturating_sub(1);
            }
            last.end = Some(end.max(last.position + 1));
        }
    }

    /// First bookmark strictly after `offset`, wrapping to the first
    pub fn next(&self, category: BookmarkCategory, offset: usize) -> Option<&Bookmark> {
        let list = self.list(category);
        list.iter()
            .find(|b| b.position > offset)
            .or_else(|| list.first())
    }

    /// Last bookmark strictly before `offset`, wrapping to the last
    pub fn prev(&self, category: BookmarkCategory, offset: usize) -> Option<&Bookmark> {
        let list = self.list(category);
        list.iter()
            .rev()
            .find(|b| b.position < offset)
            .or_else(|| list.last())
    }

    pub fn at(&self, category: BookmarkCategory, offset: usize) -> Option<&Bookmark> {
        self.list(category).iter().find(|b| b.position == offset)
    }

    pub fn covering(&self, category: BookmarkCategory, offset: usize) -> Option<&Bookmark> {
        self.list(category).iter().rev().find(|b| b.covers(offset))
    }

    /// Position of the file bookmark for file `index`
    pub fn file_position(&self, index: usize) -> Option<usize> {
        self.file
            .iter()
            .find(|b| b.target == BookmarkTarget::File(index))
            .map(|b| b.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Content,
    FileList,
}

/// Which pane receives key input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusState {
    focused: Pane,
    file_list_visible: bool,
}

impl FocusState {
    pub fn new(file_list_visible: bool) -> Self {
        Self {
            focused: Pane::Content,
            file_list_visible,
        }
    }

    pub fn focused(&self) -> Pane {
        self.focused
    }

    pub fn is_visible(&self, pane: Pane) -> bool {
        match pane {
            Pane::Content => true,
            Pane::FileList => self.file_list_visible,
        }
    }

    /// Move focus to the next visible pane
    pub fn cycle(&mut self) {
        let order = [Pane::Content, Pane::FileList];
        let at = order.iter().position(|p| *p == self.focused).unwrap_or(0);
        for step in 1..=order.len() {
            let candidate = order[(at + step) % order.len()];
            if self.is_visible(candidate) {
                self.focused = candidate;
                return;
            }
        }
    }

    pub fn toggle_file_list(&mut self) {
        self.file_list_visible = !self.file_list_visible;
        if !self.file_list_visible && self.focused == Pane::FileList {
            self.focused = Pane::Content;
        }
    }
}
