//! Turns parsed hunks into addressable display lines.
//!
//! Line numbers are running counters seeded from the hunk header: context lines
//! advance both sides, additions advance only the new side and deletions only
//! the old side. Every line shows both counters as they stand when it is read.

use crate::error::IndexError;
use crate::types::{DiffFile, DiffHunk, LineKey, Op};

/// One addressable display line of a hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine<'a> {
    pub op: Op,
    pub text: &'a str,
    pub old: u32,
    pub new: u32,
}

impl DiffLine<'_> {
    /// Key on the old side, valid unless the line was added
    pub fn old_key(&self) -> Option<LineKey> {
        (self.op != Op::Add).then_some(self.old as LineKey)
    }

    /// Key on the new side, valid unless the line was deleted
    pub fn new_key(&self) -> Option<LineKey> {
        (self.op != Op::Delete).then_some(-(self.new as LineKey))
    }

    /// Line number and side a new comment on this line should target.
    /// Returns `(line, is_new_side)`.
    pub fn comment_anchor(&self) -> (u32, bool) {
        match self.op {
            Op::Delete => (self.old, false),
            Op::Add | Op::Context => (self.new, true),
        }
    }
}

/// The lines of one hunk with their numbers assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedHunk<'a> {
    pub hunk: &'a DiffHunk,
    pub lines: Vec<DiffLine<'a>>,
}

/// Index a single hunk.
///
/// Fails when the body holds fewer (or more) lines than the header declares,
/// which means line data is missing and no key in the hunk can be trusted.
pub fn index_hunk(hunk: &DiffHunk) -> Result<IndexedHunk<'_>, IndexError> {
    let mut old = hunk.old_start;
    let mut new = hunk.new_start;
    let mut lines = Vec::with_capacity(hunk.lines.len());

    for line in &hunk.lines {
        lines.push(DiffLine {
            op: line.op,
            text: &line.text,
            old,
            new,
        });
        match line.op {
            Op::Context => {
                old += 1;
                new += 1;
            }
            Op::Add => new += 1,
            Op::Delete => old += 1,
        }
    }

    let found_old = old - hunk.old_start;
    let found_new = new - hunk.new_start;
    if found_old != hunk.old_lines || found_new != hunk.new_lines {
        return Err(IndexError::MalformedHunk {
            header: hunk.header.clone(),
            expected_old: hunk.old_lines,
            expected_new: hunk.new_lines,
            found_old,
            found_new,
        });
    }

    Ok(IndexedHunk { hunk, lines })
}

/// Index every hunk of a file. Binary files and pure renames yield nothing.
pub fn index_file(file: &DiffFile) -> Result<Vec<IndexedHunk<'_>>, IndexError> {
    file.hunks.iter().map(index_hunk).collect()
}
