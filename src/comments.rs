//! Placement of review threads on diff lines.

use std::collections::HashSet;

use crate::indexer::DiffLine;
use crate::types::{CommentMap, CommentThread, LineKey, LineThreads, Reactions};

/// Key for a thread anchored on `line`: the new (RIGHT) side is negative,
/// the old (LEFT) side positive.
pub fn line_key(line: u32, right_side: bool) -> LineKey {
    if right_side {
        -(line as LineKey)
    } else {
        line as LineKey
    }
}

/// Insert a thread into the path -> key -> threads map
pub fn insert_thread(map: &mut CommentMap, path: &str, key: LineKey, thread: CommentThread) {
    map.entry(path.to_string())
        .or_default()
        .entry(key)
        .or_default()
        .push(thread);
}

/// Attaches the threads of one file to its diff lines.
///
/// Works on a private copy of the file's bucket: a thread is removed as soon as
/// it is attached, so it can never show up twice.
pub struct CommentPlacementEngine {
    remaining: LineThreads,
    attached: HashSet<u64>,
}

impl CommentPlacementEngine {
    pub fn for_file(map: &CommentMap, path: &str) -> Self {
        Self {
            remaining: map.get(path).cloned().unwrap_or_default(),
            attached: HashSet::new(),
        }
    }

    /// Threads to render after `line`. The new side is probed first, then the old
    /// side; a key is only probed when the line exists on that side, so a thread on
    /// a deleted line never lands on an added one.
    pub fn take_for_line(&mut self, line: &DiffLine<'_>) -> Vec<CommentThread> {
        let mut threads = Vec::new();
        if self.remaining.is_empty() {
            return threads;
        }
        for key in [line.new_key(), line.old_key()].into_iter().flatten() {
            if let Some(bucket) = self.remaining.remove(&key) {
                for thread in bucket {
                    if self.attached.insert(thread.root.id) {
                        threads.push(thread);
                    }
                }
            }
        }
        threads
    }

    /// Threads that matched no line. Outdated anchors end up here.
    pub fn into_orphans(self) -> Vec<CommentThread> {
        let attached = self.attached;
        let mut seen = HashSet::new();
        self.remaining
            .into_values()
            .flatten()
            .filter(|t| !attached.contains(&t.root.id) && seen.insert(t.root.id))
            .collect()
    }
}

/// One-line summary of reactions, e.g. `[+1 x2: alice, bob] [eyes x1: carol]`
pub fn reaction_summary(reactions: &Reactions) -> Option<String> {
    let parts: Vec<String> = reactions
        .iter()
        .filter(|(_, authors)| !authors.is_empty())
        .map(|(kind, authors)| {
            let names: Vec<&str> = authors.iter().map(String::as_str).collect();
            format!("[{} x{}: {}]", kind.label(), authors.len(), names.join(", "))
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}
