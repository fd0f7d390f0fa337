use std::sync::OnceLock;

use regex::Regex;

use crate::error::ParseError;
use crate::types::{DiffFile, DiffHunk, FileKind, HunkLine, Op};

const HUNK_HEADER_PATTERN: &str = r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@";

/// Result of parsing a whole diff: the files that parsed, and the ones that didn't
#[derive(Debug, Default)]
pub struct ParsedDiff {
    pub files: Vec<DiffFile>,
    pub errors: Vec<ParseError>,
}

/// Parse a unified diff string into structured DiffFile objects
pub fn parse_diff(diff: &str) -> ParsedDiff {
    let mut parsed = ParsedDiff::default();
    let lines: Vec<&str> = diff.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        // Look for diff --git header
        if lines[i].starts_with("diff --git ") {
            if let Some((result, consumed)) = parse_file(&lines[i..]) {
                match result {
                    Ok(file) => parsed.files.push(file),
                    Err(err) => {
                        log::warn!("{}", err);
                        parsed.errors.push(err);
                    }
                }
                i += consumed;
                continue;
            }
        }
        i += 1;
    }

    parsed
}

/// Per-file flags collected from the extended header lines
#[derive(Default)]
struct FileFlags {
    added: bool,
    deleted: bool,
    renamed: bool,
    copied: bool,
    binary: bool,
}

impl FileFlags {
    fn kind(&self) -> FileKind {
        if self.binary {
            FileKind::Binary
        } else if self.deleted {
            FileKind::Deleted
        } else if self.added {
            FileKind::Added
        } else if self.renamed {
            FileKind::Renamed
        } else if self.copied {
            FileKind::Copied
        } else {
            FileKind::Modified
        }
    }
}

fn strip_side_prefix(name: &str) -> Option<&str> {
    if name == "/dev/null" {
        return None;
    }
    Some(
        name.strip_prefix("a/")
            .or_else(|| name.strip_prefix("b/"))
            .unwrap_or(name),
    )
}

fn parse_file(lines: &[&str]) -> Option<(Result<DiffFile, ParseError>, usize)> {
    if lines.is_empty() || !lines[0].starts_with("diff --git ") {
        return None;
    }

    let mut i = 0;
    let mut old_name = String::new();
    let mut new_name = String::new();
    let mut flags = FileFlags::default();
    let mut hunks = Vec::new();

    // Format: diff --git a/path/to/file b/path/to/file
    let names = &lines[i]["diff --git ".len()..];
    if let Some(b_idx) = names.find(" b/") {
        new_name = names[b_idx + 3..].to_string();
        let old = &names[..b_idx];
        old_name = old.strip_prefix("a/").unwrap_or(old).to_string();
    }
    i += 1;

    // Parse metadata lines
    while i < lines.len() {
        let line = lines[i];

        if line.starts_with("new file mode") {
            flags.added = true;
        } else if line.starts_with("deleted file mode") {
            flags.deleted = true;
        } else if let Some(from) = line.strip_prefix("rename from ") {
            flags.renamed = true;
            old_name = from.to_string();
        } else if let Some(to) = line.strip_prefix("rename to ") {
            flags.renamed = true;
            new_name = to.to_string();
        } else if let Some(from) = line.strip_prefix("copy from ") {
            flags.copied = true;
            old_name = from.to_string();
        } else if let Some(to) = line.strip_prefix("copy to ") {
            flags.copied = true;
            new_name = to.to_string();
        } else if let Some(name) = line.strip_prefix("--- ") {
            if let Some(name) = strip_side_prefix(name) {
                old_name = name.to_string();
            }
            i += 1;
            if i < lines.len() {
                if let Some(name) = lines[i].strip_prefix("+++ ") {
                    if let Some(name) = strip_side_prefix(name) {
                        new_name = name.to_string();
                    }
                    i += 1;
                }
            }
            break;
        } else if line.starts_with("diff --git ") || line.starts_with("@@ ") {
            break;
        } else if line.starts_with("Binary files") || line.starts_with("GIT binary patch") {
            flags.binary = true;
            i += 1;
            break;
        }
        i += 1;
    }

    // Parse hunks
    while i < lines.len() {
        let line = lines[i];

        if line.starts_with("diff --git ") {
            break;
        }

        if line.starts_with("@@ ") {
            match parse_hunk(&lines[i..]) {
                Some((hunk, consumed)) => {
                    hunks.push(hunk);
                    i += consumed;
                    continue;
                }
                None => {
                    let err = ParseError {
                        path: if new_name.is_empty() { old_name } else { new_name },
                        reason: format!("invalid hunk header '{}'", line),
                    };
                    // Skip the rest of this file
                    while i < lines.len() && !lines[i].starts_with("diff --git ") {
                        i += 1;
                    }
                    return Some((Err(err), i));
                }
            }
        }

        i += 1;
    }

    if flags.binary {
        hunks.clear();
    }

    Some((
        Ok(DiffFile {
            old_name,
            new_name,
            kind: flags.kind(),
            hunks,
        }),
        i,
    ))
}

fn parse_hunk_header(header: &str) -> Option<(u32, u32, u32, u32)> {
    static HUNK_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let hunk_re = HUNK_RE
        .get_or_init(|| Regex::new(HUNK_HEADER_PATTERN).ok())
        .as_ref()?;
    let caps = hunk_re.captures(header)?;

    let old_start: u32 = caps.get(1)?.as_str().parse().ok()?;
    let old_lines: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 1,
    };
    let new_start: u32 = caps.get(3)?.as_str().parse().ok()?;
    let new_lines: u32 = match caps.get(4) {
        Some(m) => m.as_str().parse().ok()?,
        None => 1,
    };
    Some((old_start, old_lines, new_start, new_lines))
}

/// Parse one hunk. Reading stops once the declared line counts are consumed, or
/// earlier at the next header, in which case the indexer reports the hunk as short.
fn parse_hunk(lines: &[&str]) -> Option<(DiffHunk, usize)> {
    if lines.is_empty() || !lines[0].starts_with("@@ ") {
        return None;
    }

    let header = lines[0].to_string();
    let (old_start, old_lines, new_start, new_lines) = parse_hunk_header(&header)?;

    let mut hunk_lines = Vec::new();
    let mut i = 1;
    let mut old_seen = 0;
    let mut new_seen = 0;
    let mut added = 0;
    let mut deleted = 0;

    while i < lines.len() {
        let line = lines[i];

        if line.starts_with('\\') {
            // "\ No newline at end of file"
            i += 1;
            continue;
        }
        if old_seen >= old_lines && new_seen >= new_lines {
            break;
        }
        if line.starts_with("@@ ") || line.starts_with("diff --git ") {
            break;
        }

        let op = if line.starts_with('+') {
            new_seen += 1;
            added += 1;
            Op::Add
        } else if line.starts_with('-') {
            old_seen += 1;
            deleted += 1;
            Op::Delete
        } else if line.starts_with(' ') || line.is_empty() {
            old_seen += 1;
            new_seen += 1;
            Op::Context
        } else {
            // Unknown line, might be end of hunk
            break;
        };

        // Strip the leading +/- / space
        let text = if line.is_empty() {
            String::new()
        } else {
            line[1..].to_string()
        };

        hunk_lines.push(HunkLine { op, text });
        i += 1;
    }

    Some((
        DiffHunk {
            header,
            old_start,
            old_lines,
            new_start,
            new_lines,
            added,
            deleted,
            lines: hunk_lines,
        },
        i,
    ))
}
