use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What happened to a file in the diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Modified,
    Renamed,
    Added,
    Deleted,
    Copied,
    Binary,
}

impl FileKind {
    pub fn badge(&self) -> &'static str {
        match self {
            FileKind::Modified => "[M]",
            FileKind::Renamed => "[R]",
            FileKind::Added => "[A]",
            FileKind::Deleted => "[D]",
            FileKind::Copied => "[C]",
            FileKind::Binary => "[B]",
        }
    }

    pub fn color(&self) -> ratatui::style::Color {
        use ratatui::style::Color;
        match self {
            FileKind::Added => Color::Green,
            FileKind::Deleted => Color::Red,
            FileKind::Modified => Color::Yellow,
            FileKind::Renamed | FileKind::Copied => Color::Cyan,
            FileKind::Binary => Color::Magenta,
        }
    }
}

/// Operation tag of a single diff line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Context,
    Add,
    Delete,
}

impl Op {
    /// The marker character used in unified diffs
    pub fn marker(&self) -> char {
        match self {
            Op::Context => ' ',
            Op::Add => '+',
            Op::Delete => '-',
        }
    }
}

/// A raw line inside a hunk, before line numbers are assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
    pub op: Op,
    pub text: String,
}

/// A hunk in a diff (a contiguous block of changes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub header: String,
    pub old_start: u32,
    /// Line count declared by the hunk header for the old side
    pub old_lines: u32,
    pub new_start: u32,
    /// Line count declared by the hunk header for the new side
    pub new_lines: u32,
    pub added: u32,
    pub deleted: u32,
    pub lines: Vec<HunkLine>,
}

/// A file in the diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    pub old_name: String,
    pub new_name: String,
    pub kind: FileKind,
    pub hunks: Vec<DiffHunk>,
}

impl DiffFile {
    /// Path used to look up comments. Deleted files only exist on the old side.
    pub fn comment_path(&self) -> &str {
        match self.kind {
            FileKind::Deleted => &self.old_name,
            _ => &self.new_name,
        }
    }

    /// Name shown in the file list
    pub fn display_name(&self) -> String {
        match self.kind {
            FileKind::Renamed | FileKind::Copied if self.old_name != self.new_name => {
                format!("{} -> {}", self.old_name, self.new_name)
            }
            FileKind::Deleted => self.old_name.clone(),
            _ => self.new_name.clone(),
        }
    }
}

/// Parsed PR information from URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrInfo {
    pub owner: String,
    pub repo: String,
    pub number: u32,
}

impl PrInfo {
    /// Full repository name (owner/repo)
    pub fn repo_full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Kind of reaction a user left on a comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReactionKind {
    ThumbsUp,
    ThumbsDown,
    Laugh,
    Hooray,
    Confused,
    Heart,
    Rocket,
    Eyes,
}

impl ReactionKind {
    /// Map a GitHub GraphQL `ReactionContent` value
    pub fn from_github(content: &str) -> Option<Self> {
        match content {
            "THUMBS_UP" => Some(ReactionKind::ThumbsUp),
            "THUMBS_DOWN" => Some(ReactionKind::ThumbsDown),
            "LAUGH" => Some(ReactionKind::Laugh),
            "HOORAY" => Some(ReactionKind::Hooray),
            "CONFUSED" => Some(ReactionKind::Confused),
            "HEART" => Some(ReactionKind::Heart),
            "ROCKET" => Some(ReactionKind::Rocket),
            "EYES" => Some(ReactionKind::Eyes),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReactionKind::ThumbsUp => "+1",
            ReactionKind::ThumbsDown => "-1",
            ReactionKind::Laugh => "laugh",
            ReactionKind::Hooray => "hooray",
            ReactionKind::Confused => "confused",
            ReactionKind::Heart => "heart",
            ReactionKind::Rocket => "rocket",
            ReactionKind::Eyes => "eyes",
        }
    }
}

/// Reaction kind -> authors who reacted with it
pub type Reactions = BTreeMap<ReactionKind, BTreeSet<String>>;

/// Where a comment came from, which decides how a reply is issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentSource {
    /// A top-level conversation comment, replied to with `in_reply_to`
    RestComment { database_id: u64 },
    /// A comment inside a review thread, replied to inside a pending review
    ThreadComment { node_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: u64,
    pub author: String,
    pub created_at: String,
    pub body: String,
    pub parent_id: Option<u64>,
    pub reactions: Reactions,
    pub source: CommentSource,
}

/// A top-level comment and its flat reply chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentThread {
    pub root: Comment,
    pub replies: Vec<Comment>,
}

impl CommentThread {
    pub fn comments(&self) -> impl Iterator<Item = &Comment> {
        std::iter::once(&self.root).chain(self.replies.iter())
    }
}

/// Signed line key: old side positive, new side negative
pub type LineKey = i64;

/// Review threads of one file, grouped by the line they annotate
pub type LineThreads = BTreeMap<LineKey, Vec<CommentThread>>;

/// path -> LineKey -> threads
pub type CommentMap = HashMap<String, LineThreads>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Pending,
    Approved,
    ChangesRequested,
    Commented,
    Cancelled,
    Dismissed,
}

impl ReviewState {
    pub fn from_github(state: &str) -> Self {
        match state {
            "PENDING" => ReviewState::Pending,
            "APPROVED" => ReviewState::Approved,
            "CHANGES_REQUESTED" => ReviewState::ChangesRequested,
            "DISMISSED" => ReviewState::Dismissed,
            _ => ReviewState::Commented,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReviewState::Pending => "PENDING",
            ReviewState::Approved => "APPROVED",
            ReviewState::ChangesRequested => "CHANGES_REQUESTED",
            ReviewState::Commented => "COMMENTED",
            ReviewState::Cancelled => "CANCELLED",
            ReviewState::Dismissed => "DISMISSED",
        }
    }
}

/// How a pending review is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEvent {
    Approve,
    RequestChanges,
    Comment,
}

impl ReviewEvent {
    /// GitHub `PullRequestReviewEvent` value
    pub fn as_github(&self) -> &'static str {
        match self {
            ReviewEvent::Approve => "APPROVE",
            ReviewEvent::RequestChanges => "REQUEST_CHANGES",
            ReviewEvent::Comment => "COMMENT",
        }
    }

    /// State the review ends up in
    pub fn resulting_state(&self) -> ReviewState {
        match self {
            ReviewEvent::Approve => ReviewState::Approved,
            ReviewEvent::RequestChanges => ReviewState::ChangesRequested,
            ReviewEvent::Comment => ReviewState::Commented,
        }
    }
}

/// A diff line a new comment is anchored to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTarget {
    pub path: String,
    pub line: u32,
    /// RIGHT side when true, LEFT side otherwise
    pub is_new: bool,
}

impl LineTarget {
    pub fn side(&self) -> &'static str {
        if self.is_new {
            "RIGHT"
        } else {
            "LEFT"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub id: String,
    pub state: ReviewState,
    pub author: String,
    pub submitted_at: String,
}

/// A CI check run or commit status context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub status: String,
    pub url: String,
}

/// Everything needed to display one PR. Replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestSnapshot {
    pub number: u32,
    pub node_id: String,
    pub title: String,
    pub author: String,
    pub state: String,
    pub source_branch: String,
    pub base_branch: String,
    pub head_sha: String,
    pub base_sha: String,
    /// Login of the authenticated user
    pub viewer: String,
    pub checks: Vec<Check>,
    pub reviews: Vec<Review>,
    pub comments: Vec<Comment>,
    pub threads: CommentMap,
    pub files: Vec<DiffFile>,
    /// Files the parser could not read, with the reason
    pub skipped_files: Vec<(String, String)>,
    pub pending_review: Option<Review>,
}
