//! Error taxonomy shared by the provider, parser, indexer and review layers.
//!
//! Nothing here is fatal to a session: the dispatcher turns every error into a
//! status message. Only `main` may exit, and only when the first load fails.

use thiserror::Error;

/// Failure of a remote or local data-provider call
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The local history lacks a commit needed to compute the diff
    #[error("cannot find commit {sha}: {cause}")]
    MissingCommit { sha: String, cause: String },

    #[error(transparent)]
    Remote(#[from] anyhow::Error),
}

impl ProviderError {
    pub fn is_missing_commit(&self) -> bool {
        matches!(self, ProviderError::MissingCommit { .. })
    }
}

/// A file the diff parser could not read
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot parse diff for {path}: {reason}")]
pub struct ParseError {
    pub path: String,
    pub reason: String,
}

/// A hunk whose body disagrees with its header
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("malformed hunk {header}: expected {expected_old} old / {expected_new} new lines, found {found_old} / {found_new}")]
    MalformedHunk {
        header: String,
        expected_old: u32,
        expected_new: u32,
        found_old: u32,
        found_new: u32,
    },
}

/// Failure of a user-triggered review or comment operation
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Rejected before any network call
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl From<anyhow::Error> for ReviewError {
    fn from(err: anyhow::Error) -> Self {
        ReviewError::Provider(ProviderError::Remote(err))
    }
}

/// How loudly a status message is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Severe,
}

impl ReviewError {
    pub fn severity(&self) -> Severity {
        match self {
            ReviewError::Precondition(_) => Severity::Normal,
            ReviewError::Provider(_) => Severity::Severe,
        }
    }
}
