//! Pending-review lifecycle and the mutating operations that drive it.
//!
//! Commands are checked against the local state first; a command that fails
//! its precondition never reaches the provider. Checked commands become a
//! [`ReviewTask`] that runs on a background task and reports a
//! [`ReviewOutcome`], which the dispatcher applies back to the machine.

use std::sync::Arc;

use log::{debug, info};

use crate::error::ReviewError;
use crate::github::Provider;
use crate::types::{
    Comment, CommentSource, LineTarget, PullRequestSnapshot, Review, ReviewEvent, ReviewState,
};

/// Where the current user's review stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewPhase {
    None,
    Pending(Review),
    /// Last review closed in this session, with its final state
    Closed(ReviewState),
}

/// A user-triggered mutating operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewCommand {
    Start,
    Close { event: ReviewEvent, body: String },
    Cancel,
    /// Reply to an existing comment, top-level or inside a review thread
    Reply { parent: Comment, body: String },
    TopLevelComment { body: String },
    LineComment { target: LineTarget, body: String },
    Merge,
}

impl ReviewCommand {
    /// Short verb for status messages and logs
    pub fn label(&self) -> &'static str {
        match self {
            ReviewCommand::Start => "start review",
            ReviewCommand::Close {
                event: ReviewEvent::Approve,
                ..
            } => "approve",
            ReviewCommand::Close {
                event: ReviewEvent::RequestChanges,
                ..
            } => "request changes",
            ReviewCommand::Close {
                event: ReviewEvent::Comment,
                ..
            } => "submit review",
            ReviewCommand::Cancel => "cancel review",
            ReviewCommand::Reply { .. } => "reply",
            ReviewCommand::TopLevelComment { .. } => "comment",
            ReviewCommand::LineComment { .. } => "line comment",
            ReviewCommand::Merge => "merge",
        }
    }
}

/// Result of a completed review task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// `existing` is true when a pending review was found instead of created
    Started { review: Review, existing: bool },
    Closed(ReviewEvent),
    Cancelled,
    /// A comment or reply was posted. `auto_submitted` is set when an
    /// implicit review was created for it and closed straight away.
    Posted { auto_submitted: bool },
    Merged,
}

impl ReviewOutcome {
    pub fn message(&self) -> String {
        match self {
            ReviewOutcome::Started {
                review,
                existing: true,
            } => format!("Resumed pending review {}", review.id),
            ReviewOutcome::Started { .. } => "Review started".to_string(),
            ReviewOutcome::Closed(ReviewEvent::Approve) => "PR approved".to_string(),
            ReviewOutcome::Closed(ReviewEvent::RequestChanges) => "Changes requested".to_string(),
            ReviewOutcome::Closed(ReviewEvent::Comment) => "Review submitted".to_string(),
            ReviewOutcome::Cancelled => "Review cancelled".to_string(),
            ReviewOutcome::Posted {
                auto_submitted: true,
            } => "Reply posted and review submitted".to_string(),
            ReviewOutcome::Posted { .. } => "Comment posted".to_string(),
            ReviewOutcome::Merged => "PR merged".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewStateMachine {
    viewer: String,
    phase: ReviewPhase,
}

impl ReviewStateMachine {
    pub fn new(viewer: impl Into<String>) -> Self {
        Self {
            viewer: viewer.into(),
            phase: ReviewPhase::None,
        }
    }

    /// Build from a freshly loaded snapshot
    pub fn from_snapshot(snapshot: &PullRequestSnapshot) -> Self {
        let mut machine = Self::new(snapshot.viewer.clone());
        machine.sync(snapshot);
        machine
    }

    pub fn phase(&self) -> &ReviewPhase {
        &self.phase
    }

    pub fn pending(&self) -> Option<&Review> {
        match &self.phase {
            ReviewPhase::Pending(review) => Some(review),
            _ => None,
        }
    }

    /// Adopt the pending review of a reloaded snapshot. A closed phase is kept
    /// until a new review starts.
    pub fn sync(&mut self, snapshot: &PullRequestSnapshot) {
        self.viewer = snapshot.viewer.clone();
        match (&snapshot.pending_review, &self.phase) {
            (Some(review), _) => self.phase = ReviewPhase::Pending(review.clone()),
            (None, ReviewPhase::Pending(_)) => self.phase = ReviewPhase::None,
            (None, _) => {}
        }
    }

    fn own_pending(&self) -> Result<&Review, ReviewError> {
        let review = self
            .pending()
            .ok_or_else(|| ReviewError::Precondition("No pending review".to_string()))?;
        if review.author != self.viewer {
            return Err(ReviewError::Precondition(format!(
                "Review {} belongs to {}",
                review.id, review.author
            )));
        }
        Ok(review)
    }

    fn require_text(body: &str, what: &str) -> Result<(), ReviewError> {
        if body.trim().is_empty() {
            return Err(ReviewError::Precondition(format!("{} needs some text", what)));
        }
        Ok(())
    }

    /// Check a command against the local state. Nothing is sent on failure.
    pub fn prepare(
        &self,
        command: ReviewCommand,
        pr_node_id: &str,
    ) -> Result<ReviewTask, ReviewError> {
        match &command {
            ReviewCommand::Start => {
                if let Some(review) = self.pending() {
                    return Err(ReviewError::Precondition(format!(
                        "Review {} is already pending",
                        review.id
                    )));
                }
            }
            ReviewCommand::Close { event, body } => {
                self.own_pending()?;
                if *event == ReviewEvent::RequestChanges {
                    Self::require_text(body, "Requesting changes")?;
                }
            }
            ReviewCommand::Cancel => {
                self.own_pending()?;
            }
            ReviewCommand::Reply { parent, body } => {
                Self::require_text(body, "A reply")?;
                if matches!(parent.source, CommentSource::ThreadComment { .. }) {
                    if let Some(review) = self.pending() {
                        if review.author != self.viewer {
                            return Err(ReviewError::Precondition(format!(
                                "Review {} belongs to {}",
                                review.id, review.author
                            )));
                        }
                    }
                }
            }
            ReviewCommand::TopLevelComment { body } | ReviewCommand::LineComment { body, .. } => {
                Self::require_text(body, "A comment")?;
            }
            ReviewCommand::Merge => {}
        }

        debug!("Prepared {}", command.label());
        Ok(ReviewTask {
            command,
            pr_node_id: pr_node_id.to_string(),
            viewer: self.viewer.clone(),
            pending: self.pending().cloned(),
        })
    }

    /// Record the effect of a completed task
    pub fn apply(&mut self, outcome: &ReviewOutcome) {
        match outcome {
            ReviewOutcome::Started { review, .. } => {
                self.phase = ReviewPhase::Pending(review.clone());
            }
            ReviewOutcome::Closed(event) => {
                self.phase = ReviewPhase::Closed(event.resulting_state());
            }
            ReviewOutcome::Cancelled => {
                self.phase = ReviewPhase::Closed(ReviewState::Cancelled);
            }
            ReviewOutcome::Posted {
                auto_submitted: true,
            } => {
                self.phase = ReviewPhase::Closed(ReviewState::Commented);
            }
            ReviewOutcome::Posted { .. } | ReviewOutcome::Merged => {}
        }
        info!("Review phase now {:?}", self.phase);
    }
}

/// A checked command, ready to run off the dispatcher loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTask {
    pub command: ReviewCommand,
    pr_node_id: String,
    viewer: String,
    pending: Option<Review>,
}

impl ReviewTask {
    /// Run the command. Each transition issues the calls it needs and no
    /// more; failures are returned, never retried.
    pub async fn execute(self, provider: Arc<dyn Provider>) -> Result<ReviewOutcome, ReviewError> {
        let provider = provider.as_ref();
        match self.command {
            ReviewCommand::Start => {
                if let Some(review) = provider.pending_review(&self.viewer).await? {
                    return Ok(ReviewOutcome::Started {
                        review,
                        existing: true,
                    });
                }
                let review = provider.start_review(&self.pr_node_id).await?;
                Ok(ReviewOutcome::Started {
                    review,
                    existing: false,
                })
            }
            ReviewCommand::Close { event, body } => {
                let review = self.pending.ok_or_else(no_pending)?;
                provider.close_review(&review.id, event, &body).await?;
                Ok(ReviewOutcome::Closed(event))
            }
            ReviewCommand::Cancel => {
                let review = self.pending.ok_or_else(no_pending)?;
                provider.cancel_review(&review.id).await?;
                Ok(ReviewOutcome::Cancelled)
            }
            ReviewCommand::Reply { parent, body } => match &parent.source {
                CommentSource::RestComment { database_id } => {
                    provider.reply_to_comment(&parent, *database_id, &body).await?;
                    Ok(ReviewOutcome::Posted {
                        auto_submitted: false,
                    })
                }
                CommentSource::ThreadComment { node_id } => {
                    let (review, is_new) = match self.pending {
                        Some(review) => (review, false),
                        None => pending_or_new(provider, &self.viewer, &self.pr_node_id).await?,
                    };
                    provider.reply_in_review(&review.id, node_id, &body).await?;
                    if is_new {
                        provider
                            .close_review(&review.id, ReviewEvent::Comment, "")
                            .await?;
                    }
                    Ok(ReviewOutcome::Posted {
                        auto_submitted: is_new,
                    })
                }
            },
            ReviewCommand::TopLevelComment { body } => {
                provider.create_top_level_comment(&body).await?;
                Ok(ReviewOutcome::Posted {
                    auto_submitted: false,
                })
            }
            ReviewCommand::LineComment { target, body } => {
                match self.pending {
                    Some(review) => provider.add_review_thread(&review.id, &target, &body).await?,
                    None => {
                        let commit_id = provider.last_commit_id().await?;
                        provider.create_comment(&target, &commit_id, &body).await?;
                    }
                }
                Ok(ReviewOutcome::Posted {
                    auto_submitted: false,
                })
            }
            ReviewCommand::Merge => {
                provider.merge(&self.pr_node_id).await?;
                Ok(ReviewOutcome::Merged)
            }
        }
    }
}

fn no_pending() -> ReviewError {
    ReviewError::Precondition("No pending review".to_string())
}

/// The user's pending review, creating one when none exists. The flag is true
/// for a review created here.
async fn pending_or_new(
    provider: &dyn Provider,
    viewer: &str,
    pr_node_id: &str,
) -> Result<(Review, bool), ReviewError> {
    if let Some(review) = provider.pending_review(viewer).await? {
        return Ok((review, false));
    }
    let review = provider.start_review(pr_node_id).await?;
    Ok((review, true))
}
