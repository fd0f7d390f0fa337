use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use url::Url;

use crate::comments::{insert_thread, line_key};
use crate::config::DiffSource;
use crate::error::ProviderError;
use crate::parser::parse_diff;
use crate::types::{
    Check, Comment, CommentMap, CommentSource, CommentThread, LineTarget, PrInfo,
    PullRequestSnapshot, ReactionKind, Reactions, Review, ReviewEvent, ReviewState,
};

/// Parse a GitHub PR URL into owner, repo, and PR number
pub fn parse_pr_url(url_str: &str) -> Result<PrInfo> {
    let url = Url::parse(url_str.trim()).context("Invalid URL")?;

    if url.host_str() != Some("github.com") {
        return Err(anyhow!("Only github.com URLs are supported"));
    }

    let segments: Vec<_> = url
        .path_segments()
        .ok_or_else(|| anyhow!("Invalid PR URL path"))?
        .collect();

    // Expected format: /owner/repo/pull/123
    if segments.len() < 4 || segments[2] != "pull" {
        return Err(anyhow!(
            "Invalid PR URL format. Expected: https://github.com/owner/repo/pull/123"
        ));
    }

    let owner = segments[0].to_string();
    let repo = segments[1].to_string();
    let number: u32 = segments[3]
        .parse()
        .context("PR number must be a valid integer")?;

    Ok(PrInfo {
        owner,
        repo,
        number,
    })
}

/// Check if gh CLI is installed and authenticated
pub async fn check_gh_cli() -> Result<()> {
    let start = Instant::now();
    let output = Command::new("gh")
        .args(["auth", "status"])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("Failed to run 'gh' CLI. Is it installed? (brew install gh)")?;

    debug!("gh auth status took {:?}", start.elapsed());

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not logged") {
            return Err(anyhow!(
                "Not authenticated with GitHub CLI. Run: gh auth login"
            ));
        }
        return Err(anyhow!("gh auth check failed: {}", stderr));
    }

    Ok(())
}

/// PR metadata needed before the rest of a snapshot can be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestMeta {
    pub number: u32,
    pub node_id: String,
    pub title: String,
    pub author: String,
    pub state: String,
    pub head_ref: String,
    pub head_sha: String,
    pub base_ref: String,
    pub base_sha: String,
}

/// Top-level comments plus review threads keyed by path and line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestComments {
    pub top_level: Vec<Comment>,
    pub threads: CommentMap,
}

/// Remote data source for one pull request.
///
/// Every call runs to completion on a background task; the caller decides
/// whether the result is still wanted.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn fetch_pull_request(&self) -> Result<PullRequestMeta, ProviderError>;

    /// Raw unified diff between the base and head of the PR
    async fn fetch_diff(&self, meta: &PullRequestMeta) -> Result<String, ProviderError>;

    async fn fetch_checks(&self) -> Result<Vec<Check>, ProviderError>;

    async fn fetch_reviews(&self) -> Result<Vec<Review>, ProviderError>;

    /// Top-level comments and review threads. Outdated threads are dropped.
    async fn fetch_comments(&self) -> Result<PullRequestComments, ProviderError>;

    async fn current_login(&self) -> Result<String, ProviderError>;

    /// The pending review of `login`, if one exists
    async fn pending_review(&self, login: &str) -> Result<Option<Review>, ProviderError>;

    async fn last_commit_id(&self) -> Result<String, ProviderError>;

    /// Update the local clone so that missing commits become available
    async fn fetch_commits(&self) -> Result<(), ProviderError>;

    async fn start_review(&self, pr_node_id: &str) -> Result<Review, ProviderError>;

    async fn close_review(
        &self,
        review_id: &str,
        event: ReviewEvent,
        body: &str,
    ) -> Result<(), ProviderError>;

    async fn cancel_review(&self, review_id: &str) -> Result<(), ProviderError>;

    /// Standalone line comment outside any review
    async fn create_comment(
        &self,
        target: &LineTarget,
        commit_id: &str,
        body: &str,
    ) -> Result<(), ProviderError>;

    /// Line comment added to a pending review
    async fn add_review_thread(
        &self,
        review_id: &str,
        target: &LineTarget,
        body: &str,
    ) -> Result<(), ProviderError>;

    async fn create_top_level_comment(&self, body: &str) -> Result<(), ProviderError>;

    /// Reply to a review-thread comment inside a pending review
    async fn reply_in_review(
        &self,
        review_id: &str,
        comment_node_id: &str,
        body: &str,
    ) -> Result<(), ProviderError>;

    /// Reply to a top-level comment with a single create call
    async fn reply_to_comment(
        &self,
        parent: &Comment,
        in_reply_to: u64,
        body: &str,
    ) -> Result<(), ProviderError>;

    async fn merge(&self, pr_node_id: &str) -> Result<(), ProviderError>;
}

/// Fetch everything needed to display the PR.
///
/// Independent calls run concurrently. The parser skips files it cannot read
/// and reports them in `skipped_files`.
pub async fn load_snapshot(provider: &dyn Provider) -> Result<PullRequestSnapshot, ProviderError> {
    let start = Instant::now();
    let meta = provider.fetch_pull_request().await?;

    let (diff, checks, reviews, comments, viewer) = tokio::join!(
        provider.fetch_diff(&meta),
        provider.fetch_checks(),
        provider.fetch_reviews(),
        provider.fetch_comments(),
        provider.current_login(),
    );
    let diff = diff?;
    let viewer = viewer?;
    let pending_review = provider.pending_review(&viewer).await?;

    let parsed = parse_diff(&diff);
    let comments = comments?;

    info!(
        "Loaded PR #{}: {} files, {} skipped, in {:?}",
        meta.number,
        parsed.files.len(),
        parsed.errors.len(),
        start.elapsed()
    );

    Ok(PullRequestSnapshot {
        number: meta.number,
        node_id: meta.node_id,
        title: meta.title,
        author: meta.author,
        state: meta.state,
        source_branch: meta.head_ref,
        base_branch: meta.base_ref,
        head_sha: meta.head_sha,
        base_sha: meta.base_sha,
        viewer,
        checks: checks?,
        reviews: reviews?,
        comments: comments.top_level,
        threads: comments.threads,
        files: parsed.files,
        skipped_files: parsed
            .errors
            .into_iter()
            .map(|e| (e.path, e.reason))
            .collect(),
        pending_review,
    })
}

/// Load a snapshot, fetching and retrying once when a commit is missing
/// locally. Used for the first load, before the dispatcher runs.
pub async fn load_with_fetch_retry(
    provider: &dyn Provider,
) -> Result<PullRequestSnapshot, ProviderError> {
    match load_snapshot(provider).await {
        Err(e) if e.is_missing_commit() => {
            info!("{}; fetching and retrying", e);
            provider.fetch_commits().await?;
            load_snapshot(provider).await
        }
        result => result,
    }
}

// ============================================================================
// gh CLI implementation
// ============================================================================

/// Provider backed by the `gh` CLI and a local git clone
pub struct GhProvider {
    pr: PrInfo,
    repo_path: Option<PathBuf>,
    diff_source: DiffSource,
}

impl GhProvider {
    pub fn new(pr: PrInfo, repo_path: Option<PathBuf>, diff_source: DiffSource) -> Self {
        Self {
            pr,
            repo_path,
            diff_source,
        }
    }

    fn repo(&self) -> String {
        self.pr.repo_full_name()
    }

    fn conversation_comment_url(&self, id: u64) -> String {
        format!(
            "https://github.com/{}/pull/{}#issuecomment-{}",
            self.repo(),
            self.pr.number,
            id
        )
    }

    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        if let Some(path) = &self.repo_path {
            cmd.arg("-C").arg(path);
        }
        cmd
    }

    async fn uses_local_diff(&self) -> bool {
        match self.diff_source {
            DiffSource::Local => true,
            DiffSource::Remote => false,
            DiffSource::Auto => self
                .git()
                .args(["rev-parse", "--is-inside-work-tree"])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false),
        }
    }

    async fn ensure_commit(&self, sha: &str) -> Result<(), ProviderError> {
        let output = self
            .git()
            .args(["cat-file", "-e", &format!("{}^{{commit}}", sha)])
            .output()
            .await
            .context("Failed to run git")?;

        if !output.status.success() {
            debug!("Commit {} is not in the local history", sha);
            return Err(ProviderError::MissingCommit {
                sha: sha.to_string(),
                cause: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn local_diff(&self, meta: &PullRequestMeta) -> Result<String, ProviderError> {
        self.ensure_commit(&meta.head_sha).await?;
        self.ensure_commit(&meta.base_sha).await?;

        let start = Instant::now();
        let output = self
            .git()
            .args([
                "diff",
                "--no-color",
                "-M",
                "-C",
                &format!("{}...{}", meta.base_sha, meta.head_sha),
            ])
            .output()
            .await
            .context("Failed to run git diff")?;

        debug!("git diff #{} took {:?}", meta.number, start.elapsed());

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git diff failed: {}", stderr).into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn remote_diff(&self) -> Result<String, ProviderError> {
        let start = Instant::now();
        let output = Command::new("gh")
            .args([
                "api",
                &format!("repos/{}/pulls/{}", self.repo(), self.pr.number),
                "-H",
                "Accept: application/vnd.github.v3.diff",
            ])
            .output()
            .await
            .context("Failed to fetch PR diff")?;

        debug!("fetch_pr_diff #{} took {:?}", self.pr.number, start.elapsed());

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("404") {
                return Err(anyhow!(
                    "PR not found: {}/pull/{}",
                    self.repo(),
                    self.pr.number
                )
                .into());
            }
            return Err(anyhow!("Failed to fetch diff: {}", stderr).into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn graphql<T: DeserializeOwned>(&self, what: &str, query: &str, variables: serde_json::Value) -> Result<T> {
        let request = json!({ "query": query, "variables": variables });
        let stdout = gh_with_input(&["api", "graphql"], &request, what).await?;
        decode_graphql(&stdout).with_context(|| format!("Failed to {}", what))
    }

    fn pr_variables(&self) -> serde_json::Value {
        json!({
            "owner": self.pr.owner,
            "repo": self.pr.repo,
            "number": self.pr.number,
        })
    }
}

/// Run `gh` and return stdout, failing on a non-zero exit
async fn gh(args: &[&str], what: &str) -> Result<Vec<u8>> {
    let start = Instant::now();
    let output = Command::new("gh")
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to {}", what))?;

    debug!("{} took {:?}", what, start.elapsed());

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("Failed to {}: {}", what, stderr.trim()));
    }
    Ok(output.stdout)
}

/// Run `gh` with a JSON request body on stdin (`--input -`)
async fn gh_with_input(args: &[&str], body: &serde_json::Value, what: &str) -> Result<Vec<u8>> {
    let body_json = serde_json::to_string(body).context("Failed to serialize request body")?;

    let start = Instant::now();
    let mut child = Command::new("gh")
        .args(args)
        .args(["--input", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to spawn gh command")?;

    // Write the JSON body to stdin
    if let Some(mut stdin) = child.stdin.take() {
        use tokio::io::AsyncWriteExt;
        stdin
            .write_all(body_json.as_bytes())
            .await
            .context("Failed to write to gh stdin")?;
    }

    let output = child
        .wait_with_output()
        .await
        .context("Failed to wait for gh command")?;

    debug!("{} took {:?}", what, start.elapsed());

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("Failed to {}: {}", what, stderr.trim()));
    }
    Ok(output.stdout)
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

fn decode_graphql<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let response: GraphQlResponse<T> =
        serde_json::from_slice(bytes).context("Invalid GraphQL response")?;
    if !response.errors.is_empty() {
        let messages: Vec<_> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(anyhow!(messages.join("; ")));
    }
    response.data.ok_or_else(|| anyhow!("GraphQL response has no data"))
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhPullRequest {
    number: u32,
    node_id: String,
    title: String,
    state: String,
    #[serde(default)]
    merged: bool,
    user: GhUser,
    head: GhBranch,
    base: GhBranch,
}

#[derive(Debug, Deserialize)]
struct GhBranch {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhReview {
    node_id: String,
    state: String,
    user: Option<GhUser>,
    #[serde(default)]
    submitted_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlActor {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GqlNodes<T> {
    nodes: Vec<Option<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlPage<T> {
    nodes: Vec<Option<T>>,
    page_info: GqlPageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlPageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlReaction {
    content: String,
    user: Option<GqlActor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlComment {
    id: String,
    database_id: Option<u64>,
    author: Option<GqlActor>,
    created_at: String,
    body: String,
    #[serde(default)]
    reply_to: Option<GqlReplyTo>,
    reactions: GqlNodes<GqlReaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlReplyTo {
    database_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlThread {
    path: String,
    line: Option<u32>,
    #[serde(default)]
    diff_side: Option<String>,
    #[serde(default)]
    is_outdated: bool,
    comments: GqlNodes<GqlComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlReview {
    id: String,
    state: String,
    author: Option<GqlActor>,
    created_at: String,
}

const THREADS_QUERY: &str = r#"
query($owner: String!, $repo: String!, $number: Int!, $after: String) {
  repository(owner: $owner, name: $repo) {
    pullRequest(number: $number) {
      reviewThreads(first: 50, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes {
          path line diffSide isOutdated
          comments(first: 100) {
            nodes {
              id databaseId createdAt body
              author { login }
              replyTo { databaseId }
              reactions(first: 50) { nodes { content user { login } } }
            }
          }
        }
      }
    }
  }
}"#;

const COMMENTS_QUERY: &str = r#"
query($owner: String!, $repo: String!, $number: Int!, $after: String) {
  repository(owner: $owner, name: $repo) {
    pullRequest(number: $number) {
      comments(first: 100, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes {
          id databaseId createdAt body
          author { login }
          reactions(first: 50) { nodes { content user { login } } }
        }
      }
    }
  }
}"#;

const CHECKS_QUERY: &str = r#"
query($owner: String!, $repo: String!, $number: Int!) {
  repository(owner: $owner, name: $repo) {
    pullRequest(number: $number) {
      commits(last: 1) {
        nodes {
          commit {
            statusCheckRollup {
              contexts(first: 100) {
                nodes {
                  __typename
                  ... on CheckRun { name status conclusion detailsUrl }
                  ... on StatusContext { context state targetUrl }
                }
              }
            }
          }
        }
      }
    }
  }
}"#;

const PENDING_REVIEW_QUERY: &str = r#"
query($owner: String!, $repo: String!, $number: Int!, $login: String!) {
  repository(owner: $owner, name: $repo) {
    pullRequest(number: $number) {
      reviews(first: 2, states: [PENDING], author: $login) {
        nodes { id state createdAt author { login } }
      }
    }
  }
}"#;

const REVIEW_FIELDS: &str = "id state createdAt author { login }";

fn to_reactions(nodes: GqlNodes<GqlReaction>) -> Reactions {
    let mut reactions = Reactions::new();
    for reaction in nodes.nodes.into_iter().flatten() {
        let (Some(kind), Some(user)) = (ReactionKind::from_github(&reaction.content), reaction.user)
        else {
            continue;
        };
        reactions.entry(kind).or_default().insert(user.login);
    }
    reactions
}

fn login_or_ghost(actor: Option<GqlActor>) -> String {
    actor.map(|a| a.login).unwrap_or_else(|| "ghost".to_string())
}

fn thread_comment(c: GqlComment) -> Option<Comment> {
    Some(Comment {
        id: c.database_id?,
        author: login_or_ghost(c.author),
        created_at: c.created_at,
        body: c.body,
        parent_id: c.reply_to.and_then(|r| r.database_id),
        reactions: to_reactions(c.reactions),
        source: CommentSource::ThreadComment { node_id: c.id },
    })
}

fn top_level_comment(c: GqlComment) -> Option<Comment> {
    let database_id = c.database_id?;
    Some(Comment {
        id: database_id,
        author: login_or_ghost(c.author),
        created_at: c.created_at,
        body: c.body,
        parent_id: None,
        reactions: to_reactions(c.reactions),
        source: CommentSource::RestComment { database_id },
    })
}

/// Key review threads by path and line. Threads without a current line are
/// outdated and dropped.
fn ingest_threads(threads: Vec<GqlThread>, map: &mut CommentMap) {
    for thread in threads {
        let Some(line) = thread.line.filter(|_| !thread.is_outdated) else {
            debug!("Dropping outdated thread on {}", thread.path);
            continue;
        };
        let right = thread.diff_side.as_deref() != Some("LEFT");
        let mut comments = thread.comments.nodes.into_iter().flatten().filter_map(thread_comment);
        let Some(root) = comments.next() else {
            continue;
        };
        let thread_value = CommentThread {
            root,
            replies: comments.collect(),
        };
        insert_thread(map, &thread.path, line_key(line, right), thread_value);
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum GqlCheckContext {
    CheckRun {
        name: String,
        status: String,
        conclusion: Option<String>,
        #[serde(rename = "detailsUrl")]
        details_url: Option<String>,
    },
    StatusContext {
        context: String,
        state: String,
        #[serde(rename = "targetUrl")]
        target_url: Option<String>,
    },
}

impl From<GqlCheckContext> for Check {
    fn from(ctx: GqlCheckContext) -> Self {
        match ctx {
            GqlCheckContext::CheckRun {
                name,
                status,
                conclusion,
                details_url,
            } => Check {
                name,
                // A finished run reports its conclusion, a running one its status
                status: conclusion.unwrap_or(status),
                url: details_url.unwrap_or_default(),
            },
            GqlCheckContext::StatusContext {
                context,
                state,
                target_url,
            } => Check {
                name: context,
                status: state,
                url: target_url.unwrap_or_default(),
            },
        }
    }
}

fn to_review(r: GqlReview) -> Review {
    Review {
        id: r.id,
        state: ReviewState::from_github(&r.state),
        author: login_or_ghost(r.author),
        submitted_at: r.created_at,
    }
}

/// REST body for a standalone line comment
fn line_comment_body(target: &LineTarget, commit_id: &str, body: &str) -> serde_json::Value {
    json!({
        "body": body,
        "commit_id": commit_id,
        "path": target.path,
        "line": target.line,
        "side": target.side(),
    })
}

/// Conversation comments have no threading; the reply quotes its parent and
/// links back to it
fn quoted_reply(parent: &Comment, parent_url: &str, body: &str) -> String {
    let quoted: Vec<String> = parent.body.lines().map(|l| format!("> {}", l)).collect();
    format!(
        "@{} [wrote]({}):\n{}\n\n{}",
        parent.author,
        parent_url,
        quoted.join("\n"),
        body
    )
}

#[async_trait]
impl Provider for GhProvider {
    async fn fetch_pull_request(&self) -> Result<PullRequestMeta, ProviderError> {
        let stdout = gh(
            &["api", &format!("repos/{}/pulls/{}", self.repo(), self.pr.number)],
            "fetch PR details",
        )
        .await?;
        let pr: GhPullRequest =
            serde_json::from_slice(&stdout).context("Failed to parse PR details")?;

        Ok(PullRequestMeta {
            number: pr.number,
            node_id: pr.node_id,
            title: pr.title,
            author: pr.user.login,
            state: if pr.merged {
                "MERGED".to_string()
            } else {
                pr.state.to_uppercase()
            },
            head_ref: pr.head.ref_name,
            head_sha: pr.head.sha,
            base_ref: pr.base.ref_name,
            base_sha: pr.base.sha,
        })
    }

    async fn fetch_diff(&self, meta: &PullRequestMeta) -> Result<String, ProviderError> {
        if self.uses_local_diff().await {
            self.local_diff(meta).await
        } else {
            self.remote_diff().await
        }
    }

    async fn fetch_checks(&self) -> Result<Vec<Check>, ProviderError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            repository: Repository,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Repository {
            pull_request: PullRequest,
        }
        #[derive(Deserialize)]
        struct PullRequest {
            commits: GqlNodes<CommitNode>,
        }
        #[derive(Deserialize)]
        struct CommitNode {
            commit: Commit,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Commit {
            status_check_rollup: Option<Rollup>,
        }
        #[derive(Deserialize)]
        struct Rollup {
            contexts: GqlNodes<GqlCheckContext>,
        }

        let data: Data = self
            .graphql("fetch checks", CHECKS_QUERY, self.pr_variables())
            .await?;

        Ok(data
            .repository
            .pull_request
            .commits
            .nodes
            .into_iter()
            .flatten()
            .filter_map(|n| n.commit.status_check_rollup)
            .flat_map(|r| r.contexts.nodes.into_iter().flatten())
            .map(Check::from)
            .collect())
    }

    async fn fetch_reviews(&self) -> Result<Vec<Review>, ProviderError> {
        let stdout = gh(
            &[
                "api",
                &format!(
                    "repos/{}/pulls/{}/reviews?per_page=100",
                    self.repo(),
                    self.pr.number
                ),
            ],
            "fetch reviews",
        )
        .await?;
        let reviews: Vec<GhReview> =
            serde_json::from_slice(&stdout).context("Failed to parse reviews")?;

        Ok(reviews
            .into_iter()
            .map(|r| Review {
                id: r.node_id,
                state: ReviewState::from_github(&r.state),
                author: r.user.map(|u| u.login).unwrap_or_else(|| "ghost".to_string()),
                submitted_at: r.submitted_at.unwrap_or_default(),
            })
            .collect())
    }

    async fn fetch_comments(&self) -> Result<PullRequestComments, ProviderError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data<T> {
            repository: Repository<T>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Repository<T> {
            pull_request: T,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Threads {
            review_threads: GqlPage<GqlThread>,
        }
        #[derive(Deserialize)]
        struct Comments {
            comments: GqlPage<GqlComment>,
        }

        let mut result = PullRequestComments::default();

        let mut after: Option<String> = None;
        loop {
            let mut vars = self.pr_variables();
            vars["after"] = json!(after);
            let data: Data<Threads> = self.graphql("fetch review threads", THREADS_QUERY, vars).await?;
            let page = data.repository.pull_request.review_threads;
            ingest_threads(page.nodes.into_iter().flatten().collect(), &mut result.threads);
            if !page.page_info.has_next_page {
                break;
            }
            after = page.page_info.end_cursor;
        }

        let mut after: Option<String> = None;
        loop {
            let mut vars = self.pr_variables();
            vars["after"] = json!(after);
            let data: Data<Comments> = self.graphql("fetch comments", COMMENTS_QUERY, vars).await?;
            let page = data.repository.pull_request.comments;
            result
                .top_level
                .extend(page.nodes.into_iter().flatten().filter_map(top_level_comment));
            if !page.page_info.has_next_page {
                break;
            }
            after = page.page_info.end_cursor;
        }

        Ok(result)
    }

    async fn current_login(&self) -> Result<String, ProviderError> {
        let stdout = gh(&["api", "user", "--jq", ".login"], "get current user").await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    async fn pending_review(&self, login: &str) -> Result<Option<Review>, ProviderError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            repository: Repository,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Repository {
            pull_request: PullRequest,
        }
        #[derive(Deserialize)]
        struct PullRequest {
            reviews: GqlNodes<GqlReview>,
        }

        let mut vars = self.pr_variables();
        vars["login"] = json!(login);
        let data: Data = self
            .graphql("fetch pending review", PENDING_REVIEW_QUERY, vars)
            .await?;

        let mut reviews: Vec<Review> = data
            .repository
            .pull_request
            .reviews
            .nodes
            .into_iter()
            .flatten()
            .map(to_review)
            .collect();
        if reviews.len() > 1 {
            return Err(anyhow!("More than one pending review for {}", login).into());
        }
        Ok(reviews.pop())
    }

    async fn last_commit_id(&self) -> Result<String, ProviderError> {
        let stdout = gh(
            &[
                "api",
                &format!("repos/{}/pulls/{}", self.repo(), self.pr.number),
                "--jq",
                ".head.sha",
            ],
            "fetch PR head SHA",
        )
        .await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    async fn fetch_commits(&self) -> Result<(), ProviderError> {
        let start = Instant::now();
        let output = self
            .git()
            .args(["fetch", "--quiet", "origin"])
            .output()
            .await
            .context("Failed to run git fetch")?;

        info!("git fetch finished in {:?}", start.elapsed());

        // Exit status 1 still leaves the fetched objects in place
        match output.status.code() {
            Some(0) | Some(1) => Ok(()),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(anyhow!("git fetch failed: {}", stderr.trim()).into())
            }
        }
    }

    async fn start_review(&self, pr_node_id: &str) -> Result<Review, ProviderError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            add_pull_request_review: Payload,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Payload {
            pull_request_review: GqlReview,
        }

        let query = format!(
            "mutation($id: ID!) {{ addPullRequestReview(input: {{pullRequestId: $id}}) {{ pullRequestReview {{ {} }} }} }}",
            REVIEW_FIELDS
        );
        let data: Data = self
            .graphql("start review", &query, json!({ "id": pr_node_id }))
            .await?;
        Ok(to_review(data.add_pull_request_review.pull_request_review))
    }

    async fn close_review(
        &self,
        review_id: &str,
        event: ReviewEvent,
        body: &str,
    ) -> Result<(), ProviderError> {
        let query = "mutation($id: ID!, $event: PullRequestReviewEvent!, $body: String) { \
            submitPullRequestReview(input: {pullRequestReviewId: $id, event: $event, body: $body}) { clientMutationId } }";
        let body = (!body.is_empty()).then_some(body);
        let _: serde_json::Value = self
            .graphql(
                "submit review",
                query,
                json!({ "id": review_id, "event": event.as_github(), "body": body }),
            )
            .await?;
        Ok(())
    }

    async fn cancel_review(&self, review_id: &str) -> Result<(), ProviderError> {
        let query = "mutation($id: ID!) { deletePullRequestReview(input: {pullRequestReviewId: $id}) { clientMutationId } }";
        let _: serde_json::Value = self
            .graphql("cancel review", query, json!({ "id": review_id }))
            .await?;
        Ok(())
    }

    async fn create_comment(
        &self,
        target: &LineTarget,
        commit_id: &str,
        body: &str,
    ) -> Result<(), ProviderError> {
        gh_with_input(
            &[
                "api",
                &format!("repos/{}/pulls/{}/comments", self.repo(), self.pr.number),
            ],
            &line_comment_body(target, commit_id, body),
            "create comment",
        )
        .await?;
        Ok(())
    }

    async fn add_review_thread(
        &self,
        review_id: &str,
        target: &LineTarget,
        body: &str,
    ) -> Result<(), ProviderError> {
        let query = "mutation($id: ID!, $path: String!, $line: Int!, $side: DiffSide, $body: String!) { \
            addPullRequestReviewThread(input: {pullRequestReviewId: $id, path: $path, line: $line, side: $side, body: $body}) { clientMutationId } }";
        let _: serde_json::Value = self
            .graphql(
                "add review comment",
                query,
                json!({
                    "id": review_id,
                    "path": target.path,
                    "line": target.line,
                    "side": target.side(),
                    "body": body,
                }),
            )
            .await?;
        Ok(())
    }

    async fn create_top_level_comment(&self, body: &str) -> Result<(), ProviderError> {
        gh_with_input(
            &[
                "api",
                &format!("repos/{}/issues/{}/comments", self.repo(), self.pr.number),
            ],
            &json!({ "body": body }),
            "create comment",
        )
        .await?;
        Ok(())
    }

    async fn reply_in_review(
        &self,
        review_id: &str,
        comment_node_id: &str,
        body: &str,
    ) -> Result<(), ProviderError> {
        let query = "mutation($id: ID!, $replyTo: ID!, $body: String!) { \
            addPullRequestReviewComment(input: {pullRequestReviewId: $id, inReplyTo: $replyTo, body: $body}) { clientMutationId } }";
        let _: serde_json::Value = self
            .graphql(
                "reply to comment",
                query,
                json!({ "id": review_id, "replyTo": comment_node_id, "body": body }),
            )
            .await?;
        Ok(())
    }

    async fn reply_to_comment(
        &self,
        parent: &Comment,
        in_reply_to: u64,
        body: &str,
    ) -> Result<(), ProviderError> {
        debug!("Replying to conversation comment {}", in_reply_to);
        let url = self.conversation_comment_url(in_reply_to);
        self.create_top_level_comment(&quoted_reply(parent, &url, body))
            .await
    }

    async fn merge(&self, pr_node_id: &str) -> Result<(), ProviderError> {
        let query = "mutation($id: ID!) { mergePullRequest(input: {pullRequestId: $id}) { clientMutationId } }";
        let _: serde_json::Value = self
            .graphql("merge", query, json!({ "id": pr_node_id }))
            .await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::comment;

    // ========================================================================
    // parse_pr_url tests
    // ========================================================================

    #[test]
    fn test_parse_pr_url() {
        let pr = parse_pr_url("https://github.com/anthropics/claude-code/pull/123").unwrap();
        assert_eq!(pr.owner, "anthropics");
        assert_eq!(pr.repo, "claude-code");
        assert_eq!(pr.number, 123);
    }

    #[test]
    fn test_parse_pr_url_invalid() {
        assert!(parse_pr_url("https://github.com/owner/repo").is_err());
        assert!(parse_pr_url("not a url").is_err());
        assert!(parse_pr_url("").is_err());
        assert!(parse_pr_url("https://github.com/owner/repo/pull/").is_err());
        assert!(parse_pr_url("https://github.com/owner/repo/pull/abc").is_err());
    }

    #[test]
    fn test_parse_pr_url_with_sub_paths() {
        let pr = parse_pr_url("https://github.com/owner/repo/pull/789/files").unwrap();
        assert_eq!(pr.number, 789);
        let pr = parse_pr_url("https://github.com/owner/repo/pull/456/").unwrap();
        assert_eq!(pr.number, 456);
    }

    #[test]
    fn test_parse_pr_url_issue_instead_of_pull() {
        assert!(parse_pr_url("https://github.com/owner/repo/issues/123").is_err());
    }

    #[test]
    fn test_parse_pr_url_wrong_host() {
        assert!(parse_pr_url("https://gitlab.com/owner/repo/pull/1").is_err());
        assert!(parse_pr_url("https://github.mycompany.com/owner/repo/pull/1").is_err());
    }

    #[test]
    fn test_parse_pr_url_surrounding_whitespace() {
        let pr = parse_pr_url("  https://github.com/my-org/my_repo/pull/42 ").unwrap();
        assert_eq!(pr.repo_full_name(), "my-org/my_repo");
    }

    // ========================================================================
    // GraphQL decoding
    // ========================================================================

    #[test]
    fn test_decode_graphql_errors() {
        let body = br#"{"data": null, "errors": [{"message": "bad id"}, {"message": "nope"}]}"#;
        let err = decode_graphql::<serde_json::Value>(body).unwrap_err();
        assert_eq!(err.to_string(), "bad id; nope");
    }

    #[test]
    fn test_decode_graphql_missing_data() {
        assert!(decode_graphql::<serde_json::Value>(br#"{}"#).is_err());
    }

    fn threads_from(json: serde_json::Value) -> CommentMap {
        let threads: Vec<GqlThread> = serde_json::from_value(json).unwrap();
        let mut map = CommentMap::new();
        ingest_threads(threads, &mut map);
        map
    }

    fn gql_comment(id: u64, author: &str, reply_to: Option<u64>) -> serde_json::Value {
        json!({
            "id": format!("PRRC_{}", id),
            "databaseId": id,
            "author": { "login": author },
            "createdAt": "2024-01-15T10:00:00Z",
            "body": format!("comment {}", id),
            "replyTo": reply_to.map(|r| json!({ "databaseId": r })),
            "reactions": { "nodes": [] }
        })
    }

    // ========================================================================
    // Thread ingestion
    // ========================================================================

    #[test]
    fn test_ingest_threads_keys_by_side() {
        let map = threads_from(json!([
            { "path": "a.rs", "line": 10, "diffSide": "RIGHT", "isOutdated": false,
              "comments": { "nodes": [gql_comment(1, "bob", None)] } },
            { "path": "a.rs", "line": 7, "diffSide": "LEFT", "isOutdated": false,
              "comments": { "nodes": [gql_comment(2, "bob", None)] } }
        ]));
        let file = &map["a.rs"];
        assert_eq!(file[&-10][0].root.id, 1);
        assert_eq!(file[&7][0].root.id, 2);
    }

    #[test]
    fn test_ingest_threads_groups_replies() {
        let map = threads_from(json!([
            { "path": "a.rs", "line": 3, "diffSide": "RIGHT", "isOutdated": false,
              "comments": { "nodes": [
                  gql_comment(1, "bob", None),
                  gql_comment(2, "alice", Some(1)),
                  gql_comment(3, "bob", Some(1))
              ] } }
        ]));
        let thread = &map["a.rs"][&-3][0];
        assert_eq!(thread.root.author, "bob");
        assert_eq!(thread.replies.len(), 2);
        assert_eq!(thread.replies[0].parent_id, Some(1));
        assert_eq!(
            thread.root.source,
            CommentSource::ThreadComment {
                node_id: "PRRC_1".to_string()
            }
        );
    }

    #[test]
    fn test_ingest_threads_drops_outdated() {
        let map = threads_from(json!([
            { "path": "a.rs", "line": null, "diffSide": "RIGHT", "isOutdated": true,
              "comments": { "nodes": [gql_comment(1, "bob", None)] } },
            { "path": "b.rs", "line": 4, "diffSide": "RIGHT", "isOutdated": true,
              "comments": { "nodes": [gql_comment(2, "bob", None)] } }
        ]));
        assert!(map.is_empty());
    }

    #[test]
    fn test_ingest_reactions_and_ghost_author() {
        let mut c = gql_comment(1, "bob", None);
        c["author"] = serde_json::Value::Null;
        c["reactions"] = json!({ "nodes": [
            { "content": "THUMBS_UP", "user": { "login": "carol" } },
            { "content": "THUMBS_UP", "user": { "login": "alice" } },
            { "content": "UNKNOWN", "user": { "login": "dave" } }
        ] });
        let map = threads_from(json!([
            { "path": "a.rs", "line": 1, "diffSide": "RIGHT", "isOutdated": false,
              "comments": { "nodes": [c] } }
        ]));
        let root = &map["a.rs"][&-1][0].root;
        assert_eq!(root.author, "ghost");
        let names: Vec<_> = root.reactions[&ReactionKind::ThumbsUp].iter().cloned().collect();
        assert_eq!(names, vec!["alice", "carol"]);
        assert_eq!(root.reactions.len(), 1);
    }

    #[test]
    fn test_top_level_comment_is_rest_source() {
        let c: GqlComment = serde_json::from_value(gql_comment(9, "carol", None)).unwrap();
        let comment = top_level_comment(c).unwrap();
        assert_eq!(comment.source, CommentSource::RestComment { database_id: 9 });
        assert_eq!(comment.parent_id, None);
    }

    // ========================================================================
    // Checks
    // ========================================================================

    #[test]
    fn test_check_contexts() {
        let nodes: Vec<GqlCheckContext> = serde_json::from_value(json!([
            { "__typename": "CheckRun", "name": "build", "status": "COMPLETED",
              "conclusion": "SUCCESS", "detailsUrl": "https://ci/1" },
            { "__typename": "CheckRun", "name": "lint", "status": "IN_PROGRESS",
              "conclusion": null, "detailsUrl": null },
            { "__typename": "StatusContext", "context": "ci/legacy", "state": "FAILURE",
              "targetUrl": "https://ci/2" }
        ]))
        .unwrap();
        let checks: Vec<Check> = nodes.into_iter().map(Check::from).collect();
        assert_eq!(checks[0].status, "SUCCESS");
        assert_eq!(checks[1].status, "IN_PROGRESS");
        assert_eq!(checks[1].url, "");
        assert_eq!(checks[2].name, "ci/legacy");
    }

    // ========================================================================
    // Request bodies
    // ========================================================================

    #[test]
    fn test_line_comment_body_sides() {
        let target = LineTarget {
            path: "src/lib.rs".to_string(),
            line: 12,
            is_new: false,
        };
        let body = line_comment_body(&target, "abc123", "why?");
        assert_eq!(body["side"], "LEFT");
        assert_eq!(body["line"], 12);
        assert_eq!(body["commit_id"], "abc123");

        let target = LineTarget { is_new: true, ..target };
        assert_eq!(line_comment_body(&target, "abc123", "x")["side"], "RIGHT");
    }

    #[test]
    fn test_quoted_reply() {
        let parent = comment(1, "bob", "first\nsecond");
        assert_eq!(
            quoted_reply(&parent, "https://example.test/c1", "agreed"),
            "@bob [wrote](https://example.test/c1):\n> first\n> second\n\nagreed"
        );
    }

    #[test]
    fn test_conversation_comment_url() {
        let pr = parse_pr_url("https://github.com/owner/repo/pull/42").unwrap();
        let provider = GhProvider::new(pr, None, DiffSource::Local);
        assert_eq!(
            provider.conversation_comment_url(987),
            "https://github.com/owner/repo/pull/42#issuecomment-987"
        );
    }

    // ========================================================================
    // load_snapshot
    // ========================================================================

    #[tokio::test]
    async fn test_load_snapshot_includes_pending_review() {
        let provider = mock::MockProvider::new("alice").with_pending(mock::review("R1", "alice"));
        let snapshot = load_snapshot(&provider).await.unwrap();
        assert_eq!(snapshot.viewer, "alice");
        assert_eq!(snapshot.pending_review.unwrap().id, "R1");
    }

    #[tokio::test]
    async fn test_load_snapshot_missing_commit() {
        let provider = mock::MockProvider::new("alice");
        *provider.missing_until_fetch.lock().unwrap() = true;
        let err = load_snapshot(&provider).await.unwrap_err();
        assert!(err.is_missing_commit());
    }

    #[tokio::test]
    async fn test_load_with_fetch_retry_recovers() {
        let provider = mock::MockProvider::new("alice");
        *provider.missing_until_fetch.lock().unwrap() = true;
        let snapshot = load_with_fetch_retry(&provider).await.unwrap();
        assert_eq!(snapshot.number, 42);
        assert_eq!(
            provider.calls(),
            vec!["fetch_diff", "fetch_commits", "fetch_diff", "pending_review alice"]
        );
    }

    #[tokio::test]
    async fn test_load_with_fetch_retry_gives_up_after_one_fetch() {
        let mut provider = mock::MockProvider::new("alice");
        provider.fetch_never_helps = true;
        *provider.missing_until_fetch.lock().unwrap() = true;
        let err = load_with_fetch_retry(&provider).await.unwrap_err();
        assert!(err.is_missing_commit());
        let fetches = provider.calls().iter().filter(|c| *c == "fetch_commits").count();
        assert_eq!(fetches, 1);
    }
}
