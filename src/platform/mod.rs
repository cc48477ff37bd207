pub mod github;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::*;

#[async_trait]
pub trait Platform: Send + Sync {
    /// Fetch an issue. A missing issue is `AppError::IssueNotFound`.
    async fn fetch_issue(&self, repo: &RepoSlug, issue_number: u64) -> Result<Issue>;

    /// Create a tree on top of `base_branch`'s head and a commit pointing at it.
    /// Returns the new commit id; no ref is moved.
    async fn commit_tree(
        &self,
        repo: &RepoSlug,
        base_branch: &str,
        files: &[FileChange],
        message: &str,
    ) -> Result<String>;

    /// Fast-forward `branch` to `commit_id`.
    async fn advance_ref(&self, repo: &RepoSlug, branch: &str, commit_id: &str) -> Result<()>;
}
