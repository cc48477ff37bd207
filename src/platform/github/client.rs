use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use octocrab::Octocrab;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::platform::types::*;
use crate::platform::Platform;

use super::mapper;

pub struct GitHubPlatform {
    /// Absent when no token is configured; every call then fails with a config error.
    client: Option<Octocrab>,
}

impl GitHubPlatform {
    pub fn new(token: Option<&str>) -> Result<Self> {
        let client = match token {
            Some(token) => Some(
                Octocrab::builder()
                    .personal_token(token.to_string())
                    .build()
                    .map_err(|e| {
                        AppError::GitHubApi(format!("Failed to build octocrab client: {e}"))
                    })?,
            ),
            None => None,
        };

        Ok(Self { client })
    }

    fn client(&self) -> Result<&Octocrab> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Config("Missing GitHub credentials: GITHUB_TOKEN not set".to_string()))
    }

    async fn branch_head(&self, repo: &RepoSlug, branch: &str) -> Result<String> {
        let url = format!("/repos/{}/{}/git/ref/heads/{branch}", repo.owner, repo.name);
        let reference: serde_json::Value = self
            .client()?
            .get(&url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to read ref heads/{branch}: {e}")))?;

        json_str(&reference["object"]["sha"], "ref object sha")
    }

    async fn create_blob(&self, repo: &RepoSlug, content: &str) -> Result<String> {
        let url = format!("/repos/{}/{}/git/blobs", repo.owner, repo.name);
        let blob: serde_json::Value = self
            .client()?
            .post(
                &url,
                Some(&json!({
                    "content": BASE64.encode(content.as_bytes()),
                    "encoding": "base64",
                })),
            )
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to create blob: {e}")))?;

        json_str(&blob["sha"], "blob sha")
    }
}

fn json_str(value: &serde_json::Value, what: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AppError::GitHubApi(format!("No {what} in response")))
}

fn is_not_found(e: &octocrab::Error) -> bool {
    matches!(e, octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404)
}

#[async_trait]
impl Platform for GitHubPlatform {
    async fn fetch_issue(&self, repo: &RepoSlug, issue_number: u64) -> Result<Issue> {
        let issue = self
            .client()?
            .issues(&repo.owner, &repo.name)
            .get(issue_number)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    AppError::IssueNotFound(issue_number)
                } else {
                    AppError::from(e)
                }
            })?;

        Ok(mapper::map_issue(&issue))
    }

    async fn commit_tree(
        &self,
        repo: &RepoSlug,
        base_branch: &str,
        files: &[FileChange],
        message: &str,
    ) -> Result<String> {
        let client = self.client()?;
        let parent_sha = self.branch_head(repo, base_branch).await?;

        let commits_url = format!("/repos/{}/{}/git/commits", repo.owner, repo.name);
        let parent: serde_json::Value = client
            .get(format!("{commits_url}/{parent_sha}"), None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to read commit {parent_sha}: {e}")))?;
        let base_tree = json_str(&parent["tree"]["sha"], "tree sha")?;

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let sha = self.create_blob(repo, &file.content).await?;
            entries.push(json!({
                "path": file.path,
                "mode": "100644",
                "type": "blob",
                "sha": sha,
            }));
        }

        let trees_url = format!("/repos/{}/{}/git/trees", repo.owner, repo.name);
        let tree: serde_json::Value = client
            .post(&trees_url, Some(&json!({ "base_tree": base_tree, "tree": entries })))
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to create tree: {e}")))?;
        let tree_sha = json_str(&tree["sha"], "tree sha")?;

        let commit: serde_json::Value = client
            .post(
                &commits_url,
                Some(&json!({
                    "message": message,
                    "tree": tree_sha,
                    "parents": [parent_sha],
                })),
            )
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to create commit: {e}")))?;

        json_str(&commit["sha"], "commit sha")
    }

    async fn advance_ref(&self, repo: &RepoSlug, branch: &str, commit_id: &str) -> Result<()> {
        let url = format!("/repos/{}/{}/git/refs/heads/{branch}", repo.owner, repo.name);
        let _: serde_json::Value = self
            .client()?
            .patch(&url, Some(&json!({ "sha": commit_id, "force": false })))
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to update ref heads/{branch}: {e}")))?;

        Ok(())
    }
}
