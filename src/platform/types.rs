use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// An issue as fetched from the hosting platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub is_open: bool,
}

/// One file in a remote commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub content: String,
}

/// `owner/name` of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Parse the `owner/repo` part out of an HTTPS, HTTP or SSH repository URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let trimmed = url.trim().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

        let path = if let Some(rest) = trimmed.strip_prefix("git@") {
            rest.split_once(':').map(|(_, path)| path.to_string())
        } else if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
            // scheme, empty, host, owner, repo
            let parts: Vec<&str> = trimmed.split('/').collect();
            if parts.len() >= 5 {
                Some(parts[parts.len() - 2..].join("/"))
            } else {
                None
            }
        } else {
            None
        };

        path.as_deref().and_then(Self::parse).ok_or_else(|| {
            AppError::Config(format!("Unrecognized GitHub repo URL format: {url}"))
        })
    }

    fn parse(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Filesystem-safe directory name for the working copy.
    pub fn dir_name(&self) -> String {
        format!("{}__{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
