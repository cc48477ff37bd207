use std::path::{Component, Path, PathBuf};

use crate::config::WorkspaceConfig;
use crate::error::{AppError, Result};
use crate::platform::types::RepoSlug;
use crate::workspace::git;

/// Manages the working copies that the workflow mutates.
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
        }
    }

    /// Where the working copy for `repo` lives.
    pub fn repo_root(&self, repo: &RepoSlug) -> PathBuf {
        self.base_dir.join(repo.dir_name())
    }

    /// Clone `clone_url` unless a working copy already exists. Returns its root.
    pub async fn ensure_checkout(
        &self,
        clone_url: &str,
        repo: &RepoSlug,
        token: Option<&str>,
    ) -> Result<PathBuf> {
        let root = self.repo_root(repo);

        if root.exists() {
            tracing::info!(path = %root.display(), "Repository already exists, skipping clone");
            return Ok(root);
        }

        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| AppError::Workspace(format!("Failed to create workspace dir: {e}")))?;

        tracing::info!(url = %clone_url, path = %root.display(), "Cloning repository");
        git::clone(clone_url, &root, token).await?;
        tracing::info!("Repository cloned successfully");

        Ok(root)
    }

    /// Resolve `requested_path` under `workspace_root`, creating missing parent
    /// directories. Absolute paths, `..` components and symlinks leading out of
    /// the root are rejected before any directory is created.
    pub fn verify_path(workspace_root: &Path, requested_path: &Path) -> Result<PathBuf> {
        let canonical_root = canonical_root(workspace_root)?;
        let full_path = workspace_root.join(relative_only(requested_path)?);

        if full_path.exists() {
            let canonical = full_path.canonicalize().map_err(resolve_error)?;
            return inside(&canonical_root, canonical, requested_path);
        }

        // New files have no canonical form yet; resolve through the parent
        let parent = full_path
            .parent()
            .ok_or_else(|| AppError::Workspace("Invalid file path".to_string()))?;
        let file_name = full_path
            .file_name()
            .ok_or_else(|| AppError::Workspace("Invalid file name".to_string()))?;

        if !parent.exists() {
            let existing = parent
                .ancestors()
                .find(|p| p.exists())
                .ok_or_else(|| AppError::Workspace("Invalid file path".to_string()))?;
            inside(
                &canonical_root,
                existing.canonicalize().map_err(resolve_error)?,
                requested_path,
            )?;
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Workspace(format!("Failed to create directory: {e}")))?;
        }

        let canonical_parent = parent.canonicalize().map_err(resolve_error)?;
        inside(&canonical_root, canonical_parent.join(file_name), requested_path)
    }

    /// Resolve a file that must already exist under `workspace_root`. Nothing is created.
    pub fn resolve_existing(workspace_root: &Path, requested_path: &Path) -> Result<PathBuf> {
        let canonical_root = canonical_root(workspace_root)?;
        let canonical = workspace_root
            .join(relative_only(requested_path)?)
            .canonicalize()
            .map_err(resolve_error)?;
        inside(&canonical_root, canonical, requested_path)
    }
}

fn traversal(requested_path: &Path) -> AppError {
    AppError::Workspace(format!(
        "Path traversal detected: {} is outside workspace",
        requested_path.display()
    ))
}

fn resolve_error(e: std::io::Error) -> AppError {
    AppError::Workspace(format!("Failed to resolve path: {e}"))
}

fn canonical_root(workspace_root: &Path) -> Result<PathBuf> {
    workspace_root
        .canonicalize()
        .map_err(|e| AppError::Workspace(format!("Failed to resolve workspace root: {e}")))
}

/// Only plain relative paths are accepted: no root, prefix or `..` component.
fn relative_only(requested_path: &Path) -> Result<&Path> {
    if requested_path.as_os_str().is_empty() {
        return Err(AppError::Workspace("Invalid file path".to_string()));
    }
    let plain = requested_path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !plain {
        return Err(traversal(requested_path));
    }
    Ok(requested_path)
}

fn inside(canonical_root: &Path, canonical: PathBuf, requested_path: &Path) -> Result<PathBuf> {
    if canonical.starts_with(canonical_root) {
        Ok(canonical)
    } else {
        Err(traversal(requested_path))
    }
}
