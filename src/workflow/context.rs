use std::path::PathBuf;

use crate::config::{AppConfig, EditMode, ToolchainConfig};
use crate::error::{AppError, Result};
use crate::oracle::Oracle;
use crate::platform::types::RepoSlug;
use crate::platform::Platform;
use crate::process::ProcessRunner;
use crate::workflow::state::WorkflowState;
use crate::workspace::WorkspaceManager;

/// Run-wide knobs the phases read. Built once from [`AppConfig`].
#[derive(Clone)]
pub struct RunSettings {
    pub max_retries: u32,
    pub include_commit_and_pr: bool,
    pub max_error_output_chars: usize,
    pub base_branch: String,
    pub github_token: Option<String>,
    pub toolchain: ToolchainConfig,
    pub edit_mode: EditMode,
}

impl RunSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.workflow.max_retries,
            include_commit_and_pr: config.workflow.include_commit_and_pr,
            max_error_output_chars: config.workflow.max_error_output_chars,
            base_branch: config.github.base_branch.clone(),
            github_token: config.github_token().map(str::to_string),
            toolchain: config.toolchain.clone(),
            edit_mode: config.workflow.edit_mode,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Everything a phase may touch besides the state itself.
pub struct PhaseContext<'a> {
    pub oracle: &'a dyn Oracle,
    pub platform: &'a dyn Platform,
    pub runner: &'a dyn ProcessRunner,
    pub workspace: &'a WorkspaceManager,
    pub settings: &'a RunSettings,
}

impl PhaseContext<'_> {
    pub fn repo_slug(&self, state: &WorkflowState) -> Result<RepoSlug> {
        let context = state
            .project_context
            .as_ref()
            .ok_or_else(|| AppError::Config("Missing project context".to_string()))?;
        RepoSlug::from_url(&context.repo_url)
    }

    /// Canonical root of the working copy. Fails when it has not been cloned.
    pub fn repo_root(&self, state: &WorkflowState) -> Result<PathBuf> {
        let root = self.workspace.repo_root(&self.repo_slug(state)?);
        if !root.is_dir() {
            return Err(AppError::Config(format!(
                "Repository path {} not found; did issue_analysis run?",
                root.display()
            )));
        }
        root.canonicalize()
            .map_err(|e| AppError::Workspace(format!("Failed to resolve {}: {e}", root.display())))
    }
}
