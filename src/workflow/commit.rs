//! Commit-and-PR phase: push the changed files as one commit on the base branch.

use std::path::Path;

use crate::error::Result;
use crate::oracle::{generate_text, prompt, strip_code_fences};
use crate::platform::types::FileChange;
use crate::workflow::context::PhaseContext;
use crate::workflow::state::WorkflowState;
use crate::workspace::{git, WorkspaceManager};

const SUMMARY_CHARS: usize = 500;

/// Whether the run earned a commit: tests passed and the combined verdict is green.
pub fn gate_open(state: &WorkflowState) -> bool {
    state.tests_passed() == Some(true) && state.passed == Some(true)
}

pub async fn run(ctx: &PhaseContext<'_>, state: &mut WorkflowState) -> Result<()> {
    if !gate_open(state) {
        tracing::info!(
            tests_passed = ?state.tests_passed(),
            passed = ?state.passed,
            "Checks did not pass, skipping commit"
        );
        return Ok(());
    }

    let changed = state
        .code_changes
        .as_ref()
        .map(|c| c.changed_files())
        .unwrap_or_default();
    if changed.is_empty() {
        tracing::warn!("No changed files, skipping commit");
        return Ok(());
    }

    let base_branch = ctx.settings.base_branch.as_str();
    git::validate_branch_name(base_branch)?;
    let repo = ctx.repo_slug(state)?;
    let root = ctx.repo_root(state)?;

    let files = read_changes(&root, &changed).await;
    if files.is_empty() {
        tracing::warn!("None of the changed files could be read, skipping commit");
        return Ok(());
    }

    let message = commit_message(ctx, state, &files).await;

    tracing::info!(repo = %repo, branch = %base_branch, files = files.len(), "Creating commit");
    let commit_id = ctx.platform.commit_tree(&repo, base_branch, &files, &message).await?;
    ctx.platform.advance_ref(&repo, base_branch, &commit_id).await?;
    tracing::info!(commit = %commit_id, branch = %base_branch, "Branch updated");

    if let Some(changes) = state.code_changes.as_mut() {
        changes.commit_message = Some(message);
        changes.commit_id = Some(commit_id);
    }
    Ok(())
}

fn repo_path(file: &str) -> String {
    let file = file.replace('\\', "/");
    file.trim_start_matches("./").to_string()
}

/// Read every changed file that resolves inside the working copy.
async fn read_changes(root: &Path, changed: &[String]) -> Vec<FileChange> {
    let mut files = Vec::with_capacity(changed.len());
    for file in changed {
        let full_path = match WorkspaceManager::resolve_existing(root, Path::new(file)) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(file = %file, error = %e, "Leaving unresolvable file out of the commit");
                continue;
            }
        };
        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => files.push(FileChange {
                path: repo_path(file),
                content,
            }),
            Err(e) => tracing::warn!(file = %file, error = %e, "Could not read file, leaving it out of the commit"),
        }
    }
    files
}

fn fallback_message(issue_text: &str) -> String {
    let headline = issue_text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if headline.is_empty() {
        "fix: resolve issue".to_string()
    } else {
        format!("fix: resolve issue\n\n{headline}")
    }
}

/// The cached message when present, else one generated from the changes.
async fn commit_message(ctx: &PhaseContext<'_>, state: &WorkflowState, files: &[FileChange]) -> String {
    if let Some(message) = state
        .code_changes
        .as_ref()
        .and_then(|c| c.commit_message.as_deref())
        .filter(|m| !m.trim().is_empty())
    {
        return message.to_string();
    }

    let summaries = files
        .iter()
        .map(|f| {
            let head: String = f.content.chars().take(SUMMARY_CHARS).collect();
            format!("File: {}\n{head}", f.path)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    match generate_text(ctx.oracle, prompt::commit_message_prompt(&state.issue_text, &summaries)).await {
        Ok(reply) => {
            let message = strip_code_fences(&reply);
            if message.is_empty() {
                tracing::warn!("Empty commit message from oracle, using fallback");
                fallback_message(&state.issue_text)
            } else {
                message
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Commit message generation failed, using fallback");
            fallback_message(&state.issue_text)
        }
    }
}
