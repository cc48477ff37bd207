//! Planning phase: decide which files the issue touches.

use crate::error::{AppError, Result};
use crate::workflow::classifier;
use crate::workflow::context::PhaseContext;
use crate::workflow::paths;
use crate::workflow::state::WorkflowState;

pub async fn run(ctx: &PhaseContext<'_>, state: &mut WorkflowState) -> Result<()> {
    let root = ctx.repo_root(state)?;
    if state.issue_text.trim().is_empty() {
        return Err(AppError::Workflow("Issue text is empty".to_string()));
    }

    let candidates = classifier::discover_candidates(&state.issue_text, &root);
    tracing::info!(
        mentioned = candidates.mentioned_files.len(),
        repo_files = candidates.repo_files.len(),
        candidates = ?candidates.candidate_files,
        "Discovered candidate files"
    );

    let mut plan =
        classifier::classify(ctx.oracle, &state.issue_text, &candidates.candidate_files).await;
    plan.test_files = paths::normalize_test_paths(&root, &plan.test_files)?;

    tracing::info!(
        relevant = plan.relevant_files.len(),
        source = plan.source_files.len(),
        test = plan.test_files.len(),
        is_test_generation_issue = plan.is_test_generation_issue,
        "Plan ready"
    );
    state.plan = Some(plan);
    Ok(())
}
