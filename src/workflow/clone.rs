//! Issue-analysis phase: make sure a working copy of the target repository exists.

use crate::error::{AppError, Result};
use crate::workflow::context::PhaseContext;
use crate::workflow::state::WorkflowState;

pub async fn run(ctx: &PhaseContext<'_>, state: &mut WorkflowState) -> Result<()> {
    let repo_url = state
        .project_context
        .as_ref()
        .map(|c| c.repo_url.clone())
        .ok_or_else(|| AppError::Config("Missing project context".to_string()))?;
    let repo = ctx.repo_slug(state)?;

    let root = ctx
        .workspace
        .ensure_checkout(&repo_url, &repo, ctx.settings.github_token.as_deref())
        .await?;

    tracing::info!(repo = %repo, path = %root.display(), "Working copy ready");
    Ok(())
}
