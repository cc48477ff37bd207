//! Project-understanding phase: turn the issue identifier into issue text.

use crate::error::{AppError, Result};
use crate::workflow::context::PhaseContext;
use crate::workflow::markdown;
use crate::workflow::state::WorkflowState;

const PREVIEW_CHARS: usize = 100;

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// A purely numeric identifier is fetched from the platform; anything else is
/// already the issue text.
pub async fn run(ctx: &PhaseContext<'_>, state: &mut WorkflowState) -> Result<()> {
    let identifier = state.issue_text.trim().to_string();
    if identifier.is_empty() {
        return Err(AppError::Workflow("Issue text is empty".to_string()));
    }

    let Ok(number) = identifier.parse::<u64>() else {
        tracing::info!(preview = %preview(&identifier), "Using issue text as given");
        return Ok(());
    };

    if ctx.settings.github_token.is_none() {
        return Err(AppError::Config(
            "Missing GitHub credentials (set GITHUB_TOKEN) to fetch an issue by number".to_string(),
        ));
    }
    let repo = ctx.repo_slug(state)?;

    tracing::info!(repo = %repo, issue = number, "Fetching issue");
    let issue = ctx.platform.fetch_issue(&repo, number).await?;

    if !issue.is_open {
        return Err(AppError::IssueNotOpen(number));
    }
    if issue.body.trim().is_empty() {
        return Err(AppError::Workflow(format!("Issue #{number} has no body")));
    }

    state.issue_text = markdown::to_plain_text(&issue.body);
    tracing::info!(
        issue = number,
        title = %issue.title,
        preview = %preview(&state.issue_text),
        "Retrieved issue"
    );
    Ok(())
}
