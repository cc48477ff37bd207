//! The workflow state machine.
//!
//! Phases run strictly in sequence. The only branch is taken after
//! test-and-lint, and it looks at `tests_passed` alone: a lint-only failure
//! moves on to the commit phase, where the combined `passed` gate then keeps
//! anything from being pushed.

use std::fmt;
use std::sync::Arc;

use tracing::Instrument;

use crate::error::Result;
use crate::oracle::Oracle;
use crate::platform::Platform;
use crate::process::ProcessRunner;
use crate::workflow::context::{PhaseContext, RunSettings};
use crate::workflow::state::{ProjectContext, WorkflowState};
use crate::workflow::{clone, commit, generation, issue, planning, test_lint};
use crate::workspace::WorkspaceManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    IssueAnalysis,
    ProjectUnderstanding,
    Planning,
    MainCodeGeneration,
    TestAndLint,
    CommitAndPr,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::IssueAnalysis => "issue_analysis",
            Phase::ProjectUnderstanding => "project_understanding",
            Phase::Planning => "planning",
            Phase::MainCodeGeneration => "main_code_generation",
            Phase::TestAndLint => "test_and_lint",
            Phase::CommitAndPr => "commit_and_pr",
        }
    }

    /// Fixed successor for every phase except test-and-lint.
    fn successor(self) -> Option<Phase> {
        match self {
            Phase::IssueAnalysis => Some(Phase::ProjectUnderstanding),
            Phase::ProjectUnderstanding => Some(Phase::Planning),
            Phase::Planning => Some(Phase::MainCodeGeneration),
            Phase::MainCodeGeneration => Some(Phase::TestAndLint),
            Phase::TestAndLint | Phase::CommitAndPr => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bounded loop back to generation after failing tests. Counts per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_count: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_count: 0,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn reset(&mut self) {
        self.retry_count = 0;
    }

    /// Where to go after test-and-lint. Clears `last_errors` on every path
    /// except a retry, which needs them for the next prompt.
    pub fn route(&mut self, state: &mut WorkflowState, include_commit: bool) -> Option<Phase> {
        if state.tests_passed() == Some(false) {
            if self.retry_count < self.max_retries {
                self.retry_count += 1;
                tracing::info!(
                    attempt = self.retry_count,
                    max_retries = self.max_retries,
                    "Tests failed, retrying generation"
                );
                return Some(Phase::MainCodeGeneration);
            }
            tracing::warn!(max_retries = self.max_retries, "Tests still failing, giving up");
            state.last_errors = None;
            return None;
        }

        state.last_errors = None;
        include_commit.then_some(Phase::CommitAndPr)
    }
}

pub struct WorkflowEngine {
    oracle: Arc<dyn Oracle>,
    platform: Arc<dyn Platform>,
    runner: Arc<dyn ProcessRunner>,
    workspace: WorkspaceManager,
    settings: RunSettings,
    retry: RetryPolicy,
}

impl WorkflowEngine {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        platform: Arc<dyn Platform>,
        runner: Arc<dyn ProcessRunner>,
        workspace: WorkspaceManager,
        settings: RunSettings,
    ) -> Self {
        let retry = RetryPolicy::new(settings.max_retries);
        Self {
            oracle,
            platform,
            runner,
            workspace,
            settings,
            retry,
        }
    }

    /// Retries consumed by the most recent run.
    pub fn retries_used(&self) -> u32 {
        self.retry.retry_count()
    }

    /// Process one issue start to finish. Returns the final state, or `None`
    /// when a phase failed (the error is logged).
    pub async fn run(&mut self, issue: &str, project_context: ProjectContext) -> Option<WorkflowState> {
        let span = tracing::info_span!("workflow", repo = %project_context.repo_url);
        let mut state = WorkflowState::new(issue, project_context);

        match self.try_run(&mut state).instrument(span.clone()).await {
            Ok(()) => {
                let _enter = span.enter();
                tracing::info!(
                    passed = ?state.passed,
                    retries = self.retry.retry_count(),
                    "Workflow finished"
                );
                match serde_json::to_string_pretty(&state) {
                    Ok(json) => tracing::debug!(state = %json, "Final state"),
                    Err(e) => tracing::debug!(error = %e, "Could not serialize final state"),
                }
                Some(state)
            }
            Err(e) => {
                let _enter = span.enter();
                tracing::error!(error = %e, "Workflow failed");
                None
            }
        }
    }

    async fn try_run(&mut self, state: &mut WorkflowState) -> Result<()> {
        self.retry.reset();
        let ctx = PhaseContext {
            oracle: self.oracle.as_ref(),
            platform: self.platform.as_ref(),
            runner: self.runner.as_ref(),
            workspace: &self.workspace,
            settings: &self.settings,
        };

        let mut next = Some(Phase::IssueAnalysis);
        while let Some(phase) = next {
            let span = tracing::info_span!("phase", phase = phase.name());
            execute(phase, &ctx, state).instrument(span).await?;

            next = match phase {
                Phase::TestAndLint => self.retry.route(state, self.settings.include_commit_and_pr),
                other => other.successor(),
            };
        }
        Ok(())
    }
}

async fn execute(phase: Phase, ctx: &PhaseContext<'_>, state: &mut WorkflowState) -> Result<()> {
    tracing::info!("Entering phase");
    match phase {
        Phase::IssueAnalysis => clone::run(ctx, state).await,
        Phase::ProjectUnderstanding => issue::run(ctx, state).await,
        Phase::Planning => planning::run(ctx, state).await,
        Phase::MainCodeGeneration => generation::run(ctx, state).await,
        Phase::TestAndLint => test_lint::run(ctx, state).await,
        Phase::CommitAndPr => commit::run(ctx, state).await,
    }
}
