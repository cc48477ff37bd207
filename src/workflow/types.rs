use crate::workflow::state::WorkflowState;

/// Outcome of a workflow execution, as reported to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// Checks passed and the changes were pushed.
    Committed { commit_id: String },
    /// Checks passed but nothing was pushed (commit phase disabled or no readable changes).
    ChecksPassed,
    /// Tests or lint still failed when the run stopped.
    ChecksFailed,
    /// The plan named nothing to check.
    NotApplicable,
    /// A phase raised an unrecoverable error.
    Failed,
}

impl WorkflowOutcome {
    pub fn from_final_state(state: Option<&WorkflowState>) -> Self {
        let Some(state) = state else {
            return WorkflowOutcome::Failed;
        };

        let commit_id = state.code_changes.as_ref().and_then(|c| c.commit_id.clone());
        match (state.passed, commit_id) {
            (_, Some(commit_id)) => WorkflowOutcome::Committed { commit_id },
            (Some(true), None) => WorkflowOutcome::ChecksPassed,
            (Some(false), None) => WorkflowOutcome::ChecksFailed,
            (None, None) => WorkflowOutcome::NotApplicable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::CodeChanges;

    #[test]
    fn test_outcome_from_state() {
        assert_eq!(WorkflowOutcome::from_final_state(None), WorkflowOutcome::Failed);

        let mut state = WorkflowState::default();
        assert_eq!(WorkflowOutcome::from_final_state(Some(&state)), WorkflowOutcome::NotApplicable);

        state.passed = Some(false);
        assert_eq!(WorkflowOutcome::from_final_state(Some(&state)), WorkflowOutcome::ChecksFailed);

        state.passed = Some(true);
        assert_eq!(WorkflowOutcome::from_final_state(Some(&state)), WorkflowOutcome::ChecksPassed);

        state.code_changes = Some(CodeChanges {
            commit_id: Some("abc123".to_string()),
            ..Default::default()
        });
        assert_eq!(
            WorkflowOutcome::from_final_state(Some(&state)),
            WorkflowOutcome::Committed {
                commit_id: "abc123".to_string()
            }
        );
    }
}
