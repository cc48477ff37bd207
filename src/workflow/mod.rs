pub mod classifier;
pub mod clone;
pub mod commit;
pub mod context;
pub mod engine;
pub mod generation;
pub mod issue;
pub mod markdown;
pub mod paths;
pub mod planning;
pub mod state;
pub mod test_lint;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use context::RunSettings;
pub use engine::WorkflowEngine;
pub use state::{ProjectContext, WorkflowState};
pub use types::WorkflowOutcome;
