use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Static facts about the target project. Set once when the run starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectContext {
    pub repo_url: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub relevant_files: Option<Vec<String>>,
    pub dependencies: Option<Vec<String>>,
}

impl ProjectContext {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            ..Default::default()
        }
    }
}

/// Classification of repository files produced by the planning phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub relevant_files: Vec<String>,
    #[serde(default)]
    pub source_files: Vec<String>,
    #[serde(default)]
    pub test_files: Vec<String>,
    #[serde(default)]
    pub is_test_generation_issue: bool,
}

/// Insertion-ordered set of touched paths. Paths are only ever added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdatedFiles(Vec<String>);

impl UpdatedFiles {
    /// Add `path` unless already present. Returns whether it was new.
    pub fn insert(&mut self, path: &str) -> bool {
        if self.contains(path) {
            return false;
        }
        self.0.push(path.to_string());
        true
    }

    pub fn extend<'a, I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for path in paths {
            self.insert(path);
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.iter().any(|p| p == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeChanges {
    pub updated_files: UpdatedFiles,
    /// Test file synthesized by test generation, if any.
    pub created_file: Option<String>,
    pub commit_message: Option<String>,
    pub commit_id: Option<String>,
}

impl CodeChanges {
    /// Created file first, then updated files; no duplicates.
    pub fn changed_files(&self) -> Vec<String> {
        let mut files = UpdatedFiles::default();
        if let Some(created) = &self.created_file {
            files.insert(created);
        }
        files.extend(self.updated_files.iter());
        files.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResults {
    pub test_outputs: BTreeMap<String, String>,
    pub tests_passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintResults {
    pub lint_outputs: BTreeMap<String, String>,
    pub lint_passed: bool,
}

/// The record threaded through every phase of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    pub issue_text: String,
    pub project_context: Option<ProjectContext>,
    pub plan: Option<Plan>,
    pub code_changes: Option<CodeChanges>,
    pub test_results: Option<TestResults>,
    pub lint_results: Option<LintResults>,
    /// Failure text from the last test/lint phase, pending a retry.
    pub last_errors: Option<String>,
    /// tests_passed AND lint_passed; `None` until test/lint has run.
    pub passed: Option<bool>,
}

impl WorkflowState {
    pub fn new(issue_text: impl Into<String>, project_context: ProjectContext) -> Self {
        Self {
            issue_text: issue_text.into(),
            project_context: Some(project_context),
            ..Default::default()
        }
    }

    /// Record that `paths` were touched by a generation phase.
    pub fn record_updated_files<'a, I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.code_changes
            .get_or_insert_with(CodeChanges::default)
            .updated_files
            .extend(paths);
    }

    /// `Some(passed)` once tests have produced a verdict.
    pub fn tests_passed(&self) -> Option<bool> {
        self.test_results.as_ref().map(|r| r.tests_passed)
    }

    pub fn plan(&self) -> Plan {
        self.plan.clone().unwrap_or_default()
    }
}
