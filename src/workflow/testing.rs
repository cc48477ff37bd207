//! Recording fakes for the external collaborators.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::WorkspaceConfig;
use crate::error::Result;
use crate::oracle::{Oracle, OracleReply, OracleRequest};
use crate::platform::types::{FileChange, Issue, RepoSlug};
use crate::platform::Platform;
use crate::process::{CommandSpec, ProcessOutput, ProcessRunner};
use crate::workflow::context::{PhaseContext, RunSettings};
use crate::workflow::state::{Plan, ProjectContext, WorkflowState};
use crate::workspace::WorkspaceManager;

pub const REPO_URL: &str = "https://github.com/owner/repo";

type OracleFn = dyn Fn(&OracleRequest) -> Result<OracleReply> + Send + Sync;

pub struct FnOracle {
    respond: Box<OracleFn>,
    pub requests: Mutex<Vec<OracleRequest>>,
}

impl FnOracle {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&OracleRequest) -> Result<OracleReply> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl Oracle for FnOracle {
    async fn generate(&self, request: &OracleRequest) -> Result<OracleReply> {
        self.requests.lock().unwrap().push(request.clone());
        (self.respond)(request)
    }
}

pub fn output(exit_code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

type RunnerFn = dyn Fn(&CommandSpec) -> Result<ProcessOutput> + Send + Sync;

#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub command: CommandSpec,
    pub env: Vec<(String, String)>,
}

pub struct ScriptedRunner {
    respond: Box<RunnerFn>,
    pub runs: Mutex<Vec<RecordedRun>>,
}

impl ScriptedRunner {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<ProcessOutput> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn always_ok() -> Self {
        Self::new(|_| Ok(output(0, "", "")))
    }

    pub fn commands(&self) -> Vec<String> {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.command.to_string())
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        _cwd: &Path,
        env: &[(String, String)],
    ) -> Result<ProcessOutput> {
        self.runs.lock().unwrap().push(RecordedRun {
            command: command.clone(),
            env: env.to_vec(),
        });
        (self.respond)(command)
    }
}

#[derive(Default)]
pub struct RecordingPlatform {
    pub issue: Option<Issue>,
    pub calls: Mutex<Vec<String>>,
    pub committed: Mutex<Vec<FileChange>>,
}

impl RecordingPlatform {
    pub fn with_issue(issue: Issue) -> Self {
        Self {
            issue: Some(issue),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn fetch_issue(&self, repo: &RepoSlug, issue_number: u64) -> Result<Issue> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("fetch_issue {repo} #{issue_number}"));
        self.issue
            .clone()
            .ok_or(crate::error::AppError::IssueNotFound(issue_number))
    }

    async fn commit_tree(
        &self,
        repo: &RepoSlug,
        base_branch: &str,
        files: &[FileChange],
        message: &str,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("commit_tree {repo} {base_branch} {message}"));
        self.committed.lock().unwrap().extend(files.iter().cloned());
        Ok("c0ffee".to_string())
    }

    async fn advance_ref(&self, repo: &RepoSlug, branch: &str, commit_id: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("advance_ref {repo} {branch} {commit_id}"));
        Ok(())
    }
}

/// A temporary workspace holding a checked-out `owner/repo` plus fakes.
pub struct Harness {
    pub base: tempfile::TempDir,
    pub workspace: WorkspaceManager,
    pub oracle: FnOracle,
    pub platform: RecordingPlatform,
    pub runner: ScriptedRunner,
    pub settings: RunSettings,
}

impl Harness {
    pub fn new(oracle: FnOracle, runner: ScriptedRunner) -> Self {
        let base = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(base.path().join("owner__repo")).unwrap();
        let workspace = WorkspaceManager::new(&WorkspaceConfig {
            base_dir: base.path().to_path_buf(),
        });
        Self {
            base,
            workspace,
            oracle,
            platform: RecordingPlatform::default(),
            runner,
            settings: RunSettings::default(),
        }
    }

    pub fn repo_root(&self) -> PathBuf {
        self.base.path().join("owner__repo")
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.repo_root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Turn the working copy into a git repository with everything committed.
    pub fn commit_all(&self) {
        let repo = git2::Repository::init(self.repo_root()).unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.repo_root().join(rel)).unwrap()
    }

    pub fn ctx(&self) -> PhaseContext<'_> {
        PhaseContext {
            oracle: &self.oracle,
            platform: &self.platform,
            runner: &self.runner,
            workspace: &self.workspace,
            settings: &self.settings,
        }
    }
}

pub fn state_with_plan(issue_text: &str, plan: Plan) -> WorkflowState {
    let mut state = WorkflowState::new(issue_text, ProjectContext::new(REPO_URL));
    state.plan = Some(plan);
    state
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
