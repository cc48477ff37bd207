use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub claude: ClaudeConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub toolchain: ToolchainConfig,
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default = "default_repo_url")]
    pub repo_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_branch: default_base_branch(),
            repo_url: default_repo_url(),
        }
    }
}

// Manual Debug impl to avoid leaking the token
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("base_branch", &self.base_branch)
            .field("repo_url", &self.repo_url)
            .finish()
    }
}

#[derive(Deserialize, Clone)]
pub struct ClaudeConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for ClaudeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_dir")]
    pub base_dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: default_workspace_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_include_commit_and_pr")]
    pub include_commit_and_pr: bool,
    #[serde(default = "default_max_error_output_chars")]
    pub max_error_output_chars: usize,
    #[serde(default)]
    pub process_timeout_secs: Option<u64>,
    #[serde(default)]
    pub edit_mode: EditMode,
}

/// How generated changes reach the working copy.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    /// The oracle returns complete files that replace the originals.
    #[default]
    WholeFile,
    /// The oracle returns a unified diff per file, applied with git.
    Patch,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            include_commit_and_pr: default_include_commit_and_pr(),
            max_error_output_chars: default_max_error_output_chars(),
            process_timeout_secs: None,
            edit_mode: EditMode::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_secs.map(Duration::from_secs)
    }
}

/// Command prefixes used by the test-and-lint phase. The target file is
/// appended as the final argument where one applies.
#[derive(Debug, Deserialize, Clone)]
pub struct ToolchainConfig {
    #[serde(default = "default_python_test")]
    pub python_test: Vec<String>,
    #[serde(default = "default_javascript_test")]
    pub javascript_test: Vec<String>,
    #[serde(default = "default_lint")]
    pub lint: Vec<String>,
    #[serde(default = "default_dependency_install")]
    pub dependency_install: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            python_test: default_python_test(),
            javascript_test: default_javascript_test(),
            lint: default_lint(),
            dependency_install: default_dependency_install(),
        }
    }
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_repo_url() -> String {
    "https://github.com/SDT-DeveloperTwin/SDT-Testing-Project.git".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.2
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("/tmp/tendril-workspaces")
}

fn default_max_retries() -> u32 {
    3
}

fn default_include_commit_and_pr() -> bool {
    true
}

fn default_max_error_output_chars() -> usize {
    4000
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn default_python_test() -> Vec<String> {
    argv(&["python3", "-m", "pytest"])
}

fn default_javascript_test() -> Vec<String> {
    argv(&["npm", "run", "test"])
}

fn default_lint() -> Vec<String> {
    argv(&["ruff", "check"])
}

fn default_dependency_install() -> Vec<String> {
    argv(&["python3", "-m", "pip", "install"])
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("tendril").required(false));
        }

        // Environment variable overrides, e.g. TENDRIL__WORKFLOW__MAX_RETRIES
        builder = builder.add_source(
            config::Environment::with_prefix("TENDRIL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let mut app: AppConfig = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        app.apply_conventional_env();
        Ok(app)
    }

    /// Fill credentials and branch from the conventional variables used by
    /// GitHub Actions and the Anthropic SDKs when the config leaves them unset.
    fn apply_conventional_env(&mut self) {
        if self.github.token.is_none() {
            self.github.token = non_empty_env("GITHUB_TOKEN");
        }
        if let Some(branch) = non_empty_env("GITHUB_BASE_BRANCH") {
            if self.github.base_branch == default_base_branch() {
                self.github.base_branch = branch;
            }
        }
        if self.claude.api_key.is_none() {
            self.claude.api_key = non_empty_env("ANTHROPIC_API_KEY");
        }
    }

    pub fn github_token(&self) -> Option<&str> {
        self.github.token.as_deref()
    }

    pub fn claude_api_key(&self) -> Result<&str> {
        self.claude
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("Missing Claude API key (set ANTHROPIC_API_KEY)".to_string()))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.workflow.max_retries, 3);
        assert!(config.workflow.include_commit_and_pr);
        assert_eq!(config.github.base_branch, "main");
        assert_eq!(config.toolchain.lint, vec!["ruff", "check"]);
        assert!(config.workflow.process_timeout().is_none());
        assert_eq!(config.workflow.edit_mode, EditMode::WholeFile);
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = AppConfig::default();
        let err = config.claude_api_key().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.github.token = Some("ghp_secret".to_string());
        config.claude.api_key = Some("sk-secret".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("ghp_secret"));
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tendril.toml");
        std::fs::write(
            &path,
            "[workflow]\nmax_retries = 5\nedit_mode = \"patch\"\n\n[github]\nbase_branch = \"develop\"\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.workflow.max_retries, 5);
        assert_eq!(config.workflow.max_error_output_chars, 4000);
        assert_eq!(config.workflow.edit_mode, EditMode::Patch);
        assert_eq!(config.github.base_branch, "develop");
        assert_eq!(config.toolchain.python_test, vec!["python3", "-m", "pytest"]);
    }
}
