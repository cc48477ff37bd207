use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tendril::config::AppConfig;
use tendril::oracle::ClaudeClient;
use tendril::platform::github::GitHubPlatform;
use tendril::process::SystemRunner;
use tendril::workflow::{ProjectContext, RunSettings, WorkflowEngine, WorkflowOutcome};
use tendril::workspace::WorkspaceManager;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "tendril", about = "Resolve a GitHub issue: generate code, run tests and lint, commit")]
struct Cli {
    /// Issue number, path to a file holding the issue text, or the issue text itself
    #[arg(short, long)]
    issue: String,

    /// Repository to work on (overrides the configured repo_url)
    #[arg(long)]
    repo_url: Option<String>,

    /// Whether to commit and push when the checks pass
    #[arg(long)]
    include_commit_and_pr: Option<bool>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Also write logs to tendril_run_<timestamp>.log in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

/// Validate `--issue` and load it from disk when it names a file.
fn resolve_issue(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("--issue must not be empty".to_string());
    }

    if let Ok(number) = trimmed.parse::<i64>() {
        if number <= 0 {
            return Err(format!("issue number must be a positive integer, got {number}"));
        }
        return Ok(number.to_string());
    }

    let path = Path::new(trimmed);
    if path.is_file() {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read issue file {}: {e}", path.display()))?;
        if text.trim().is_empty() {
            return Err(format!("issue file {} is empty", path.display()));
        }
        return Ok(text);
    }

    Ok(trimmed.to_string())
}

/// Install the subscriber. Returns the log file path when one was opened.
fn init_tracing(format: LogFormat, log_dir: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!(
                "tendril_run_{}.log",
                chrono::Local::now().format("%Y%m%d_%H%M")
            ));
            let file = std::fs::File::create(&path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(Arc::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    Ok(log_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let issue = match resolve_issue(&cli.issue) {
        Ok(issue) => issue,
        Err(message) => {
            eprintln!("error: {message}");
            std::process::exit(1);
        }
    };

    let log_path = init_tracing(cli.log_format, cli.log_dir.as_deref())?;
    if let Some(path) = &log_path {
        tracing::info!(path = %path.display(), "Logging to file");
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(repo_url) = cli.repo_url {
        config.github.repo_url = repo_url;
    }
    if let Some(include) = cli.include_commit_and_pr {
        config.workflow.include_commit_and_pr = include;
    }
    tracing::debug!(config = ?config, "Configuration loaded");

    let oracle = Arc::new(ClaudeClient::new(config.claude_api_key()?, &config.claude));
    let platform = Arc::new(GitHubPlatform::new(config.github_token())?);
    let runner = Arc::new(SystemRunner::new(config.workflow.process_timeout()));

    let mut engine = WorkflowEngine::new(
        oracle,
        platform,
        runner,
        WorkspaceManager::new(&config.workspace),
        RunSettings::from_config(&config),
    );

    tracing::info!(
        repo = %config.github.repo_url,
        include_commit_and_pr = config.workflow.include_commit_and_pr,
        "Starting workflow"
    );
    let final_state = engine
        .run(&issue, ProjectContext::new(config.github.repo_url.clone()))
        .await;

    let outcome = WorkflowOutcome::from_final_state(final_state.as_ref());
    tracing::info!(outcome = ?outcome, retries = engine.retries_used(), "Run complete");

    // A failed gate is a normal outcome; only an aborted run is an error
    if outcome == WorkflowOutcome::Failed {
        std::process::exit(1);
    }
    Ok(())
}
