use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};

/// An external command: program plus arguments, no shell involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Build from an argv prefix (e.g. `["ruff", "check"]`) and extra arguments.
    pub fn from_argv(prefix: &[String], extra: &[&str]) -> Result<Self> {
        let (program, args) = prefix
            .split_first()
            .ok_or_else(|| AppError::Config("Empty command in toolchain configuration".to_string()))?;

        Ok(Self {
            program: program.clone(),
            args: args
                .iter()
                .cloned()
                .chain(extra.iter().map(|a| a.to_string()))
                .collect(),
        })
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// -1 when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external tools. A non-zero exit is a normal `Ok` result; `Err` means
/// the process could not be started (or did not finish in time).
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: &CommandSpec,
        cwd: &Path,
        env: &[(String, String)],
    ) -> Result<ProcessOutput>;
}

pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        cwd: &Path,
        env: &[(String, String)],
    ) -> Result<ProcessOutput> {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| {
                    AppError::Process(format!("`{command}` timed out after {}s", limit.as_secs()))
                })?,
            None => cmd.output().await,
        }
        .map_err(|e| AppError::Process(format!("Failed to start `{command}`: {e}")))?;

        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_from_argv_appends_extra() {
        let spec = CommandSpec::from_argv(&argv(&["ruff", "check"]), &["price_utils.py"]).unwrap();
        assert_eq!(spec.program, "ruff");
        assert_eq!(spec.args, vec!["check", "price_utils.py"]);
        assert_eq!(spec.to_string(), "ruff check price_utils.py");
    }

    #[test]
    fn test_from_argv_rejects_empty() {
        assert!(CommandSpec::from_argv(&[], &["x"]).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemRunner::new(None);
        let spec = CommandSpec::from_argv(
            &argv(&["sh", "-c", "echo out; echo err >&2; exit 3"]),
            &[],
        )
        .unwrap();

        let output = runner.run(&spec, dir.path(), &[]).await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_passes_env() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemRunner::new(None);
        let spec = CommandSpec::from_argv(&argv(&["sh", "-c", "printf %s \"$GREETING\""]), &[]).unwrap();

        let output = runner
            .run(&spec, dir.path(), &[("GREETING".to_string(), "hello".to_string())])
            .await
            .unwrap();
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemRunner::new(None);
        let spec = CommandSpec::from_argv(&argv(&["definitely-not-a-real-binary-xyz"]), &[]).unwrap();

        let err = runner.run(&spec, dir.path(), &[]).await.unwrap_err();
        assert!(matches!(err, AppError::Process(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemRunner::new(Some(Duration::from_millis(100)));
        let spec = CommandSpec::from_argv(&argv(&["sleep", "5"]), &[]).unwrap();

        let err = runner.run(&spec, dir.path(), &[]).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
