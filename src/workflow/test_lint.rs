//! Test-and-lint phase: run the project's tests and linter and turn failures
//! into error text for the next generation attempt.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Result;
use crate::process::{CommandSpec, ProcessOutput};
use crate::workflow::context::PhaseContext;
use crate::workflow::generation;
use crate::workflow::paths::{extension_of, is_test_file};
use crate::workflow::state::{LintResults, TestResults, WorkflowState};
use crate::workspace::WorkspaceManager;

static MISSING_MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ModuleNotFoundError: No module named '([^']+)'")
        .expect("MISSING_MODULE_RE regex should compile")
});

const NO_TESTS_COLLECTED: &str = "no tests ran";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestKind {
    Python,
    JavaScript,
}

impl TestKind {
    fn for_path(path: &str) -> Option<Self> {
        match extension_of(path).as_deref() {
            Some("py") => Some(TestKind::Python),
            Some("js" | "jsx" | "ts" | "tsx") => Some(TestKind::JavaScript),
            _ => None,
        }
    }
}

/// Accumulated outcome of one phase run.
#[derive(Debug)]
struct CheckReport {
    test_outputs: BTreeMap<String, String>,
    lint_outputs: BTreeMap<String, String>,
    test_errors: Vec<String>,
    lint_errors: Vec<String>,
    tests_passed: bool,
    lint_passed: bool,
}

impl Default for CheckReport {
    fn default() -> Self {
        Self {
            test_outputs: BTreeMap::new(),
            lint_outputs: BTreeMap::new(),
            test_errors: Vec::new(),
            lint_errors: Vec::new(),
            tests_passed: true,
            lint_passed: true,
        }
    }
}

impl CheckReport {
    fn no_tests_collected(&self) -> bool {
        self.test_outputs
            .values()
            .any(|out| out.to_lowercase().contains(NO_TESTS_COLLECTED))
    }

    fn apply(mut self, state: &mut WorkflowState) {
        if self.no_tests_collected() {
            tracing::info!("No tests were collected, treating tests as passed");
            self.tests_passed = true;
            self.test_errors.clear();
        }

        let errors: Vec<String> = self.test_errors.into_iter().chain(self.lint_errors).collect();

        state.passed = Some(self.tests_passed && self.lint_passed);
        state.last_errors = (!errors.is_empty()).then(|| errors.join("\n\n"));
        state.test_results = Some(TestResults {
            test_outputs: self.test_outputs,
            tests_passed: self.tests_passed,
        });
        state.lint_results = Some(LintResults {
            lint_outputs: self.lint_outputs,
            lint_passed: self.lint_passed,
        });
    }
}

pub async fn run(ctx: &PhaseContext<'_>, state: &mut WorkflowState) -> Result<()> {
    if state.plan().relevant_files.is_empty() {
        tracing::warn!("No relevant files, skipping tests and lint");
        state.test_results = None;
        state.lint_results = None;
        state.passed = None;
        state.last_errors = None;
        return Ok(());
    }

    let root = ctx.repo_root(state)?;
    let test_files = resolve_test_files(ctx, state, &root).await?;
    let mut report = CheckReport::default();

    if test_files.is_empty() {
        tracing::info!("No test files found after all fallbacks, tests pass by default");
    }
    for file in &test_files {
        run_test_file(ctx, &root, file, &mut report).await;
    }

    for file in lint_targets(&state.plan().relevant_files) {
        run_lint(ctx, &root, &file, &mut report).await;
    }

    report.apply(state);
    tracing::info!(
        tests_passed = ?state.tests_passed(),
        passed = ?state.passed,
        "Tests and lint finished"
    );
    Ok(())
}

/// Files that exist inside the working copy.
fn existing(root: &Path, files: &[String]) -> Vec<String> {
    files
        .iter()
        .filter(|f| WorkspaceManager::resolve_existing(root, Path::new(f)).is_ok_and(|p| p.is_file()))
        .cloned()
        .collect()
}

/// Planned test files on disk, else test-looking relevant files on disk, else
/// whatever test generation manages to produce.
async fn resolve_test_files(
    ctx: &PhaseContext<'_>,
    state: &mut WorkflowState,
    root: &Path,
) -> Result<Vec<String>> {
    let plan = state.plan();

    let planned = existing(root, &plan.test_files);
    if !planned.is_empty() {
        return Ok(planned);
    }

    tracing::info!("No planned test files exist, checking relevant files");
    let test_like: Vec<String> = plan
        .relevant_files
        .iter()
        .filter(|f| is_test_file(f))
        .cloned()
        .collect();
    let relevant = existing(root, &test_like);
    if !relevant.is_empty() {
        return Ok(relevant);
    }

    tracing::info!("No test files found, generating tests");
    generation::generate_tests(ctx, state).await?;
    Ok(existing(root, &state.plan().test_files))
}

/// Relevant Python sources that are not tests, in plan order.
fn lint_targets(relevant_files: &[String]) -> Vec<String> {
    relevant_files
        .iter()
        .filter(|f| extension_of(f).as_deref() == Some("py") && !is_test_file(f))
        .cloned()
        .collect()
}

fn python_path(root: &Path) -> String {
    match std::env::var_os("PYTHONPATH").filter(|p| !p.is_empty()) {
        Some(existing) => {
            let mut parts = vec![root.as_os_str().to_os_string()];
            parts.extend(std::env::split_paths(&existing).map(|p| p.into_os_string()));
            std::env::join_paths(parts)
                .map(|joined| joined.to_string_lossy().into_owned())
                .unwrap_or_else(|_| root.to_string_lossy().into_owned())
        }
        None => root.to_string_lossy().into_owned(),
    }
}

/// Projects configured with `--doctest-rst` addopts must be run as a whole.
fn pyproject_forces_full_run(root: &Path) -> bool {
    std::fs::read_to_string(root.join("pyproject.toml"))
        .map(|content| content.contains("addopts") && content.contains("--doctest-rst"))
        .unwrap_or(false)
}

fn test_command(
    ctx: &PhaseContext<'_>,
    root: &Path,
    kind: TestKind,
    file: &str,
) -> Result<(CommandSpec, Vec<(String, String)>)> {
    let toolchain = &ctx.settings.toolchain;
    match kind {
        TestKind::Python => {
            let command = if pyproject_forces_full_run(root) {
                CommandSpec::from_argv(&toolchain.python_test, &[])?
            } else {
                CommandSpec::from_argv(&toolchain.python_test, &[file])?
            };
            Ok((command, vec![("PYTHONPATH".to_string(), python_path(root))]))
        }
        TestKind::JavaScript => Ok((CommandSpec::from_argv(&toolchain.javascript_test, &[])?, Vec::new())),
    }
}

/// Modules reported missing anywhere in the output. pytest prints collection
/// errors on stdout, a bare interpreter on stderr.
fn missing_modules(out: &ProcessOutput) -> BTreeSet<String> {
    MISSING_MODULE_RE
        .captures_iter(&out.stdout)
        .chain(MISSING_MODULE_RE.captures_iter(&out.stderr))
        .map(|caps| caps[1].to_string())
        .collect()
}

async fn install_modules(ctx: &PhaseContext<'_>, root: &Path, modules: &BTreeSet<String>) {
    for module in modules {
        let command = match CommandSpec::from_argv(&ctx.settings.toolchain.dependency_install, &[module.as_str()]) {
            Ok(command) => command,
            Err(e) => {
                tracing::error!(error = %e, "Cannot build install command");
                return;
            }
        };

        tracing::info!(module = %module, command = %command, "Installing missing module");
        match ctx.runner.run(&command, root, &[]).await {
            Ok(out) if out.success() => tracing::info!(module = %module, "Installed module"),
            Ok(out) => tracing::error!(module = %module, stderr = %out.stderr, "Module install failed"),
            Err(e) => tracing::error!(module = %module, error = %e, "Module install failed"),
        }
    }
}

fn format_output(out: &ProcessOutput) -> String {
    format!("{}\n{}", out.stdout, out.stderr)
}

/// Keep the last `max_chars` characters, marking the cut.
fn truncate_tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - max_chars).collect();
    format!("...(truncated)\n{tail}")
}

async fn run_test_file(ctx: &PhaseContext<'_>, root: &Path, file: &str, report: &mut CheckReport) {
    let Some(kind) = TestKind::for_path(file) else {
        tracing::debug!(file = %file, "No test runner for file type, skipping");
        return;
    };

    let (command, env) = match test_command(ctx, root, kind, file) {
        Ok(built) => built,
        Err(e) => {
            report.tests_passed = false;
            report.test_outputs.insert(file.to_string(), format!("Test error: {e}"));
            report.test_errors.push(format!("Test error in {file}: {e}"));
            return;
        }
    };

    tracing::info!(file = %file, command = %command, "Running tests");
    let mut result = ctx.runner.run(&command, root, &env).await;

    if kind == TestKind::Python {
        if let Ok(out) = &result {
            let modules = missing_modules(out);
            if !out.success() && !modules.is_empty() {
                install_modules(ctx, root, &modules).await;
                tracing::info!(file = %file, "Re-running tests after installing modules");
                result = ctx.runner.run(&command, root, &env).await;
            }
        }
        if let Ok(out) = &result {
            if out.stderr.contains("ImportError") && out.stderr.contains("extension") {
                tracing::info!(
                    file = %file,
                    "Import of a C extension failed; the project may need to be built in place first"
                );
            }
        }
    }

    let limit = ctx.settings.max_error_output_chars;
    match result {
        Ok(out) => {
            report.test_outputs.insert(file.to_string(), format_output(&out));
            if !out.success() {
                tracing::error!(file = %file, exit_code = out.exit_code, "Tests failed");
                report.tests_passed = false;
                report.test_errors.push(format!(
                    "Test failure in {file}:\n{}\n{}",
                    truncate_tail(&out.stdout, limit),
                    truncate_tail(&out.stderr, limit)
                ));
            }
        }
        Err(e) => {
            tracing::error!(file = %file, error = %e, "Could not run tests");
            report.tests_passed = false;
            report.test_outputs.insert(file.to_string(), format!("Test error: {e}"));
            report.test_errors.push(format!("Test error in {file}: {e}"));
        }
    }
}

async fn run_lint(ctx: &PhaseContext<'_>, root: &Path, file: &str, report: &mut CheckReport) {
    let limit = ctx.settings.max_error_output_chars;
    let result = match CommandSpec::from_argv(&ctx.settings.toolchain.lint, &[file]) {
        Ok(command) => {
            tracing::info!(file = %file, command = %command, "Running lint");
            ctx.runner.run(&command, root, &[]).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(out) => {
            report.lint_outputs.insert(file.to_string(), format_output(&out));
            if !out.success() {
                tracing::warn!(file = %file, exit_code = out.exit_code, "Lint failed");
                report.lint_passed = false;
                report.lint_errors.push(format!(
                    "Lint failure in {file}: Exit code {}\n{}",
                    out.exit_code,
                    truncate_tail(&out.stdout, limit)
                ));
            }
        }
        Err(e) => {
            tracing::error!(file = %file, error = %e, "Could not run lint");
            report.lint_passed = false;
            report.lint_outputs.insert(file.to_string(), format!("Lint error: {e}"));
            report.lint_errors.push(format!("Lint error in {file}: {e}"));
        }
    }
}
