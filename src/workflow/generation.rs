//! Code and test generation phases.
//!
//! Both regenerate files one at a time: read the current content, ask the
//! oracle for a replacement (or a diff, in patch mode) and write it back when
//! the reply is usable. An unusable reply leaves the file untouched but the
//! path is still recorded as updated. Paths outside the working copy are
//! never written or recorded.

use std::path::Path;

use crate::config::EditMode;
use crate::error::{AppError, Result};
use crate::oracle::{generate_text, prompt, strip_code_fences, OracleRequest};
use crate::workflow::context::PhaseContext;
use crate::workflow::paths::{self, Language};
use crate::workflow::state::WorkflowState;
use crate::workspace::{git, WorkspaceManager};

/// The main-code-generation phase. A test-generation issue always regenerates
/// tests; otherwise source files are regenerated when the plan names any.
pub async fn run(ctx: &PhaseContext<'_>, state: &mut WorkflowState) -> Result<()> {
    let plan = state.plan();
    if plan.is_test_generation_issue {
        tracing::info!("Issue asks for tests, running test generation");
        generate_tests(ctx, state).await
    } else if !plan.source_files.is_empty() {
        generate_code(ctx, state).await
    } else {
        tracing::warn!("Plan has no source files, nothing to generate");
        Ok(())
    }
}

/// Regenerate every planned source file.
pub async fn generate_code(ctx: &PhaseContext<'_>, state: &mut WorkflowState) -> Result<()> {
    if state.issue_text.trim().is_empty() {
        tracing::error!("No issue text, skipping code generation");
        return Ok(());
    }
    let root = ctx.repo_root(state)?;
    let plan = state.plan();
    let language = detect(state, &root);

    if let Some(errors) = &state.last_errors {
        tracing::info!(errors = %errors, "Regenerating with errors from the previous run");
    }

    let task = prompt::code_generation_task(language);
    let mut accepted = Vec::new();
    for file in &plan.source_files {
        let others = other_files(&plan.relevant_files, file);
        let in_workspace = regenerate_file(ctx, &root, file, |content| {
            let context = prompt::code_generation_context(
                &state.issue_text,
                file,
                content,
                &others,
                state.last_errors.as_deref(),
            );
            prompt::format_instruction_prompt(&task, &context)
        })
        .await;
        if in_workspace {
            accepted.push(file.clone());
        }
    }

    state.record_updated_files(&accepted);
    Ok(())
}

/// Regenerate every planned test file, synthesizing one when the plan has none.
pub async fn generate_tests(ctx: &PhaseContext<'_>, state: &mut WorkflowState) -> Result<()> {
    let root = ctx.repo_root(state)?;
    let language = detect(state, &root);
    let mut plan = state.plan();
    let mut created_file = None;

    if plan.test_files.is_empty() {
        let name = paths::synthesized_test_name(plan.source_files.first().map(String::as_str), language);
        let path = paths::normalize_test_path(&root, &name)?;
        touch(&root, &path).await?;
        tracing::info!(file = %path, "Created test file");
        plan.test_files = vec![path.clone()];
        created_file = Some(path);
    }
    plan.test_files = paths::normalize_test_paths(&root, &plan.test_files)?;
    state.plan = Some(plan.clone());

    if let Some(errors) = &state.last_errors {
        tracing::info!(errors = %errors, "Regenerating tests with errors from the previous run");
    }

    let task = prompt::test_generation_task(language);
    let mut accepted = Vec::new();
    for file in &plan.test_files {
        let others = other_files(&plan.relevant_files, file);
        let in_workspace = regenerate_file(ctx, &root, file, |content| {
            let context = prompt::test_generation_context(
                &state.issue_text,
                file,
                content,
                &others,
                state.last_errors.as_deref(),
            );
            prompt::format_instruction_prompt(&task, &context)
        })
        .await;
        if in_workspace {
            accepted.push(file.clone());
        }
    }

    state.record_updated_files(&accepted);
    if let Some(created) = created_file {
        if let Some(changes) = state.code_changes.as_mut() {
            changes.created_file = Some(created);
        }
    }
    Ok(())
}

fn detect(state: &WorkflowState, root: &Path) -> Language {
    let language = paths::detect_language(state, root);
    tracing::debug!(language = language.display_name(), "Detected project language");
    language
}

fn other_files<'a>(relevant_files: &'a [String], current: &str) -> Vec<&'a str> {
    relevant_files
        .iter()
        .map(String::as_str)
        .filter(|f| *f != current)
        .collect()
}

/// Create `rel` if missing without touching existing content.
async fn touch(root: &Path, rel: &str) -> Result<()> {
    let full_path = WorkspaceManager::verify_path(root, Path::new(rel))?;
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&full_path)
        .await
        .map_err(|e| AppError::Workspace(format!("Failed to create {rel}: {e}")))?;
    Ok(())
}

/// Regenerate one file. Returns false when the path lies outside the working
/// copy; any other failure is logged and leaves the file as it was.
async fn regenerate_file<F>(ctx: &PhaseContext<'_>, root: &Path, file: &str, build_prompt: F) -> bool
where
    F: FnOnce(&str) -> String,
{
    let full_path = match WorkspaceManager::verify_path(root, Path::new(file)) {
        Ok(path) => path,
        Err(e) => {
            tracing::error!(file = %file, error = %e, "Refusing to write file");
            return false;
        }
    };

    let content = match tokio::fs::read_to_string(&full_path).await {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(file = %file, error = %e, "Could not read file, generating from scratch");
            String::new()
        }
    };

    let request = build_prompt(&content);
    match ctx.settings.edit_mode {
        EditMode::WholeFile => replace_file(ctx, &full_path, file, request).await,
        EditMode::Patch => patch_file(ctx, root, file, request).await,
    }
    true
}

async fn replace_file(ctx: &PhaseContext<'_>, full_path: &Path, file: &str, request: String) {
    let reply = match generate_text(ctx.oracle, request).await {
        Ok(reply) => strip_code_fences(&reply),
        Err(e) => {
            tracing::error!(file = %file, error = %e, "Generation failed, leaving file unchanged");
            return;
        }
    };

    if reply.is_empty() {
        tracing::warn!(file = %file, "Oracle returned empty content, leaving file unchanged");
        return;
    }

    match tokio::fs::write(full_path, format!("{}\n", reply.trim_end())).await {
        Ok(()) => tracing::info!(file = %file, "Updated file"),
        Err(e) => tracing::error!(file = %file, error = %e, "Failed to write file"),
    }
}

async fn patch_file(ctx: &PhaseContext<'_>, root: &Path, file: &str, request: String) {
    let patch = match ctx.oracle.generate(&OracleRequest::patch(request)).await {
        Ok(reply) => reply.into_text(),
        Err(e) => {
            tracing::error!(file = %file, error = %e, "Generation failed, leaving file unchanged");
            return;
        }
    };

    if patch.trim().is_empty() {
        tracing::warn!(file = %file, "Oracle returned no diff, leaving file unchanged");
        return;
    }

    match git::apply_patch(root, &patch, Path::new(file)).await {
        Ok(()) => tracing::info!(file = %file, "Applied patch"),
        Err(e) => tracing::error!(file = %file, error = %e, "Failed to apply patch, leaving file unchanged"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{GenerationMode, OracleReply};
    use crate::workflow::state::Plan;
    use crate::workflow::testing::{state_with_plan, strings, FnOracle, Harness, ScriptedRunner};

    fn text(reply: &str) -> FnOracle {
        let reply = reply.to_string();
        FnOracle::new(move |_| Ok(OracleReply::Text(reply.clone())))
    }

    #[tokio::test]
    async fn test_generate_code_rewrites_source_files() {
        let h = Harness::new(
            text("```python\ndef round_price(x):\n    return round(x, 2)\n```"),
            ScriptedRunner::always_ok(),
        );
        h.write("price_utils.py", "def round_price(x):\n    return x\n");
        let mut state = state_with_plan(
            "Fix rounding in price_utils.py",
            Plan {
                relevant_files: strings(&["price_utils.py", "tests/test_price_utils.py"]),
                source_files: strings(&["price_utils.py"]),
                test_files: strings(&["tests/test_price_utils.py"]),
                is_test_generation_issue: false,
            },
        );

        run(&h.ctx(), &mut state).await.unwrap();

        assert_eq!(h.read("price_utils.py"), "def round_price(x):\n    return round(x, 2)\n");
        let changes = state.code_changes.unwrap();
        assert_eq!(changes.changed_files(), vec!["price_utils.py"]);
        assert_eq!(changes.created_file, None);

        let prompts = h.oracle.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("def round_price(x):\n    return x"));
        assert!(prompts[0].contains("- tests/test_price_utils.py"));
        assert!(!prompts[0].contains("ATTENTION"));
    }

    #[tokio::test]
    async fn test_previous_errors_reach_the_prompt() {
        let h = Harness::new(text("x = 2"), ScriptedRunner::always_ok());
        h.write("app.py", "x = 1\n");
        let mut state = state_with_plan(
            "Set x to 2 in app.py",
            Plan {
                relevant_files: strings(&["app.py"]),
                source_files: strings(&["app.py"]),
                ..Default::default()
            },
        );
        state.last_errors = Some("Test failure in tests/test_app.py:\nassert 1 == 2".to_string());

        generate_code(&h.ctx(), &mut state).await.unwrap();

        let prompts = h.oracle.prompts();
        assert!(prompts[0].contains("ATTENTION:"));
        assert!(prompts[0].contains("assert 1 == 2"));
    }

    #[tokio::test]
    async fn test_empty_reply_leaves_file_but_records_it() {
        let h = Harness::new(text("```\n```"), ScriptedRunner::always_ok());
        h.write("app.py", "x = 1\n");
        let mut state = state_with_plan(
            "Change app.py",
            Plan {
                relevant_files: strings(&["app.py"]),
                source_files: strings(&["app.py"]),
                ..Default::default()
            },
        );

        generate_code(&h.ctx(), &mut state).await.unwrap();

        assert_eq!(h.read("app.py"), "x = 1\n");
        assert!(state.code_changes.unwrap().updated_files.contains("app.py"));
    }

    #[tokio::test]
    async fn test_oracle_error_is_not_fatal() {
        let h = Harness::new(
            FnOracle::new(|_| Err(AppError::OracleRateLimited("429".to_string()))),
            ScriptedRunner::always_ok(),
        );
        h.write("app.py", "x = 1\n");
        let mut state = state_with_plan(
            "Change app.py",
            Plan {
                source_files: strings(&["app.py"]),
                ..Default::default()
            },
        );

        generate_code(&h.ctx(), &mut state).await.unwrap();
        assert_eq!(h.read("app.py"), "x = 1\n");
    }

    #[tokio::test]
    async fn test_test_generation_synthesizes_missing_test_file() {
        let h = Harness::new(
            text("from temperature import to_celsius\n\ndef test_freezing():\n    assert to_celsius(32) == 0\n"),
            ScriptedRunner::always_ok(),
        );
        h.write("temperature.py", "def to_celsius(f):\n    return (f - 32) * 5 / 9\n");
        let mut state = state_with_plan(
            "Add tests for temperature.py",
            Plan {
                relevant_files: strings(&["temperature.py"]),
                source_files: strings(&["temperature.py"]),
                test_files: Vec::new(),
                is_test_generation_issue: true,
            },
        );

        run(&h.ctx(), &mut state).await.unwrap();

        assert!(h.read("tests/test_temperature.py").contains("def test_freezing"));
        assert_eq!(state.plan().test_files, vec!["tests/test_temperature.py"]);
        let changes = state.code_changes.unwrap();
        assert_eq!(changes.created_file.as_deref(), Some("tests/test_temperature.py"));
        assert_eq!(changes.changed_files(), vec!["tests/test_temperature.py"]);
        // Test generation leaves source files alone
        assert_eq!(h.read("temperature.py"), "def to_celsius(f):\n    return (f - 32) * 5 / 9\n");
    }

    #[tokio::test]
    async fn test_test_generation_normalizes_bare_names() {
        let h = Harness::new(text("def test_ok():\n    assert True"), ScriptedRunner::always_ok());
        h.write("test/.keep", "");
        let mut state = state_with_plan(
            "Add validation tests",
            Plan {
                relevant_files: strings(&["validation.py"]),
                test_files: strings(&["test_validation.py"]),
                is_test_generation_issue: true,
                ..Default::default()
            },
        );

        generate_tests(&h.ctx(), &mut state).await.unwrap();

        assert_eq!(h.read("test/test_validation.py"), "def test_ok():\n    assert True\n");
        assert_eq!(state.plan().test_files, vec!["test/test_validation.py"]);
        assert_eq!(state.code_changes.unwrap().created_file, None);
    }

    #[tokio::test]
    async fn test_paths_outside_workspace_are_skipped_and_not_recorded() {
        let h = Harness::new(text("x = 2"), ScriptedRunner::always_ok());
        h.write("app.py", "x = 1\n");
        let secret = h.base.path().join("secret.py");
        std::fs::write(&secret, "TOKEN = 'abc'\n").unwrap();
        let mut state = state_with_plan(
            "Change app.py",
            Plan {
                relevant_files: strings(&["app.py"]),
                source_files: vec![
                    secret.to_string_lossy().into_owned(),
                    "../escape.py".to_string(),
                    "app.py".to_string(),
                ],
                ..Default::default()
            },
        );

        generate_code(&h.ctx(), &mut state).await.unwrap();

        assert_eq!(h.read("app.py"), "x = 2\n");
        assert_eq!(std::fs::read_to_string(&secret).unwrap(), "TOKEN = 'abc'\n");
        assert!(!h.base.path().join("escape.py").exists());
        assert_eq!(h.oracle.prompts().len(), 1);
        assert_eq!(state.code_changes.unwrap().changed_files(), vec!["app.py"]);
    }

    #[tokio::test]
    async fn test_synthesized_test_file_exists_before_generation() {
        let mut h = Harness::new(text(""), ScriptedRunner::always_ok());
        h.write("temperature.py", "def to_celsius(f):\n    return (f - 32) * 5 / 9\n");
        h.write("tests/__init__.py", "");
        let expected = h.repo_root().join("tests/test_temperature.py");
        h.oracle = FnOracle::new(move |_| {
            assert_eq!(std::fs::read_to_string(&expected).unwrap(), "");
            Ok(OracleReply::Text("def test_boiling():\n    assert True".to_string()))
        });
        let mut state = state_with_plan(
            "Add tests for temperature.py",
            Plan {
                relevant_files: strings(&["temperature.py"]),
                source_files: strings(&["temperature.py"]),
                test_files: Vec::new(),
                is_test_generation_issue: false,
            },
        );

        generate_tests(&h.ctx(), &mut state).await.unwrap();

        assert_eq!(h.oracle.prompts().len(), 1);
        assert_eq!(state.plan().test_files, vec!["tests/test_temperature.py"]);
        assert_eq!(h.read("tests/test_temperature.py"), "def test_boiling():\n    assert True\n");
    }

    #[tokio::test]
    async fn test_patch_mode_applies_diff() {
        let mut h = Harness::new(
            FnOracle::new(|request| {
                assert_eq!(request.mode, GenerationMode::Patch);
                Ok(OracleReply::Text(
                    "diff --git a/app.py b/app.py\n--- a/app.py\n+++ b/app.py\n@@ -1 +1 @@\n-x = 1\n+x = 2\n"
                        .to_string(),
                ))
            }),
            ScriptedRunner::always_ok(),
        );
        h.settings.edit_mode = EditMode::Patch;
        h.write("app.py", "x = 1\n");
        h.commit_all();
        let mut state = state_with_plan(
            "Set x to 2 in app.py",
            Plan {
                relevant_files: strings(&["app.py"]),
                source_files: strings(&["app.py"]),
                ..Default::default()
            },
        );

        generate_code(&h.ctx(), &mut state).await.unwrap();

        assert_eq!(h.read("app.py"), "x = 2\n");
        assert_eq!(state.code_changes.unwrap().changed_files(), vec!["app.py"]);
    }

    #[tokio::test]
    async fn test_patch_mode_rejects_diff_for_other_file() {
        let mut h = Harness::new(
            FnOracle::new(|_| {
                Ok(OracleReply::Text(
                    "diff --git a/setup.py b/setup.py\n--- a/setup.py\n+++ b/setup.py\n@@ -1 +1 @@\n-y = 1\n+y = 2\n"
                        .to_string(),
                ))
            }),
            ScriptedRunner::always_ok(),
        );
        h.settings.edit_mode = EditMode::Patch;
        h.write("app.py", "x = 1\n");
        h.write("setup.py", "y = 1\n");
        h.commit_all();
        let mut state = state_with_plan(
            "Set x to 2 in app.py",
            Plan {
                source_files: strings(&["app.py"]),
                ..Default::default()
            },
        );

        generate_code(&h.ctx(), &mut state).await.unwrap();

        assert_eq!(h.read("setup.py"), "y = 1\n");
        assert_eq!(h.read("app.py"), "x = 1\n");
    }

    #[tokio::test]
    async fn test_nothing_to_generate() {
        let h = Harness::new(
            FnOracle::new(|_| unreachable!("no oracle calls expected")),
            ScriptedRunner::always_ok(),
        );
        let mut state = state_with_plan("Tidy up", Plan::default());

        run(&h.ctx(), &mut state).await.unwrap();
        assert!(state.code_changes.is_none());
    }
}
