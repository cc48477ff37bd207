//! Path conventions shared by the phases: test-file heuristics, the canonical
//! test directory and project language detection.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::workflow::state::WorkflowState;

/// Extensions the classifier and generators consider.
pub const RECOGNIZED_EXTENSIONS: &[&str] = &["py", "js", "ts", "tsx", "jsx", "json"];

const PREFERRED_TEST_DIR: &str = "tests";
const FALLBACK_TEST_DIR: &str = "test";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    TypeScript,
    JavaScript,
}

impl Language {
    pub fn display_name(self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::TypeScript => "TypeScript",
            Language::JavaScript => "JavaScript",
        }
    }

    fn from_tech(tech: &str) -> Option<Self> {
        let tech = tech.to_lowercase();
        if tech.contains("python") {
            Some(Language::Python)
        } else if tech.contains("typescript") || tech.contains("ts") {
            Some(Language::TypeScript)
        } else if tech.contains("javascript") || tech.contains("js") {
            Some(Language::JavaScript)
        } else {
            None
        }
    }

    fn from_extension(path: &str) -> Option<Self> {
        match extension_of(path).as_deref() {
            Some("py") => Some(Language::Python),
            Some("ts" | "tsx") => Some(Language::TypeScript),
            Some("js" | "jsx") => Some(Language::JavaScript),
            _ => None,
        }
    }

    /// Guess from well-known manifest files at the repository root.
    pub fn from_repo_markers(repo_root: &Path) -> Option<Self> {
        let has = |name: &str| repo_root.join(name).is_file();
        if has("pyproject.toml") || has("setup.py") || has("requirements.txt") {
            Some(Language::Python)
        } else if has("tsconfig.json") {
            Some(Language::TypeScript)
        } else if has("package.json") {
            Some(Language::JavaScript)
        } else {
            None
        }
    }
}

/// Language from the project context, else from the first relevant file with a
/// known extension, else from manifest files in `repo_root`, else Python.
pub fn detect_language(state: &WorkflowState, repo_root: &Path) -> Language {
    let from_context = state
        .project_context
        .as_ref()
        .and_then(|ctx| ctx.language.as_deref())
        .and_then(Language::from_tech);

    let from_files = || {
        state
            .plan
            .as_ref()
            .and_then(|plan| plan.relevant_files.iter().find_map(|f| Language::from_extension(f)))
    };

    from_context
        .or_else(from_files)
        .or_else(|| Language::from_repo_markers(repo_root))
        .unwrap_or(Language::Python)
}

/// Lowercased extension without the dot.
pub fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

fn file_stem_of(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Name-based test heuristic: the file name mentions "test" or "spec".
pub fn is_test_file(path: &str) -> bool {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.contains("test") || name.contains("spec")
}

/// Resolve the canonical test directory: `tests/` if present, else `test/`,
/// else create `tests/`. Returned relative to the repository root.
pub fn canonical_test_dir(repo_root: &Path) -> Result<PathBuf> {
    let preferred = repo_root.join(PREFERRED_TEST_DIR);
    if preferred.is_dir() {
        return Ok(PathBuf::from(PREFERRED_TEST_DIR));
    }
    if repo_root.join(FALLBACK_TEST_DIR).is_dir() {
        return Ok(PathBuf::from(FALLBACK_TEST_DIR));
    }

    std::fs::create_dir_all(&preferred).map_err(|e| {
        AppError::Workspace(format!("Failed to create {}: {e}", preferred.display()))
    })?;
    Ok(PathBuf::from(PREFERRED_TEST_DIR))
}

fn has_parent_dir(path: &str) -> bool {
    Path::new(path)
        .parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty() && parent != Path::new("."))
}

/// Home a bare test file name under the canonical test directory. Paths that
/// already name a directory are returned unchanged.
pub fn normalize_test_path(repo_root: &Path, path: &str) -> Result<String> {
    if has_parent_dir(path) {
        return Ok(path.to_string());
    }

    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::Workflow(format!("Invalid test file path: {path:?}")))?;

    let dir = canonical_test_dir(repo_root)?;
    Ok(format!("{}/{file_name}", dir.to_string_lossy()))
}

pub fn normalize_test_paths(repo_root: &Path, paths: &[String]) -> Result<Vec<String>> {
    paths
        .iter()
        .map(|p| {
            let normalized = normalize_test_path(repo_root, p)?;
            if &normalized != p {
                tracing::debug!(from = %p, to = %normalized, "Normalized test file path");
            }
            Ok(normalized)
        })
        .collect()
}

/// Test file name for a source file: `test_<stem>.py` for Python,
/// `<stem>.test.<ts|js>` otherwise.
pub fn synthesized_test_name(source_file: Option<&str>, language: Language) -> String {
    let Some(source) = source_file else {
        return match language {
            Language::Python => "test_generated.py".to_string(),
            _ => "generated.test.ts".to_string(),
        };
    };

    let stem = file_stem_of(source);
    let base = stem.strip_prefix("test_").unwrap_or(&stem);
    match language {
        Language::Python => format!("test_{base}.py"),
        Language::TypeScript => format!("{base}.test.ts"),
        Language::JavaScript => format!("{base}.test.js"),
    }
}
