//! Candidate discovery and file classification for the planning phase.
//!
//! The regex/heuristic stage only proposes candidates; the oracle's answer is
//! taken verbatim whenever it parses.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use walkdir::{DirEntry, WalkDir};

use crate::oracle::{prompt, strip_code_fences, Oracle, OracleReply, OracleRequest};
use crate::workflow::paths::{is_test_file, RECOGNIZED_EXTENSIONS};
use crate::workflow::state::Plan;

static MENTIONED_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_\-/\\]+\.(?:py|jsx|js|tsx|ts|json)\b")
        .expect("MENTIONED_FILE_RE regex should compile")
});

/// Directories never worth scanning for candidates.
const SKIPPED_DIRS: &[&str] = &["node_modules", "__pycache__", "venv"];

#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub mentioned_files: BTreeSet<String>,
    pub repo_files: BTreeSet<String>,
    pub relevant_test_files: BTreeSet<String>,
    /// Sorted; every repo file when nothing more specific was found.
    pub candidate_files: Vec<String>,
}

/// Path-like tokens with a recognized extension, backslashes turned into `/`.
pub fn mentioned_files(issue_text: &str) -> BTreeSet<String> {
    MENTIONED_FILE_RE
        .find_iter(issue_text)
        .map(|m| m.as_str().replace('\\', "/"))
        .collect()
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

/// Repository-relative paths (with `/` separators) of files with a recognized extension.
pub fn repo_files(repo_root: &Path) -> BTreeSet<String> {
    WalkDir::new(repo_root)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| RECOGNIZED_EXTENSIONS.contains(&ext.to_string_lossy().as_ref()))
        })
        .filter_map(|e| {
            e.path()
                .strip_prefix(repo_root)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect()
}

/// Test-looking repository files whose name contains the stem of a mentioned file.
pub fn relevant_test_files(
    mentioned: &BTreeSet<String>,
    repo_files: &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for mentioned_file in mentioned {
        let base = Path::new(mentioned_file)
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if base.is_empty() {
            continue;
        }

        for repo_file in repo_files {
            let name = Path::new(repo_file)
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if is_test_file(repo_file) && name.contains(&base) {
                tracing::debug!(test_file = %repo_file, base = %base, "Found relevant test file");
                found.insert(repo_file.clone());
            }
        }
    }
    found
}

pub fn discover_candidates(issue_text: &str, repo_root: &Path) -> Candidates {
    let mentioned_files = mentioned_files(issue_text);
    let repo_files = repo_files(repo_root);
    let relevant_test_files = relevant_test_files(&mentioned_files, &repo_files);

    let mut candidate_files: Vec<String> = mentioned_files
        .union(&relevant_test_files)
        .cloned()
        .collect();

    if candidate_files.is_empty() {
        tracing::info!("No candidate files found, using all repo files");
        candidate_files = repo_files.iter().cloned().collect();
    }

    Candidates {
        mentioned_files,
        repo_files,
        relevant_test_files,
        candidate_files,
    }
}

pub fn plan_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "relevant_files": {
                "type": "array",
                "items": { "type": "string" },
                "description": "List of all possibly relevant files to the GitHub issue."
            },
            "source_files": {
                "type": "array",
                "items": { "type": "string" },
                "description": "List of the main files which should be updated to fix the issue."
            },
            "test_files": {
                "type": "array",
                "items": { "type": "string" },
                "description": "List of test files relevant to the GitHub issue."
            },
            "is_test_generation_issue": {
                "type": "boolean",
                "description": "True if the issue is about generating or updating tests, false if it is about code implementation or bugfix."
            }
        },
        "required": ["relevant_files", "source_files", "test_files", "is_test_generation_issue"]
    })
}

/// Plan used when the oracle's classification cannot be used.
pub fn fallback_plan(candidate_files: &[String]) -> Plan {
    Plan {
        relevant_files: candidate_files.to_vec(),
        source_files: candidate_files.to_vec(),
        test_files: Vec::new(),
        is_test_generation_issue: false,
    }
}

fn parse_reply(reply: OracleReply, candidate_files: &[String]) -> Result<Plan, String> {
    match reply {
        OracleReply::Structured(value) => serde_json::from_value(value).map_err(|e| e.to_string()),
        OracleReply::Text(text) => {
            let text = strip_code_fences(&text);
            if text.is_empty() {
                return Ok(fallback_plan(candidate_files));
            }
            serde_json::from_str(&text).map_err(|e| e.to_string())
        }
    }
}

/// Ask the oracle to classify `candidate_files`. Never fails: any error or
/// unparsable reply degrades to [`fallback_plan`].
pub async fn classify(oracle: &dyn Oracle, issue_text: &str, candidate_files: &[String]) -> Plan {
    let request = OracleRequest::structured(
        prompt::classification_prompt(issue_text, candidate_files),
        plan_schema(),
    );

    let reply = match oracle.generate(&request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "File classification call failed, using candidates");
            return fallback_plan(candidate_files);
        }
    };

    match parse_reply(reply, candidate_files) {
        Ok(plan) => {
            tracing::info!(
                relevant = ?plan.relevant_files,
                source = ?plan.source_files,
                test = ?plan.test_files,
                is_test_generation_issue = plan.is_test_generation_issue,
                "Oracle classified files"
            );
            plan
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse classification output, using candidates");
            fallback_plan(candidate_files)
        }
    }
}
