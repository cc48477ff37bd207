use crate::workflow::paths::Language;

pub fn format_instruction_prompt(task: &str, context: &str) -> String {
    format!(
        r#"You are a senior software engineer.
Respond ONLY with valid, runnable code for the project's tech stack. Do NOT wrap the code in markdown fences. Do NOT include test functions, test cases, or usage examples unless explicitly requested. Ensure the code is idiomatic and follows best practices for the relevant language and tools.

Task:
{task}

Context:
{context}"#
    )
}

pub fn code_generation_task(language: Language) -> String {
    format!(
        r#"Implement the following GitHub issue in the {lang} source file provided.
- Output the full, valid code for the file (not just a section).
- Do NOT include markdown code fences in the response.
- Do NOT create or modify test functions, test cases, or usage examples unless explicitly requested.
- Maintain correctness and code quality according to the project's tech stack and tools.
"#,
        lang = language.display_name()
    )
}

pub fn test_generation_task(language: Language) -> String {
    format!(
        r#"Implement the following GitHub issue in the {lang} test file provided.
- Output the full, valid code for the test file (not just a section).
- Do NOT include markdown code fences in the response.
- Ensure the tests are idiomatic and follow best practices for the project's tech stack.
- Use only valid, working import statements that match the actual file/module structure of the project. Determine the correct import path based on the real file locations and names provided in the context. Do NOT use placeholder or non-existent module names such as 'your_project' or 'src' unless they are present in the project structure. If the source file is at the project root, import directly by filename (e.g., 'from validation import ...').
- Generate VERY FEW and SIMPLE, to-the-point test cases that directly check the main requirements. Avoid redundant or excessive tests; focus only on the core functionality described in the issue.
"#,
        lang = language.display_name()
    )
}

/// Context block for regenerating a source file.
pub fn code_generation_context(
    issue_text: &str,
    file_path: &str,
    file_content: &str,
    other_files: &[&str],
    last_errors: Option<&str>,
) -> String {
    let error_section = match last_errors {
        Some(errors) => format!(
            "ATTENTION: The following test or lint errors occurred in the last run. You MUST fix these errors in your next code update. Analyze the failed assertion or error message and update the code so that the test passes.\n\n{}\n",
            errors.trim()
        ),
        None => String::new(),
    };

    format!(
        "{error_section}GitHub Issue:\n{issue_text}\n\nSource File to update: {file_path}\nCurrent File Content:\n{file_content}\n\nOther relevant files for context (do not modify):\n{others}\nOnly make changes to the source file, use the context for reference.",
        others = format_file_list(other_files),
    )
}

/// Context block for regenerating a test file.
pub fn test_generation_context(
    issue_text: &str,
    file_path: &str,
    file_content: &str,
    other_files: &[&str],
    last_errors: Option<&str>,
) -> String {
    let error_section = match last_errors {
        Some(errors) => format!(
            "\n\n[Previous test/lint errors to fix:]\n{}\nRemove any failed test cases and keep only the passed ones. Regenerate only correct and minimal test cases.",
            errors.trim()
        ),
        None => String::new(),
    };

    format!(
        "GitHub Issue:\n{issue_text}\n\nTest File to update: {file_path}\nCurrent Test File Content:\n{file_content}\n\nOther relevant files for context (do not modify):\n{others}\nOnly make changes to the test file, use the context for reference.{error_section}",
        others = format_file_list(other_files),
    )
}

pub fn classification_prompt(issue_text: &str, candidate_files: &[String]) -> String {
    format!(
        r#"Given the following GitHub issue and a list of candidate files, choose ONLY the file(s) that are most relevant for addressing the issue. Respond in JSON with four keys: 'relevant_files' (all possibly relevant files to the issue query), 'source_files' (the main files which should be updated to fix the issue, should not include test files, ignore README.md), 'test_files' (test files relevant to the issue, including those that may not exist yet), and 'is_test_generation_issue' (true if the issue is about generating or updating tests, false if it is about code implementation or bugfix).

Respond ONLY with a valid JSON object, no explanation.

Issue:
{issue_text}

Candidate files:
{candidates}"#,
        candidates = candidate_files.join(", ")
    )
}

pub fn commit_message_prompt(issue_text: &str, file_summaries: &str) -> String {
    format!(
        "Generate a short, conventional Git commit message for the following changes.\nGitHub Issue:\n{issue_text}\n\nChanged files and content (truncated):\n{file_summaries}"
    )
}

pub fn patch_instruction(prompt: &str) -> String {
    format!(
        "You are an expert software engineer. Given the following problem statement, generate a unified diff (patch) in the standard format (starting with 'diff --git ...') that applies the fix. Do NOT include explanations, only the diff. If the fix cannot be expressed as a diff, return an empty string.\n\n{prompt}"
    )
}

fn format_file_list(files: &[&str]) -> String {
    if files.is_empty() {
        "(none)".to_string()
    } else {
        files
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
