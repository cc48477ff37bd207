//! Flatten issue bodies written in GitHub markdown into plain text for prompts.
//!
//! Underscore emphasis is deliberately left alone so identifiers such as
//! `__init__.py` or `test_utils.py` survive intact.

use std::sync::LazyLock;

use regex::Regex;

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("markdown regex should compile")
}

static HTML_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"(?s)<!--.*?-->"));
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"^\s{0,3}#{1,6}\s+"));
static QUOTE_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"^\s*(?:>\s?)+"));
static LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| regex(r"^\s*(?:[-*+]|\d+[.)])\s+(?:\[[ xX]\]\s+)?"));
static RULE_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"^\s*(?:-{3,}|\*{3,}|_{3,})\s*$"));
static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"!\[([^\]]*)\]\([^)]*\)"));
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"\[([^\]]+)\]\([^)]*\)"));
static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"`([^`]*)`"));
static STRONG_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"\*\*([^*]+)\*\*|~~([^~]+)~~"));

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn strip_line(line: &str) -> String {
    let line = HEADING_RE.replace(line, "");
    let line = QUOTE_RE.replace(&line, "");
    let line = LIST_RE.replace(&line, "");
    let line = IMAGE_RE.replace_all(&line, "$1");
    let line = LINK_RE.replace_all(&line, "$1");
    let line = INLINE_CODE_RE.replace_all(&line, "$1");
    let line = STRONG_RE.replace_all(&line, "$1$2");
    line.trim_end().to_string()
}

/// Markdown syntax removed, text and code content kept.
pub fn to_plain_text(markdown: &str) -> String {
    let without_comments = HTML_COMMENT_RE.replace_all(markdown, "");

    let mut lines: Vec<String> = Vec::new();
    for line in without_comments.lines() {
        if is_fence(line) || RULE_RE.is_match(line) {
            continue;
        }
        let stripped = strip_line(line);
        let previous_blank = lines.last().is_none_or(|l| l.is_empty());
        if stripped.is_empty() && previous_blank {
            continue;
        }
        lines.push(stripped);
    }

    lines.join("\n").trim().to_string()
}
