pub mod claude;
pub mod prompt;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::Result;

pub use claude::ClaudeClient;

/// How the oracle should shape its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Plain text, usually a complete file.
    Default,
    /// A unified diff; anything that does not look like one becomes empty text.
    Patch,
}

#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub prompt: String,
    pub mode: GenerationMode,
    /// JSON schema for a structured reply.
    pub schema: Option<serde_json::Value>,
}

impl OracleRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            mode: GenerationMode::Default,
            schema: None,
        }
    }

    /// Ask for a unified diff instead of a whole file.
    pub fn patch(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            mode: GenerationMode::Patch,
            schema: None,
        }
    }

    pub fn structured(prompt: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            prompt: prompt.into(),
            mode: GenerationMode::Default,
            schema: Some(schema),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OracleReply {
    Text(String),
    Structured(serde_json::Value),
}

impl OracleReply {
    /// Text form of the reply; structured objects are rendered as JSON.
    pub fn into_text(self) -> String {
        match self {
            OracleReply::Text(text) => text,
            OracleReply::Structured(value) => value.to_string(),
        }
    }
}

/// The text/code generation service consulted by the workflow phases.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, request: &OracleRequest) -> Result<OracleReply>;
}

/// Convenience wrapper for plain-text generation.
pub async fn generate_text(oracle: &dyn Oracle, prompt: impl Into<String>) -> Result<String> {
    let reply = oracle.generate(&OracleRequest::text(prompt)).await?;
    Ok(reply.into_text())
}

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^```[A-Za-z0-9_+-]*[ \t]*$\n?|```\s*$").expect("FENCE_RE regex should compile")
});

/// Remove markdown code fences and surrounding whitespace from generated code.
pub fn strip_code_fences(raw: &str) -> String {
    FENCE_RE.replace_all(raw.trim(), "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_with_language() {
        let raw = "```python\ndef add(a, b):\n    return a + b\n```";
        assert_eq!(strip_code_fences(raw), "def add(a, b):\n    return a + b");
    }

    #[test]
    fn test_strip_fences_without_language() {
        let raw = "\n```\nconst x = 1;\n```\n";
        assert_eq!(strip_code_fences(raw), "const x = 1;");
    }

    #[test]
    fn test_strip_leaves_plain_code() {
        let raw = "  x = 1\n";
        assert_eq!(strip_code_fences(raw), "x = 1");
    }

    #[test]
    fn test_strip_fence_only_is_empty() {
        assert_eq!(strip_code_fences("```\n```"), "");
    }

    #[test]
    fn test_request_modes() {
        assert_eq!(OracleRequest::text("a").mode, GenerationMode::Default);
        let patch = OracleRequest::patch("fix it");
        assert_eq!(patch.mode, GenerationMode::Patch);
        assert!(patch.schema.is_none());
    }

    #[test]
    fn test_structured_into_text() {
        let reply = OracleReply::Structured(serde_json::json!({"a": 1}));
        assert_eq!(reply.into_text(), r#"{"a":1}"#);
    }
}
