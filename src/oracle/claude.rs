use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::ClaudeConfig;
use crate::error::{AppError, Result};
use crate::oracle::{GenerationMode, Oracle, OracleReply, OracleRequest};

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Name of the tool Claude is forced to call when a structured reply is requested.
const STRUCTURED_TOOL_NAME: &str = "submit_result";

pub struct ClaudeClient {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ClaudeClient {
    pub fn new(api_key: &str, config: &ClaudeConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub async fn send_message(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        let response = self
            .client
            .post(CLAUDE_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, body));
        }

        let body = response.json::<MessagesResponse>().await?;
        Ok(body)
    }

    fn request_for(&self, prompt: String, schema: Option<&serde_json::Value>) -> MessagesRequest {
        let (tools, tool_choice) = match schema {
            Some(schema) => (
                vec![ToolDefinition {
                    name: STRUCTURED_TOOL_NAME.to_string(),
                    description: "Submit the requested result as a structured object.".to_string(),
                    input_schema: schema.clone(),
                }],
                Some(ToolChoice {
                    kind: "tool".to_string(),
                    name: STRUCTURED_TOOL_NAME.to_string(),
                }),
            ),
            None => (Vec::new(), None),
        };

        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
            tools,
            tool_choice,
        }
    }
}

fn classify_failure(status: StatusCode, body: String) -> AppError {
    let message = format!("API returned {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS {
        AppError::OracleRateLimited(message)
    } else if status.is_server_error() || status.as_u16() == 529 {
        AppError::OracleTransient(message)
    } else {
        AppError::Oracle(message)
    }
}

#[async_trait]
impl Oracle for ClaudeClient {
    async fn generate(&self, request: &OracleRequest) -> Result<OracleReply> {
        let prompt = match request.mode {
            GenerationMode::Default => request.prompt.clone(),
            GenerationMode::Patch => crate::oracle::prompt::patch_instruction(&request.prompt),
        };

        tracing::debug!(
            approx_tokens = prompt.split_whitespace().count(),
            structured = request.schema.is_some(),
            "Sending oracle prompt"
        );

        let response = self
            .send_message(&self.request_for(prompt, request.schema.as_ref()))
            .await?;

        tracing::debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            "Claude response"
        );

        let reply = normalize_reply(&response.content);
        Ok(match request.mode {
            GenerationMode::Default => reply,
            GenerationMode::Patch => keep_diff(reply),
        })
    }
}

/// Patch replies must be a unified diff; anything else becomes empty text.
fn keep_diff(reply: OracleReply) -> OracleReply {
    let text = reply.into_text();
    if text.trim_start().starts_with("diff ") {
        return OracleReply::Text(text);
    }
    tracing::warn!("Oracle did not return a unified diff for a patch request");
    OracleReply::Text(String::new())
}

/// Collapse the content blocks of a response into a single reply: the input of
/// the first tool call when present, otherwise the joined text blocks.
fn normalize_reply(content: &[ContentBlock]) -> OracleReply {
    for block in content {
        if let ContentBlock::ToolUse { input, .. } = block {
            return OracleReply::Structured(input.clone());
        }
    }

    let text = content
        .iter()
        .filter_map(|block| {
            if let ContentBlock::Text { text } = block {
                Some(text.as_str())
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    OracleReply::Text(text)
}

// --- Request types ---

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolChoice {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
