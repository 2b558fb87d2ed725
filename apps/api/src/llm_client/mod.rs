/// LLM Client — the single point of entry for all model calls.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// All model interactions MUST go through the `ModelInvoker` trait defined here.
///
/// One outbound request per `invoke`; retries belong to the caller.
/// Model: claude-sonnet-4-5 (hardcoded, not configurable)
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::LlmSettings;
use crate::estimation::compiler::CompiledPrompt;
use crate::estimation::contract::TokenUsage;
use crate::estimation::encoder::{EncodedDocument, EncodingError};
use crate::estimation::schema::OutputSchema;

pub mod prompts;

const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("document could not be attached: {0}")]
    Document(#[from] EncodingError),
}

impl LlmError {
    /// Transient failures worth another attempt: transport errors, timeouts,
    /// 408, 429 and 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http(_) | LlmError::Timeout(_) => true,
            LlmError::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            LlmError::Parse(_) | LlmError::EmptyContent | LlmError::Document(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Api { status, .. } => Some(*status),
            LlmError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// What the model produced, before any contract checks.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// Tool input from schema-guided generation.
    Structured(Value),
    /// Plain text when the model ignored the tool. Left for the validator to parse.
    Text(String),
}

impl ModelOutput {
    /// The output as text, for diagnostics.
    pub fn raw_text(&self) -> String {
        match self {
            ModelOutput::Structured(value) => value.to_string(),
            ModelOutput::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawModelResponse {
    pub output: ModelOutput,
    pub usage: TokenUsage,
}

/// The model invoker seam. `LlmClient` talks to Anthropic; tests plug in doubles.
///
/// Held by the estimation service as `Arc<dyn ModelInvoker>`.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Model identifier recorded in result provenance.
    fn model(&self) -> &str;

    /// Sends one request, constrained by `schema`. No retries.
    async fn invoke(
        &self,
        prompt: &CompiledPrompt,
        schema: &OutputSchema,
    ) -> Result<RawModelResponse, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    tools: Vec<AnthropicTool<'a>>,
    tool_choice: ToolChoice<'a>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Document { source: DocumentSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DocumentSource<'a> {
    Base64 { media_type: &'a str, data: &'a str },
    Text { media_type: &'a str, data: String },
}

#[derive(Debug, Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
    pub name: Option<String>,
    pub input: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }

    /// Extracts the input of the first `tool_use` block calling `tool`.
    pub fn tool_input(&self, tool: &str) -> Option<&Value> {
        self.content
            .iter()
            .find(|b| b.block_type == "tool_use" && b.name.as_deref() == Some(tool))
            .and_then(|b| b.input.as_ref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// The production model invoker: Anthropic Messages API with a forced tool call.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    api_url: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(settings.timeout).build()?,
            api_key: settings.api_key.clone(),
            api_url: settings.api_url.clone(),
            timeout: settings.timeout,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout)
        } else {
            LlmError::Http(e)
        }
    }
}

/// PDFs go through as base64; plain text is decoded and sent as a text source.
fn document_source(document: &EncodedDocument) -> Result<DocumentSource<'_>, LlmError> {
    let (media_type, payload) = document.parts()?;
    if media_type == "text/plain" {
        Ok(DocumentSource::Text {
            media_type,
            data: document.decode_text()?,
        })
    } else {
        Ok(DocumentSource::Base64 {
            media_type,
            data: payload,
        })
    }
}

#[async_trait]
impl ModelInvoker for LlmClient {
    fn model(&self) -> &str {
        MODEL
    }

    async fn invoke(
        &self,
        prompt: &CompiledPrompt,
        schema: &OutputSchema,
    ) -> Result<RawModelResponse, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system: &prompt.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: vec![
                    ContentPart::Document {
                        source: document_source(&prompt.document)?,
                    },
                    ContentPart::Text {
                        text: &prompt.instructions,
                    },
                ],
            }],
            tools: vec![AnthropicTool {
                name: schema.name,
                description: schema.description,
                input_schema: schema.to_json_schema(),
            }],
            tool_choice: ToolChoice {
                kind: "tool",
                name: schema.name,
            },
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            // Try to parse error message
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let llm_response: LlmResponse = serde_json::from_str(&body)?;

        debug!(
            "LLM call succeeded in {}ms: input_tokens={}, output_tokens={}",
            started.elapsed().as_millis(),
            llm_response.usage.input_tokens,
            llm_response.usage.output_tokens
        );

        let output = if let Some(input) = llm_response.tool_input(schema.name) {
            ModelOutput::Structured(input.clone())
        } else if let Some(text) = llm_response.text() {
            ModelOutput::Text(text.to_string())
        } else {
            return Err(LlmError::EmptyContent);
        };

        Ok(RawModelResponse {
            output,
            usage: TokenUsage {
                input_tokens: llm_response.usage.input_tokens,
                output_tokens: llm_response.usage.output_tokens,
            },
        })
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
