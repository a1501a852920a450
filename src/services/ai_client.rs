//! Client for the generative-model backend.
//!
//! The rest of the crate only sees [`StructuredCompletion`]: "given an
//! instruction and a target schema, return a JSON object or fail".
//! [`OpenAiClient`] is the concrete adapter against an OpenAI-compatible
//! chat completions API using `json_schema` structured outputs.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::middleware::request_id::X_REQUEST_ID;

/// Instruction sent to the backend.
#[derive(Debug, Clone)]
pub struct CompletionPrompt {
    pub system: String,
    pub user: String,
}

/// Named JSON Schema the backend must constrain its output to.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub schema: Value,
}

#[derive(Debug, Error)]
pub enum AiClientError {
    #[error("model backend unavailable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model backend timed out")]
    Timeout,

    #[error("model backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("invalid model backend response: {0}")]
    InvalidResponse(String),

    #[error("model refused the request: {0}")]
    Refused(String),

    #[error("model output was truncated")]
    Truncated,
}

/// Schema-constrained completion capability.
#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    /// Run one completion and return the decoded JSON object.
    async fn complete_structured(
        &self,
        prompt: &CompletionPrompt,
        schema: &OutputSchema,
        request_id: Option<&str>,
    ) -> Result<Value, AiClientError>;

    async fn health_check(&self) -> Result<(), AiClientError>;
}

/// OpenAI chat completions adapter.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    r#type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout_seconds: u64,
    ) -> Result<Self, AiClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        tracing::info!(base_url = base_url, model = model, "Model backend client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl StructuredCompletion for OpenAiClient {
    #[instrument(skip_all, fields(schema = schema.name))]
    async fn complete_structured(
        &self,
        prompt: &CompletionPrompt,
        schema: &OutputSchema,
        request_id: Option<&str>,
    ) -> Result<Value, AiClientError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            response_format: ResponseFormat {
                r#type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: schema.name,
                    strict: true,
                    schema: &schema.schema,
                },
            },
        };

        let mut req = self.client.post(&url).bearer_auth(&self.api_key);

        if let Some(rid) = request_id {
            req = req.header(X_REQUEST_ID, rid);
        }

        debug!(url = %url, model = %self.model, "Model backend request");

        let response = req.json(&body).send().await.map_err(|e| {
            error!(error = %e, "Model backend request failed");
            if e.is_timeout() {
                AiClientError::Timeout
            } else {
                AiClientError::Transport(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "Model backend error");
            return Err(AiClientError::Status { status, body });
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiClientError::InvalidResponse(e.to_string()))?;

        extract_structured_output(envelope)
    }

    async fn health_check(&self) -> Result<(), AiClientError> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AiClientError::Status {
                status,
                body: String::new(),
            })
        }
    }
}

/// Pull the JSON object out of the first choice.
fn extract_structured_output(envelope: ChatResponse) -> Result<Value, AiClientError> {
    let choice = envelope
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AiClientError::InvalidResponse("no choices returned".to_string()))?;

    if let Some(refusal) = choice.message.refusal {
        return Err(AiClientError::Refused(refusal));
    }

    if choice.finish_reason.as_deref() == Some("length") {
        return Err(AiClientError::Truncated);
    }

    let content = choice
        .message
        .content
        .ok_or_else(|| AiClientError::InvalidResponse("empty message content".to_string()))?;

    serde_json::from_str(&content)
        .map_err(|e| AiClientError::InvalidResponse(format!("content is not JSON: {}", e)))
}
