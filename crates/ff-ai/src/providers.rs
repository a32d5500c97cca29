//! Provider wire formats and HTTP dispatch
//!
//! Two request shapes cover the supported providers:
//! - OpenAI chat completions (OpenAI, and Google through its compatible endpoint)
//! - Anthropic messages

use async_trait::async_trait;
use ff_protocol::ProviderId;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};
use url::Url;

use crate::config::join_endpoint;
use crate::error::{AiError, Result};
use crate::output::sanitize_error_message;

/// Anthropic API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Provider-neutral prompt
#[derive(Debug, Clone)]
pub struct Prompt {
    /// System instructions
    pub system: String,
    /// User message
    pub user: String,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Completion token ceiling
    pub max_tokens: u32,
}

/// Token counts reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Total tokens
    pub total_tokens: u64,
}

/// Normalized provider reply
#[derive(Debug, Clone)]
pub struct Completion {
    /// Text of the first completion
    pub text: String,
    /// Token usage, when reported
    pub usage: Option<TokenUsage>,
}

/// Chat completion request (OpenAI shape)
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// ID of the model to use
    pub model: String,
    /// List of messages in the conversation
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 to 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Content of the message
    #[serde(default)]
    pub content: Option<String>,
}

impl Message {
    fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: Some(content.to_string()),
        }
    }
}

/// Role of the message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt
    System,
    /// User input
    User,
    /// Assistant response
    Assistant,
}

/// Chat completion response (OpenAI shape)
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// Unique ID of the response
    #[serde(default)]
    pub id: Option<String>,
    /// Model used for generation
    #[serde(default)]
    pub model: Option<String>,
    /// List of generated choices
    pub choices: Vec<Choice>,
    /// Token usage statistics
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Generated choice
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    /// Generated message
    pub message: Message,
    /// Reason for finishing (e.g. "stop", "length")
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage statistics (OpenAI shape)
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u64,
    /// Tokens in the completion
    pub completion_tokens: u64,
    /// Total tokens used
    pub total_tokens: u64,
}

/// Messages request (Anthropic shape)
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    /// ID of the model to use
    pub model: String,
    /// System instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Conversation turns (user/assistant only)
    pub messages: Vec<Message>,
    /// Maximum number of tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature (0.0 to 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Messages response (Anthropic shape)
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    /// Content blocks
    pub content: Vec<ContentBlock>,
    /// Reason generation stopped
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Token usage statistics
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Content block of a messages response
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Generated text
    Text {
        /// The text
        text: String,
    },
    /// Any other block type (tool use, thinking, ...)
    #[serde(other)]
    Other,
}

/// Token usage statistics (Anthropic shape)
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AnthropicUsage {
    /// Tokens in the prompt
    pub input_tokens: u64,
    /// Tokens in the completion
    pub output_tokens: u64,
}

impl From<AnthropicUsage> for TokenUsage {
    fn from(u: AnthropicUsage) -> Self {
        Self {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens.saturating_add(u.output_tokens),
        }
    }
}

/// API error body, shared by both shapes
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Detailed error information
    pub error: ErrorDetail,
}

/// Detailed error information
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    /// Error message
    pub message: String,
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

/// One provider request/response dialect
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one prompt and normalize the reply
    async fn complete(
        &self,
        http: &reqwest::Client,
        base_url: &Url,
        api_key: &SecretString,
        model: &str,
        prompt: &Prompt,
    ) -> Result<Completion>;
}

/// OpenAI chat-completions dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiCompatible;

/// Anthropic messages dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicMessages;

/// Backend speaking a provider's dialect
pub fn backend_for(provider: ProviderId) -> &'static dyn ChatBackend {
    match provider {
        ProviderId::OpenAI | ProviderId::Google => &OpenAiCompatible,
        ProviderId::Anthropic => &AnthropicMessages,
    }
}

fn header_value(raw: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(raw)
        .map_err(|_| AiError::InvalidRequest("API key contains invalid header characters".to_string()))
}

#[async_trait]
impl ChatBackend for OpenAiCompatible {
    #[instrument(skip(self, http, base_url, api_key, prompt), fields(url = %base_url))]
    async fn complete(
        &self,
        http: &reqwest::Client,
        base_url: &Url,
        api_key: &SecretString,
        model: &str,
        prompt: &Prompt,
    ) -> Result<Completion> {
        let url = join_endpoint(base_url, "chat/completions")?;

        let mut headers = HeaderMap::new();
        let mut auth = header_value(&format!("Bearer {}", api_key.expose_secret()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                Message::new(Role::System, &prompt.system),
                Message::new(Role::User, &prompt.user),
            ],
            temperature: prompt.temperature,
            max_tokens: Some(prompt.max_tokens),
        };

        debug!("Sending chat completion request");
        let response = http.post(url).headers(headers).json(&request).send().await?;
        let body = read_success(response).await?;

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::upstream(format!("malformed chat completion: {e}")))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::upstream("no completion content"))?;

        Ok(Completion {
            text,
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

#[async_trait]
impl ChatBackend for AnthropicMessages {
    #[instrument(skip(self, http, base_url, api_key, prompt), fields(url = %base_url))]
    async fn complete(
        &self,
        http: &reqwest::Client,
        base_url: &Url,
        api_key: &SecretString,
        model: &str,
        prompt: &Prompt,
    ) -> Result<Completion> {
        let url = join_endpoint(base_url, "messages")?;

        let mut headers = HeaderMap::new();
        let mut key = header_value(api_key.expose_secret())?;
        key.set_sensitive(true);
        headers.insert(HeaderName::from_static("x-api-key"), key);
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let request = MessagesRequest {
            model: model.to_string(),
            system: Some(prompt.system.clone()).filter(|s| !s.is_empty()),
            messages: vec![Message::new(Role::User, &prompt.user)],
            max_tokens: prompt.max_tokens,
            // Anthropic caps temperature at 1.0
            temperature: prompt.temperature.map(|t| t.min(1.0)),
        };

        debug!("Sending messages request");
        let response = http.post(url).headers(headers).json(&request).send().await?;
        let body = read_success(response).await?;

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::upstream(format!("malformed messages response: {e}")))?;
        let text = parsed
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .ok_or_else(|| AiError::upstream("no text content"))?;

        Ok(Completion {
            text,
            usage: parsed.usage.map(TokenUsage::from),
        })
    }
}

/// Return the body of a 2xx response, or an [`AiError::Upstream`]
async fn read_success(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }

    let message = match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => {
            let message = sanitize_error_message(&api_error.error.message);
            match api_error.error.error_type {
                Some(kind) => format!("{message} ({kind})"),
                None => message,
            }
        }
        Err(_) => status.canonical_reason().unwrap_or("Unknown error").to_string(),
    };
    error!(status = status.as_u16(), %message, "Provider returned an error");

    Err(AiError::Upstream {
        status: Some(status.as_u16()),
        message,
    })
}
