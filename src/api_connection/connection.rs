use async_trait::async_trait;
use reqwest::Client;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::endpoints::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, MessagesRequest,
    MessagesResponse, Provider, ResponseFormat, ANTHROPIC_API_KEY_NAME, ANTHROPIC_VERSION,
    OPENAI_API_KEY_NAME,
};
use crate::config::SecretStore;

/// Error bodies that mean the prompt did not fit the provider's context window.
const CONTEXT_LENGTH_MARKERS: &[&str] = &[
    "maximum context length",
    "context_length_exceeded",
    "context length",
    "prompt is too long",
];

#[derive(Debug)]
pub enum ApiConnectionError {
    MissingApiKey(String),
    NetworkError(reqwest::Error),
    SerializationError(serde_json::Error),
    ApiError {
        status: reqwest::StatusCode,
        error_body: String,
    },
    EmptyResponse(String),
    Timeout(String),
}

impl ApiConnectionError {
    /// True when the provider rejected the request for exceeding its context window.
    pub fn is_context_length_exceeded(&self) -> bool {
        match self {
            ApiConnectionError::ApiError { error_body, .. } => {
                let body = error_body.to_lowercase();
                CONTEXT_LENGTH_MARKERS.iter().any(|marker| body.contains(marker))
            }
            _ => false,
        }
    }
}

impl fmt::Display for ApiConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiConnectionError::MissingApiKey(key_name) => {
                write!(f, "API key not found in secret store: {}", key_name)
            }
            ApiConnectionError::NetworkError(err) => write!(f, "Network error: {}", err),
            ApiConnectionError::SerializationError(err) => {
                write!(f, "Serialization error: {}", err)
            }
            ApiConnectionError::ApiError { status, error_body } => {
                write!(f, "API error {}: {}", status, error_body)
            }
            ApiConnectionError::EmptyResponse(provider) => {
                write!(f, "Provider '{}' returned no content", provider)
            }
            ApiConnectionError::Timeout(provider) => {
                write!(f, "Request to provider '{}' timed out", provider)
            }
        }
    }
}

impl Error for ApiConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiConnectionError::NetworkError(err) => Some(err),
            ApiConnectionError::SerializationError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiConnectionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let url = err.url().map(|u| u.to_string()).unwrap_or_default();
            return ApiConnectionError::Timeout(url);
        }
        ApiConnectionError::NetworkError(err)
    }
}

impl From<serde_json::Error> for ApiConnectionError {
    fn from(err: serde_json::Error) -> Self {
        ApiConnectionError::SerializationError(err)
    }
}

/// A single prompt exchange: one system instruction, one user message.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system: String,
    pub prompt: String,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, system: impl Into<String>) -> Self {
        Self { system: system.into(), prompt: prompt.into() }
    }
}

/// Anything that can answer an [`LlmRequest`] with raw text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &LlmRequest) -> Result<String, ApiConnectionError>;
}

impl Provider {
    pub fn openai(base_url: &str, model: &str) -> Self {
        Self::OpenAi {
            api_key_name: OPENAI_API_KEY_NAME.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn anthropic(base_url: &str, model: &str) -> Self {
        Self::Anthropic {
            api_key_name: ANTHROPIC_API_KEY_NAME.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Overrides the secret name the key is looked up under.
    pub fn with_api_key_name(mut self, name: &str) -> Self {
        match &mut self {
            Provider::OpenAi { api_key_name, .. } | Provider::Anthropic { api_key_name, .. } => {
                *api_key_name = name.to_string();
            }
        }
        self
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAi { .. } => "openai",
            Provider::Anthropic { .. } => "anthropic",
        }
    }

    pub fn api_key_name(&self) -> &str {
        match self {
            Provider::OpenAi { api_key_name, .. } | Provider::Anthropic { api_key_name, .. } => {
                api_key_name
            }
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAi { model, .. } | Provider::Anthropic { model, .. } => model,
        }
    }
}

/// HTTP-backed [`LlmProvider`]. The `reqwest::Client` is built once by the
/// caller (carrying its timeout) and shared by every call.
pub struct HttpProvider {
    provider: Provider,
    client: Client,
    secrets: Arc<dyn SecretStore>,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl HttpProvider {
    pub fn new(provider: Provider, client: Client, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            provider,
            client,
            secrets,
            max_tokens: 4096,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    fn api_key(&self) -> Result<String, ApiConnectionError> {
        let name = self.provider.api_key_name();
        self.secrets
            .get_secret(name)
            .ok_or_else(|| ApiConnectionError::MissingApiKey(name.to_string()))
    }

    pub async fn call_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ApiConnectionError> {
        let base_url = match &self.provider {
            Provider::OpenAi { base_url, .. } => base_url,
            Provider::Anthropic { .. } => {
                return Err(ApiConnectionError::ApiError {
                    status: reqwest::StatusCode::BAD_REQUEST,
                    error_body: "chat completions are not served by the anthropic provider".to_string(),
                })
            }
        };
        let api_key = self.api_key()?;
        let url = format!("{}/chat/completions", base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if response.status().is_success() {
            let chat_response = response.json::<ChatCompletionResponse>().await?;
            Ok(chat_response)
        } else {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            Err(ApiConnectionError::ApiError { status, error_body })
        }
    }

    pub async fn call_messages(
        &self,
        request: MessagesRequest,
    ) -> Result<MessagesResponse, ApiConnectionError> {
        let base_url = match &self.provider {
            Provider::Anthropic { base_url, .. } => base_url,
            Provider::OpenAi { .. } => {
                return Err(ApiConnectionError::ApiError {
                    status: reqwest::StatusCode::BAD_REQUEST,
                    error_body: "messages are not served by the openai provider".to_string(),
                })
            }
        };
        let api_key = self.api_key()?;
        let url = format!("{}/v1/messages", base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json::<MessagesResponse>().await?)
        } else {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            Err(ApiConnectionError::ApiError { status, error_body })
        }
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, ApiConnectionError> {
        let content = match &self.provider {
            Provider::OpenAi { model, .. } => {
                let chat_request = ChatCompletionRequest {
                    model: model.clone(),
                    messages: vec![
                        ChatMessage::system(request.system.clone()),
                        ChatMessage::user(request.prompt.clone()),
                    ],
                    response_format: Some(ResponseFormat::json_object()),
                    temperature: self.temperature,
                    max_tokens: Some(self.max_tokens),
                };
                let response = self.call_chat_completion(chat_request).await?;
                response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .unwrap_or_default()
            }
            Provider::Anthropic { model, .. } => {
                let messages_request = MessagesRequest {
                    model: model.clone(),
                    max_tokens: self.max_tokens,
                    system: request.system.clone(),
                    messages: vec![ChatMessage::user(request.prompt.clone())],
                    temperature: self.temperature,
                };
                self.call_messages(messages_request).await?.text()
            }
        };

        debug!(provider = self.name(), chars = content.len(), "provider responded");
        if content.trim().is_empty() {
            return Err(ApiConnectionError::EmptyResponse(self.name().to_string()));
        }
        Ok(content)
    }
}
