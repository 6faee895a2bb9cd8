//! GenAI-based LLM client implementation
//!
//! Uses the `genai` crate, which resolves the provider (OpenAI, Anthropic, Gemini,
//! Ollama, ...) from the model name and reads credentials from the provider's
//! standard environment variable.

use super::client::LLMClient;
use super::error::BackendError;
use super::types::{ChatMessage, LLMRequest, LLMResponse, MessageRole};
use async_trait::async_trait;
use genai::chat::{ChatMessage as GenAIChatMessage, ChatOptions, ChatRequest as GenAIChatRequest};
use genai::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// One model reachable through genai
pub struct GenAIClient {
    client: Client,
    model: String,
    timeout: Duration,
}

impl GenAIClient {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        let model = model.into();
        debug!(model = %model, timeout_secs = timeout.as_secs(), "Creating GenAI client");

        Self {
            client: Client::default(),
            model,
            timeout,
        }
    }

    fn convert_message(msg: &ChatMessage) -> GenAIChatMessage {
        match msg.role {
            MessageRole::System => GenAIChatMessage::system(&msg.content),
            MessageRole::User => GenAIChatMessage::user(&msg.content),
            MessageRole::Assistant => GenAIChatMessage::assistant(&msg.content),
        }
    }
}

/// Maps a provider error message onto the transport taxonomy.
///
/// genai surfaces HTTP failures as text, so the status code is recovered from it.
fn classify_provider_error(message: &str) -> BackendError {
    const STATUS_CODES: [u16; 8] = [400, 401, 403, 404, 429, 500, 502, 503];

    let lower = message.to_lowercase();
    if lower.contains("rate limit") {
        return BackendError::RateLimitError { retry_after: None };
    }
    if lower.contains("api key") || lower.contains("unauthorized") {
        return BackendError::AuthenticationError {
            message: message.to_string(),
        };
    }
    for code in STATUS_CODES {
        if message.contains(&code.to_string()) {
            return BackendError::from_status(code, message);
        }
    }
    if lower.contains("connect") || lower.contains("dns") {
        return BackendError::NetworkError {
            message: message.to_string(),
        };
    }

    BackendError::ApiError {
        message: message.to_string(),
        status_code: None,
    }
}

#[async_trait]
impl LLMClient for GenAIClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        let start = Instant::now();

        let messages: Vec<GenAIChatMessage> =
            request.messages.iter().map(Self::convert_message).collect();
        let genai_request = GenAIChatRequest::new(messages);

        let mut options = ChatOptions::default();
        if let Some(temp) = request.temperature {
            options = options.with_temperature(temp as f64);
        }
        if let Some(max_tokens) = request.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }

        let response = match tokio::time::timeout(
            self.timeout,
            self.client
                .exec_chat(&self.model, genai_request, Some(&options)),
        )
        .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                error!(model = %self.model, "Model API error: {}", e);
                return Err(classify_provider_error(&e.to_string()));
            }
            Err(_) => {
                error!(
                    model = %self.model,
                    "Model request timed out after {}s",
                    self.timeout.as_secs()
                );
                return Err(BackendError::TimeoutError {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let content = response.first_text().unwrap_or_default().to_string();
        Ok(LLMResponse::text(content, start.elapsed()))
    }

    fn name(&self) -> &str {
        &self.model
    }

    fn model_info(&self) -> Option<String> {
        Some(self.model.clone())
    }
}

impl std::fmt::Debug for GenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenAIClient")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}
