//! Model call executor
//!
//! Runs one prompt against an ordered [`ModelChain`]. Each provider gets its own
//! bounded retries for transient transport errors; blank output, non-transient
//! errors and output that fails validation move on to the next provider. The
//! first validated result wins. Exhausting the chain yields a single
//! [`ModelExhaustionError`] carrying every attempt.

use super::call_log::CallLogger;
use super::client::LLMClient;
use super::types::{ChatMessage, LLMRequest};
use crate::output::schema::Validate;
use crate::util::RetryPolicy;
use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// One entry of a fallback chain
#[derive(Clone)]
pub struct ModelProvider {
    pub id: String,
    pub client: Arc<dyn LLMClient>,
    pub retry: RetryPolicy,
    /// Overrides the executor-wide call timeout for this model
    pub timeout: Option<Duration>,
}

impl ModelProvider {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            id: client.name().to_string(),
            client,
            retry: RetryPolicy::default(),
            timeout: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelProvider")
            .field("id", &self.id)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Ordered list of interchangeable providers, tried front to back
#[derive(Debug, Clone, Default)]
pub struct ModelChain {
    providers: Vec<ModelProvider>,
}

impl ModelChain {
    pub fn new(providers: Vec<ModelProvider>) -> Self {
        Self { providers }
    }

    pub fn single(provider: ModelProvider) -> Self {
        Self::new(vec![provider])
    }

    /// Appends another chain after this one (e.g. powerful, then architect, then fallback)
    pub fn then(mut self, other: ModelChain) -> Self {
        self.providers.extend(other.providers);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelProvider> {
        self.providers.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// Timeout, rate limit, network or 5xx; eligible for a same-model retry
    Transient(String),
    /// Non-retryable transport error
    Failed(String),
    EmptyOutput,
    /// Output did not parse into the stage type or failed its checks
    SchemaMismatch(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub model: String,
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
}

impl AttemptRecord {
    pub fn new(model: impl Into<String>, attempt: u32, outcome: AttemptOutcome, latency_ms: u64) -> Self {
        Self {
            model: model.into(),
            attempt,
            outcome,
            latency_ms,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("all models exhausted for stage '{stage}' after {} attempts", .attempts.len())]
pub struct ModelExhaustionError {
    pub stage: String,
    pub attempts: Vec<AttemptRecord>,
}

/// Per-call settings and the labels used for observability
#[derive(Debug, Clone)]
pub struct CallMetadata {
    pub analysis_id: String,
    pub stage: &'static str,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CallMetadata {
    pub fn new(analysis_id: impl Into<String>, stage: &'static str) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            stage,
            temperature: 0.2,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

pub struct ModelCallExecutor {
    call_timeout: Duration,
    call_log: Arc<CallLogger>,
}

impl ModelCallExecutor {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            call_timeout,
            call_log: Arc::new(CallLogger::disabled()),
        }
    }

    pub fn with_call_log(mut self, call_log: Arc<CallLogger>) -> Self {
        self.call_log = call_log;
        self
    }

    /// Calls the chain and returns the first output that parses into `T` and passes
    /// `T::validate`. The JSON schema of `T` is appended to the system prompt.
    pub async fn call_structured<T>(
        &self,
        chain: &ModelChain,
        prompt: &Prompt,
        meta: &CallMetadata,
    ) -> Result<T, ModelExhaustionError>
    where
        T: DeserializeOwned + JsonSchema + Validate,
    {
        let system = format!(
            "{}\n\nRespond with a single JSON object that conforms to this JSON Schema. \
             Do not add prose before or after the JSON.\n{}",
            prompt.system,
            schema_for::<T>()
        );

        self.run(chain, &system, &prompt.user, meta, parse_structured::<T>)
            .await
    }

    /// Calls the chain and returns the first non-blank text
    pub async fn call_text(
        &self,
        chain: &ModelChain,
        prompt: &Prompt,
        meta: &CallMetadata,
    ) -> Result<String, ModelExhaustionError> {
        self.run(chain, &prompt.system, &prompt.user, meta, |raw| {
            Ok(raw.trim().to_string())
        })
        .await
    }

    async fn run<V, F>(
        &self,
        chain: &ModelChain,
        system: &str,
        user: &str,
        meta: &CallMetadata,
        validate: F,
    ) -> Result<V, ModelExhaustionError>
    where
        F: Fn(&str) -> Result<V, String>,
    {
        let mut attempts = Vec::new();

        for provider in chain.iter() {
            let call_timeout = provider.timeout.unwrap_or(self.call_timeout);
            let mut attempt = 0;

            loop {
                attempt += 1;

                let mut request =
                    LLMRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
                        .with_temperature(meta.temperature);
                if let Some(max_tokens) = meta.max_tokens {
                    request = request.with_max_tokens(max_tokens);
                }

                debug!(
                    analysis_id = %meta.analysis_id,
                    stage = meta.stage,
                    model = %provider.id,
                    attempt,
                    "Calling model"
                );

                let start = Instant::now();
                let result = tokio::time::timeout(call_timeout, provider.client.chat(request)).await;
                let latency_ms = start.elapsed().as_millis() as u64;

                let (outcome, value) = match result {
                    Err(_) => (
                        AttemptOutcome::Transient(format!(
                            "timed out after {}ms",
                            call_timeout.as_millis()
                        )),
                        None,
                    ),
                    Ok(Err(e)) if e.is_transient() => (AttemptOutcome::Transient(e.to_string()), None),
                    Ok(Err(e)) => (AttemptOutcome::Failed(e.to_string()), None),
                    Ok(Ok(response)) if response.is_blank() => (AttemptOutcome::EmptyOutput, None),
                    Ok(Ok(response)) => match validate(&response.content) {
                        Ok(value) => (AttemptOutcome::Success, Some(value)),
                        Err(reason) => (AttemptOutcome::SchemaMismatch(reason), None),
                    },
                };

                let record = AttemptRecord::new(&provider.id, attempt, outcome, latency_ms);
                self.call_log.record(&meta.analysis_id, meta.stage, &record);

                if let Some(value) = value {
                    info!(
                        analysis_id = %meta.analysis_id,
                        stage = meta.stage,
                        model = %provider.id,
                        attempt,
                        latency_ms,
                        "Model call succeeded"
                    );
                    return Ok(value);
                }

                warn!(
                    analysis_id = %meta.analysis_id,
                    stage = meta.stage,
                    model = %provider.id,
                    attempt,
                    outcome = ?record.outcome,
                    "Model attempt failed"
                );

                let retry_same_model = matches!(record.outcome, AttemptOutcome::Transient(_))
                    && provider.retry.should_retry(attempt);
                attempts.push(record);

                if !retry_same_model {
                    break;
                }

                let backoff = provider.retry.backoff_for(attempt);
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        Err(ModelExhaustionError {
            stage: meta.stage.to_string(),
            attempts,
        })
    }
}

fn schema_for<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn parse_structured<T>(raw: &str) -> Result<T, String>
where
    T: DeserializeOwned + Validate,
{
    let json = extract_json(raw).ok_or_else(|| "no JSON object found in output".to_string())?;
    let value: T = serde_json::from_str(json).map_err(|e| format!("invalid JSON: {}", e))?;
    value.validate()?;
    Ok(value)
}

fn fenced_block_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").expect("fenced block pattern is valid")
    })
}

/// Pulls a JSON object out of raw model text: bare, fenced, or embedded in prose
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    if let Some(captures) = fenced_block_regex().captures(trimmed) {
        if let Some(block) = captures.get(1) {
            let json = block.as_str().trim();
            if json.starts_with('{') && json.ends_with('}') {
                return Some(json);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (start < end).then(|| &trimmed[start..=end])
}
