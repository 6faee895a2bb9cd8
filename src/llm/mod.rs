//! LLM client abstraction layer
//!
//! Trait-based model access so the pipeline can run against real providers (genai)
//! or scripted mocks interchangeably, plus the executor that drives fallback chains.

mod call_log;
mod client;
mod error;
mod executor;
mod genai;
mod mock;
mod types;

pub use call_log::CallLogger;
pub use client::LLMClient;
pub use error::BackendError;
pub use executor::{
    extract_json, AttemptOutcome, AttemptRecord, CallMetadata, ModelCallExecutor, ModelChain,
    ModelExhaustionError, ModelProvider, Prompt,
};
pub use genai::GenAIClient;
pub use mock::{MockLLMClient, MockResponse};
pub use types::{ChatMessage, LLMRequest, LLMResponse, MessageRole};
