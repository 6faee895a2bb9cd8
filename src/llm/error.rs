//! Model transport errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors that can occur while talking to a model provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackendError {
    /// API request failed with the given message
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    /// Authentication failed or credentials are invalid
    AuthenticationError { message: String },

    /// Request timed out after the specified duration (in seconds)
    TimeoutError { seconds: u64 },

    /// Rate limit exceeded, retry after the specified duration (in seconds)
    RateLimitError { retry_after: Option<u64> },

    /// Configuration error (missing API keys, unknown model, etc.)
    ConfigurationError { message: String },

    /// Network-related error
    NetworkError { message: String },

    Other { message: String },
}

impl BackendError {
    /// Builds an error from an HTTP-ish status code and provider message
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => BackendError::AuthenticationError { message },
            408 => BackendError::TimeoutError { seconds: 0 },
            429 => BackendError::RateLimitError { retry_after: None },
            _ => BackendError::ApiError {
                message,
                status_code: Some(status_code),
            },
        }
    }

    /// Whether retrying the same model may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::TimeoutError { .. }
            | BackendError::RateLimitError { .. }
            | BackendError::NetworkError { .. } => true,
            BackendError::ApiError { status_code, .. } => match status_code {
                Some(code) => *code >= 500,
                None => true,
            },
            BackendError::AuthenticationError { .. }
            | BackendError::ConfigurationError { .. }
            | BackendError::Other { .. } => false,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::ApiError {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "API error ({}): {}", code, message)
                } else {
                    write!(f, "API error: {}", message)
                }
            }
            BackendError::AuthenticationError { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            BackendError::TimeoutError { seconds } => {
                write!(f, "Request timed out after {} seconds", seconds)
            }
            BackendError::RateLimitError { retry_after } => {
                if let Some(seconds) = retry_after {
                    write!(f, "Rate limit exceeded, retry after {} seconds", seconds)
                } else {
                    write!(f, "Rate limit exceeded")
                }
            }
            BackendError::ConfigurationError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            BackendError::NetworkError { message } => {
                write!(f, "Network error: {}", message)
            }
            BackendError::Other { message } => {
                write!(f, "Error: {}", message)
            }
        }
    }
}

impl std::error::Error for BackendError {}
