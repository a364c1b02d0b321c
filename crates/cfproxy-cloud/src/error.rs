//! Error types for enumeration, mutation and state persistence

use crate::action::Verb;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Authentication failed (HTTP {status}): {message}")]
    AuthenticationFailed { status: u16, message: String },

    #[error("Rate limited: {message}")]
    RateLimited {
        retry_after: Option<u64>,
        message: String,
    },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Pagination limit reached: {0}")]
    PageLimit(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("'{0}' does not process DNS records")]
    UnsupportedVerb(Verb),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether a retry may succeed: 5xx, 429, network failures and timeouts.
    /// Auth and other 4xx failures are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            CloudError::RateLimited { .. } | CloudError::Network(_) | CloudError::Timeout(_) => {
                true
            }
            CloudError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
