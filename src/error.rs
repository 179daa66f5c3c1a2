//! Error types shared across the collector.
//!
//! Every fallible operation returns [`Result`]. Errors coming from external
//! services are classified into a [`FailureKind`] so the retry wrapper can
//! decide whether another attempt is worth it.

use std::fmt;

use thiserror::Error;

use crate::retry::{Classify, FailureKind};

/// Result type alias for collector operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML settings could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Feed document could not be parsed
    #[error("Feed parse error: {0}")]
    Feed(#[from] quick_xml::DeError),

    /// A remote API answered with a non-success status
    #[error("{service} returned {status}: {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    /// A remote API answered successfully but with an unusable body
    #[error("{service} response unusable: {message}")]
    Response { service: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// History file exists but cannot be trusted
    #[error("Corrupt history: {0}")]
    Corrupt(String),
}

impl AppError {
    /// Create an API status error.
    pub fn api(service: impl Into<String>, status: u16, message: impl fmt::Display) -> Self {
        Self::Api {
            service: service.into(),
            status,
            message: message.to_string(),
        }
    }

    /// Create an unusable-response error.
    pub fn response(service: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Response {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a corrupt-history error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }
}

/// Map an HTTP status code to a failure kind.
fn status_kind(status: u16) -> FailureKind {
    match status {
        429 => FailureKind::RateLimited,
        502..=504 => FailureKind::ServiceUnavailable,
        408 => FailureKind::Timeout,
        _ => FailureKind::Permanent,
    }
}

impl Classify for AppError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            AppError::Http(e) if e.is_timeout() => FailureKind::Timeout,
            AppError::Http(e) if e.is_connect() => FailureKind::Connection,
            AppError::Http(e) => e
                .status()
                .map(|s| status_kind(s.as_u16()))
                .unwrap_or(FailureKind::Permanent),
            AppError::Api { status, .. } => status_kind(*status),
            _ => FailureKind::Permanent,
        }
    }
}
