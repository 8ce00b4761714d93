//! Error types for radiolap.
//!
//! This module defines the crate-wide error type. Failures of the optional
//! language-model and transcription collaborators live in
//! [`crate::narrative::NarrativeError`] and convert into [`Error`] when they
//! need to propagate.

use thiserror::Error;

use crate::narrative::NarrativeError;

/// The main error type for radiolap operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Gateway Errors ===
    /// The HTTP request could not be completed (connect, TLS, timeout, body read).
    #[error("request to {url} failed: {source}")]
    Http {
        /// The requested URL.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The upstream API answered with a non-success status.
    #[error("upstream returned HTTP {status} for {url}")]
    UpstreamStatus {
        /// The requested URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The upstream payload was valid JSON but not the expected shape.
    #[error("unexpected payload from {url}: {message}")]
    UnexpectedPayload {
        /// The requested URL.
        url: String,
        /// Description of what was wrong.
        message: String,
    },

    /// A gateway URL could not be built.
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The offending URL text.
        url: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Narrative Errors ===
    /// The narrative or transcription collaborator failed.
    #[error(transparent)]
    Narrative(#[from] NarrativeError),

    // === Lookup Errors ===
    /// A selected entity is not present in the upstream data.
    #[error("{what} not found")]
    NotFound {
        /// Description of what was looked up.
        what: String,
    },

    // === I/O Errors ===
    /// File system or stream operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for radiolap operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a not-found error for the described entity.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create an unexpected payload error.
    #[must_use]
    pub fn unexpected_payload(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedPayload {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Check if this error is an upstream non-success status.
    #[must_use]
    pub fn is_upstream_status(&self) -> bool {
        matches!(self, Self::UpstreamStatus { .. })
    }

    /// Check if this error indicates a missing entity.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
