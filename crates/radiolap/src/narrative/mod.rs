//! Natural-language summaries and radio transcripts.
//!
//! Two optional collaborators live here: a chat-completion
//! [`NarrativeGenerator`] and an audio [`Transcriber`]. Both are fallible and
//! neither failure is fatal to a report: call sites turn errors into a
//! [`Narrative::Warning`] and carry on.

pub mod openai;
pub mod prompt;
pub mod retry;
pub mod transcribe;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub use openai::OpenAiClient;
pub use prompt::{Prompt, RaceFacts, RadioContext, Sentiment};
pub use retry::{RetryPolicy, Retrying};
pub use transcribe::{Transcriber, WhisperClient};

/// Errors from the narrative and transcription services.
#[derive(Debug, Error)]
pub enum NarrativeError {
    /// No API key was configured.
    #[error("no API key configured (set OPENAI_API_KEY)")]
    MissingApiKey,

    /// The request could not be sent or its body could not be read.
    #[error("narrative request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("narrative service returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },

    /// The response carried no usable text.
    #[error("narrative service returned an empty response")]
    EmptyResponse,

    /// The radio recording could not be downloaded.
    #[error("failed to download recording {url}: {message}")]
    Download {
        /// Recording URL.
        url: String,
        /// What went wrong.
        message: String,
    },

    /// Every retry attempt failed.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: Box<NarrativeError>,
    },
}

/// Longest response body kept in a status error.
const ERROR_BODY_LIMIT: usize = 800;

impl NarrativeError {
    /// A [`NarrativeError::Status`] keeping at most the first
    /// `ERROR_BODY_LIMIT` characters of `body`.
    #[must_use]
    pub fn status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            body: body.chars().take(ERROR_BODY_LIMIT).collect(),
        }
    }

    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MissingApiKey | Self::Exhausted { .. })
    }
}

/// Result type for narrative operations.
pub type Result<T> = std::result::Result<T, NarrativeError>;

/// Produces text for a [`Prompt`].
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

#[async_trait]
impl<G: NarrativeGenerator + ?Sized> NarrativeGenerator for Box<G> {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        (**self).generate(prompt).await
    }
}

/// Outcome of an optional narrative section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "lowercase")]
pub enum Narrative {
    /// Generated text.
    Text(String),
    /// The section is unavailable; the message explains why.
    Warning(String),
}

impl Narrative {
    /// Convert a generation result, logging failures.
    pub fn from_result<E: fmt::Display>(section: &str, result: std::result::Result<String, E>) -> Self {
        match result {
            Ok(text) => Self::Text(text),
            Err(err) => {
                warn!(section, error = %err, "narrative section unavailable");
                Self::Warning(format!("{section} unavailable: {err}"))
            }
        }
    }

    /// The generated text, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Warning(_) => None,
        }
    }

    /// Whether this is a warning.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning(_))
    }
}

impl fmt::Display for Narrative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Warning(message) => write!(f, "warning: {message}"),
        }
    }
}

/// Run `prompt` through `generator`, turning failure into a warning.
pub async fn narrate(generator: &dyn NarrativeGenerator, section: &str, prompt: &Prompt) -> Narrative {
    Narrative::from_result(section, generator.generate(prompt).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(Result<&'static str>);

    #[async_trait]
    impl NarrativeGenerator for Canned {
        async fn generate(&self, _prompt: &Prompt) -> Result<String> {
            match &self.0 {
                Ok(text) => Ok((*text).to_string()),
                Err(_) => Err(NarrativeError::EmptyResponse),
            }
        }
    }

    fn prompt() -> Prompt {
        Prompt::new("system", "user")
    }

    #[test]
    fn test_retryable() {
        assert!(NarrativeError::EmptyResponse.is_retryable());
        assert!(NarrativeError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!NarrativeError::MissingApiKey.is_retryable());
        let exhausted = NarrativeError::Exhausted {
            attempts: 3,
            last: Box::new(NarrativeError::EmptyResponse),
        };
        assert!(!exhausted.is_retryable());
        assert!(exhausted.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_status_body_truncated() {
        let page = format!("<html>{}</html>", "x".repeat(5_000));
        let NarrativeError::Status { status, body } = NarrativeError::status(502, &page) else {
            panic!("expected a status error");
        };
        assert_eq!(status, 502);
        assert_eq!(body.chars().count(), ERROR_BODY_LIMIT);
        assert!(body.starts_with("<html>"));

        let short = NarrativeError::status(429, "slow down");
        assert!(short.to_string().ends_with("HTTP 429: slow down"));
    }

    #[tokio::test]
    async fn test_narrate_text() {
        let narrative = narrate(&Canned(Ok("P3 finish")), "race summary", &prompt()).await;
        assert_eq!(narrative, Narrative::Text("P3 finish".to_string()));
        assert_eq!(narrative.text(), Some("P3 finish"));
        assert_eq!(narrative.to_string(), "P3 finish");
    }

    #[tokio::test]
    async fn test_narrate_failure_becomes_warning() {
        let generator: Box<dyn NarrativeGenerator> =
            Box::new(Canned(Err(NarrativeError::EmptyResponse)));
        let narrative = narrate(&generator, "race summary", &prompt()).await;
        assert!(narrative.is_warning());
        assert_eq!(narrative.text(), None);
        assert!(narrative.to_string().starts_with("warning: race summary unavailable"));
    }

    #[test]
    fn test_narrative_serializes_tagged() {
        let json = serde_json::to_value(Narrative::Warning("no key".into())).unwrap();
        assert_eq!(json["kind"], "warning");
        assert_eq!(json["message"], "no key");
    }
}
