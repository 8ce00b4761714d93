//! Radio transcription.
//!
//! The recording is downloaded as opaque bytes and forwarded to an
//! OpenAI-compatible `audio/transcriptions` endpoint. Audio is never decoded
//! locally.

use std::fmt;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::debug;

use super::{NarrativeError, Result};
use crate::config::{NarrativeConfig, TranscriptionConfig};

/// File name sent with the uploaded recording.
const UPLOAD_FILE_NAME: &str = "radio_message.mp3";

/// Turns a recording URL into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the recording at `recording_url`.
    async fn transcribe(&self, recording_url: &str) -> Result<String>;
}

/// [`Transcriber`] backed by the Whisper API.
#[derive(Clone)]
pub struct WhisperClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl fmt::Debug for WhisperClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhisperClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl WhisperClient {
    /// Build a client sharing the narrative service's endpoint and key.
    ///
    /// # Errors
    ///
    /// Returns [`NarrativeError::MissingApiKey`] when no key is configured.
    pub fn from_config(narrative: &NarrativeConfig, transcription: &TranscriptionConfig) -> Result<Self> {
        let api_key = narrative.api_key().ok_or(NarrativeError::MissingApiKey)?;
        let http = Client::builder()
            .timeout(narrative.timeout())
            .build()
            .map_err(|e| NarrativeError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base_url: narrative.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: transcription.model.clone(),
        })
    }

    async fn download(&self, recording_url: &str) -> Result<Vec<u8>> {
        let download_err = |message: String| NarrativeError::Download {
            url: recording_url.to_string(),
            message,
        };
        let response = self
            .http
            .get(recording_url)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(download_err(format!("HTTP {}", status.as_u16())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn form(&self, audio: Vec<u8>) -> Result<Form> {
        let file = Part::bytes(audio)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str("audio/mpeg")
            .map_err(|e| NarrativeError::Request(e.to_string()))?;
        Ok(Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part("file", file))
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, recording_url: &str) -> Result<String> {
        let audio = self.download(recording_url).await?;
        debug!(bytes = audio.len(), model = %self.model, "uploading recording");

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(self.form(audio)?)
            .send()
            .await
            .map_err(|e| NarrativeError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NarrativeError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(NarrativeError::status(status.as_u16(), &body));
        }
        let text = body.trim();
        if text.is_empty() {
            return Err(NarrativeError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}
