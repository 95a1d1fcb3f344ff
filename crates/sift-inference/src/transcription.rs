//! Transcription backend trait and the Whisper-compatible implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use sift_core::{defaults, Error, Result, TranscriptSegment, TranscriptionOutput};

use crate::status_error;

/// Backend for transcribing audio and video.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe a media payload.
    async fn transcribe(
        &self,
        media: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionOutput>;

    /// Check if the transcription backend is available.
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible Whisper backend (Speaches, faster-whisper-server).
pub struct WhisperBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl WhisperBackend {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
            timeout_secs: defaults::TRANSCRIBE_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables.
    /// Returns None if WHISPER_BASE_URL is not set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(defaults::ENV_WHISPER_BASE_URL).ok()?;
        if base_url.is_empty() {
            return None;
        }
        let model = std::env::var(defaults::ENV_WHISPER_MODEL)
            .unwrap_or_else(|_| defaults::DEFAULT_WHISPER_MODEL.to_string());
        Some(Self::new(base_url, model))
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// File extension the server uses to pick a decoder.
pub(crate) fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/aac" => "aac",
        "audio/m4a" | "audio/x-m4a" | "audio/mp4" => "m4a",
        "audio/webm" | "video/webm" => "webm",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        _ => "bin",
    }
}

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

impl WhisperResponse {
    fn into_output(self) -> TranscriptionOutput {
        let transcript = self.text.trim().to_string();
        let mut segments: Vec<TranscriptSegment> = self
            .segments
            .unwrap_or_default()
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .map(|s| TranscriptSegment {
                start_secs: s.start,
                end_secs: s.end,
                text: s.text.trim().to_string(),
                speaker: None,
            })
            .collect();
        if segments.is_empty() && !transcript.is_empty() {
            segments.push(TranscriptSegment {
                start_secs: 0.0,
                end_secs: self.duration.unwrap_or(0.0),
                text: transcript.clone(),
                speaker: None,
            });
        }
        TranscriptionOutput {
            transcript,
            segments,
            // Whisper does not separate speakers.
            speaker_count: None,
            language: self.language,
            duration_secs: self.duration,
        }
    }
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    #[instrument(skip(self, media), fields(subsystem = "inference", component = "whisper", op = "transcribe", model = %self.model, bytes = media.len()))]
    async fn transcribe(
        &self,
        media: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionOutput> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);

        let file_part = reqwest::multipart::Part::bytes(media.to_vec())
            .file_name(format!("media.{}", extension_for(mime_type)))
            .mime_str(mime_type)
            .map_err(|e| Error::UnsupportedMedia(format!("{}: {}", mime_type, e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(
                status,
                &body,
                &[400, 415, 422],
                Error::Transcription,
            ));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("Failed to parse response: {}", e)))?;
        let output = result.into_output();
        debug!(
            segments = output.segments.len(),
            chars = output.transcript.len(),
            "Transcription complete"
        );
        Ok(output)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
