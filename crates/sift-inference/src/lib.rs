//! # sift-inference
//!
//! Model and media backends for the sift pipeline.
//!
//! This crate provides:
//! - Ollama implementation of the embedding and generation traits (default)
//! - Whisper-compatible transcription backend
//! - HTTP diarization backend and speaker assignment
//! - Media fetching with content sniffing
//! - Analysis and topic-naming prompts with tolerant JSON parsing
//! - Deterministic mock backends (feature `mock`)
//!
//! # Feature Flags
//!
//! - `ollama` (default): Enable Ollama backend
//! - `mock`: Enable mock backends for tests in dependent crates
//!
//! # Example
//!
//! ```rust,no_run
//! use sift_inference::OllamaBackend;
//! use sift_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OllamaBackend::from_env();
//!     let texts = vec!["Hello".to_string()];
//!     let embeddings = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

pub mod analysis;
pub mod diarization;
pub mod media;
pub mod naming;
pub mod transcription;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use sift_core::*;

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

pub use analysis::{analysis_prompt, parse_analysis_response, ANALYSIS_SYSTEM_PROMPT};
pub use diarization::{
    assign_speakers, speaker_count, DiarizationBackend, HttpDiarizationBackend, SpeakerTurn,
};
pub use media::{sniff_media_type, FetchedMedia, HttpMediaFetcher, MediaFetcher};
pub use naming::{parse_topic_name, topic_naming_prompt, TOPIC_NAMING_SYSTEM_PROMPT};
pub use transcription::{TranscriptionBackend, WhisperBackend};

/// Map a non-success HTTP status from an upstream service to an error.
///
/// 429 and 5xx are transient. 4xx codes listed in `fatal` mean the input
/// itself was rejected. Everything else is reported through `other`.
pub(crate) fn status_error(
    status: reqwest::StatusCode,
    body: &str,
    fatal: &[u16],
    other: fn(String) -> Error,
) -> Error {
    let message = format!("upstream returned {}: {}", status, body);
    if status.is_server_error() || status.as_u16() == 429 {
        Error::Transient(message)
    } else if fatal.contains(&status.as_u16()) {
        Error::UnsupportedMedia(message)
    } else {
        other(message)
    }
}
