//! Fetching raw media payloads for transcription.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use sift_core::{defaults, Error, Result};

use crate::status_error;

/// Media bytes plus the MIME type they were identified as.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Source of raw media bytes.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch the payload at `location`. `declared_mime` is the type recorded at
    /// ingestion, used when the content itself is not recognizable.
    async fn fetch(&self, location: &str, declared_mime: Option<&str>) -> Result<FetchedMedia>;
}

fn is_media_mime(mime: &str) -> bool {
    mime.starts_with("audio/") || mime.starts_with("video/")
}

/// Identify the media type of `bytes`.
///
/// Magic-byte detection wins over the declared type. Anything that is not
/// audio or video is rejected as unsupported.
pub fn sniff_media_type(bytes: &[u8], declared: Option<&str>) -> Result<String> {
    if bytes.is_empty() {
        return Err(Error::FatalInput("media payload is empty".to_string()));
    }
    match infer::get(bytes) {
        Some(kind) if is_media_mime(kind.mime_type()) => Ok(kind.mime_type().to_string()),
        Some(kind) => Err(Error::UnsupportedMedia(kind.mime_type().to_string())),
        None => match declared {
            Some(mime) if is_media_mime(mime) => Ok(mime.to_string()),
            Some(mime) => Err(Error::UnsupportedMedia(mime.to_string())),
            None => Err(Error::UnsupportedMedia(
                "unrecognized media payload".to_string(),
            )),
        },
    }
}

/// Fetches media over HTTP(S).
pub struct HttpMediaFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpMediaFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: Duration::from_secs(defaults::TRANSCRIBE_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpMediaFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    #[instrument(skip(self), fields(subsystem = "inference", component = "media", op = "fetch"))]
    async fn fetch(&self, location: &str, declared_mime: Option<&str>) -> Result<FetchedMedia> {
        if !(location.starts_with("http://") || location.starts_with("https://")) {
            return Err(Error::FatalInput(format!(
                "unsupported media location: {}",
                location
            )));
        }

        let response = self
            .client
            .get(location)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // A payload that is gone will not come back.
            if status.as_u16() == 404 || status.as_u16() == 410 {
                return Err(Error::FatalInput(format!(
                    "media not found at {}: {}",
                    location, status
                )));
            }
            return Err(status_error(status, &body, &[415], Error::Request));
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response.bytes().await?.to_vec();
        let declared = declared_mime.map(str::to_string).or(header_mime);
        let mime_type = sniff_media_type(&bytes, declared.as_deref())?;

        debug!(bytes = bytes.len(), mime_type = %mime_type, "Fetched media");
        Ok(FetchedMedia { bytes, mime_type })
    }
}
