//! Speaker diarization.
//!
//! A diarization service returns speaker turns for a recording; the turns are
//! then laid over the transcript segments, each segment taking the speaker
//! whose turn overlaps it the most.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use sift_core::{defaults, Error, Result, TranscriptSegment};

use crate::status_error;
use crate::transcription::extension_for;

/// A stretch of audio attributed to one speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

/// Backend that labels transcript segments with speakers.
#[async_trait]
pub trait DiarizationBackend: Send + Sync {
    async fn diarize(
        &self,
        media: &[u8],
        mime_type: &str,
        segments: &[TranscriptSegment],
    ) -> Result<Vec<TranscriptSegment>>;
}

/// Label each segment with the speaker of the turn it overlaps most.
///
/// Segments without any overlapping turn keep their existing label.
pub fn assign_speakers(segments: &[TranscriptSegment], turns: &[SpeakerTurn]) -> Vec<TranscriptSegment> {
    segments
        .iter()
        .map(|segment| {
            let mut best: Option<(&SpeakerTurn, f64)> = None;
            for turn in turns {
                let overlap = segment.end_secs.min(turn.end) - segment.start_secs.max(turn.start);
                if overlap <= 0.0 {
                    continue;
                }
                if best.map_or(true, |(_, o)| overlap > o) {
                    best = Some((turn, overlap));
                }
            }
            let mut labeled = segment.clone();
            if let Some((turn, _)) = best {
                labeled.speaker = Some(turn.speaker.clone());
            }
            labeled
        })
        .collect()
}

/// Number of distinct speakers across labeled segments.
pub fn speaker_count(segments: &[TranscriptSegment]) -> i32 {
    let mut speakers: Vec<&str> = segments
        .iter()
        .filter_map(|s| s.speaker.as_deref())
        .collect();
    speakers.sort_unstable();
    speakers.dedup();
    speakers.len() as i32
}

#[derive(Deserialize)]
struct DiarizeResponse {
    turns: Vec<SpeakerTurn>,
}

/// Diarization service reached over HTTP (`POST {base}/v1/diarize`).
pub struct HttpDiarizationBackend {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpDiarizationBackend {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout_secs: defaults::TRANSCRIBE_TIMEOUT_SECS,
        }
    }

    /// Returns None if DIARIZATION_BASE_URL is not set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(defaults::ENV_DIARIZATION_BASE_URL).ok()?;
        if base_url.is_empty() {
            return None;
        }
        Some(Self::new(base_url))
    }
}

#[async_trait]
impl DiarizationBackend for HttpDiarizationBackend {
    #[instrument(skip(self, media, segments), fields(subsystem = "inference", component = "diarization", op = "diarize", segment_count = segments.len()))]
    async fn diarize(
        &self,
        media: &[u8],
        mime_type: &str,
        segments: &[TranscriptSegment],
    ) -> Result<Vec<TranscriptSegment>> {
        let part = reqwest::multipart::Part::bytes(media.to_vec())
            .file_name(format!("media.{}", extension_for(mime_type)))
            .mime_str(mime_type)
            .map_err(|e| Error::UnsupportedMedia(format!("{}: {}", mime_type, e)))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/v1/diarize", self.base_url))
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

        let result: DiarizeResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("Failed to parse diarization: {}", e)))?;
        debug!(turns = result.turns.len(), "Diarization complete");
        Ok(assign_speakers(segments, &result.turns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64) -> TranscriptSegment {
        TranscriptSegment {
            start_secs: start,
            end_secs: end,
            text: format!("{}-{}", start, end),
            speaker: None,
        }
    }

    fn turn(start: f64, end: f64, speaker: &str) -> SpeakerTurn {
        SpeakerTurn {
            start,
            end,
            speaker: speaker.to_string(),
        }
    }

    #[test]
    fn test_assign_by_largest_overlap() {
        let segments = vec![seg(0.0, 4.0), seg(4.0, 10.0)];
        let turns = vec![turn(0.0, 5.0, "A"), turn(5.0, 10.0, "B")];
        let labeled = assign_speakers(&segments, &turns);
        assert_eq!(labeled[0].speaker.as_deref(), Some("A"));
        // 1s of A vs 5s of B.
        assert_eq!(labeled[1].speaker.as_deref(), Some("B"));
        assert_eq!(speaker_count(&labeled), 2);
    }

    #[test]
    fn test_segment_without_overlap_unlabeled() {
        let labeled = assign_speakers(&[seg(20.0, 25.0)], &[turn(0.0, 5.0, "A")]);
        assert!(labeled[0].speaker.is_none());
        assert_eq!(speaker_count(&labeled), 0);
    }

    #[test]
    fn test_equal_overlap_keeps_first_turn() {
        let labeled = assign_speakers(&[seg(4.0, 6.0)], &[turn(0.0, 5.0, "A"), turn(5.0, 9.0, "B")]);
        assert_eq!(labeled[0].speaker.as_deref(), Some("A"));
    }
}
