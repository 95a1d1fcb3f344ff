//! Mock backends for deterministic testing.
//!
//! Every mock records its calls and can be told to fail a number of times
//! before succeeding, which is how retry behaviour is exercised.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sift_inference::mock::MockEmbeddingBackend;
//!
//! let backend = MockEmbeddingBackend::new(8).with_vector("hello", vec![1.0; 8]);
//! let vectors = backend.embed_texts(&["hello".to_string()]).await?;
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use sift_core::{
    EmbeddingBackend, Error, GenerationBackend, Result, TranscriptSegment, TranscriptionOutput,
    Vector,
};

use crate::diarization::{assign_speakers, DiarizationBackend, SpeakerTurn};
use crate::media::{FetchedMedia, MediaFetcher};
use crate::transcription::TranscriptionBackend;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Countdown of injected failures shared by the mocks.
#[derive(Default)]
struct FailurePlan {
    remaining: AtomicUsize,
    fatal: std::sync::atomic::AtomicBool,
}

impl FailurePlan {
    fn set(&self, times: usize, fatal: bool) {
        self.remaining.store(times, Ordering::SeqCst);
        self.fatal.store(fatal, Ordering::SeqCst);
    }

    fn check(&self, what: &str) -> Result<()> {
        let took = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !took {
            return Ok(());
        }
        if self.fatal.load(Ordering::SeqCst) {
            Err(Error::UnsupportedMedia(format!("mock {} rejected input", what)))
        } else {
            Err(Error::Transient(format!("mock {} unavailable", what)))
        }
    }
}

/// Deterministic vector for `text`: character-position hashing, unit length.
pub fn deterministic_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0_f32; dimension.max(1)];
    for (i, c) in text.chars().enumerate() {
        let idx = (c as usize + i) % vec.len();
        vec[idx] += 0.1;
    }
    normalize(&mut vec);
    vec
}

fn normalize(vec: &mut [f32]) {
    let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vec.iter_mut().for_each(|x| *x /= magnitude);
    }
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// Embedding backend with exact text-to-vector overrides.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    dimension: usize,
    vectors: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    failures: Arc<FailurePlan>,
    calls: Arc<AtomicUsize>,
    embedded: Arc<AtomicUsize>,
}

impl MockEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(FailurePlan::default()),
            calls: Arc::new(AtomicUsize::new(0)),
            embedded: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Return `vector` whenever exactly `text` is embedded.
    pub fn with_vector(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.set_vector(text, vector);
        self
    }

    pub fn set_vector(&self, text: impl Into<String>, vector: Vec<f32>) {
        lock(&self.vectors).insert(text.into(), vector);
    }

    /// Fail the next `times` calls with a transient error.
    pub fn fail_next(&self, times: usize) {
        self.failures.set(times, false);
    }

    /// Number of `embed_texts` calls.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts embedded across all calls.
    pub fn embedded_count(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.failures.check("embedding")?;
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        let vectors = lock(&self.vectors);
        Ok(texts
            .iter()
            .map(|t| {
                let v = vectors
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| deterministic_vector(t, self.dimension));
                Vector::from(v)
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

// =============================================================================
// GENERATION
// =============================================================================

/// Generation backend returning queued or fixed responses.
#[derive(Clone)]
pub struct MockGenerationBackend {
    queued: Arc<Mutex<VecDeque<String>>>,
    default_response: Arc<Mutex<String>>,
    prompts: Arc<Mutex<Vec<String>>>,
    failures: Arc<FailurePlan>,
    delay: Option<std::time::Duration>,
}

impl MockGenerationBackend {
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            queued: Arc::new(Mutex::new(VecDeque::new())),
            default_response: Arc::new(Mutex::new(default_response.into())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(FailurePlan::default()),
            delay: None,
        }
    }

    /// Respond with `response` once, before falling back to the default.
    pub fn push_response(&self, response: impl Into<String>) {
        lock(&self.queued).push_back(response.into());
    }

    pub fn set_default_response(&self, response: impl Into<String>) {
        *lock(&self.default_response) = response.into();
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `times` calls with a transient error.
    pub fn fail_next(&self, times: usize) {
        self.failures.set(times, false);
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        lock(&self.prompts).push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.failures.check("generation")?;
        let next = lock(&self.queued).pop_front();
        Ok(next.unwrap_or_else(|| lock(&self.default_response).clone()))
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}

// =============================================================================
// TRANSCRIPTION, DIARIZATION, MEDIA
// =============================================================================

/// Transcription backend returning a fixed output.
#[derive(Clone)]
pub struct MockTranscriptionBackend {
    output: TranscriptionOutput,
    failures: Arc<FailurePlan>,
    calls: Arc<AtomicUsize>,
}

impl MockTranscriptionBackend {
    pub fn new(output: TranscriptionOutput) -> Self {
        Self {
            output,
            failures: Arc::new(FailurePlan::default()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A transcript of `lines`, one 5-second segment each.
    pub fn from_lines(lines: &[&str], speaker_count: Option<i32>) -> Self {
        let segments: Vec<TranscriptSegment> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| TranscriptSegment {
                start_secs: i as f64 * 5.0,
                end_secs: (i + 1) as f64 * 5.0,
                text: line.to_string(),
                speaker: None,
            })
            .collect();
        Self::new(TranscriptionOutput {
            transcript: lines.join(" "),
            segments,
            speaker_count,
            language: Some("en".to_string()),
            duration_secs: Some(lines.len() as f64 * 5.0),
        })
    }

    /// Fail the next `times` calls with a transient error.
    pub fn fail_next(&self, times: usize) {
        self.failures.set(times, false);
    }

    /// Reject the next `times` calls as unsupported input.
    pub fn reject_next(&self, times: usize) {
        self.failures.set(times, true);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionBackend for MockTranscriptionBackend {
    async fn transcribe(
        &self,
        _media: &[u8],
        _mime_type: &str,
        _language: Option<&str>,
    ) -> Result<TranscriptionOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.failures.check("transcription")?;
        Ok(self.output.clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "mock-whisper"
    }
}

/// Diarization backend that alternates speakers per segment.
#[derive(Clone, Default)]
pub struct MockDiarizationBackend {
    failures: Arc<FailurePlan>,
    calls: Arc<AtomicUsize>,
}

impl MockDiarizationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, times: usize) {
        self.failures.set(times, false);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiarizationBackend for MockDiarizationBackend {
    async fn diarize(
        &self,
        _media: &[u8],
        _mime_type: &str,
        segments: &[TranscriptSegment],
    ) -> Result<Vec<TranscriptSegment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.failures.check("diarization")?;
        let turns: Vec<SpeakerTurn> = segments
            .iter()
            .enumerate()
            .map(|(i, s)| SpeakerTurn {
                start: s.start_secs,
                end: s.end_secs,
                speaker: format!("SPEAKER_{:02}", i % 2),
            })
            .collect();
        Ok(assign_speakers(segments, &turns))
    }
}

/// Media fetcher serving in-memory payloads by location.
#[derive(Clone, Default)]
pub struct MockMediaFetcher {
    payloads: Arc<Mutex<HashMap<String, FetchedMedia>>>,
    failures: Arc<FailurePlan>,
}

impl MockMediaFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_media(self, location: impl Into<String>, bytes: Vec<u8>, mime_type: &str) -> Self {
        lock(&self.payloads).insert(
            location.into(),
            FetchedMedia {
                bytes,
                mime_type: mime_type.to_string(),
            },
        );
        self
    }

    pub fn fail_next(&self, times: usize) {
        self.failures.set(times, false);
    }
}

#[async_trait]
impl MediaFetcher for MockMediaFetcher {
    async fn fetch(&self, location: &str, _declared_mime: Option<&str>) -> Result<FetchedMedia> {
        self.failures.check("media fetch")?;
        let payload = lock(&self.payloads).get(location).cloned();
        let media = payload.ok_or_else(|| {
            Error::FatalInput(format!("media not found at {}", location))
        })?;
        if !(media.mime_type.starts_with("audio/") || media.mime_type.starts_with("video/")) {
            return Err(Error::UnsupportedMedia(media.mime_type));
        }
        Ok(media)
    }
}
