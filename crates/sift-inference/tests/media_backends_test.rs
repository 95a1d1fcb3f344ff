//! Whisper, diarization and media fetching against a mock HTTP server.

use sift_inference::{
    DiarizationBackend, HttpDiarizationBackend, HttpMediaFetcher, MediaFetcher,
    TranscriptSegment, TranscriptionBackend, WhisperBackend,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt \x10\x00\x00\x00";

#[tokio::test]
async fn test_whisper_transcribe() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "text": "We will migrate to Postgres.",
            "language": "en",
            "duration": 4.0,
            "segments": [{"start": 0.0, "end": 4.0, "text": "We will migrate to Postgres."}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = WhisperBackend::new(server.uri(), "whisper-1".to_string());
    let output = backend.transcribe(WAV, "audio/x-wav", Some("en")).await.unwrap();
    assert_eq!(output.transcript, "We will migrate to Postgres.");
    assert_eq!(output.segments.len(), 1);
    assert_eq!(output.duration_secs, Some(4.0));
}

#[tokio::test]
async fn test_whisper_rejected_media_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(415).set_body_string("cannot decode"))
        .mount(&server)
        .await;

    let backend = WhisperBackend::new(server.uri(), "whisper-1".to_string());
    let err = backend.transcribe(WAV, "audio/x-wav", None).await.unwrap_err();
    assert!(err.is_fatal_input());
}

#[tokio::test]
async fn test_whisper_overloaded_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let backend = WhisperBackend::new(server.uri(), "whisper-1".to_string());
    let err = backend.transcribe(WAV, "audio/x-wav", None).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_diarization_labels_segments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/diarize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "turns": [
                {"start": 0.0, "end": 3.0, "speaker": "SPEAKER_00"},
                {"start": 3.0, "end": 8.0, "speaker": "SPEAKER_01"}
            ]
        })))
        .mount(&server)
        .await;

    let segments = vec![
        TranscriptSegment {
            start_secs: 0.0,
            end_secs: 3.0,
            text: "Hi".to_string(),
            speaker: None,
        },
        TranscriptSegment {
            start_secs: 3.0,
            end_secs: 8.0,
            text: "Hello".to_string(),
            speaker: None,
        },
    ];
    let labeled = HttpDiarizationBackend::new(server.uri())
        .diarize(WAV, "audio/x-wav", &segments)
        .await
        .unwrap();
    assert_eq!(labeled[0].speaker.as_deref(), Some("SPEAKER_00"));
    assert_eq!(labeled[1].speaker.as_deref(), Some("SPEAKER_01"));
}

#[tokio::test]
async fn test_fetch_sniffs_audio() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/call.wav"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/octet-stream")
                .set_body_bytes(WAV),
        )
        .mount(&server)
        .await;

    let media = HttpMediaFetcher::new()
        .fetch(&format!("{}/call.wav", server.uri()), None)
        .await
        .unwrap();
    assert_eq!(media.mime_type, "audio/x-wav");
    assert_eq!(media.bytes, WAV);
}

#[tokio::test]
async fn test_fetch_missing_media_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.mp3"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = HttpMediaFetcher::new()
        .fetch(&format!("{}/gone.mp3", server.uri()), Some("audio/mpeg"))
        .await
        .unwrap_err();
    assert!(err.is_fatal_input());
}

#[tokio::test]
async fn test_fetch_non_http_location_is_fatal() {
    let err = HttpMediaFetcher::new()
        .fetch("s3://bucket/key.mp3", None)
        .await
        .unwrap_err();
    assert!(err.is_fatal_input());
}
