//! Ollama backend against a mock HTTP server.

#![cfg(feature = "ollama")]

use sift_inference::{EmbeddingBackend, GenerationBackend, OllamaBackend};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer, dimension: usize) -> OllamaBackend {
    OllamaBackend::with_config(
        server.uri(),
        "test-embed".to_string(),
        "test-gen".to_string(),
        dimension,
    )
}

#[tokio::test]
async fn test_embed_texts_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(serde_json::json!({
            "model": "test-embed",
            "input": ["first", "second"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let vectors = backend(&server, 3)
        .embed_texts(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[1].as_slice(), &[0.4, 0.5, 0.6]);
}

#[tokio::test]
async fn test_embed_dimension_mismatch_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.1, 0.2]]
        })))
        .mount(&server)
        .await;

    let err = backend(&server, 3)
        .embed_texts(&["x".to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("dimension"));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
        .mount(&server)
        .await;

    let err = backend(&server, 3)
        .embed_texts(&["x".to_string()])
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_generate_json_requests_json_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({
            "model": "test-gen",
            "format": "json",
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"role": "assistant", "content": "{\"summary\": \"ok\"}"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let content = backend(&server, 3)
        .generate_json("system", "prompt")
        .await
        .unwrap();
    assert_eq!(content, "{\"summary\": \"ok\"}");
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"models": []})))
        .mount(&server)
        .await;

    assert!(backend(&server, 3).health_check().await.unwrap());
}
