//! Integration tests for the Whisper language scorer against a mock server.

use glossa_inference::{Error, Scorer, WhisperLanguageScorer};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn labels() -> Vec<String> {
    vec!["ru".to_string(), "en".to_string(), "uk".to_string()]
}

fn payload() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("5jeezDV1Cik");
    std::fs::write(&file, b"OggS fake audio").unwrap();
    (dir, file)
}

#[tokio::test]
async fn test_score_posts_payload_and_projects_labels() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/detect-language"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "probabilities": {"ru": 0.62, "uk": 0.31, "pl": 0.04}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (_dir, file) = payload();
    let scorer = WhisperLanguageScorer::new(mock_server.uri(), labels());
    let scores = scorer.score(&file).await.unwrap();

    assert_eq!(scores.len(), 3);
    assert_eq!(scores["ru"], 0.62);
    assert_eq!(scores["uk"], 0.31);
    assert_eq!(scores["en"], 0.0);

    let requests = mock_server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"audio_file\""));
    assert!(body.contains("OggS fake audio"));
}

#[tokio::test]
async fn test_score_accepts_single_language_answer() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/detect-language"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "detected_language": "english",
            "language_code": "en",
            "confidence": 0.88
        })))
        .mount(&mock_server)
        .await;

    let (_dir, file) = payload();
    let scorer = WhisperLanguageScorer::new(mock_server.uri(), labels());
    let scores = scorer.score(&file).await.unwrap();

    assert_eq!(scores["en"], 0.88);
    assert_eq!(scores["ru"], 0.0);
}

#[tokio::test]
async fn test_score_server_error_is_scoring_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/detect-language"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&mock_server)
        .await;

    let (_dir, file) = payload();
    let scorer = WhisperLanguageScorer::new(mock_server.uri(), labels());
    let err = scorer.score(&file).await.unwrap_err();

    assert!(matches!(err, Error::Scoring(_)));
    assert!(err.collaborator_message().contains("model crashed"));
}

#[tokio::test]
async fn test_score_missing_payload_skips_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let scorer = WhisperLanguageScorer::new(mock_server.uri(), labels());
    let err = scorer.score(&dir.path().join("missing")).await.unwrap_err();
    assert!(matches!(err, Error::Scoring(_)));
}

#[tokio::test]
async fn test_health_check() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let scorer = WhisperLanguageScorer::new(mock_server.uri(), labels());
    assert!(scorer.health_check().await.unwrap());

    let unreachable = WhisperLanguageScorer::new("http://127.0.0.1:1", labels());
    assert!(!unreachable.health_check().await.unwrap());
}
