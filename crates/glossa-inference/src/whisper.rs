//! Language scoring against a Whisper language-detection service.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use glossa_core::{defaults, Error, Result, Scorer, Scores};

/// Whisper ASR webservice backend (`POST /detect-language`).
///
/// Every configured label appears in the returned scores; labels the service
/// did not report score `0.0`.
pub struct WhisperLanguageScorer {
    base_url: String,
    labels: Vec<String>,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl WhisperLanguageScorer {
    pub fn new(base_url: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            labels,
            client: reqwest::Client::new(),
            timeout_secs: defaults::SCORER_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables.
    ///
    /// `SCORE_LABELS` is a comma-separated list, e.g. `ru,en,uk`.
    pub fn from_env() -> Self {
        let base_url = std::env::var(defaults::ENV_SCORER_BASE_URL)
            .unwrap_or_else(|_| defaults::SCORER_BASE_URL.to_string());
        let labels = std::env::var(defaults::ENV_SCORE_LABELS)
            .ok()
            .map(|raw| parse_labels(&raw))
            .filter(|labels| !labels.is_empty())
            .unwrap_or_else(|| {
                defaults::SCORE_LABELS
                    .iter()
                    .map(|l| l.to_string())
                    .collect()
            });
        Self::new(base_url, labels)
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn project(&self, detected: HashMap<String, f64>) -> Scores {
        self.labels
            .iter()
            .map(|label| (label.clone(), detected.get(label).copied().unwrap_or(0.0)))
            .collect()
    }
}

fn parse_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Either a full probability table or a single best guess.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetectResponse {
    Probabilities {
        probabilities: HashMap<String, f64>,
    },
    Single {
        language_code: String,
        #[serde(default = "full_confidence")]
        confidence: f64,
    },
}

fn full_confidence() -> f64 {
    1.0
}

impl DetectResponse {
    fn into_map(self) -> HashMap<String, f64> {
        match self {
            DetectResponse::Probabilities { probabilities } => probabilities,
            DetectResponse::Single {
                language_code,
                confidence,
            } => HashMap::from([(language_code, confidence)]),
        }
    }
}

#[async_trait]
impl Scorer for WhisperLanguageScorer {
    async fn score(&self, payload: &Path) -> Result<Scores> {
        let start = Instant::now();
        let url = format!("{}/detect-language", self.base_url);

        let bytes = tokio::fs::read(payload).await.map_err(|e| {
            Error::Scoring(format!("failed to read payload {}: {}", payload.display(), e))
        })?;
        let size_bytes = bytes.len();

        let file_name = payload
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| Error::Internal(format!("Failed to create multipart: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("audio_file", part);

        let response = self
            .client
            .post(&url)
            .query(&[("encode", "true")])
            .multipart(form)
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Scoring(format!("Language detection request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                subsystem = "inference",
                component = "whisper",
                status = status.as_u16(),
                "Language detection service returned an error"
            );
            return Err(Error::Scoring(format!(
                "Language detection returned {}: {}",
                status, body
            )));
        }

        let detected: DetectResponse = response.json().await.map_err(|e| {
            Error::Scoring(format!("Failed to parse language detection response: {}", e))
        })?;
        let scores = self.project(detected.into_map());

        debug!(
            subsystem = "inference",
            component = "whisper",
            op = "score",
            payload_bytes = size_bytes,
            duration_ms = start.elapsed().as_millis() as u64,
            scores = ?scores,
            "Language scores computed"
        );
        Ok(scores)
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
        "whisper"
    }
}
