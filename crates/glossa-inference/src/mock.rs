//! Mock collaborators for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use glossa_inference::mock::{MockExtractor, MockScorer};
//!
//! let extractor = MockExtractor::new()
//!     .with_duration(600)
//!     .with_fetch_error("abc", "ERROR: [youtube] abc: Private video");
//! let scorer = MockScorer::new().with_score("ru", 0.9);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use glossa_core::{Error, Extractor, ProbeInfo, Result, Scorer, Scores};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone)]
pub enum MockCall {
    Probe(String),
    Fetch(String, PathBuf),
    Score(PathBuf),
}

#[derive(Debug, Clone, Default)]
struct ExtractorConfig {
    default_probe: ProbeInfo,
    probes: HashMap<String, ProbeInfo>,
    probe_errors: HashMap<String, String>,
    fetch_errors: HashMap<String, String>,
    payload: Vec<u8>,
    latency: Duration,
}

/// Extractor that writes a fixed payload and answers probes from a table.
#[derive(Clone)]
pub struct MockExtractor {
    config: Arc<ExtractorConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    pub fn new() -> Self {
        let mut config = ExtractorConfig::default();
        config.default_probe.duration_secs = Some(60);
        config.payload = b"mock-audio".to_vec();
        Self {
            config: Arc::new(config),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Duration reported for keys without a dedicated probe.
    pub fn with_duration(mut self, secs: i64) -> Self {
        Arc::make_mut(&mut self.config).default_probe.duration_secs = Some(secs);
        self
    }

    pub fn with_probe(mut self, source_key: impl Into<String>, probe: ProbeInfo) -> Self {
        Arc::make_mut(&mut self.config)
            .probes
            .insert(source_key.into(), probe);
        self
    }

    pub fn with_probe_error(
        mut self,
        source_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .probe_errors
            .insert(source_key.into(), message.into());
        self
    }

    pub fn with_fetch_error(
        mut self,
        source_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .fetch_errors
            .insert(source_key.into(), message.into());
        self
    }

    /// Simulated latency for every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = latency;
        self
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        lock(&self.call_log).clone()
    }

    pub fn fetch_call_count(&self) -> usize {
        lock(&self.call_log)
            .iter()
            .filter(|c| matches!(c, MockCall::Fetch(..)))
            .count()
    }

    async fn pause(&self) {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn probe(&self, source_key: &str) -> Result<ProbeInfo> {
        lock(&self.call_log).push(MockCall::Probe(source_key.to_string()));
        self.pause().await;
        if let Some(message) = self.config.probe_errors.get(source_key) {
            return Err(Error::Extraction(message.clone()));
        }
        Ok(self
            .config
            .probes
            .get(source_key)
            .cloned()
            .unwrap_or_else(|| self.config.default_probe.clone()))
    }

    async fn fetch(&self, source_key: &str, destination: &Path) -> Result<()> {
        lock(&self.call_log).push(MockCall::Fetch(
            source_key.to_string(),
            destination.to_path_buf(),
        ));
        self.pause().await;
        if let Some(message) = self.config.fetch_errors.get(source_key) {
            return Err(Error::Extraction(message.clone()));
        }
        tokio::fs::write(destination, &self.config.payload).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Debug, Clone)]
struct ScorerConfig {
    scores: Scores,
    error: Option<String>,
    latency: Duration,
}

/// Scorer that returns fixed scores.
#[derive(Clone)]
pub struct MockScorer {
    config: Arc<ScorerConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl Default for MockScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScorer {
    /// Defaults to a confident `ru` result over the stock labels.
    pub fn new() -> Self {
        let scores = Scores::from([
            ("ru".to_string(), 0.9),
            ("en".to_string(), 0.05),
            ("uk".to_string(), 0.05),
        ]);
        Self {
            config: Arc::new(ScorerConfig {
                scores,
                error: None,
                latency: Duration::ZERO,
            }),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_score(mut self, label: impl Into<String>, score: f64) -> Self {
        Arc::make_mut(&mut self.config)
            .scores
            .insert(label.into(), score);
        self
    }

    /// Fail every call with `message`.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).error = Some(message.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = latency;
        self
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        lock(&self.call_log).clone()
    }

    pub fn score_call_count(&self) -> usize {
        lock(&self.call_log).len()
    }
}

#[async_trait]
impl Scorer for MockScorer {
    async fn score(&self, payload: &Path) -> Result<Scores> {
        lock(&self.call_log).push(MockCall::Score(payload.to_path_buf()));
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        if let Some(message) = &self.config.error {
            return Err(Error::Scoring(message.clone()));
        }
        if !tokio::fs::try_exists(payload).await? {
            return Err(Error::Scoring(format!(
                "payload not found: {}",
                payload.display()
            )));
        }
        Ok(self.config.scores.clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.config.error.is_none())
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
