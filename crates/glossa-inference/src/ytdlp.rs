//! Extraction via the yt-dlp command-line tool.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use glossa_core::{defaults, Error, Extractor, ProbeInfo, Result};

/// Runs `yt-dlp` as a subprocess.
///
/// Failures surface as `Error::Extraction` with the tool's stderr so the
/// failure classifier sees the original wording.
pub struct YtDlpExtractor {
    program: String,
    format: String,
}

impl YtDlpExtractor {
    pub fn new(program: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            format: format.into(),
        }
    }

    /// Create from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let program = std::env::var(defaults::ENV_YTDLP_PATH)
            .unwrap_or_else(|_| defaults::YTDLP_PATH.to_string());
        let format = std::env::var(defaults::ENV_YTDLP_FORMAT)
            .unwrap_or_else(|_| defaults::YTDLP_FORMAT.to_string());
        Self::new(program, format)
    }

    /// Run the tool and return stdout, or its stderr as the error text.
    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Extraction(format!("failed to execute {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                subsystem = "inference",
                component = "ytdlp",
                exit_code = output.status.code(),
                stderr = %stderr,
                "yt-dlp exited with failure"
            );
            return Err(Error::Extraction(if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            }));
        }

        Ok(output.stdout)
    }
}

/// The subset of `--dump-json` output the pipeline reads.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    live_status: Option<String>,
    #[serde(default)]
    is_live: Option<bool>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    release_timestamp: Option<i64>,
}

impl YtDlpInfo {
    fn into_probe(self) -> ProbeInfo {
        let live = match self.live_status.as_deref() {
            Some(status) => status == "is_live",
            None => self.is_live.unwrap_or(false),
        };
        ProbeInfo {
            live,
            duration_secs: self.duration.map(|d| d.round() as i64),
            release_time: self
                .release_timestamp
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        }
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn probe(&self, source_key: &str) -> Result<ProbeInfo> {
        let stdout = self
            .run(&["--dump-json", "--skip-download", "--no-playlist", "--", source_key])
            .await?;
        let info: YtDlpInfo = serde_json::from_slice(&stdout)?;
        let probe = info.into_probe();

        debug!(
            subsystem = "inference",
            component = "ytdlp",
            op = "probe",
            source_key,
            live = probe.live,
            duration_secs = probe.duration_secs,
            "Probed source item"
        );
        Ok(probe)
    }

    async fn fetch(&self, source_key: &str, destination: &Path) -> Result<()> {
        let start = Instant::now();
        let dest = destination.to_string_lossy();

        self.run(&[
            "--format",
            &self.format,
            "--output",
            &dest,
            "--no-playlist",
            "--no-progress",
            "--",
            source_key,
        ])
        .await?;

        info!(
            subsystem = "inference",
            component = "ytdlp",
            op = "fetch",
            source_key,
            path = %destination.display(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Payload fetched"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "yt-dlp"
    }
}
