//! Centralized default constants for the glossa pipeline.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 5000;

/// Default HTTP bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default CORS max-age in seconds (1 hour).
pub const CORS_MAX_AGE_SECS: u64 = 3600;

// =============================================================================
// WORK ITEMS
// =============================================================================

/// Longest accepted source key.
pub const SOURCE_KEY_MAX_LEN: usize = 64;

/// Media longer than this (seconds) fails with `TOO_LONG` without a transfer.
pub const MAX_DURATION_SECS: i64 = 60 * 60 * 5;

/// A live broadcast that started at least this long ago is `LONG_LIVE_STREAM`.
pub const LONG_LIVE_STREAM_SECS: i64 = 60 * 60 * 24;

/// Elapsed time after which a timed-retry failure may be reactivated.
pub const REACTIVATION_WINDOW_SECS: i64 = 60 * 60 * 24;

/// Labels reported for every scored item.
pub const SCORE_LABELS: &[&str] = &["ru", "en", "uk"];

// =============================================================================
// WORKERS
// =============================================================================

/// Poll interval between claim attempts in milliseconds.
pub const POLL_INTERVAL_MS: u64 = 500;

/// Concurrent fetch loops per process.
pub const FETCH_WORKERS: usize = 2;

/// Concurrent score loops per process.
pub const SCORE_WORKERS: usize = 2;

/// Per-worker ceiling on items held in `FETCHED`.
pub const FETCHED_CEILING: i64 = 100;

/// Default worker event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Default local payload directory.
pub const STORAGE_ROOT: &str = "/var/lib/glossa/payloads";

// =============================================================================
// COLLABORATORS
// =============================================================================

/// Default yt-dlp executable.
pub const YTDLP_PATH: &str = "yt-dlp";

/// Default yt-dlp format selector (audio only).
pub const YTDLP_FORMAT: &str = "opus/bestaudio/best";

/// Default language-detection service URL.
pub const SCORER_BASE_URL: &str = "http://127.0.0.1:9000";

/// Timeout for a single scoring request in seconds.
pub const SCORER_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

pub const ENV_WORKER_ID: &str = "WORKER_ID";
pub const ENV_WORKER_ENABLED: &str = "WORKER_ENABLED";
pub const ENV_STORAGE_ROOT: &str = "STORAGE_ROOT";
pub const ENV_FETCH_WORKERS: &str = "FETCH_WORKERS";
pub const ENV_SCORE_WORKERS: &str = "SCORE_WORKERS";
pub const ENV_POLL_INTERVAL_MS: &str = "POLL_INTERVAL_MS";
pub const ENV_FETCHED_CEILING: &str = "FETCHED_CEILING";
pub const ENV_MAX_DURATION_SECS: &str = "MAX_DURATION_SECS";
pub const ENV_COLLABORATOR_TIMEOUT_SECS: &str = "COLLABORATOR_TIMEOUT_SECS";
pub const ENV_YTDLP_PATH: &str = "YTDLP_PATH";
pub const ENV_YTDLP_FORMAT: &str = "YTDLP_FORMAT";
pub const ENV_SCORER_BASE_URL: &str = "SCORER_BASE_URL";
pub const ENV_SCORE_LABELS: &str = "SCORE_LABELS";
