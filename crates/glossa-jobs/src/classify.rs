//! Failure classification.
//!
//! Maps collaborator error text and probe metadata to a typed `FailReason`.
//! Anything unrecognized stays unclassified and is only retried by the
//! verification sweep.

use chrono::{DateTime, Duration, Utc};

use glossa_core::{defaults, Error, FailReason, ProbeInfo};

/// Substring triggers in ascending precedence: when several match, the last
/// one in this table wins.
const MESSAGE_PATTERNS: &[(&str, FailReason)] = &[
    ("requires payment", FailReason::RequiresPayment),
    ("not available", FailReason::NotAvailable),
    ("live event will begin", FailReason::WillBegin),
    ("Private video", FailReason::PrivateVideo),
    ("This video may be inappropriate", FailReason::Inappropriate),
];

/// Classify raw collaborator error text.
pub fn classify_message(message: &str) -> Option<FailReason> {
    MESSAGE_PATTERNS
        .iter()
        .rev()
        .find(|(pattern, _)| message.contains(pattern))
        .map(|(_, reason)| *reason)
}

/// Classify an error returned by a collaborator.
///
/// Timeouts and infrastructure errors are never classified.
pub fn classify_error(error: &Error) -> Option<FailReason> {
    match error {
        Error::Extraction(_) | Error::Scoring(_) => classify_message(&error.collaborator_message()),
        _ => None,
    }
}

/// Decide from probe metadata alone whether a transfer should be skipped.
///
/// Live broadcasts are checked before duration: a live item fails as
/// `LIVE_STREAM`, or `LONG_LIVE_STREAM` once it has been running for a day.
pub fn classify_probe(
    probe: &ProbeInfo,
    max_duration_secs: i64,
    now: DateTime<Utc>,
) -> Option<FailReason> {
    if probe.live {
        let long_running = probe.release_time.is_some_and(|started| {
            now - started >= Duration::seconds(defaults::LONG_LIVE_STREAM_SECS)
        });
        return Some(if long_running {
            FailReason::LongLiveStream
        } else {
            FailReason::LiveStream
        });
    }
    match probe.duration_secs {
        Some(duration) if duration > max_duration_secs => Some(FailReason::TooLong),
        _ => None,
    }
}
