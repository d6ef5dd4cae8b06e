//! Domain models for the glossa work queue.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Surrogate key of a work item, assigned at creation in insertion order.
pub type ItemId = i64;

/// Label → confidence mapping produced by the scoring stage.
pub type Scores = BTreeMap<String, f64>;

// =============================================================================
// STATES
// =============================================================================

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    /// Submitted, waiting for a fetch worker.
    Init,
    /// Claimed by a fetch worker.
    Fetching,
    /// Payload is on the fetching worker's local storage.
    Fetched,
    /// Claimed by a score worker.
    Scoring,
    /// Scores are cached. Terminal.
    Scored,
    /// Failed, possibly with a typed reason. Terminal until reset.
    Failed,
}

impl ItemState {
    /// Every state, in pipeline order.
    pub const ALL: [ItemState; 6] = [
        ItemState::Init,
        ItemState::Fetching,
        ItemState::Fetched,
        ItemState::Scoring,
        ItemState::Scored,
        ItemState::Failed,
    ];

    /// States that tie an item to a specific worker process.
    pub const RECOVERABLE: [ItemState; 3] =
        [ItemState::Fetching, ItemState::Fetched, ItemState::Scoring];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Init => "INIT",
            ItemState::Fetching => "FETCHING",
            ItemState::Fetched => "FETCHED",
            ItemState::Scoring => "SCORING",
            ItemState::Scored => "SCORED",
            ItemState::Failed => "FAILED",
        }
    }

    /// `SCORED` and `FAILED` do not count towards queue depth.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Scored | ItemState::Failed)
    }

    /// States in which `owner` must be set.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, ItemState::Fetching | ItemState::Scoring)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ItemState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown item state: {s}")))
    }
}

// =============================================================================
// FAILURE REASONS
// =============================================================================

/// Whether a classified failure becomes eligible again on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Terminal; only an operator can bring it back.
    Never,
    /// Reactivated by a resubmission once the reactivation window has passed.
    AfterWindow,
}

/// Closed set of typed failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailReason {
    TooLong,
    LiveStream,
    LongLiveStream,
    RequiresPayment,
    NotAvailable,
    WillBegin,
    PrivateVideo,
    Inappropriate,
}

impl FailReason {
    pub const ALL: [FailReason; 8] = [
        FailReason::TooLong,
        FailReason::LiveStream,
        FailReason::LongLiveStream,
        FailReason::RequiresPayment,
        FailReason::NotAvailable,
        FailReason::WillBegin,
        FailReason::PrivateVideo,
        FailReason::Inappropriate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::TooLong => "TOO_LONG",
            FailReason::LiveStream => "LIVE_STREAM",
            FailReason::LongLiveStream => "LONG_LIVE_STREAM",
            FailReason::RequiresPayment => "REQUIRES_PAYMENT",
            FailReason::NotAvailable => "NOT_AVAILABLE",
            FailReason::WillBegin => "WILL_BEGIN",
            FailReason::PrivateVideo => "PRIVATE_VIDEO",
            FailReason::Inappropriate => "INAPPROPRIATE",
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            FailReason::TooLong | FailReason::LongLiveStream | FailReason::Inappropriate => {
                RetryPolicy::Never
            }
            FailReason::LiveStream
            | FailReason::RequiresPayment
            | FailReason::NotAvailable
            | FailReason::WillBegin
            | FailReason::PrivateVideo => RetryPolicy::AfterWindow,
        }
    }

    /// Reasons that resubmission may reactivate.
    pub fn timed_retry() -> Vec<FailReason> {
        FailReason::ALL
            .iter()
            .copied()
            .filter(|r| r.retry_policy() == RetryPolicy::AfterWindow)
            .collect()
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FailReason::ALL
            .iter()
            .copied()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown fail reason: {s}")))
    }
}

// =============================================================================
// WORK ITEM
// =============================================================================

/// One unit of the pipeline's backlog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    pub source_key: String,
    pub state: ItemState,
    /// Worker currently processing the item; only set while in progress.
    pub owner: Option<String>,
    /// Worker whose local storage holds the payload.
    pub fetched_by: Option<String>,
    pub fail_reason: Option<FailReason>,
    pub duration_secs: Option<i64>,
    pub scores: Option<Scores>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// A failed item whose reason allows automatic retry and whose last
    /// update is older than the reactivation window.
    pub fn is_reactivatable(&self, now: DateTime<Utc>) -> bool {
        self.state == ItemState::Failed
            && self
                .fail_reason
                .is_some_and(|r| r.retry_policy() == RetryPolicy::AfterWindow)
            && now - self.updated_at > reactivation_window()
    }
}

/// Window after which timed-retry failures may be reactivated.
pub fn reactivation_window() -> Duration {
    Duration::seconds(defaults::REACTIVATION_WINDOW_SECS)
}

/// Reject keys that are empty, too long, or carry characters unsafe in a file
/// name. A leading `-` is allowed; the extractor ends its options with `--`.
pub fn validate_source_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidInput("source key is empty".into()));
    }
    if key.len() > defaults::SOURCE_KEY_MAX_LEN {
        return Err(Error::InvalidInput(format!(
            "source key exceeds {} characters",
            defaults::SOURCE_KEY_MAX_LEN
        )));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidInput(format!(
            "source key contains invalid characters: {key}"
        )));
    }
    Ok(())
}

// =============================================================================
// STAGES & CLAIMS
// =============================================================================

/// One pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Score,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Score => "score",
        }
    }

    /// States this stage claims from.
    pub fn eligible_states(&self) -> &'static [ItemState] {
        match self {
            Stage::Fetch => &[ItemState::Init],
            Stage::Score => &[ItemState::Fetched],
        }
    }

    /// In-progress state an item enters when this stage claims it.
    pub fn claimed_state(&self) -> ItemState {
        match self {
            Stage::Fetch => ItemState::Fetching,
            Stage::Score => ItemState::Scoring,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one atomic claim.
///
/// The store always serves the oldest-created eligible item first, breaking
/// ties by surrogate key.
#[derive(Debug, Clone, Copy)]
pub struct ClaimRequest<'a> {
    /// States an item may be claimed from.
    pub eligible: &'a [ItemState],
    /// State the claimed item moves to.
    pub claimed_state: ItemState,
    /// Identity recorded as `owner`.
    pub worker_id: &'a str,
    /// Only claim items whose payload was fetched by this worker.
    pub fetched_by: Option<&'a str>,
}

impl<'a> ClaimRequest<'a> {
    /// Claim request for a pipeline stage. Score claims are pinned to the
    /// worker that fetched the payload.
    pub fn for_stage(stage: Stage, worker_id: &'a str) -> Self {
        Self {
            eligible: stage.eligible_states(),
            claimed_state: stage.claimed_state(),
            worker_id,
            fetched_by: match stage {
                Stage::Fetch => None,
                Stage::Score => Some(worker_id),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.eligible.is_empty() {
            return Err(Error::InvalidInput("claim needs at least one eligible state".into()));
        }
        if !self.claimed_state.is_in_progress() {
            return Err(Error::InvalidInput(format!(
                "claimed state must be in progress, got {}",
                self.claimed_state
            )));
        }
        if self.eligible.iter().any(|s| s.is_in_progress()) {
            return Err(Error::InvalidInput(
                "items already in progress cannot be claimed".into(),
            ));
        }
        if self.worker_id.is_empty() {
            return Err(Error::InvalidInput("worker id is empty".into()));
        }
        Ok(())
    }
}

/// Fields persisted when a worker finishes with an item.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub state: ItemState,
    pub fail_reason: Option<FailReason>,
    /// Written when known; an existing duration is kept otherwise.
    pub duration_secs: Option<i64>,
    pub scores: Option<Scores>,
}

impl Completion {
    pub fn fetched(duration_secs: Option<i64>) -> Self {
        Self {
            state: ItemState::Fetched,
            fail_reason: None,
            duration_secs,
            scores: None,
        }
    }

    pub fn scored(scores: Scores) -> Self {
        Self {
            state: ItemState::Scored,
            fail_reason: None,
            duration_secs: None,
            scores: Some(scores),
        }
    }

    pub fn failed(fail_reason: Option<FailReason>, duration_secs: Option<i64>) -> Self {
        Self {
            state: ItemState::Failed,
            fail_reason,
            duration_secs,
            scores: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.state {
            ItemState::Fetched => {
                if self.fail_reason.is_some() || self.scores.is_some() {
                    return Err(Error::InvalidInput(
                        "FETCHED completion carries no reason or scores".into(),
                    ));
                }
            }
            ItemState::Scored => {
                if self.fail_reason.is_some() {
                    return Err(Error::InvalidInput("SCORED completion has a fail reason".into()));
                }
                match &self.scores {
                    Some(scores) if !scores.is_empty() => {}
                    _ => {
                        return Err(Error::InvalidInput(
                            "SCORED completion requires scores".into(),
                        ))
                    }
                }
            }
            ItemState::Failed => {
                if self.scores.is_some() {
                    return Err(Error::InvalidInput("FAILED completion carries scores".into()));
                }
            }
            other => {
                return Err(Error::InvalidInput(format!(
                    "cannot complete an item into {other}"
                )))
            }
        }
        Ok(())
    }
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub item: WorkItem,
    /// Items not yet in a terminal state, including this one if pending.
    pub queue_depth: i64,
    /// The submission reset a timed-retry failure back to `INIT`.
    pub reactivated: bool,
}

/// Per-state item counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub init: i64,
    pub fetching: i64,
    pub fetched: i64,
    pub scoring: i64,
    pub scored: i64,
    pub failed: i64,
    /// Failed items with no classified reason (verification-sweep candidates).
    pub failed_unclassified: i64,
}

impl QueueStats {
    /// Record `count` items in `state`.
    pub fn add(&mut self, state: ItemState, count: i64) {
        match state {
            ItemState::Init => self.init += count,
            ItemState::Fetching => self.fetching += count,
            ItemState::Fetched => self.fetched += count,
            ItemState::Scoring => self.scoring += count,
            ItemState::Scored => self.scored += count,
            ItemState::Failed => self.failed += count,
        }
    }

    /// Items not yet terminal.
    pub fn depth(&self) -> i64 {
        self.init + self.fetching + self.fetched + self.scoring
    }

    pub fn total(&self) -> i64 {
        self.depth() + self.scored + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(state: ItemState, reason: Option<FailReason>, age: Duration) -> WorkItem {
        let now = Utc::now();
        WorkItem {
            id: 1,
            source_key: "abc".to_string(),
            state,
            owner: None,
            fetched_by: None,
            fail_reason: reason,
            duration_secs: None,
            scores: None,
            created_at: now - age,
            updated_at: now - age,
        }
    }

    #[test]
    fn test_state_round_trip_strings() {
        for state in ItemState::ALL {
            assert_eq!(state.as_str().parse::<ItemState>().unwrap(), state);
        }
        assert!("DOWNLOAD".parse::<ItemState>().is_err());
    }

    #[test]
    fn test_state_serde_matches_as_str() {
        let json = serde_json::to_string(&ItemState::Fetched).unwrap();
        assert_eq!(json, "\"FETCHED\"");
    }

    #[test]
    fn test_terminal_and_in_progress_are_disjoint() {
        for state in ItemState::ALL {
            assert!(!(state.is_terminal() && state.is_in_progress()));
        }
        assert!(ItemState::Scored.is_terminal());
        assert!(ItemState::Failed.is_terminal());
        assert!(ItemState::Fetching.is_in_progress());
        assert!(ItemState::Scoring.is_in_progress());
        assert!(!ItemState::Fetched.is_in_progress());
    }

    #[test]
    fn test_retry_policies() {
        assert_eq!(FailReason::TooLong.retry_policy(), RetryPolicy::Never);
        assert_eq!(FailReason::LongLiveStream.retry_policy(), RetryPolicy::Never);
        assert_eq!(FailReason::Inappropriate.retry_policy(), RetryPolicy::Never);
        assert_eq!(
            FailReason::timed_retry(),
            vec![
                FailReason::LiveStream,
                FailReason::RequiresPayment,
                FailReason::NotAvailable,
                FailReason::WillBegin,
                FailReason::PrivateVideo,
            ]
        );
    }

    #[test]
    fn test_fail_reason_strings() {
        assert_eq!(FailReason::LongLiveStream.as_str(), "LONG_LIVE_STREAM");
        assert_eq!(
            "PRIVATE_VIDEO".parse::<FailReason>().unwrap(),
            FailReason::PrivateVideo
        );
        assert!("private_video".parse::<FailReason>().is_err());
    }

    #[test]
    fn test_reactivation_requires_timed_reason_and_age() {
        let now = Utc::now();
        let old = item(
            ItemState::Failed,
            Some(FailReason::PrivateVideo),
            Duration::hours(25),
        );
        assert!(old.is_reactivatable(now));

        let fresh = item(
            ItemState::Failed,
            Some(FailReason::PrivateVideo),
            Duration::hours(1),
        );
        assert!(!fresh.is_reactivatable(now));

        let permanent = item(ItemState::Failed, Some(FailReason::TooLong), Duration::days(30));
        assert!(!permanent.is_reactivatable(now));

        let unclassified = item(ItemState::Failed, None, Duration::days(30));
        assert!(!unclassified.is_reactivatable(now));

        let scored = item(ItemState::Scored, None, Duration::days(30));
        assert!(!scored.is_reactivatable(now));
    }

    #[test]
    fn test_validate_source_key() {
        assert!(validate_source_key("5jeezDV1Cik").is_ok());
        assert!(validate_source_key("a_b-c").is_ok());
        assert!(validate_source_key("").is_err());
        assert!(validate_source_key("-5jeezDV1Ci").is_ok());
        assert!(validate_source_key("a b").is_err());
        assert!(validate_source_key("../etc").is_err());
        assert!(validate_source_key(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_stage_mapping() {
        assert_eq!(Stage::Fetch.eligible_states(), &[ItemState::Init]);
        assert_eq!(Stage::Fetch.claimed_state(), ItemState::Fetching);
        assert_eq!(Stage::Score.eligible_states(), &[ItemState::Fetched]);
        assert_eq!(Stage::Score.claimed_state(), ItemState::Scoring);
    }

    #[test]
    fn test_claim_request_pins_score_stage() {
        let fetch = ClaimRequest::for_stage(Stage::Fetch, "node-a");
        assert_eq!(fetch.fetched_by, None);
        let score = ClaimRequest::for_stage(Stage::Score, "node-a");
        assert_eq!(score.fetched_by, Some("node-a"));
        assert!(fetch.validate().is_ok());
        assert!(score.validate().is_ok());
    }

    #[test]
    fn test_claim_request_validation() {
        let bad = ClaimRequest {
            eligible: &[ItemState::Init],
            claimed_state: ItemState::Fetched,
            worker_id: "w",
            fetched_by: None,
        };
        assert!(bad.validate().is_err());

        let bad = ClaimRequest {
            eligible: &[ItemState::Fetching],
            claimed_state: ItemState::Scoring,
            worker_id: "w",
            fetched_by: None,
        };
        assert!(bad.validate().is_err());

        let bad = ClaimRequest {
            eligible: &[],
            claimed_state: ItemState::Fetching,
            worker_id: "w",
            fetched_by: None,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_completion_validation() {
        let mut scores = Scores::new();
        scores.insert("en".into(), 0.9);

        assert!(Completion::fetched(Some(10)).validate().is_ok());
        assert!(Completion::scored(scores).validate().is_ok());
        assert!(Completion::scored(Scores::new()).validate().is_err());
        assert!(Completion::failed(None, None).validate().is_ok());
        assert!(Completion::failed(Some(FailReason::TooLong), Some(20_000))
            .validate()
            .is_ok());

        let into_progress = Completion {
            state: ItemState::Scoring,
            fail_reason: None,
            duration_secs: None,
            scores: None,
        };
        assert!(into_progress.validate().is_err());
    }

    #[test]
    fn test_queue_stats_depth() {
        let mut stats = QueueStats::default();
        stats.add(ItemState::Init, 3);
        stats.add(ItemState::Fetched, 2);
        stats.add(ItemState::Scored, 5);
        stats.add(ItemState::Failed, 1);
        assert_eq!(stats.depth(), 5);
        assert_eq!(stats.total(), 11);
    }
}
