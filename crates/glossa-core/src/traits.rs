//! Core traits for glossa abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy: the job store, and the two pipeline collaborators.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::*;

// =============================================================================
// JOB STORE
// =============================================================================

/// Durable table of work items.
///
/// Every mutation is atomic; `claim_next` must never hand the same item to
/// two callers regardless of how many processes share the store.
#[async_trait]
pub trait WorkItemRepository: Send + Sync {
    /// Return the item for `source_key`, creating it in `INIT` if absent.
    ///
    /// A failed item with a timed-retry reason older than the reactivation
    /// window is reset to `INIT` as part of the call.
    async fn submit(&self, source_key: &str) -> Result<SubmitOutcome>;

    /// Read-only fetch by external key.
    async fn lookup(&self, source_key: &str) -> Result<Option<WorkItem>>;

    /// Read-only fetch by surrogate key.
    async fn get(&self, id: ItemId) -> Result<Option<WorkItem>>;

    /// Atomically take ownership of the oldest eligible item.
    async fn claim_next(&self, request: &ClaimRequest<'_>) -> Result<Option<WorkItem>>;

    /// Persist a worker's result and release ownership.
    ///
    /// Fails with `Error::OwnershipLost` when `worker_id` no longer holds the
    /// item in an in-progress state.
    async fn complete(
        &self,
        id: ItemId,
        worker_id: &str,
        completion: &Completion,
    ) -> Result<WorkItem>;

    /// Move every item in `states` to `target`, clearing ownership.
    async fn bulk_reset(&self, states: &[ItemState], target: ItemState) -> Result<u64>;

    /// Reset `FAILED` items without a classified reason back to `INIT`.
    async fn reset_unclassified_failures(&self) -> Result<u64>;

    /// Items in `FETCHED` whose payload lives on `worker_id`.
    async fn count_fetched_by(&self, worker_id: &str) -> Result<i64>;

    /// Items not yet in a terminal state.
    async fn queue_depth(&self) -> Result<i64>;

    /// Per-state counts.
    async fn queue_stats(&self) -> Result<QueueStats>;

    /// Drop and recreate all persisted state.
    async fn recreate(&self) -> Result<()>;
}

// =============================================================================
// COLLABORATORS
// =============================================================================

/// Cheap metadata about a source item, gathered without a transfer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    /// The item is a broadcast that is currently live.
    pub live: bool,
    pub duration_secs: Option<i64>,
    /// When the broadcast started (or the item was released).
    pub release_time: Option<DateTime<Utc>>,
}

/// Source-extraction step.
///
/// Errors are reported as `Error::Extraction` carrying the tool's raw text so
/// the failure classifier can match on it.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetch metadata only.
    async fn probe(&self, source_key: &str) -> Result<ProbeInfo>;

    /// Transfer the payload to `destination`.
    async fn fetch(&self, source_key: &str, destination: &Path) -> Result<()>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Scoring step.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Compute label confidences for the payload at `payload`.
    async fn score(&self, payload: &Path) -> Result<Scores>;

    /// Check if the backend is reachable.
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}
