//! Stage handlers: the per-stage work done on a claimed item.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use glossa_core::{Completion, FailReason, Result, Stage, WorkItem};

/// Context provided to stage handlers.
pub struct StageContext {
    /// The claimed item, already in the stage's in-progress state.
    pub item: WorkItem,
    /// Identity of the claiming worker.
    pub worker_id: String,
    payload_path: PathBuf,
}

impl StageContext {
    pub fn new(item: WorkItem, worker_id: impl Into<String>, storage_root: &Path) -> Self {
        let payload_path = payload_path(storage_root, &item.source_key);
        Self {
            item,
            worker_id: worker_id.into(),
            payload_path,
        }
    }

    pub fn source_key(&self) -> &str {
        &self.item.source_key
    }

    /// Local path of this item's payload.
    pub fn payload_path(&self) -> &Path {
        &self.payload_path
    }
}

/// Payload location for a source key under the storage root.
pub fn payload_path(storage_root: &Path, source_key: &str) -> PathBuf {
    storage_root.join(source_key)
}

/// Result of stage execution.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The item advances; the completion carries the next state and results.
    Success(Completion),
    /// The item fails, with a classified reason when one was recognized.
    Failed {
        reason: Option<FailReason>,
        duration_secs: Option<i64>,
        error: String,
    },
}

impl StageOutcome {
    pub fn failed(reason: Option<FailReason>, error: impl Into<String>) -> Self {
        StageOutcome::Failed {
            reason,
            duration_secs: None,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success(_))
    }

    /// Fields to persist for this outcome.
    pub fn completion(&self) -> Completion {
        match self {
            StageOutcome::Success(completion) => completion.clone(),
            StageOutcome::Failed {
                reason,
                duration_secs,
                ..
            } => Completion::failed(*reason, *duration_secs),
        }
    }
}

/// Trait for stage handlers.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// The stage this handler processes.
    fn stage(&self) -> Stage;

    /// Pre-claim gate; `false` skips this cycle without claiming.
    async fn ready(&self, _worker_id: &str) -> Result<bool> {
        Ok(true)
    }

    /// Process a claimed item. Never returns an error: failures become a
    /// `StageOutcome::Failed`.
    async fn execute(&self, ctx: &StageContext) -> StageOutcome;

    /// Runs after the outcome has been persisted, or persisting failed for a
    /// reason other than lost ownership.
    async fn finish(&self, _ctx: &StageContext, _succeeded: bool) {}
}
