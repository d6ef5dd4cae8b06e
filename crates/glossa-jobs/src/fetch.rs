//! Fetch stage: probe the source, then transfer the payload to local storage.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use glossa_core::{defaults, Completion, Extractor, Result, Stage};

use crate::classify::{classify_error, classify_probe};
use crate::fairness::FairnessGate;
use crate::handler::{StageContext, StageHandler, StageOutcome};

/// Handler for `INIT` → `FETCHING` → `FETCHED`.
pub struct FetchHandler {
    extractor: Arc<dyn Extractor>,
    max_duration_secs: i64,
    gate: Option<FairnessGate>,
}

impl FetchHandler {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self {
            extractor,
            max_duration_secs: defaults::MAX_DURATION_SECS,
            gate: None,
        }
    }

    pub fn with_max_duration_secs(mut self, secs: i64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    pub fn with_fairness(mut self, gate: FairnessGate) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl StageHandler for FetchHandler {
    fn stage(&self) -> Stage {
        Stage::Fetch
    }

    async fn ready(&self, worker_id: &str) -> Result<bool> {
        match &self.gate {
            Some(gate) => gate.allows(worker_id).await,
            None => Ok(true),
        }
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        let start = Instant::now();
        let key = ctx.source_key();

        let probe = match self.extractor.probe(key).await {
            Ok(probe) => probe,
            Err(e) => return StageOutcome::failed(classify_error(&e), e.collaborator_message()),
        };

        if let Some(reason) = classify_probe(&probe, self.max_duration_secs, Utc::now()) {
            info!(
                subsystem = "jobs",
                component = "fetch",
                item_id = ctx.item.id,
                source_key = key,
                reason = %reason,
                duration_secs = probe.duration_secs,
                "Skipping transfer"
            );
            return StageOutcome::Failed {
                reason: Some(reason),
                duration_secs: probe.duration_secs,
                error: format!("skipped: {reason}"),
            };
        }

        if let Err(e) = self.extractor.fetch(key, ctx.payload_path()).await {
            return StageOutcome::Failed {
                reason: classify_error(&e),
                duration_secs: probe.duration_secs,
                error: e.collaborator_message(),
            };
        }

        info!(
            subsystem = "jobs",
            component = "fetch",
            item_id = ctx.item.id,
            source_key = key,
            extractor = self.extractor.name(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Payload stored"
        );
        StageOutcome::Success(Completion::fetched(probe.duration_secs))
    }

    async fn finish(&self, ctx: &StageContext, succeeded: bool) {
        if succeeded {
            return;
        }
        // drop any partial transfer
        match tokio::fs::remove_file(ctx.payload_path()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                subsystem = "jobs",
                component = "fetch",
                path = %ctx.payload_path().display(),
                error = %e,
                "Failed to remove partial payload"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use glossa_core::{FailReason, ItemState, ProbeInfo, WorkItem};
    use glossa_inference::mock::MockExtractor;

    fn ctx(key: &str, root: &std::path::Path) -> StageContext {
        let item = WorkItem {
            id: 7,
            source_key: key.to_string(),
            state: ItemState::Fetching,
            owner: Some("w1".into()),
            fetched_by: None,
            fail_reason: None,
            duration_secs: None,
            scores: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        StageContext::new(item, "w1", root)
    }

    #[tokio::test]
    async fn test_fetch_success_writes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = MockExtractor::new().with_duration(300);
        let handler = FetchHandler::new(Arc::new(extractor.clone()));
        let ctx = ctx("abc", dir.path());

        let outcome = handler.execute(&ctx).await;
        assert_eq!(outcome, StageOutcome::Success(Completion::fetched(Some(300))));
        assert!(dir.path().join("abc").exists());
        assert_eq!(extractor.fetch_call_count(), 1);
    }

    #[tokio::test]
    async fn test_too_long_skips_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = MockExtractor::new().with_duration(defaults::MAX_DURATION_SECS + 1);
        let handler = FetchHandler::new(Arc::new(extractor.clone()));

        let outcome = handler.execute(&ctx("abc", dir.path())).await;
        match outcome {
            StageOutcome::Failed {
                reason,
                duration_secs,
                ..
            } => {
                assert_eq!(reason, Some(FailReason::TooLong));
                assert_eq!(duration_secs, Some(defaults::MAX_DURATION_SECS + 1));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(extractor.fetch_call_count(), 0);
    }

    #[tokio::test]
    async fn test_live_stream_classification() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = MockExtractor::new()
            .with_probe(
                "live",
                ProbeInfo {
                    live: true,
                    duration_secs: None,
                    release_time: Some(Utc::now() - Duration::hours(1)),
                },
            )
            .with_probe(
                "old",
                ProbeInfo {
                    live: true,
                    duration_secs: None,
                    release_time: Some(Utc::now() - Duration::days(3)),
                },
            );
        let handler = FetchHandler::new(Arc::new(extractor));

        let live = handler.execute(&ctx("live", dir.path())).await;
        assert_eq!(live.completion().fail_reason, Some(FailReason::LiveStream));
        let old = handler.execute(&ctx("old", dir.path())).await;
        assert_eq!(old.completion().fail_reason, Some(FailReason::LongLiveStream));
    }

    #[tokio::test]
    async fn test_probe_and_fetch_errors_are_classified() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = MockExtractor::new()
            .with_probe_error("priv", "ERROR: [youtube] priv: Private video")
            .with_fetch_error("paid", "ERROR: [youtube] paid: This video requires payment")
            .with_fetch_error("weird", "ERROR: unable to extract player response");
        let handler = FetchHandler::new(Arc::new(extractor));

        let outcome = handler.execute(&ctx("priv", dir.path())).await;
        assert_eq!(outcome.completion().fail_reason, Some(FailReason::PrivateVideo));

        let outcome = handler.execute(&ctx("paid", dir.path())).await;
        let completion = outcome.completion();
        assert_eq!(completion.fail_reason, Some(FailReason::RequiresPayment));
        assert_eq!(completion.duration_secs, Some(60));

        let outcome = handler.execute(&ctx("weird", dir.path())).await;
        assert_eq!(outcome.completion().state, ItemState::Failed);
        assert_eq!(outcome.completion().fail_reason, None);
    }

    #[tokio::test]
    async fn test_finish_removes_partial_payload_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let handler = FetchHandler::new(Arc::new(MockExtractor::new()));
        let ctx = ctx("abc", dir.path());
        std::fs::write(ctx.payload_path(), b"partial").unwrap();

        handler.finish(&ctx, true).await;
        assert!(ctx.payload_path().exists());

        handler.finish(&ctx, false).await;
        assert!(!ctx.payload_path().exists());

        // already gone is fine
        handler.finish(&ctx, false).await;
    }
}
