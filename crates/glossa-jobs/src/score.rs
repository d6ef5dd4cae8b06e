//! Score stage: compute label confidences for a locally held payload.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info, warn};

use glossa_core::{Completion, Scorer, Stage};

use crate::handler::{StageContext, StageHandler, StageOutcome};

/// Handler for `FETCHED` → `SCORING` → `SCORED`.
///
/// Scoring failures are never classified. The payload is deleted once the
/// outcome has been persisted, whatever it was.
pub struct ScoreHandler {
    scorer: Arc<dyn Scorer>,
}

impl ScoreHandler {
    pub fn new(scorer: Arc<dyn Scorer>) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl StageHandler for ScoreHandler {
    fn stage(&self) -> Stage {
        Stage::Score
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        let start = Instant::now();

        match self.scorer.score(ctx.payload_path()).await {
            Ok(scores) if scores.is_empty() => {
                StageOutcome::failed(None, "scorer returned no labels")
            }
            Ok(scores) => {
                info!(
                    subsystem = "jobs",
                    component = "score",
                    item_id = ctx.item.id,
                    source_key = ctx.source_key(),
                    model = self.scorer.model_name(),
                    scores = ?scores,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Payload scored"
                );
                StageOutcome::Success(Completion::scored(scores))
            }
            Err(e) => StageOutcome::failed(None, e.collaborator_message()),
        }
    }

    async fn finish(&self, ctx: &StageContext, _succeeded: bool) {
        let path = ctx.payload_path();
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    subsystem = "jobs",
                    component = "score",
                    source_key = ctx.source_key(),
                    path = %path.display(),
                    "Payload already absent"
                );
            }
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "score",
                    source_key = ctx.source_key(),
                    path = %path.display(),
                    error = %e,
                    "Failed to delete payload"
                );
            }
        }

        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            error!(
                subsystem = "jobs",
                component = "score",
                source_key = ctx.source_key(),
                path = %path.display(),
                "Payload still present after deletion"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use glossa_core::{ItemState, Scores, WorkItem};
    use glossa_inference::mock::MockScorer;

    fn ctx(root: &std::path::Path) -> StageContext {
        let item = WorkItem {
            id: 3,
            source_key: "abc".to_string(),
            state: ItemState::Scoring,
            owner: Some("w1".into()),
            fetched_by: Some("w1".into()),
            fail_reason: None,
            duration_secs: Some(60),
            scores: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        StageContext::new(item, "w1", root)
    }

    #[tokio::test]
    async fn test_score_success() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        std::fs::write(ctx.payload_path(), b"audio").unwrap();

        let handler = ScoreHandler::new(Arc::new(MockScorer::new()));
        let outcome = handler.execute(&ctx).await;

        let completion = outcome.completion();
        assert_eq!(completion.state, ItemState::Scored);
        assert_eq!(completion.scores.as_ref().unwrap()["ru"], 0.9);
    }

    #[tokio::test]
    async fn test_scorer_error_is_unclassified() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        std::fs::write(ctx.payload_path(), b"audio").unwrap();

        // even text that would match a fetch pattern stays unclassified here
        let scorer = MockScorer::new().with_error("Private video");
        let handler = ScoreHandler::new(Arc::new(scorer));
        let outcome = handler.execute(&ctx).await;

        let completion = outcome.completion();
        assert_eq!(completion.state, ItemState::Failed);
        assert_eq!(completion.fail_reason, None);
    }

    #[tokio::test]
    async fn test_missing_payload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let handler = ScoreHandler::new(Arc::new(MockScorer::new()));
        let outcome = handler.execute(&ctx(dir.path())).await;
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_finish_deletes_payload_either_way() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let handler = ScoreHandler::new(Arc::new(MockScorer::new()));

        std::fs::write(ctx.payload_path(), b"audio").unwrap();
        handler.finish(&ctx, true).await;
        assert!(!ctx.payload_path().exists());

        std::fs::write(ctx.payload_path(), b"audio").unwrap();
        handler.finish(&ctx, false).await;
        assert!(!ctx.payload_path().exists());

        // missing payload is logged, not fatal
        handler.finish(&ctx, false).await;
    }

    #[test]
    fn test_empty_scores_never_complete() {
        assert!(Completion::scored(Scores::new()).validate().is_err());
    }
}
