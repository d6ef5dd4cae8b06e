//! Per-worker backlog ceiling for the fetch stage.

use std::sync::Arc;

use tracing::debug;

use glossa_core::{Result, WorkItemRepository};

/// Stops a worker from fetching while `ceiling` or more of its payloads wait
/// to be scored.
#[derive(Clone)]
pub struct FairnessGate {
    repo: Arc<dyn WorkItemRepository>,
    ceiling: i64,
}

impl FairnessGate {
    pub fn new(repo: Arc<dyn WorkItemRepository>, ceiling: i64) -> Self {
        Self { repo, ceiling }
    }

    /// Whether `worker_id` may claim another fetch.
    pub async fn allows(&self, worker_id: &str) -> Result<bool> {
        let held = self.repo.count_fetched_by(worker_id).await?;
        if held >= self.ceiling {
            debug!(
                subsystem = "jobs",
                component = "fairness",
                worker_id,
                held,
                ceiling = self.ceiling,
                "Fetched backlog at ceiling, skipping fetch cycle"
            );
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glossa_core::{ClaimRequest, Completion, Stage};
    use glossa_db::MemoryWorkItemRepository;

    async fn fetch_one(repo: &MemoryWorkItemRepository, key: &str, worker: &str) {
        let id = repo.submit(key).await.unwrap().item.id;
        repo.claim_next(&ClaimRequest::for_stage(Stage::Fetch, worker))
            .await
            .unwrap();
        repo.complete(id, worker, &Completion::fetched(None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_gate_closes_at_ceiling() {
        let repo = Arc::new(MemoryWorkItemRepository::new());
        let gate = FairnessGate::new(repo.clone(), 2);

        assert!(gate.allows("w1").await.unwrap());
        fetch_one(&repo, "a", "w1").await;
        assert!(gate.allows("w1").await.unwrap());
        fetch_one(&repo, "b", "w1").await;
        assert!(!gate.allows("w1").await.unwrap());

        // other workers are unaffected
        assert!(gate.allows("w2").await.unwrap());
    }
}
