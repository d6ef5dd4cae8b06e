//! Pipeline worker: a fixed pool of claim loops per stage.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use glossa_core::{
    defaults, ClaimRequest, Error, Extractor, FailReason, ItemId, ItemState, Result, Scorer,
    Stage, WorkItem, WorkItemRepository,
};

use crate::fairness::FairnessGate;
use crate::fetch::FetchHandler;
use crate::handler::{StageContext, StageHandler, StageOutcome};
use crate::score::ScoreHandler;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Configuration for the pipeline worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity recorded as owner and `fetched_by`.
    pub worker_id: String,
    /// Whether to run any loops at all.
    pub enabled: bool,
    pub fetch_workers: usize,
    pub score_workers: usize,
    /// Wait before every claim attempt, in milliseconds.
    pub poll_interval_ms: u64,
    /// Per-worker ceiling on items held in `FETCHED`.
    pub fetched_ceiling: i64,
    pub max_duration_secs: i64,
    /// Upper bound on one collaborator call; unbounded when `None`.
    pub collaborator_timeout_secs: Option<u64>,
    /// Directory holding fetched payloads.
    pub storage_root: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: generate_worker_id(),
            enabled: true,
            fetch_workers: defaults::FETCH_WORKERS,
            score_workers: defaults::SCORE_WORKERS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            fetched_ceiling: defaults::FETCHED_CEILING,
            max_duration_secs: defaults::MAX_DURATION_SECS,
            collaborator_timeout_secs: None,
            storage_root: PathBuf::from(defaults::STORAGE_ROOT),
        }
    }
}

/// A fresh identity for processes started without `WORKER_ID`.
pub fn generate_worker_id() -> String {
    format!("glossa-{}", Uuid::now_v7())
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_ID` | `glossa-<uuid>` | Worker identity |
    /// | `WORKER_ENABLED` | `true` | Enable/disable stage loops |
    /// | `FETCH_WORKERS` | `2` | Fetch loops |
    /// | `SCORE_WORKERS` | `2` | Score loops |
    /// | `POLL_INTERVAL_MS` | `500` | Wait before each claim |
    /// | `FETCHED_CEILING` | `100` | Fairness ceiling |
    /// | `MAX_DURATION_SECS` | `18000` | Longest accepted media |
    /// | `COLLABORATOR_TIMEOUT_SECS` | unset | Collaborator call bound |
    /// | `STORAGE_ROOT` | `/var/lib/glossa/payloads` | Payload directory |
    pub fn from_env() -> Self {
        let worker_id = std::env::var(defaults::ENV_WORKER_ID)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(generate_worker_id);

        let enabled = std::env::var(defaults::ENV_WORKER_ENABLED)
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            worker_id,
            enabled,
            fetch_workers: env_parse(defaults::ENV_FETCH_WORKERS)
                .unwrap_or(defaults::FETCH_WORKERS),
            score_workers: env_parse(defaults::ENV_SCORE_WORKERS)
                .unwrap_or(defaults::SCORE_WORKERS),
            poll_interval_ms: env_parse(defaults::ENV_POLL_INTERVAL_MS)
                .unwrap_or(defaults::POLL_INTERVAL_MS),
            fetched_ceiling: env_parse(defaults::ENV_FETCHED_CEILING)
                .unwrap_or(defaults::FETCHED_CEILING),
            max_duration_secs: env_parse(defaults::ENV_MAX_DURATION_SECS)
                .unwrap_or(defaults::MAX_DURATION_SECS),
            collaborator_timeout_secs: env_parse::<u64>(defaults::ENV_COLLABORATOR_TIMEOUT_SECS)
                .filter(|secs| *secs > 0),
            storage_root: std::env::var(defaults::ENV_STORAGE_ROOT)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(defaults::STORAGE_ROOT)),
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_fetch_workers(mut self, n: usize) -> Self {
        self.fetch_workers = n;
        self
    }

    pub fn with_score_workers(mut self, n: usize) -> Self {
        self.score_workers = n;
        self
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_fetched_ceiling(mut self, ceiling: i64) -> Self {
        self.fetched_ceiling = ceiling;
        self
    }

    pub fn with_max_duration_secs(mut self, secs: i64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    pub fn with_collaborator_timeout(mut self, secs: Option<u64>) -> Self {
        self.collaborator_timeout_secs = secs;
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    /// Loop count for a stage.
    pub fn loops_for(&self, stage: Stage) -> usize {
        match stage {
            Stage::Fetch => self.fetch_workers,
            Stage::Score => self.score_workers,
        }
    }
}

/// Event emitted by the pipeline worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// An item was claimed.
    ItemClaimed {
        item_id: ItemId,
        source_key: String,
        stage: Stage,
    },
    /// An item advanced to the next state.
    ItemCompleted {
        item_id: ItemId,
        source_key: String,
        stage: Stage,
        state: ItemState,
    },
    /// An item failed.
    ItemFailed {
        item_id: ItemId,
        source_key: String,
        stage: Stage,
        reason: Option<FailReason>,
        error: String,
    },
    /// A cycle was skipped by the stage's pre-claim gate.
    CycleSkipped { stage: Stage },
    /// A cycle ended in an error or panic.
    LoopError { stage: Stage, error: String },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// What one loop iteration did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The pre-claim gate refused.
    Skipped,
    /// Nothing was eligible.
    Idle,
    /// An item was processed; carries its persisted state.
    Processed(WorkItem),
}

/// Runs single iterations of one stage: gate, claim, execute, persist.
pub struct StageRunner {
    repo: Arc<dyn WorkItemRepository>,
    handler: Arc<dyn StageHandler>,
    worker_id: String,
    storage_root: PathBuf,
    collaborator_timeout: Option<Duration>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl StageRunner {
    pub fn new(
        repo: Arc<dyn WorkItemRepository>,
        handler: Arc<dyn StageHandler>,
        config: &WorkerConfig,
        event_tx: broadcast::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            repo,
            handler,
            worker_id: config.worker_id.clone(),
            storage_root: config.storage_root.clone(),
            collaborator_timeout: config.collaborator_timeout_secs.map(Duration::from_secs),
            event_tx,
        }
    }

    pub fn stage(&self) -> Stage {
        self.handler.stage()
    }

    /// One iteration. Storage errors propagate; collaborator failures are
    /// recorded on the item.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let stage = self.stage();

        if !self.handler.ready(&self.worker_id).await? {
            let _ = self.event_tx.send(WorkerEvent::CycleSkipped { stage });
            return Ok(CycleOutcome::Skipped);
        }

        let request = ClaimRequest::for_stage(stage, &self.worker_id);
        let Some(item) = self.repo.claim_next(&request).await? else {
            return Ok(CycleOutcome::Idle);
        };

        let start = Instant::now();
        let item_id = item.id;
        let source_key = item.source_key.clone();
        info!(
            subsystem = "jobs",
            component = "worker",
            op = "claim",
            %stage,
            item_id,
            source_key = %source_key,
            worker_id = %self.worker_id,
            "Processing item"
        );
        let _ = self.event_tx.send(WorkerEvent::ItemClaimed {
            item_id,
            source_key: source_key.clone(),
            stage,
        });

        let ctx = StageContext::new(item, self.worker_id.clone(), &self.storage_root);
        // A panicking handler still releases the claim as an unclassified failure.
        let execution = AssertUnwindSafe(self.handler.execute(&ctx)).catch_unwind();
        let executed = match self.collaborator_timeout {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(executed) => executed,
                Err(_) => {
                    warn!(
                        subsystem = "jobs",
                        component = "worker",
                        %stage,
                        item_id,
                        timeout_secs = limit.as_secs(),
                        "Collaborator call timed out"
                    );
                    Ok(StageOutcome::failed(
                        None,
                        Error::Timeout(limit.as_secs()).to_string(),
                    ))
                }
            },
            None => execution.await,
        };
        let outcome = executed.unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            error!(
                subsystem = "jobs",
                component = "worker",
                %stage,
                item_id,
                source_key = %source_key,
                error = %message,
                "Stage handler panicked"
            );
            StageOutcome::failed(None, message)
        });

        let persisted = self
            .repo
            .complete(item_id, &self.worker_id, &outcome.completion())
            .await;
        match &persisted {
            // The item may already be re-fetched into the same path by its new owner.
            Err(Error::OwnershipLost { .. }) => warn!(
                subsystem = "jobs",
                component = "worker",
                %stage,
                item_id,
                source_key = %source_key,
                "Ownership lost before completion, leaving payload in place"
            ),
            _ => self.handler.finish(&ctx, outcome.is_success()).await,
        }
        let item = persisted?;

        match &outcome {
            StageOutcome::Success(_) => {
                info!(
                    subsystem = "jobs",
                    component = "worker",
                    op = "complete",
                    %stage,
                    item_id,
                    source_key = %source_key,
                    state = %item.state,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Item completed"
                );
                let _ = self.event_tx.send(WorkerEvent::ItemCompleted {
                    item_id,
                    source_key,
                    stage,
                    state: item.state,
                });
            }
            StageOutcome::Failed { reason, error, .. } => {
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    op = "fail",
                    %stage,
                    item_id,
                    source_key = %source_key,
                    reason = reason.map(|r| r.as_str()).unwrap_or("UNCLASSIFIED"),
                    error = %error,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Item failed"
                );
                let _ = self.event_tx.send(WorkerEvent::ItemFailed {
                    item_id,
                    source_key,
                    stage,
                    reason: *reason,
                    error: error.clone(),
                });
            }
        }

        Ok(CycleOutcome::Processed(item))
    }

    /// Poll loop: wait, run a cycle, repeat until shutdown.
    ///
    /// Errors and panics from a cycle are logged here and never end the loop.
    async fn run(
        self: Arc<Self>,
        index: usize,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let stage = self.stage();
        debug!(subsystem = "jobs", component = "worker", %stage, index, "Loop started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(poll_interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }

            let error = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            error!(
                subsystem = "jobs",
                component = "worker",
                %stage,
                index,
                error = %error,
                "Stage cycle failed"
            );
            let _ = self.event_tx.send(WorkerEvent::LoopError { stage, error });
        }

        debug!(subsystem = "jobs", component = "worker", %stage, index, "Loop stopped");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    supervisor: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal every loop to stop after its current cycle.
    ///
    /// Also fine when no loop is running (a disabled worker).
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Wait until every loop has exited.
    pub async fn join(self) -> Result<()> {
        self.supervisor
            .await
            .map_err(|e| Error::Internal(format!("Worker supervisor failed: {e}")))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Pipeline worker running every registered stage.
pub struct PipelineWorker {
    config: WorkerConfig,
    runners: Vec<Arc<StageRunner>>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl PipelineWorker {
    /// Runners in registration order.
    pub fn runners(&self) -> &[Arc<StageRunner>] {
        &self.runners
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Spawn the loops and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let event_rx = self.event_tx.subscribe();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        let mut loops = JoinSet::new();
        if self.config.enabled {
            for runner in &self.runners {
                for index in 0..self.config.loops_for(runner.stage()) {
                    loops.spawn(runner.clone().run(index, poll_interval, shutdown_rx.clone()));
                }
            }
            info!(
                subsystem = "jobs",
                component = "worker",
                worker_id = %self.config.worker_id,
                fetch_workers = self.config.fetch_workers,
                score_workers = self.config.score_workers,
                poll_interval_ms = self.config.poll_interval_ms,
                loops = loops.len(),
                "Pipeline worker started"
            );
            let _ = self.event_tx.send(WorkerEvent::WorkerStarted);
        } else {
            info!("Pipeline worker is disabled, not starting");
        }

        let event_tx = self.event_tx.clone();
        let supervisor = tokio::spawn(async move {
            while let Some(result) = loops.join_next().await {
                if let Err(e) = result {
                    error!(error = ?e, "Stage loop task failed");
                }
            }
            let _ = event_tx.send(WorkerEvent::WorkerStopped);
            info!("Pipeline worker stopped");
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            supervisor,
        }
    }
}

/// Builder for creating a pipeline worker.
pub struct WorkerBuilder {
    repo: Arc<dyn WorkItemRepository>,
    config: WorkerConfig,
    extractor: Option<Arc<dyn Extractor>>,
    scorer: Option<Arc<dyn Scorer>>,
    handlers: Vec<Arc<dyn StageHandler>>,
}

impl WorkerBuilder {
    pub fn new(repo: Arc<dyn WorkItemRepository>) -> Self {
        Self {
            repo,
            config: WorkerConfig::default(),
            extractor: None,
            scorer: None,
            handlers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the fetch stage with this extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Run the score stage with this scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Add a custom handler.
    pub fn with_handler<H: StageHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Build the worker, creating the storage root if needed.
    pub async fn build(self) -> Result<PipelineWorker> {
        tokio::fs::create_dir_all(&self.config.storage_root).await?;

        let mut handlers: Vec<Arc<dyn StageHandler>> = Vec::new();
        if let Some(extractor) = self.extractor {
            let gate = FairnessGate::new(self.repo.clone(), self.config.fetched_ceiling);
            handlers.push(Arc::new(
                FetchHandler::new(extractor)
                    .with_max_duration_secs(self.config.max_duration_secs)
                    .with_fairness(gate),
            ));
        }
        if let Some(scorer) = self.scorer {
            handlers.push(Arc::new(ScoreHandler::new(scorer)));
        }
        handlers.extend(self.handlers);

        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        let runners = handlers
            .into_iter()
            .map(|handler| {
                Arc::new(StageRunner::new(
                    self.repo.clone(),
                    handler,
                    &self.config,
                    event_tx.clone(),
                ))
            })
            .collect();

        Ok(PipelineWorker {
            config: self.config,
            runners,
            event_tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert!(config.worker_id.starts_with("glossa-"));
        assert!(config.enabled);
        assert_eq!(config.fetch_workers, 2);
        assert_eq!(config.score_workers, 2);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.fetched_ceiling, 100);
        assert_eq!(config.max_duration_secs, 18_000);
        assert_eq!(config.collaborator_timeout_secs, None);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_worker_id("node-a")
            .with_fetch_workers(3)
            .with_score_workers(1)
            .with_poll_interval(10)
            .with_fetched_ceiling(2)
            .with_collaborator_timeout(Some(30))
            .with_storage_root("/tmp/glossa")
            .with_enabled(false);

        assert_eq!(config.worker_id, "node-a");
        assert_eq!(config.loops_for(Stage::Fetch), 3);
        assert_eq!(config.loops_for(Stage::Score), 1);
        assert_eq!(config.poll_interval_ms, 10);
        assert_eq!(config.fetched_ceiling, 2);
        assert_eq!(config.collaborator_timeout_secs, Some(30));
        assert_eq!(config.storage_root, PathBuf::from("/tmp/glossa"));
        assert!(!config.enabled);
    }

    #[test]
    fn test_generated_worker_ids_are_unique() {
        assert_ne!(generate_worker_id(), generate_worker_id());
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "panic: boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "panic: bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "panic");
    }

    #[test]
    fn test_worker_event_debug() {
        let event = WorkerEvent::ItemFailed {
            item_id: 9,
            source_key: "abc".into(),
            stage: Stage::Fetch,
            reason: Some(FailReason::PrivateVideo),
            error: "Private video".into(),
        };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("ItemFailed"));
        assert!(debug_str.contains("PrivateVideo"));
    }
}
