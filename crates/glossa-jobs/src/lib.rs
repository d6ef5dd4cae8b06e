//! # glossa-jobs
//!
//! Stage workers for the glossa pipeline.
//!
//! This crate provides:
//! - The fetch stage (probe, classify, transfer) and the score stage
//! - Failure classification from collaborator messages
//! - A per-worker fairness gate on the fetched backlog
//! - Startup recovery and unclassified-failure verification sweeps
//! - A poll-loop worker with events via broadcast channels
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use glossa_db::Database;
//! use glossa_inference::{WhisperLanguageScorer, YtDlpExtractor};
//! use glossa_jobs::{recover_orphans, WorkerBuilder, WorkerConfig};
//!
//! let db = Database::connect("postgres://...").await?;
//! let repo = Arc::new(db.items.clone());
//! recover_orphans(repo.as_ref()).await?;
//!
//! let worker = WorkerBuilder::new(repo)
//!     .with_config(WorkerConfig::from_env())
//!     .with_extractor(Arc::new(YtDlpExtractor::from_env()))
//!     .with_scorer(Arc::new(WhisperLanguageScorer::from_env()))
//!     .build()
//!     .await?;
//!
//! let handle = worker.start();
//! // ...
//! handle.shutdown();
//! handle.join().await?;
//! ```

pub mod classify;
pub mod fairness;
pub mod fetch;
pub mod handler;
pub mod recovery;
pub mod score;
pub mod worker;

// Re-export core types
pub use glossa_core::*;

pub use classify::{classify_error, classify_message, classify_probe};
pub use fairness::FairnessGate;
pub use fetch::FetchHandler;
pub use handler::{payload_path, StageContext, StageHandler, StageOutcome};
pub use recovery::{recover_orphans, verify_failures};
pub use score::ScoreHandler;
pub use worker::{
    CycleOutcome, PipelineWorker, StageRunner, WorkerBuilder, WorkerConfig, WorkerEvent,
    WorkerHandle,
};
