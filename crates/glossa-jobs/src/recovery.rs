//! Recovery and verification sweeps.

use tracing::info;

use glossa_core::{ItemState, Result, WorkItemRepository};

/// Reset every item tied to a worker process (`FETCHING`, `FETCHED`,
/// `SCORING`) back to `INIT`.
///
/// Run at startup, before any loop claims. Completed downloads are discarded
/// and refetched by whichever worker claims the item next.
pub async fn recover_orphans(repo: &dyn WorkItemRepository) -> Result<u64> {
    let reset = repo
        .bulk_reset(&ItemState::RECOVERABLE, ItemState::Init)
        .await?;
    info!(
        subsystem = "jobs",
        component = "recovery",
        op = "recover_orphans",
        reset,
        "Recovery sweep complete"
    );
    Ok(reset)
}

/// Return unclassified failures to `INIT` so they are attempted again.
pub async fn verify_failures(repo: &dyn WorkItemRepository) -> Result<u64> {
    let reset = repo.reset_unclassified_failures().await?;
    info!(
        subsystem = "jobs",
        component = "recovery",
        op = "verify_failures",
        reset,
        "Verification sweep complete"
    );
    Ok(reset)
}
