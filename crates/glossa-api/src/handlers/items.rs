//! Submission and read-only item endpoints.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::info;

use glossa_core::{ItemState, QueueStats, WorkItem};

use crate::{ApiError, AppState};

/// Body returned while an item is still pending or failed.
#[derive(Debug, Serialize)]
pub struct QueuePosition {
    pub queue_depth: i64,
    pub state: ItemState,
}

/// `GET /ru/identify/:source_key`
///
/// Submits the key (idempotently). A scored item answers with its flat
/// label map; anything else with the queue depth and current state.
pub async fn identify(
    State(state): State<AppState>,
    Path(source_key): Path<String>,
) -> Result<Response, ApiError> {
    let outcome = state.items.submit(&source_key).await?;
    info!(
        subsystem = "api",
        op = "identify",
        source_key = %source_key,
        state = %outcome.item.state,
        queue_depth = outcome.queue_depth,
        reactivated = outcome.reactivated,
        "Identify request"
    );

    if outcome.item.state == ItemState::Scored {
        if let Some(scores) = outcome.item.scores {
            return Ok(Json(scores).into_response());
        }
    }

    Ok(Json(QueuePosition {
        queue_depth: outcome.queue_depth,
        state: outcome.item.state,
    })
    .into_response())
}

/// `GET /api/v1/items/:source_key`
pub async fn get_item(
    State(state): State<AppState>,
    Path(source_key): Path<String>,
) -> Result<Json<WorkItem>, ApiError> {
    state
        .items
        .lookup(&source_key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No item for source key {source_key}")))
}

/// `GET /api/v1/queue/stats`
pub async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    Ok(Json(state.items.queue_stats().await?))
}
