//! Health and maintenance endpoints.

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use tracing::warn;

use glossa_jobs::verify_failures;

use crate::{ApiError, AppState};

/// `GET /health`
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /verify/fails`: return unclassified failures to `INIT`.
pub async fn verify_fails(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let reset = verify_failures(state.items.as_ref()).await?;
    Ok(Json(json!({ "reset": reset })))
}

/// `GET /recreate/db`: drop and recreate all persisted state.
pub async fn recreate_db(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    warn!(subsystem = "api", op = "recreate_db", "Recreating work item store");
    state.items.recreate().await?;
    Ok(Json(json!({ "status": "recreated" })))
}
