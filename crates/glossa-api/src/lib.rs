//! # glossa-api
//!
//! HTTP surface of the glossa pipeline: submission, sweeps, and read-only
//! inspection of the work-item queue.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use glossa_core::{defaults, WorkItemRepository};

pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub items: Arc<dyn WorkItemRepository>,
}

impl AppState {
    pub fn new(items: Arc<dyn WorkItemRepository>) -> Self {
        Self { items }
    }
}

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Parse `ALLOWED_ORIGINS` (comma separated). Unset allows any origin.
fn cors_origins() -> AllowOrigin {
    let Ok(raw) = std::env::var("ALLOWED_ORIGINS") else {
        return AllowOrigin::any();
    };
    let origins: Vec<HeaderValue> = raw
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect();
    if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::admin::health_check))
        // Submission, under the path clients already use
        .route("/ru/identify/:source_key", get(handlers::items::identify))
        // Sweeps
        .route("/verify/fails", get(handlers::admin::verify_fails))
        .route("/recreate/db", get(handlers::admin::recreate_db))
        // Read-only inspection
        .route("/api/v1/items/:source_key", get(handlers::items::get_item))
        .route("/api/v1/queue/stats", get(handlers::items::queue_stats))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(cors_origins())
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                .max_age(std::time::Duration::from_secs(defaults::CORS_MAX_AGE_SECS)),
        )
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
