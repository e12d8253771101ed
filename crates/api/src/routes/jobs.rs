//! Route definitions for the `/jobs` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /               -> submit_job
/// GET    /{id}           -> job_status
/// POST   /{id}/cancel    -> cancel_job
/// GET    /{id}/result    -> download_result
/// GET    /{id}/stream    -> status stream (WebSocket)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::submit_job))
        .route("/{id}", get(jobs::job_status))
        .route("/{id}/cancel", post(jobs::cancel_job))
        .route("/{id}/result", get(jobs::download_result))
        .route("/{id}/stream", get(ws::status_stream_handler))
}

/// Body limit layer for the submit route; applied at the app level so
/// the limit follows configuration.
pub fn body_limit(max_upload_bytes: usize) -> DefaultBodyLimit {
    DefaultBodyLimit::max(max_upload_bytes)
}
