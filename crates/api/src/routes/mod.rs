pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /jobs                      POST submit
/// /jobs/{id}                 GET  status poll
/// /jobs/{id}/cancel          POST cancel
/// /jobs/{id}/result          GET  artifact download
/// /jobs/{id}/stream          GET  WebSocket status stream
/// ```
pub fn api_router() -> Router<AppState> {
    Router::new().nest("/jobs", jobs::router())
}
