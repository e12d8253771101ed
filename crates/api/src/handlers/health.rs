use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use picstyle_core::health::HealthVerdict;
use serde::Serialize;

use crate::error::AppResult;
use crate::health;
use crate::state::AppState;

/// Health probe response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Failure reason when unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// GET /health -- full pipeline probe for the load balancer.
///
/// 200 when queue depth, worker liveness, and the canaries all pass;
/// 503 with the first failing reason otherwise. A store outage is a 500
/// via the usual error path, distinguishable from an unhealthy verdict.
pub async fn health_check(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let verdict = health::check(&state).await?;

    let (code, body) = match verdict {
        HealthVerdict::Healthy => (
            StatusCode::OK,
            HealthResponse {
                status: "ok",
                version: env!("CARGO_PKG_VERSION"),
                reason: None,
            },
        ),
        HealthVerdict::Unhealthy { reason } => {
            tracing::warn!(reason = %reason, "Health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                HealthResponse {
                    status: "unhealthy",
                    version: env!("CARGO_PKG_VERSION"),
                    reason: Some(reason),
                },
            )
        }
    };

    Ok((code, Json(body)))
}

/// GET /health/live -- process liveness only: the service is up and can
/// reach its store. Never consults workers or canaries, so it stays
/// green during a worker outage and the orchestrator does not restart
/// the wrong process.
pub async fn liveness(State(state): State<AppState>) -> impl IntoResponse {
    match picstyle_db::health_check(&state.pool).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))),
        Err(e) => {
            tracing::error!(error = %e, "Liveness probe cannot reach the store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "degraded" })),
            )
        }
    }
}
