//! Health probe: gather a snapshot, apply the pure rules, report.

use picstyle_core::error::CoreError;
use picstyle_core::health::{self, HealthSnapshot, HealthVerdict};
use picstyle_core::types::CANARY_JOB_IDS;
use picstyle_db::repositories::worker_repo::WorkerRepo;
use picstyle_db::repositories::JobRepo;

use crate::state::AppState;

/// Gather everything the health rules need in one pass over the store
/// and the worker registry.
pub async fn gather_snapshot(state: &AppState) -> Result<HealthSnapshot, CoreError> {
    let queue_len = JobRepo::queued_len(&state.pool).await?;
    let capacity_ceiling = state.admission.capacity_ceiling().await?;
    // The admission ceiling floors at one worker's capacity, so read the
    // registry directly: an empty registry must fail the probe.
    let active_workers =
        WorkerRepo::active_count(&state.pool).await?.max(0) as usize;

    let mut canaries = Vec::with_capacity(CANARY_JOB_IDS.len());
    for id in CANARY_JOB_IDS {
        canaries.push(JobRepo::canary_record(&state.pool, id).await?);
    }

    Ok(HealthSnapshot {
        queue_len,
        capacity_ceiling,
        active_workers,
        canaries,
    })
}

/// Evaluate current health. Failures are verdicts, not errors; an error
/// here means the store itself was unreachable.
pub async fn check(state: &AppState) -> Result<HealthVerdict, CoreError> {
    let snapshot = gather_snapshot(state).await?;
    Ok(health::evaluate(&snapshot, chrono::Utc::now()))
}
