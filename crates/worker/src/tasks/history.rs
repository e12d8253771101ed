//! Daily maintenance: prune aged history, purge retention-expired job
//! rows, drop long-dead worker registrations.

use picstyle_db::repositories::worker_repo::WorkerRepo;
use picstyle_db::repositories::{HistoryRepo, JobRepo};
use picstyle_db::DbPool;
use serde_json::{json, Value};

pub async fn run(pool: &DbPool) -> Result<Value, sqlx::Error> {
    let history_pruned = HistoryRepo::prune(pool).await?;
    let jobs_purged = JobRepo::delete_expired(pool).await?;
    let workers_pruned = WorkerRepo::prune_stale(pool).await?;

    tracing::info!(
        history_pruned,
        jobs_purged,
        workers_pruned,
        "Maintenance pass complete",
    );
    Ok(json!({
        "history_pruned": history_pruned,
        "jobs_purged": jobs_purged,
        "workers_pruned": workers_pruned,
    }))
}
