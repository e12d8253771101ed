//! Worker liveness registry over the `workers` table, plus the trait
//! adapters that feed the admission controller and health monitor.

use picstyle_core::error::CoreError;
use picstyle_core::registry::{QueueInfo, WorkerRegistry};
use sqlx::PgPool;

use crate::repositories::JobRepo;

/// A worker heartbeat older than this is considered offline.
pub const HEARTBEAT_TIMEOUT_SECS: i64 = 120;

pub struct WorkerRepo;

impl WorkerRepo {
    /// Upsert a worker's heartbeat and state (`idle` or `busy`).
    pub async fn heartbeat(pool: &PgPool, worker_id: &str, state: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO workers (id, state, last_heartbeat_at) \
             VALUES ($1, $2, NOW()) \
             ON CONFLICT (id) DO UPDATE SET \
                 state = EXCLUDED.state, last_heartbeat_at = NOW()",
        )
        .bind(worker_id)
        .bind(state)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Number of workers with a recent heartbeat in an active state.
    pub async fn active_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM workers \
             WHERE state IN ('idle', 'busy') \
               AND last_heartbeat_at > NOW() - make_interval(secs => $1)",
        )
        .bind(HEARTBEAT_TIMEOUT_SECS as f64)
        .fetch_one(pool)
        .await
    }

    /// Remove workers whose heartbeat went stale long ago.
    pub async fn prune_stale(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM workers \
             WHERE last_heartbeat_at < NOW() - make_interval(secs => $1)",
        )
        .bind((HEARTBEAT_TIMEOUT_SECS * 10) as f64)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// [`WorkerRegistry`] backed by the `workers` table.
pub struct PgWorkerRegistry {
    pool: PgPool,
}

impl PgWorkerRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WorkerRegistry for PgWorkerRegistry {
    async fn active_worker_count(&self) -> Result<usize, CoreError> {
        let count = WorkerRepo::active_count(&self.pool).await?;
        Ok(count.max(0) as usize)
    }
}

/// [`QueueInfo`] backed by the `jobs` table.
pub struct PgQueueInfo {
    pool: PgPool,
}

impl PgQueueInfo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QueueInfo for PgQueueInfo {
    async fn queued_len(&self) -> Result<i64, CoreError> {
        Ok(JobRepo::queued_len(&self.pool).await?)
    }
}
