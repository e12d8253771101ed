//! Repository for the `jobs` table: job store and work queue in one.
//!
//! A single INSERT is both the record write and the enqueue, so a crash
//! can never leave a store record without a queue reference or vice
//! versa. Presence in the queue is simply `status = 'queued'`.

use picstyle_core::health::CanaryRecord;
use picstyle_core::status::JobStatus;
use picstyle_core::types::JobId;
use sqlx::PgPool;

use crate::models::job::{CancelOutcome, Job, NewJob};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, kind, status, session_id, priority, parameters, result, error, \
    cancel_requested, timeout_secs, result_ttl_secs, failure_ttl_secs, \
    queue_ttl_secs, worker_id, submitted_at, started_at, completed_at, \
    expires_at";

/// Provides store and queue operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new queued job. Record write and enqueue are one atomic
    /// statement.
    pub async fn submit(pool: &PgPool, new: &NewJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs \
                 (id, kind, status, session_id, priority, parameters, \
                  timeout_secs, result_ttl_secs, failure_ttl_secs, queue_ttl_secs) \
             VALUES ($1, $2, 'queued', $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(new.id)
            .bind(new.kind)
            .bind(new.session_id)
            .bind(new.priority)
            .bind(&new.parameters)
            .bind(new.ttl.job_timeout.as_secs() as i64)
            .bind(new.ttl.result_ttl.as_secs() as i64)
            .bind(new.ttl.failure_ttl.as_secs() as i64)
            .bind(new.ttl.queue_ttl.as_secs() as i64)
            .fetch_one(pool)
            .await
    }

    /// Enqueue a system job under its fixed, well-known id.
    ///
    /// Re-uses the existing slot instead of accumulating one row per
    /// firing: if the previous run is still queued or started the upsert
    /// leaves it alone, otherwise the row is reset to a fresh queued
    /// state. `completed_at` is deliberately preserved across re-enqueues
    /// so the health monitor can judge a stuck slot by the age of its
    /// last completion. Returns `true` when a new run was enqueued.
    pub async fn submit_system(pool: &PgPool, new: &NewJob) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO jobs \
                 (id, kind, status, session_id, priority, parameters, \
                  timeout_secs, result_ttl_secs, failure_ttl_secs, queue_ttl_secs) \
             VALUES ($1, $2, 'queued', NULL, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET \
                 status = 'queued', cancel_requested = FALSE, \
                 result = NULL, error = NULL, worker_id = NULL, \
                 submitted_at = NOW(), started_at = NULL, expires_at = NULL \
             WHERE jobs.status NOT IN ('queued', 'started')",
        )
        .bind(new.id)
        .bind(new.kind)
        .bind(new.priority)
        .bind(&new.parameters)
        .bind(new.ttl.job_timeout.as_secs() as i64)
        .bind(new.ttl.result_ttl.as_secs() as i64)
        .bind(new.ttl.failure_ttl.as_secs() as i64)
        .bind(new.ttl.queue_ttl.as_secs() as i64)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a job by its id.
    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Current status of a job, without materializing the full row.
    pub async fn status(pool: &PgPool, id: JobId) -> Result<Option<JobStatus>, sqlx::Error> {
        sqlx::query_scalar::<_, JobStatus>("SELECT status FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// 0-based rank of a queued job within the claim order
    /// (priority DESC, submitted_at ASC).
    ///
    /// Only meaningful while the job's status is `queued`; callers check
    /// the status first (a non-queued job yields 0 here).
    pub async fn queue_position(pool: &PgPool, id: JobId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM jobs q \
             JOIN jobs j ON j.id = $1 \
             WHERE q.status = 'queued' AND j.status = 'queued' AND q.id <> j.id \
               AND (q.priority > j.priority \
                    OR (q.priority = j.priority AND q.submitted_at < j.submitted_at))",
        )
        .bind(id)
        .fetch_one(pool)
        .await
    }

    /// Number of jobs currently waiting in the queue.
    pub async fn queued_len(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE status = 'queued'")
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the next queued job for a worker and mark it
    /// started.
    ///
    /// `FOR UPDATE SKIP LOCKED` prevents double-dispatch when several
    /// worker processes poll concurrently.
    pub async fn claim_next(pool: &PgPool, worker_id: &str) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = 'started', worker_id = $1, started_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = 'queued' \
                 ORDER BY priority DESC, submitted_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(worker_id)
            .fetch_optional(pool)
            .await
    }

    /// Mark a job finished with its result pointer; retention starts now.
    pub async fn complete(
        pool: &PgPool,
        id: JobId,
        result: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET status = 'finished', result = $2, completed_at = NOW(), \
                 expires_at = NOW() + make_interval(secs => result_ttl_secs) \
             WHERE id = $1 AND status = 'started'",
        )
        .bind(id)
        .bind(result)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a job failed with an error message.
    pub async fn fail(pool: &PgPool, id: JobId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET status = 'failed', error = $2, completed_at = NOW(), \
                 expires_at = NOW() + make_interval(secs => failure_ttl_secs) \
             WHERE id = $1 AND status = 'started'",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Terminal transition after a cancel was observed during execution:
    /// `canceled` when the worker exited voluntarily, `stopped` when it
    /// was forcibly interrupted.
    pub async fn finish_canceled(
        pool: &PgPool,
        id: JobId,
        forced: bool,
    ) -> Result<(), sqlx::Error> {
        let status = if forced {
            JobStatus::Stopped
        } else {
            JobStatus::Canceled
        };
        sqlx::query(
            "UPDATE jobs \
             SET status = $2, completed_at = NOW(), \
                 expires_at = NOW() + make_interval(secs => failure_ttl_secs) \
             WHERE id = $1 AND status = 'started'",
        )
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Request cancellation. Best-effort cooperative: a queued job is
    /// canceled immediately; a started job gets its `cancel_requested`
    /// flag set for the worker to observe; a terminal job is left
    /// untouched and the call still succeeds.
    pub async fn cancel(pool: &PgPool, id: JobId) -> Result<CancelOutcome, sqlx::Error> {
        let canceled = sqlx::query(
            "UPDATE jobs \
             SET status = 'canceled', completed_at = NOW(), \
                 expires_at = NOW() + make_interval(secs => failure_ttl_secs) \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .execute(pool)
        .await?;
        if canceled.rows_affected() > 0 {
            return Ok(CancelOutcome::Canceled);
        }

        let requested = sqlx::query(
            "UPDATE jobs SET cancel_requested = TRUE \
             WHERE id = $1 AND status = 'started'",
        )
        .bind(id)
        .execute(pool)
        .await?;
        if requested.rows_affected() > 0 {
            return Ok(CancelOutcome::Requested);
        }

        Ok(CancelOutcome::AlreadyTerminal)
    }

    /// Whether cancellation has been requested for a running job.
    pub async fn cancel_requested(pool: &PgPool, id: JobId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT cancel_requested FROM jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map(|v| v.unwrap_or(false))
    }

    /// Purge user-job rows that have outlived every retention window:
    /// terminal rows past `expires_at`, and queued rows older than
    /// their queue TTL. System slots (`session_id IS NULL`) are never
    /// purged: they are a fixed handful of upserted rows, and the
    /// health monitor must be able to observe a stuck or stale canary
    /// rather than find an empty slot. Returns the number of rows
    /// removed.
    pub async fn delete_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM jobs \
             WHERE session_id IS NOT NULL \
               AND ((expires_at IS NOT NULL AND expires_at < NOW()) \
                 OR (status = 'queued' \
                     AND submitted_at < NOW() - make_interval(secs => queue_ttl_secs)))",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Latest observed state of a canary slot, for the health monitor.
    /// `None` when the slot has never been enqueued.
    pub async fn canary_record(
        pool: &PgPool,
        id: JobId,
    ) -> Result<Option<CanaryRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, (JobStatus, Option<picstyle_core::types::Timestamp>)>(
            "SELECT status, completed_at FROM jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(status, completed_at)| CanaryRecord {
            job_id: id,
            status,
            completed_at,
        }))
    }
}
