//! Repository for the `job_history` table.
//!
//! Every executed job leaves one history row, giving the stats logger a
//! cheap source of success/failure counts per trailing period without
//! scanning the retention-pruned `jobs` table.

use picstyle_core::types::JobId;
use sqlx::PgPool;

/// Trailing periods reported by [`HistoryRepo::stats`].
const PERIODS: [(&str, &str); 5] = [
    ("hour", "1 hour"),
    ("day", "1 day"),
    ("week", "7 days"),
    ("month", "1 month"),
    ("year", "1 year"),
];

/// Success/failure/unfinished counts for one trailing period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodStats {
    pub period: &'static str,
    pub succeeded: i64,
    pub failed: i64,
    pub unfinished: i64,
}

pub struct HistoryRepo;

impl HistoryRepo {
    /// Record the start of an execution. Returns the history row id.
    pub async fn start(pool: &PgPool, job_id: JobId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO job_history (job_id) VALUES ($1) RETURNING id",
        )
        .bind(job_id)
        .fetch_one(pool)
        .await
    }

    /// Record the outcome of an execution started via [`start`].
    ///
    /// [`start`]: HistoryRepo::start
    pub async fn finish(pool: &PgPool, id: i64, succeeded: bool) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            "UPDATE job_history SET succeeded = $2, ended = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(succeeded)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// Outcome counts per trailing period.
    pub async fn stats(pool: &PgPool) -> Result<Vec<PeriodStats>, sqlx::Error> {
        let mut out = Vec::with_capacity(PERIODS.len());
        for (period, interval) in PERIODS {
            let row = sqlx::query_as::<_, (i64, i64, i64)>(&format!(
                "SELECT \
                     COUNT(*) FILTER (WHERE succeeded IS TRUE), \
                     COUNT(*) FILTER (WHERE succeeded IS FALSE), \
                     COUNT(*) FILTER (WHERE succeeded IS NULL) \
                 FROM job_history WHERE started > NOW() - INTERVAL '{interval}'"
            ))
            .fetch_one(pool)
            .await?;
            out.push(PeriodStats {
                period,
                succeeded: row.0,
                failed: row.1,
                unfinished: row.2,
            });
        }
        Ok(out)
    }

    /// Drop history rows older than one year. Returns rows removed.
    pub async fn prune(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM job_history WHERE started < NOW() - INTERVAL '1 year'")
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }
}
