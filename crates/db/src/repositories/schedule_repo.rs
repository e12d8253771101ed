//! Repository for the `scheduled_tasks` table.
//!
//! Implements the [`TaskRegistry`] seam: registrations are keyed by
//! logical name, and the scheduler clears the whole namespace before
//! installing on every process start so restarts never accumulate
//! duplicate firings.

use std::str::FromStr;

use chrono::Utc;
use picstyle_core::error::CoreError;
use picstyle_core::registry::{ScheduledTask, ScheduledTaskSpec, TaskRegistry, TaskSchedule};
use picstyle_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::schedule::ScheduledTaskRow;

/// Namespace owned by the background scheduler.
pub const SCHEDULER_NAMESPACE: &str = "system";

/// Encode a schedule for storage.
fn encode_schedule(schedule: &TaskSchedule) -> String {
    match schedule {
        TaskSchedule::Every { interval_secs, .. } => format!("every:{interval_secs}"),
        TaskSchedule::Cron(expr) => format!("cron:{expr}"),
    }
}

/// Decode a stored schedule.
///
/// The initial delay only matters at install time, so it is not
/// persisted; decoded `Every` schedules carry a zero delay.
pub fn decode_schedule(s: &str) -> Result<TaskSchedule, CoreError> {
    if let Some(secs) = s.strip_prefix("every:") {
        let interval_secs = secs
            .parse()
            .map_err(|_| CoreError::Infra(format!("Bad interval schedule: {s}")))?;
        Ok(TaskSchedule::Every {
            interval_secs,
            initial_delay_secs: 0,
        })
    } else if let Some(expr) = s.strip_prefix("cron:") {
        Ok(TaskSchedule::Cron(expr.to_string()))
    } else {
        Err(CoreError::Infra(format!("Bad schedule encoding: {s}")))
    }
}

/// First fire time of a schedule installed at `now`.
pub fn first_fire(schedule: &TaskSchedule, now: Timestamp) -> Result<Timestamp, CoreError> {
    match schedule {
        TaskSchedule::Every {
            initial_delay_secs, ..
        } => Ok(now + chrono::Duration::seconds(*initial_delay_secs as i64)),
        TaskSchedule::Cron(expr) => next_cron_fire(expr, now),
    }
}

/// Fire time following a firing at `now`.
pub fn next_fire(schedule: &TaskSchedule, now: Timestamp) -> Result<Timestamp, CoreError> {
    match schedule {
        TaskSchedule::Every { interval_secs, .. } => {
            Ok(now + chrono::Duration::seconds(*interval_secs as i64))
        }
        TaskSchedule::Cron(expr) => next_cron_fire(expr, now),
    }
}

fn next_cron_fire(expr: &str, after: Timestamp) -> Result<Timestamp, CoreError> {
    let schedule = cron::Schedule::from_str(expr)
        .map_err(|e| CoreError::Infra(format!("Bad cron expression {expr:?}: {e}")))?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| CoreError::Infra(format!("Cron expression {expr:?} never fires")))
}

/// Durable scheduled-task registry over Postgres.
pub struct ScheduleRepo {
    pool: PgPool,
}

impl ScheduleRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Tasks whose fire time has arrived, claimed for this process with
    /// `FOR UPDATE SKIP LOCKED` so concurrent api instances do not
    /// double-fire. Each claimed task's `next_run_at` is advanced in the
    /// same transaction.
    pub async fn take_due(&self) -> Result<Vec<ScheduledTask>, CoreError> {
        let mut tx = self.pool.begin().await.map_err(CoreError::from)?;

        let rows = sqlx::query_as::<_, ScheduledTaskRow>(
            "SELECT name, namespace, schedule, timeout_secs, next_run_at, created_at \
             FROM scheduled_tasks \
             WHERE namespace = $1 AND next_run_at <= NOW() \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(SCHEDULER_NAMESPACE)
        .fetch_all(&mut *tx)
        .await
        .map_err(CoreError::from)?;

        let mut due = Vec::with_capacity(rows.len());
        let now = Utc::now();
        for row in rows {
            let schedule = decode_schedule(&row.schedule)?;
            let next = next_fire(&schedule, now)?;
            sqlx::query("UPDATE scheduled_tasks SET next_run_at = $2 WHERE name = $1")
                .bind(&row.name)
                .bind(next)
                .execute(&mut *tx)
                .await
                .map_err(CoreError::from)?;
            due.push(ScheduledTask {
                name: row.name,
                schedule,
                timeout_secs: row.timeout_secs as u64,
                next_run_at: row.next_run_at,
            });
        }

        tx.commit().await.map_err(CoreError::from)?;
        Ok(due)
    }
}

#[async_trait::async_trait]
impl TaskRegistry for ScheduleRepo {
    async fn clear_namespace(&self) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM scheduled_tasks WHERE namespace = $1")
            .bind(SCHEDULER_NAMESPACE)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        Ok(result.rows_affected())
    }

    async fn install(&self, spec: &ScheduledTaskSpec) -> Result<(), CoreError> {
        let next_run_at = first_fire(&spec.schedule, Utc::now())?;
        sqlx::query(
            "INSERT INTO scheduled_tasks \
                 (name, namespace, schedule, timeout_secs, next_run_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (name) DO UPDATE SET \
                 namespace = EXCLUDED.namespace, \
                 schedule = EXCLUDED.schedule, \
                 timeout_secs = EXCLUDED.timeout_secs, \
                 next_run_at = EXCLUDED.next_run_at",
        )
        .bind(spec.name)
        .bind(SCHEDULER_NAMESPACE)
        .bind(encode_schedule(&spec.schedule))
        .bind(spec.timeout_secs as i64)
        .bind(next_run_at)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ScheduledTask>, CoreError> {
        let rows = sqlx::query_as::<_, ScheduledTaskRow>(
            "SELECT name, namespace, schedule, timeout_secs, next_run_at, created_at \
             FROM scheduled_tasks WHERE namespace = $1 ORDER BY name",
        )
        .bind(SCHEDULER_NAMESPACE)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;

        rows.into_iter()
            .map(|row| {
                Ok(ScheduledTask {
                    schedule: decode_schedule(&row.schedule)?,
                    name: row.name,
                    timeout_secs: row.timeout_secs as u64,
                    next_run_at: row.next_run_at,
                })
            })
            .collect()
    }
}
