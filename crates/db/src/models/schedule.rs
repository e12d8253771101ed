//! Scheduled task row model.

use picstyle_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `scheduled_tasks` table.
///
/// `schedule` is either `every:<secs>` or `cron:<expression>` (six-field
/// cron with seconds).
#[derive(Debug, Clone, FromRow)]
pub struct ScheduledTaskRow {
    pub name: String,
    pub namespace: String,
    pub schedule: String,
    pub timeout_secs: i64,
    pub next_run_at: Timestamp,
    pub created_at: Timestamp,
}
