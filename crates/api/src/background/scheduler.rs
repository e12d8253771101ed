//! Recurring system task scheduler.
//!
//! Two halves: `install_all` runs once at process start (clear the
//! namespace, then install the fixed task set, so a crash/restart cycle
//! never leaves duplicate registrations firing), and `run` is the
//! driver loop that takes due registrations and enqueues the matching
//! system job into the ordinary work queue.

use std::time::Duration;

use picstyle_core::error::CoreError;
use picstyle_core::job::{JobKind, PRIORITY_SYSTEM};
use picstyle_core::registry::{ScheduledTaskSpec, TaskRegistry, TaskSchedule};
use picstyle_core::retention::TtlConfig;
use picstyle_core::types::{JobId, HEALTH_CHECK_JOB_ID, IMAGE_CHECK_JOB_ID};
use picstyle_db::models::job::NewJob;
use picstyle_db::repositories::{JobRepo, ScheduleRepo};
use picstyle_db::DbPool;
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// How often the driver checks for due registrations.
const DRIVER_TICK: Duration = Duration::from_secs(10);

/// Well-known slots for non-canary system jobs, so each registration
/// re-uses one row instead of accumulating one per firing.
const STATS_LOG_JOB_ID: JobId =
    uuid::Uuid::from_u128(0x9e1c_0000_0000_4000_8000_0000_0000_0011);
const CLEANUP_JOB_ID: JobId =
    uuid::Uuid::from_u128(0x9e1c_0000_0000_4000_8000_0000_0000_0012);
const HISTORY_JOB_ID: JobId =
    uuid::Uuid::from_u128(0x9e1c_0000_0000_4000_8000_0000_0000_0013);

/// The fixed recurring task set.
pub fn task_specs() -> Vec<ScheduledTaskSpec> {
    vec![
        ScheduledTaskSpec {
            name: "stats_log",
            schedule: TaskSchedule::Every {
                interval_secs: 15 * 60,
                initial_delay_secs: 0,
            },
            timeout_secs: 60,
        },
        ScheduledTaskSpec {
            name: "cleanup_data",
            schedule: TaskSchedule::Every {
                interval_secs: 60 * 60,
                initial_delay_secs: 0,
            },
            timeout_secs: 5 * 60,
        },
        // The canary fires shortly after start so a fresh deployment
        // produces a health signal without waiting a full interval.
        ScheduledTaskSpec {
            name: "health_check",
            schedule: TaskSchedule::Every {
                interval_secs: 15 * 60,
                initial_delay_secs: 10,
            },
            timeout_secs: 60,
        },
        ScheduledTaskSpec {
            name: "history_maintenance",
            schedule: TaskSchedule::Cron("0 0 3 * * *".into()),
            timeout_secs: 5 * 60,
        },
    ]
}

/// Install the task set, clearing any stale registrations first.
/// Idempotent across restarts and concurrent instances.
pub async fn install_all(registry: &dyn TaskRegistry) -> Result<(), CoreError> {
    let cleared = registry.clear_namespace().await?;
    if cleared > 0 {
        tracing::debug!(cleared, "Cleared stale task registrations");
    }
    for spec in task_specs() {
        registry.install(&spec).await?;
        tracing::info!(task = spec.name, "Scheduled task installed");
    }
    Ok(())
}

/// The system jobs a due registration expands to.
fn jobs_for_task(name: &str, timeout_secs: u64) -> Vec<NewJob> {
    let ttl = TtlConfig {
        job_timeout: Duration::from_secs(timeout_secs),
        ..TtlConfig::system()
    };
    let new = |id: JobId, kind: JobKind, parameters: serde_json::Value| NewJob {
        id,
        kind,
        session_id: None,
        priority: PRIORITY_SYSTEM,
        parameters,
        ttl,
    };

    match name {
        "stats_log" => vec![new(STATS_LOG_JOB_ID, JobKind::StatsLog, json!({}))],
        "cleanup_data" => vec![new(CLEANUP_JOB_ID, JobKind::Cleanup, json!({}))],
        // Two canaries per firing: a queue round-trip and an actual
        // tiny image transform.
        "health_check" => vec![
            new(
                HEALTH_CHECK_JOB_ID,
                JobKind::HealthCheck,
                json!({ "probe": "queue" }),
            ),
            new(
                IMAGE_CHECK_JOB_ID,
                JobKind::HealthCheck,
                json!({ "probe": "image" }),
            ),
        ],
        "history_maintenance" => {
            vec![new(HISTORY_JOB_ID, JobKind::HistoryMaintenance, json!({}))]
        }
        other => {
            tracing::error!(task = other, "Unknown scheduled task, skipping");
            vec![]
        }
    }
}

/// Driver loop: tick, take due registrations, enqueue their system
/// jobs. Store errors are logged and retried next tick; the loop only
/// exits on cancellation.
pub async fn run(pool: DbPool, cancel: CancellationToken) {
    tracing::info!("Scheduler driver started");
    let repo = ScheduleRepo::new(pool.clone());
    let mut tick = tokio::time::interval(DRIVER_TICK);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        let due = match repo.take_due().await {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!(error = %e, "Scheduler tick failed");
                continue;
            }
        };

        for task in due {
            for job in jobs_for_task(&task.name, task.timeout_secs as u64) {
                match JobRepo::submit_system(&pool, &job).await {
                    Ok(true) => {
                        tracing::info!(task = %task.name, job_id = %job.id, "System job enqueued");
                    }
                    Ok(false) => {
                        // Previous run still queued or started; the
                        // slot is left alone.
                        tracing::debug!(task = %task.name, job_id = %job.id, "System slot busy");
                    }
                    Err(e) => {
                        tracing::warn!(task = %task.name, error = %e, "System enqueue failed");
                    }
                }
            }
        }
    }

    tracing::info!("Scheduler driver stopped");
}
