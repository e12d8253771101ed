//! Claim-and-execute loop.
//!
//! One runner task per worker process: heartbeat, claim the next queued
//! job, execute it under its timeout while watching for cancellation,
//! write the terminal transition, notify. Every terminal write is
//! guarded by `status = 'started'` in the repository, so a crashed or
//! raced runner can never overwrite another terminal state.

use std::sync::Arc;
use std::time::Duration;

use picstyle_core::error::CoreError;
use picstyle_core::job::{JobKind, StyleParams};
use picstyle_core::retention::TtlConfig;
use picstyle_db::models::job::Job;
use picstyle_db::repositories::worker_repo::WorkerRepo;
use picstyle_db::repositories::{HistoryRepo, JobRepo};
use picstyle_db::DbPool;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::tasks;
use crate::transform::{StyleTransform, TransformSpec};

/// How often a running job checks for a cancellation request.
const CANCEL_POLL: Duration = Duration::from_secs(1);

/// Heartbeat interval while executing a long job.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How one execution ended, before it is written to the store.
#[derive(Debug)]
enum Outcome {
    Completed(Value),
    Failed(CoreError),
    TimedOut,
    /// Cancellation observed mid-run; the work future was dropped.
    Aborted,
}

/// The terminal write an outcome maps to.
#[derive(Debug, PartialEq)]
enum TerminalAction {
    Finish(Value),
    Fail(String),
    /// Voluntary exit after a cancel request.
    Canceled,
    /// Forcibly interrupted.
    Stopped,
}

/// Pure outcome-to-transition mapping. `cancel_requested` is the flag
/// value at completion time: work that finishes on its own after a
/// cancel request still ends as canceled, not finished.
fn terminal_action(outcome: Outcome, cancel_requested: bool, timeout_secs: u64) -> TerminalAction {
    match outcome {
        Outcome::Completed(_) if cancel_requested => TerminalAction::Canceled,
        Outcome::Completed(result) => TerminalAction::Finish(result),
        Outcome::Failed(e) => TerminalAction::Fail(e.to_string()),
        Outcome::TimedOut => {
            TerminalAction::Fail(CoreError::WorkerTimeout { timeout_secs }.to_string())
        }
        Outcome::Aborted => TerminalAction::Stopped,
    }
}

pub struct Runner {
    pool: DbPool,
    config: WorkerConfig,
    transform: Arc<dyn StyleTransform>,
}

impl Runner {
    pub fn new(pool: DbPool, config: WorkerConfig, transform: Arc<dyn StyleTransform>) -> Self {
        Self {
            pool,
            config,
            transform,
        }
    }

    /// Run until `cancel` fires. A job in flight is finished, not
    /// abandoned; only the claim loop observes the shutdown.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        tracing::info!(worker_id = %self.config.worker_id, "Worker runner started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker runner shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }

            self.heartbeat("idle").await;

            // Drain the queue before going back to sleep.
            loop {
                let claimed = match JobRepo::claim_next(&self.pool, &self.config.worker_id).await {
                    Ok(claimed) => claimed,
                    Err(e) => {
                        tracing::warn!(error = %e, "Claim failed");
                        break;
                    }
                };
                let Some(job) = claimed else { break };

                self.heartbeat("busy").await;
                self.execute(job).await;

                if cancel.is_cancelled() {
                    break;
                }
            }
        }

        tracing::info!("Worker runner stopped");
    }

    async fn heartbeat(&self, state: &str) {
        if let Err(e) = WorkerRepo::heartbeat(&self.pool, &self.config.worker_id, state).await {
            tracing::warn!(error = %e, "Heartbeat failed");
        }
    }

    /// Execute one claimed job through to its terminal transition.
    async fn execute(&self, job: Job) {
        tracing::info!(job_id = %job.id, kind = ?job.kind, "Job claimed");
        self.notify(job.id).await;

        let history_id = match HistoryRepo::start(&self.pool, job.id).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "History start failed");
                None
            }
        };

        let timeout_secs = job.timeout_secs.max(1) as u64;
        let outcome = self.drive(&job, timeout_secs).await;

        let cancel_requested = JobRepo::cancel_requested(&self.pool, job.id)
            .await
            .unwrap_or(false);
        let action = terminal_action(outcome, cancel_requested, timeout_secs);

        let succeeded = matches!(action, TerminalAction::Finish(_));
        let write = match &action {
            TerminalAction::Finish(result) => JobRepo::complete(&self.pool, job.id, result).await,
            TerminalAction::Fail(error) => {
                tracing::warn!(job_id = %job.id, error = %error, "Job failed");
                JobRepo::fail(&self.pool, job.id, error).await
            }
            TerminalAction::Canceled => JobRepo::finish_canceled(&self.pool, job.id, false).await,
            TerminalAction::Stopped => JobRepo::finish_canceled(&self.pool, job.id, true).await,
        };
        if let Err(e) = write {
            tracing::error!(job_id = %job.id, error = %e, "Terminal write failed");
        }

        if let Some(id) = history_id {
            if let Err(e) = HistoryRepo::finish(&self.pool, id, succeeded).await {
                tracing::warn!(job_id = %job.id, error = %e, "History finish failed");
            }
        }

        // Inputs are consumed whatever the outcome; only the artifact
        // survives into retention.
        if job.kind == JobKind::Style {
            self.delete_inputs(&job).await;
        }

        self.notify(job.id).await;
        tracing::info!(job_id = %job.id, ?action, "Job finished");
    }

    /// Drive the job body against its deadline and the cancel flag.
    async fn drive(&self, job: &Job, timeout_secs: u64) -> Outcome {
        let work = self.perform(job);
        tokio::pin!(work);

        let deadline = tokio::time::sleep(Duration::from_secs(timeout_secs));
        tokio::pin!(deadline);

        let mut cancel_tick = tokio::time::interval(CANCEL_POLL);
        let mut heartbeat_tick = tokio::time::interval(HEARTBEAT_INTERVAL);

        loop {
            tokio::select! {
                result = &mut work => {
                    return match result {
                        Ok(value) => Outcome::Completed(value),
                        Err(e) => Outcome::Failed(e),
                    };
                }
                _ = &mut deadline => {
                    tracing::warn!(job_id = %job.id, timeout_secs, "Job hit its timeout");
                    return Outcome::TimedOut;
                }
                _ = cancel_tick.tick() => {
                    match JobRepo::cancel_requested(&self.pool, job.id).await {
                        Ok(true) => {
                            // Dropping the work future kills a child
                            // process via kill_on_drop.
                            tracing::info!(job_id = %job.id, "Cancel observed, aborting");
                            return Outcome::Aborted;
                        }
                        Ok(false) => {}
                        Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Cancel poll failed"),
                    }
                }
                _ = heartbeat_tick.tick() => self.heartbeat("busy").await,
            }
        }
    }

    /// The job body, selected by kind.
    async fn perform(&self, job: &Job) -> Result<Value, CoreError> {
        match job.kind {
            JobKind::Style => self.perform_style(job).await,
            JobKind::HealthCheck => {
                tasks::canary::run(
                    self.transform.as_ref(),
                    &self.config.jobs_dir,
                    &job.parameters,
                )
                .await
            }
            JobKind::Cleanup => {
                let jobs_dir = self.config.jobs_dir.clone();
                let horizon = TtlConfig::default().retention_horizon();
                let report = tokio::task::spawn_blocking(move || {
                    tasks::cleanup::sweep(&jobs_dir, horizon)
                })
                .await
                .map_err(|e| CoreError::Infra(format!("Sweep task panicked: {e}")))?;

                // Row purge rides along with the hourly file sweep so
                // expired records never wait for the daily maintenance.
                let rows = JobRepo::delete_expired(&self.pool).await?;
                tracing::info!(
                    files_removed = report.files_removed,
                    dirs_removed = report.dirs_removed,
                    rows_purged = rows,
                    "Cleanup sweep complete",
                );
                serde_json::to_value(&report).map_err(|e| CoreError::Infra(e.to_string()))
            }
            JobKind::StatsLog => Ok(tasks::stats::run(&self.pool).await?),
            JobKind::HistoryMaintenance => Ok(tasks::history::run(&self.pool).await?),
        }
    }

    async fn perform_style(&self, job: &Job) -> Result<Value, CoreError> {
        let params: StyleParams = serde_json::from_value(job.parameters.clone())
            .map_err(|e| CoreError::WorkerFailed(format!("Bad style parameters: {e}")))?;

        let artifact_path = format!("{}/{}", job.id, params.output_name);
        let spec = TransformSpec {
            content: self.config.jobs_dir.join(&params.content_path),
            style: self.config.jobs_dir.join(&params.style_path),
            output: self.config.jobs_dir.join(&artifact_path),
            artifact_path,
            strength: params.strength.min(100),
        };

        let artifact = self.transform.run(&spec).await?;
        serde_json::to_value(&artifact).map_err(|e| CoreError::Infra(e.to_string()))
    }

    /// Delete a style job's uploaded inputs after its terminal
    /// transition.
    async fn delete_inputs(&self, job: &Job) {
        let Ok(params) = serde_json::from_value::<StyleParams>(job.parameters.clone()) else {
            return;
        };
        for rel in [&params.content_path, &params.style_path] {
            let path = self.config.jobs_dir.join(rel);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Input cleanup failed");
                }
            }
        }
    }

    async fn notify(&self, job_id: picstyle_core::types::JobId) {
        if let Err(e) = picstyle_events::pg::notify_job_update(&self.pool, job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Notification failed");
        }
    }
}
