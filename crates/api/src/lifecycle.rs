//! Job lifecycle core: creation, ownership-checked reads, cancellation.
//!
//! Every read that crosses a session boundary goes through the
//! ownership check here, with the anti-probing fold applied in exactly
//! one place so no handler can leak job existence by accident.

use picstyle_core::error::CoreError;
use picstyle_core::job::{Artifact, JobKind, StyleParams, PRIORITY_NORMAL};
use picstyle_core::retention::TtlConfig;
use picstyle_core::status::JobStatus;
use picstyle_core::types::{JobId, SessionId};
use picstyle_db::models::job::{CancelOutcome, Job, NewJob};
use picstyle_db::repositories::JobRepo;
use picstyle_db::DbPool;

use crate::stream::{StatusSnapshot, StatusSource};

/// Session-scoped job lifecycle operations over the store.
pub struct JobLifecycle {
    pool: DbPool,
    hide_foreign_jobs: bool,
}

impl JobLifecycle {
    pub fn new(pool: DbPool, hide_foreign_jobs: bool) -> Self {
        Self {
            pool,
            hide_foreign_jobs,
        }
    }

    /// Create and enqueue a style job for `session_id`.
    ///
    /// The caller supplies the id because it also names the upload
    /// directory, written before this row exists.
    pub async fn create_style_job(
        &self,
        job_id: JobId,
        session_id: SessionId,
        params: &StyleParams,
    ) -> Result<Job, CoreError> {
        let new = NewJob {
            id: job_id,
            kind: JobKind::Style,
            session_id: Some(session_id),
            priority: PRIORITY_NORMAL,
            parameters: serde_json::to_value(params)
                .map_err(|e| CoreError::Infra(e.to_string()))?,
            ttl: TtlConfig::default(),
        };
        let job = JobRepo::submit(&self.pool, &new).await?;
        tracing::info!(job_id = %job.id, "Style job submitted");
        Ok(job)
    }

    /// Fetch a job the session owns. A missing job and a foreign job are
    /// indistinguishable to the caller when `hide_foreign_jobs` is on.
    pub async fn get_owned(&self, job_id: JobId, session_id: SessionId) -> Result<Job, CoreError> {
        let job = JobRepo::find_by_id(&self.pool, job_id)
            .await?
            .ok_or(CoreError::NotFound { job_id })?;
        authorize(&job, session_id, self.hide_foreign_jobs)?;
        Ok(job)
    }

    /// The finished job's result artifact, for the download handler.
    pub async fn result_artifact(
        &self,
        job_id: JobId,
        session_id: SessionId,
    ) -> Result<Artifact, CoreError> {
        let job = self.get_owned(job_id, session_id).await?;
        if job.status != JobStatus::Finished {
            return Err(CoreError::NotFound { job_id });
        }
        let result = job.result.ok_or(CoreError::NotFound { job_id })?;
        serde_json::from_value(result).map_err(|e| CoreError::Infra(e.to_string()))
    }

    /// Request cancellation of an owned job. Best-effort cooperative:
    /// succeeds whatever state the job is in, the outcome says what
    /// actually happened.
    pub async fn cancel(
        &self,
        job_id: JobId,
        session_id: SessionId,
    ) -> Result<CancelOutcome, CoreError> {
        self.get_owned(job_id, session_id).await?;
        let outcome = JobRepo::cancel(&self.pool, job_id).await?;
        tracing::info!(job_id = %job_id, ?outcome, "Cancel requested");
        if outcome == CancelOutcome::Canceled {
            if let Err(e) = picstyle_events::pg::notify_job_update(&self.pool, job_id).await {
                tracing::warn!(job_id = %job_id, error = %e, "Cancel notification failed");
            }
        }
        Ok(outcome)
    }
}

/// Ownership gate for every session-scoped read. The anti-probing fold
/// happens here and nowhere else: a foreign job surfaces as `NotOwned`
/// only when the policy reveals foreign jobs, as `NotFound` otherwise.
fn authorize(job: &Job, session_id: SessionId, hide_foreign_jobs: bool) -> Result<(), CoreError> {
    if job.is_owned_by(session_id) {
        Ok(())
    } else {
        Err(CoreError::NotOwned { job_id: job.id }.fold_ownership(hide_foreign_jobs))
    }
}

#[async_trait::async_trait]
impl StatusSource for JobLifecycle {
    /// One consistent (status, position) pair. Status is read first and
    /// position only consulted while queued, so a job that gets claimed
    /// between the two reads surfaces as queued at its old position for
    /// one cycle at most.
    async fn snapshot(
        &self,
        job_id: JobId,
        session_id: SessionId,
    ) -> Result<StatusSnapshot, CoreError> {
        let job = self.get_owned(job_id, session_id).await?;
        let position = if job.status == JobStatus::Queued {
            Some(JobRepo::queue_position(&self.pool, job_id).await?)
        } else {
            None
        };
        Ok(StatusSnapshot {
            status: job.status,
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picstyle_core::types::{new_job_id, new_session_id};

    fn job_for(session_id: Option<SessionId>) -> Job {
        Job {
            id: new_job_id(),
            kind: JobKind::Style,
            status: JobStatus::Queued,
            session_id,
            priority: PRIORITY_NORMAL,
            parameters: serde_json::Value::Null,
            result: None,
            error: None,
            cancel_requested: false,
            timeout_secs: 300,
            result_ttl_secs: 3600,
            failure_ttl_secs: 3600,
            queue_ttl_secs: 1800,
            worker_id: None,
            submitted_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            expires_at: None,
        }
    }

    #[test]
    fn owner_is_authorized() {
        let session = new_session_id();
        let job = job_for(Some(session));
        assert!(authorize(&job, session, true).is_ok());
        assert!(authorize(&job, session, false).is_ok());
    }

    #[test]
    fn foreign_session_gets_not_found_when_hidden() {
        // With hiding on, a foreign job and a missing job must be
        // indistinguishable: no probe can confirm an id exists.
        let job = job_for(Some(new_session_id()));
        let err = authorize(&job, new_session_id(), true).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { job_id } if job_id == job.id));
    }

    #[test]
    fn foreign_session_gets_not_owned_when_visible() {
        let job = job_for(Some(new_session_id()));
        let err = authorize(&job, new_session_id(), false).unwrap_err();
        assert!(matches!(err, CoreError::NotOwned { job_id } if job_id == job.id));
    }

    #[test]
    fn system_job_is_owned_by_nobody() {
        let job = job_for(None);
        assert!(authorize(&job, new_session_id(), true).is_err());
        assert!(authorize(&job, new_session_id(), false).is_err());
    }
}
