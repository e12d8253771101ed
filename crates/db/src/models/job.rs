//! Job entity model and submission DTOs.

use picstyle_core::job::JobKind;
use picstyle_core::retention::TtlConfig;
use picstyle_core::status::JobStatus;
use picstyle_core::types::{JobId, SessionId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `jobs` table. The row is simultaneously the job
/// record and the queue entry; a job is "in the queue" exactly while
/// its status is `queued`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Owning session. `None` for system jobs, set exactly once at
    /// creation for user jobs and never changed.
    pub session_id: Option<SessionId>,
    pub priority: i32,
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub cancel_requested: bool,
    pub timeout_secs: i64,
    pub result_ttl_secs: i64,
    pub failure_ttl_secs: i64,
    pub queue_ttl_secs: i64,
    pub worker_id: Option<String>,
    pub submitted_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    /// Retention deadline, set when the job reaches a terminal state.
    pub expires_at: Option<Timestamp>,
}

impl Job {
    /// Whether this session owns the job. System jobs are owned by
    /// nobody; ownership is exact equality, never prefix or pattern.
    pub fn is_owned_by(&self, session_id: SessionId) -> bool {
        self.session_id == Some(session_id)
    }
}

/// Arguments for inserting a new job row.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: JobId,
    pub kind: JobKind,
    pub session_id: Option<SessionId>,
    pub priority: i32,
    pub parameters: serde_json::Value,
    pub ttl: TtlConfig,
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was still queued and is now `canceled`.
    Canceled,
    /// The job was executing; the worker will observe the request.
    Requested,
    /// The job had already reached a terminal state. Success per the
    /// cooperative-cancel policy; the stored status is untouched.
    AlreadyTerminal,
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
            priority: 0,
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
    fn owner_matches_by_exact_equality() {
        let session = new_session_id();
        assert!(job_for(Some(session)).is_owned_by(session));
    }

    #[test]
    fn foreign_session_never_owns() {
        let job = job_for(Some(new_session_id()));
        assert!(!job.is_owned_by(new_session_id()));
    }

    #[test]
    fn system_job_has_no_owner() {
        assert!(!job_for(None).is_owned_by(new_session_id()));
    }
}
