use crate::types::JobId;

/// Domain error taxonomy shared by the API server and the worker.
///
/// `NotFound` and `NotOwned` are deliberately separate variants: whether
/// a caller can distinguish them is a policy decision applied at the
/// edge (see the `hide_foreign_jobs` configuration flag), not here.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The job does not exist (or has expired out of retention).
    #[error("Job not found: {job_id}")]
    NotFound { job_id: JobId },

    /// The job exists but belongs to a different session.
    #[error("Job {job_id} is owned by another session")]
    NotOwned { job_id: JobId },

    /// Admission control rejected a new submission. A normal outcome
    /// under load, not a fault.
    #[error("System is at capacity, try again later")]
    Busy,

    /// A status stream reached its session deadline before the job
    /// reached a terminal state. The job may still be running.
    #[error("Timed out waiting for the job to finalize")]
    TimedOut,

    /// The job executed and raised.
    #[error("Worker failed: {0}")]
    WorkerFailed(String),

    /// The job exceeded its execution timeout. Treated as a failure
    /// variant everywhere a terminal status is needed.
    #[error("Worker exceeded the {timeout_secs}s execution timeout")]
    WorkerTimeout { timeout_secs: u64 },

    /// Store, queue, or bus unreachable.
    #[error("Infrastructure error: {0}")]
    Infra(String),
}

impl CoreError {
    /// Fold `NotOwned` into `NotFound` when the anti-probing policy is
    /// active, so cross-session probes cannot learn whether an id
    /// exists. Every other variant passes through unchanged.
    pub fn fold_ownership(self, hide_foreign_jobs: bool) -> CoreError {
        match self {
            CoreError::NotOwned { job_id } if hide_foreign_jobs => CoreError::NotFound { job_id },
            other => other,
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Infra(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::new_job_id;
    use assert_matches::assert_matches;

    #[test]
    fn fold_hides_ownership_when_enabled() {
        let id = new_job_id();
        let folded = CoreError::NotOwned { job_id: id }.fold_ownership(true);
        assert_matches!(folded, CoreError::NotFound { job_id } if job_id == id);
    }

    #[test]
    fn fold_preserves_ownership_when_disabled() {
        let id = new_job_id();
        let kept = CoreError::NotOwned { job_id: id }.fold_ownership(false);
        assert_matches!(kept, CoreError::NotOwned { job_id } if job_id == id);
    }

    #[test]
    fn fold_leaves_other_variants_alone() {
        assert_matches!(CoreError::Busy.fold_ownership(true), CoreError::Busy);
        let id = new_job_id();
        assert_matches!(
            CoreError::NotFound { job_id: id }.fold_ownership(true),
            CoreError::NotFound { .. }
        );
    }
}
