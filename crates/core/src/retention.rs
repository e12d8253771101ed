//! Time-to-live configuration for jobs and their artifacts.

use std::time::Duration;

/// Default execution timeout for a user job.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How long a finished job's record and artifact are retained.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(60 * 60);

/// How long a failed job's record is retained (kept longer than results
/// so failures stay inspectable).
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How long a job may sit in the queue before it is eligible for purge.
pub const DEFAULT_QUEUE_TTL: Duration = Duration::from_secs(30 * 60);

/// Execution timeout for system jobs. Short, so canaries never linger
/// consuming retention budget.
pub const SYSTEM_JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// Nominal retention for system job records. System slots are a fixed
/// set of rows upserted in place and exempt from the row purge, so this
/// only bounds their `expires_at` metadata.
pub const SYSTEM_JOB_TTL: Duration = Duration::from_secs(10 * 60);

/// Per-job retention configuration, supplied at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlConfig {
    /// Execution timeout enforced by the worker.
    pub job_timeout: Duration,
    /// Retention of a successful result.
    pub result_ttl: Duration,
    /// Retention of a failed record.
    pub failure_ttl: Duration,
    /// Retention while still queued.
    pub queue_ttl: Duration,
}

impl TtlConfig {
    /// TTLs for system jobs: short timeout, short retention, so repeated
    /// canaries never accumulate.
    pub fn system() -> Self {
        Self {
            job_timeout: SYSTEM_JOB_TIMEOUT,
            result_ttl: SYSTEM_JOB_TTL,
            failure_ttl: SYSTEM_JOB_TTL,
            queue_ttl: SYSTEM_JOB_TTL,
        }
    }

    /// The horizon past which no file belonging to a job can still be
    /// needed: the sum of every possible retention window. Used by the
    /// cleanup sweep as its deletion cutoff.
    pub fn retention_horizon(&self) -> Duration {
        self.job_timeout + self.result_ttl.max(self.failure_ttl) + self.queue_ttl
    }
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            job_timeout: DEFAULT_JOB_TIMEOUT,
            result_ttl: DEFAULT_RESULT_TTL,
            failure_ttl: DEFAULT_FAILURE_TTL,
            queue_ttl: DEFAULT_QUEUE_TTL,
        }
    }
}
