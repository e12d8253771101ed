//! Dependency seams for process-wide registries.
//!
//! Worker liveness, queue depth, and scheduled-task registrations are
//! process-external shared state. They are passed in explicitly as trait
//! objects (constructed at process start, torn down at process stop)
//! rather than read from ambient globals, so admission and scheduling
//! behavior can be exercised with test doubles.

use crate::error::CoreError;
use crate::types::Timestamp;

/// Observed liveness state of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy,
    Offline,
}

impl WorkerState {
    /// Idle and busy workers both count as active capacity.
    pub fn is_active(self) -> bool {
        matches!(self, WorkerState::Idle | WorkerState::Busy)
    }
}

/// Live view of the worker registry. Expensive to query (scans the
/// registry), which is why the admission controller caches its verdict.
#[async_trait::async_trait]
pub trait WorkerRegistry: Send + Sync {
    /// Number of workers currently in an active (idle or busy) state.
    async fn active_worker_count(&self) -> Result<usize, CoreError>;
}

/// Depth of the pending work queue.
#[async_trait::async_trait]
pub trait QueueInfo: Send + Sync {
    /// Number of jobs currently in `queued` status.
    async fn queued_len(&self) -> Result<i64, CoreError>;
}

// ---------------------------------------------------------------------------
// Scheduled task registry
// ---------------------------------------------------------------------------

/// When a recurring task fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSchedule {
    /// Fixed interval in seconds, with an optional initial delay.
    Every { interval_secs: u64, initial_delay_secs: u64 },
    /// Six-field cron expression (seconds granularity).
    Cron(String),
}

/// A recurring system task registration.
#[derive(Debug, Clone)]
pub struct ScheduledTaskSpec {
    /// Fixed logical name, e.g. `"health_check"`. Exactly one live
    /// registration may exist per name.
    pub name: &'static str,
    pub schedule: TaskSchedule,
    /// Execution timeout of the enqueued job, distinct from the
    /// scheduler's own bookkeeping.
    pub timeout_secs: u64,
}

/// A live registration as stored by the registry.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub name: String,
    pub schedule: TaskSchedule,
    pub timeout_secs: u64,
    pub next_run_at: Timestamp,
}

/// Durable registry of scheduled tasks, shared by all processes.
///
/// The de-duplication contract: `clear_namespace` must complete before
/// any `install` on process start, so a crash/restart cycle never leaves
/// two live registrations firing under the same name.
#[async_trait::async_trait]
pub trait TaskRegistry: Send + Sync {
    /// Forcibly delete every registration under the scheduler namespace.
    async fn clear_namespace(&self) -> Result<u64, CoreError>;

    /// Install a registration, computing its first fire time from the
    /// schedule.
    async fn install(&self, spec: &ScheduledTaskSpec) -> Result<(), CoreError>;

    /// All live registrations, for inspection and tests.
    async fn list(&self) -> Result<Vec<ScheduledTask>, CoreError>;
}
