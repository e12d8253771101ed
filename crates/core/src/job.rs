//! Job kinds, parameters, and priority constants.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Priority constants
// ---------------------------------------------------------------------------

/// Priority for system jobs (canaries, maintenance). Claimed before all
/// user traffic so health checks are never starved behind it.
pub const PRIORITY_SYSTEM: i32 = 10;

/// Priority for user-submitted jobs. Default.
pub const PRIORITY_NORMAL: i32 = 0;

// ---------------------------------------------------------------------------
// Job kinds
// ---------------------------------------------------------------------------

/// What a queued job does when a worker claims it.
///
/// System kinds flow through the same work queue as user jobs so the
/// canary exercises the full pipeline end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum JobKind {
    /// User-submitted style transfer of a content/style image pair.
    Style,
    /// Pipeline canary enqueued by the scheduler under a well-known id.
    HealthCheck,
    /// Artifact-directory retention sweep.
    Cleanup,
    /// Periodic job statistics logger.
    StatsLog,
    /// Daily maintenance: prune job history and expired job rows.
    HistoryMaintenance,
}

impl JobKind {
    pub fn is_system(self) -> bool {
        !matches!(self, JobKind::Style)
    }
}

// ---------------------------------------------------------------------------
// Style job parameters
// ---------------------------------------------------------------------------

/// The ordered argument list a style job hands to the worker, stored as
/// the job's `parameters` JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleParams {
    /// Path of the uploaded content image.
    pub content_path: String,
    /// Path of the uploaded style image.
    pub style_path: String,
    /// File name of the result artifact, relative to the job directory.
    pub output_name: String,
    /// Style strength in percent, clamped to `0..=100`.
    pub strength: u8,
}

/// A finished job's result pointer: artifact identity plus size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_kinds_classified() {
        assert!(!JobKind::Style.is_system());
        assert!(JobKind::HealthCheck.is_system());
        assert!(JobKind::Cleanup.is_system());
        assert!(JobKind::StatsLog.is_system());
        assert!(JobKind::HistoryMaintenance.is_system());
    }

    #[test]
    fn kinds_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobKind::HealthCheck).unwrap(),
            "\"health_check\""
        );
    }

    #[test]
    fn system_priority_beats_normal() {
        assert!(PRIORITY_SYSTEM > PRIORITY_NORMAL);
    }
}
