//! Pure health evaluation over a gathered snapshot.
//!
//! The probe handler gathers a [`HealthSnapshot`] from the store and the
//! worker registry, then calls [`evaluate`]. Keeping the rules pure
//! makes every edge (stale canary, in-flight first run, empty registry)
//! directly testable.

use std::time::Duration;

use crate::status::JobStatus;
use crate::types::{JobId, Timestamp};

/// How long a canary's most recent success stays valid. Past this window
/// a canary silently stuck in `queued` no longer masks an outage behind
/// stale success.
pub const CANARY_VALIDITY: Duration = Duration::from_secs(30 * 60);

/// Last observed state of one canary slot.
#[derive(Debug, Clone)]
pub struct CanaryRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Completion time of the most recent run, if any run has completed.
    pub completed_at: Option<Timestamp>,
}

/// Everything the health rules need, gathered in one pass.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    /// Current depth of the work queue.
    pub queue_len: i64,
    /// Admission-control capacity ceiling at snapshot time.
    pub capacity_ceiling: i64,
    /// Workers currently in an active (idle or busy) state.
    pub active_workers: usize,
    /// One record per well-known canary id; `None` when the slot has
    /// never been enqueued.
    pub canaries: Vec<Option<CanaryRecord>>,
}

/// The probe verdict. Failures are data reported to the caller, never
/// errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    Unhealthy { reason: String },
}

impl HealthVerdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthVerdict::Healthy)
    }
}

/// Apply the health rules to a snapshot.
///
/// - queue length above half the admission ceiling is an early warning;
/// - no active worker means nothing can drain the queue;
/// - each canary must have a recent successful run, except that a first
///   run still in flight is healthy so a fresh deployment does not
///   flap; a slot with no record at all fails, since that means the
///   scheduler never submitted it.
pub fn evaluate(snapshot: &HealthSnapshot, now: Timestamp) -> HealthVerdict {
    if snapshot.queue_len > snapshot.capacity_ceiling / 2 {
        return HealthVerdict::Unhealthy {
            reason: format!(
                "queue depth {} exceeds half the capacity ceiling {}",
                snapshot.queue_len, snapshot.capacity_ceiling
            ),
        };
    }

    if snapshot.active_workers == 0 {
        return HealthVerdict::Unhealthy {
            reason: "no worker in an active state".into(),
        };
    }

    for canary in &snapshot.canaries {
        if let Some(reason) = canary_failure(canary.as_ref(), now) {
            return HealthVerdict::Unhealthy { reason };
        }
    }

    HealthVerdict::Healthy
}

/// Health rule for a single canary slot. Returns the failure reason, or
/// `None` when the slot is healthy.
fn canary_failure(record: Option<&CanaryRecord>, now: Timestamp) -> Option<String> {
    let Some(record) = record else {
        // Never enqueued. A dead scheduler must not report healthy
        // forever, so a missing record fails even right after boot; the
        // first canary lands within the scheduler's initial delay.
        return Some("canary has never been scheduled".into());
    };

    match record.completed_at {
        None => {
            // A run is in flight but nothing has completed. A currently
            // running canary must never zero out an uptime metric.
            if record.status.is_terminal() {
                Some(format!(
                    "canary {} is {} with no completion time",
                    record.job_id, record.status
                ))
            } else {
                None
            }
        }
        Some(completed_at) => {
            if record.status == JobStatus::Finished || !record.status.is_terminal() {
                // Finished, or a fresh run in flight on top of a prior
                // completion: judge by the age of the last completion.
                let age = now.signed_duration_since(completed_at);
                if age > chrono::Duration::from_std(CANARY_VALIDITY).unwrap_or(chrono::Duration::MAX)
                {
                    Some(format!(
                        "canary {} last succeeded {}s ago, past the validity window",
                        record.job_id,
                        age.num_seconds()
                    ))
                } else {
                    None
                }
            } else {
                Some(format!(
                    "canary {} last run ended as {}",
                    record.job_id, record.status
                ))
            }
        }
    }
}
