//! Job status values and the lifecycle state machine.
//!
//! `queued -> started -> {finished | failed | stopped}` plus the two
//! cancellation edges: `queued -> canceled` (pre-execution) and
//! `started -> canceled` (cooperative cancel where the worker exits
//! voluntarily; a forced kill surfaces as `stopped` instead).

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
///
/// Stored as lowercase text in the database and serialized the same way
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the work queue. The only status with a queue position.
    Queued,
    /// Claimed by a worker and executing.
    Started,
    /// Terminal: execution returned a result artifact.
    Finished,
    /// Terminal: execution raised or exceeded its timeout.
    Failed,
    /// Terminal: cancelled before or during execution, worker exited
    /// voluntarily.
    Canceled,
    /// Terminal: execution was forcibly interrupted by a cancel.
    Stopped,
}

impl JobStatus {
    /// Whether no further transition can occur from this status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Failed | JobStatus::Canceled | JobStatus::Stopped
        )
    }

    /// Lowercase wire/database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Stopped => "stopped",
        }
    }

    /// The set of statuses reachable from `self`.
    ///
    /// Terminal statuses return an empty slice: nothing ever observes a
    /// transition out of them.
    pub fn valid_transitions(self) -> &'static [JobStatus] {
        match self {
            JobStatus::Queued => &[JobStatus::Started, JobStatus::Canceled],
            JobStatus::Started => &[
                JobStatus::Finished,
                JobStatus::Failed,
                JobStatus::Canceled,
                JobStatus::Stopped,
            ],
            _ => &[],
        }
    }

    /// Check whether a transition from `self` to `to` is allowed.
    pub fn can_transition(self, to: JobStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "started" => Ok(JobStatus::Started),
            "finished" => Ok(JobStatus::Finished),
            "failed" => Ok(JobStatus::Failed),
            "canceled" => Ok(JobStatus::Canceled),
            "stopped" => Ok(JobStatus::Stopped),
            other => Err(format!("Unknown job status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::JobStatus::*;
    use super::*;

    const ALL: [JobStatus; 6] = [Queued, Started, Finished, Failed, Canceled, Stopped];

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn queued_to_started() {
        assert!(Queued.can_transition(Started));
    }

    #[test]
    fn queued_to_canceled() {
        assert!(Queued.can_transition(Canceled));
    }

    #[test]
    fn started_to_finished() {
        assert!(Started.can_transition(Finished));
    }

    #[test]
    fn started_to_failed() {
        assert!(Started.can_transition(Failed));
    }

    #[test]
    fn started_to_canceled() {
        assert!(Started.can_transition(Canceled));
    }

    #[test]
    fn started_to_stopped() {
        assert!(Started.can_transition(Stopped));
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn queued_cannot_skip_to_finished() {
        assert!(!Queued.can_transition(Finished));
        assert!(!Queued.can_transition(Failed));
        assert!(!Queued.can_transition(Stopped));
    }

    #[test]
    fn terminal_statuses_have_no_transitions() {
        for from in [Finished, Failed, Canceled, Stopped] {
            assert!(from.valid_transitions().is_empty(), "{from} must be terminal");
            for to in ALL {
                assert!(!from.can_transition(to));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Terminal classification
    // -----------------------------------------------------------------------

    #[test]
    fn only_queued_and_started_are_non_terminal() {
        for status in ALL {
            let expected = matches!(status, Queued | Started);
            assert_eq!(!status.is_terminal(), expected);
        }
    }

    // -----------------------------------------------------------------------
    // Wire representation round-trip
    // -----------------------------------------------------------------------

    #[test]
    fn as_str_parses_back() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_rejected() {
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Finished).unwrap(), "\"finished\"");
    }
}
