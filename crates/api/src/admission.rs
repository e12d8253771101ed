//! Admission control: decide whether a new submission may enter the
//! queue, with a short-lived cached verdict so the worker registry is
//! not scanned on every request.

use std::sync::Arc;
use std::time::Duration;

use picstyle_core::error::CoreError;
use picstyle_core::registry::{QueueInfo, WorkerRegistry};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Verdict of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionVerdict {
    Admit,
    /// The queue is at capacity; the caller should be told to retry
    /// later rather than enqueue into a backlog nobody will drain soon.
    Reject,
}

impl AdmissionVerdict {
    pub fn is_admitted(self) -> bool {
        matches!(self, AdmissionVerdict::Admit)
    }
}

struct CachedVerdict {
    verdict: AdmissionVerdict,
    computed_at: Instant,
}

/// Gate in front of job submission.
///
/// The ceiling is `per_worker_capacity * max(active_workers, 1)`: with
/// zero live workers the check degrades to a single worker's capacity
/// instead of rejecting everything, so a worker restart does not bounce
/// all traffic.
///
/// Verdicts are cached for a short TTL. A cached `Reject` can therefore
/// bounce a request that would now fit and a cached `Admit` can
/// overshoot the ceiling by a few jobs; both are acceptable, the ceiling
/// is a load shed, not a quota.
pub struct AdmissionController {
    registry: Arc<dyn WorkerRegistry>,
    queue: Arc<dyn QueueInfo>,
    per_worker_capacity: i64,
    cache_ttl: Duration,
    cache: Mutex<Option<CachedVerdict>>,
}

impl AdmissionController {
    pub fn new(
        registry: Arc<dyn WorkerRegistry>,
        queue: Arc<dyn QueueInfo>,
        per_worker_capacity: i64,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            queue,
            per_worker_capacity,
            cache_ttl,
            cache: Mutex::new(None),
        }
    }

    /// Whether a new submission may enter the queue right now.
    ///
    /// Returns the cached verdict when it is still fresh, otherwise
    /// recomputes against the live registry and queue depth.
    pub async fn may_admit(&self) -> Result<AdmissionVerdict, CoreError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.computed_at.elapsed() < self.cache_ttl {
                return Ok(cached.verdict);
            }
        }

        let ceiling = self.capacity_ceiling().await?;
        let queued = self.queue.queued_len().await?;
        let verdict = if queued < ceiling {
            AdmissionVerdict::Admit
        } else {
            AdmissionVerdict::Reject
        };
        tracing::debug!(queued, ceiling, ?verdict, "Admission verdict recomputed");

        *cache = Some(CachedVerdict {
            verdict,
            computed_at: Instant::now(),
        });
        Ok(verdict)
    }

    /// Current capacity ceiling. Uncached; also feeds the health probe.
    pub async fn capacity_ceiling(&self) -> Result<i64, CoreError> {
        let workers = self.registry.active_worker_count().await?;
        Ok(self.per_worker_capacity * (workers.max(1) as i64))
    }
}
