use std::sync::Arc;

use picstyle_core::registry::{QueueInfo, WorkerRegistry};
use picstyle_db::repositories::worker_repo::{PgQueueInfo, PgWorkerRegistry};
use picstyle_db::DbPool;
use picstyle_events::bus::EventBus;

use crate::admission::AdmissionController;
use crate::config::ServerConfig;
use crate::lifecycle::JobLifecycle;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<ServerConfig>,
    pub bus: Arc<EventBus>,
    pub admission: Arc<AdmissionController>,
    pub lifecycle: Arc<JobLifecycle>,
}

impl AppState {
    /// Wire the production state: Postgres-backed registries behind the
    /// trait seams, the admission controller on top of them, and the
    /// lifecycle core on top of the pool.
    pub fn new(pool: DbPool, config: ServerConfig, bus: Arc<EventBus>) -> Self {
        let config = Arc::new(config);
        let registry: Arc<dyn WorkerRegistry> = Arc::new(PgWorkerRegistry::new(pool.clone()));
        let queue: Arc<dyn QueueInfo> = Arc::new(PgQueueInfo::new(pool.clone()));
        let admission = Arc::new(AdmissionController::new(
            registry,
            queue,
            config.per_worker_capacity,
            config.admission_cache_ttl,
        ));
        let lifecycle = Arc::new(JobLifecycle::new(
            pool.clone(),
            config.hide_foreign_jobs,
        ));
        Self {
            pool,
            config,
            bus,
            admission,
            lifecycle,
        }
    }
}
