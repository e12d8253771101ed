use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Stable-for-the-process worker identity used in heartbeats and
    /// job claims.
    pub worker_id: String,
    /// Root directory shared with the API server for inputs and
    /// artifacts.
    pub jobs_dir: PathBuf,
    /// External style-transfer command. Invoked as
    /// `<command> <content> <style> <output> <strength>`.
    pub style_command: String,
    /// Queue polling interval while idle.
    pub poll_interval: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                |
    /// |----------------------|------------------------|
    /// | `WORKER_ID`          | `worker-<random uuid>` |
    /// | `JOBS_DIR`           | `jobs`                 |
    /// | `STYLE_COMMAND`      | `style-transfer`       |
    /// | `POLL_INTERVAL_SECS` | `1`                    |
    pub fn from_env() -> Self {
        let worker_id = std::env::var("WORKER_ID")
            .unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::new_v4()));
        let poll_secs = std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        Self {
            worker_id,
            jobs_dir: PathBuf::from(std::env::var("JOBS_DIR").unwrap_or_else(|_| "jobs".into())),
            style_command: std::env::var("STYLE_COMMAND")
                .unwrap_or_else(|_| "style-transfer".into()),
            poll_interval: Duration::from_secs(poll_secs),
        }
    }
}
