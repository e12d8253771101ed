use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. In
/// production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Root directory for uploaded inputs and result artifacts.
    pub jobs_dir: PathBuf,
    /// Queue slots each active worker is assumed to absorb; the
    /// admission ceiling is `per_worker_capacity * max(workers, 1)`.
    pub per_worker_capacity: i64,
    /// How long an admission verdict stays cached before the worker
    /// registry is scanned again.
    pub admission_cache_ttl: Duration,
    /// Maximum lifetime of one status stream session.
    pub stream_session_timeout: Duration,
    /// Polling fallback interval of the status stream (also covers
    /// queue-position changes that fire no record notification).
    pub stream_poll_interval: Duration,
    /// Idle heartbeat interval of the status stream.
    pub stream_heartbeat_interval: Duration,
    /// Anti-probing policy: when `true`, a foreign session's job is
    /// reported as not found instead of forbidden, so callers cannot
    /// probe for the existence of other sessions' jobs.
    pub hide_foreign_jobs: bool,
    /// Maximum accepted upload size per request, in bytes.
    pub max_upload_bytes: usize,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T
where
    T::Err: std::fmt::Debug,
{
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be valid: {e:?}")),
        Err(_) => default,
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default     |
    /// |--------------------------------|-------------|
    /// | `HOST`                         | `0.0.0.0`   |
    /// | `PORT`                         | `3000`      |
    /// | `JOBS_DIR`                     | `jobs`      |
    /// | `PER_WORKER_CAPACITY`          | `10`        |
    /// | `ADMISSION_CACHE_SECS`         | `30`        |
    /// | `STREAM_SESSION_TIMEOUT_SECS`  | `600`       |
    /// | `STREAM_POLL_INTERVAL_SECS`    | `2`         |
    /// | `STREAM_HEARTBEAT_SECS`        | `30`        |
    /// | `HIDE_FOREIGN_JOBS`            | `true`      |
    /// | `MAX_UPLOAD_BYTES`             | `16777216`  |
    /// | `REQUEST_TIMEOUT_SECS`         | `30`        |
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parsed("PORT", 3000),
            jobs_dir: PathBuf::from(
                std::env::var("JOBS_DIR").unwrap_or_else(|_| "jobs".into()),
            ),
            per_worker_capacity: env_parsed("PER_WORKER_CAPACITY", 10),
            admission_cache_ttl: Duration::from_secs(env_parsed("ADMISSION_CACHE_SECS", 30)),
            stream_session_timeout: Duration::from_secs(env_parsed(
                "STREAM_SESSION_TIMEOUT_SECS",
                600,
            )),
            stream_poll_interval: Duration::from_secs(env_parsed("STREAM_POLL_INTERVAL_SECS", 2)),
            stream_heartbeat_interval: Duration::from_secs(env_parsed("STREAM_HEARTBEAT_SECS", 30)),
            hide_foreign_jobs: env_parsed("HIDE_FOREIGN_JOBS", true),
            max_upload_bytes: env_parsed("MAX_UPLOAD_BYTES", 16 * 1024 * 1024),
            request_timeout: Duration::from_secs(env_parsed("REQUEST_TIMEOUT_SECS", 30)),
        }
    }
}
