//! Cross-process leg of the notification bus: Postgres `NOTIFY` on the
//! publishing side, a `LISTEN` relay into the in-process bus on the
//! consuming side.

use std::sync::Arc;
use std::time::Duration;

use picstyle_core::types::JobId;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, JobEvent};

/// Postgres notification channel for job record changes.
pub const JOB_CHANNEL: &str = "job_updates";

/// Backoff before reconnecting a failed listener.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Publish a change notification for `job_id`.
///
/// Called by the worker after every status write. Failures are returned
/// to the caller, which logs and moves on: the bus is best-effort and
/// the status stream's poll fallback covers dropped events.
pub async fn notify_job_update(pool: &PgPool, job_id: JobId) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(JOB_CHANNEL)
        .bind(job_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Relay Postgres notifications into the in-process bus until `cancel`
/// is triggered.
///
/// Listener errors (connection loss, unparseable payloads) never
/// terminate the relay; the listener reconnects with a short backoff.
pub async fn relay(pool: PgPool, bus: Arc<EventBus>, cancel: CancellationToken) {
    tracing::info!(channel = JOB_CHANNEL, "Notification relay started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let mut listener = match PgListener::connect_with(&pool).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::warn!(error = %e, "Notification listener connect failed, retrying");
                if wait_or_cancelled(&cancel, RECONNECT_DELAY).await {
                    break;
                }
                continue;
            }
        };

        if let Err(e) = listener.listen(JOB_CHANNEL).await {
            tracing::warn!(error = %e, "LISTEN failed, retrying");
            if wait_or_cancelled(&cancel, RECONNECT_DELAY).await {
                break;
            }
            continue;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Notification relay shutting down");
                    return;
                }
                notification = listener.recv() => {
                    match notification {
                        Ok(notification) => {
                            match notification.payload().parse::<JobId>() {
                                Ok(job_id) => bus.publish(JobEvent::new(job_id)),
                                Err(_) => {
                                    tracing::warn!(
                                        payload = notification.payload(),
                                        "Ignoring malformed job notification",
                                    );
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Notification stream broke, reconnecting");
                            break;
                        }
                    }
                }
            }
        }

        if wait_or_cancelled(&cancel, RECONNECT_DELAY).await {
            break;
        }
    }

    tracing::info!("Notification relay stopped");
}

/// Sleep for `delay`, returning `true` if cancelled first.
async fn wait_or_cancelled(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
