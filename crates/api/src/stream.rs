//! Status stream sessions: push a job's status to one client until the
//! job reaches a terminal state, the client leaves, or the session
//! times out.
//!
//! The loop is event-driven with a polling safety net. Bus events only
//! ever wake a re-read of the store; the store is the single source of
//! truth, so a dropped or duplicated event can never surface a wrong or
//! out-of-order status.

use std::sync::Arc;
use std::time::Duration;

use picstyle_core::error::CoreError;
use picstyle_core::status::JobStatus;
use picstyle_core::types::{JobId, SessionId};
use picstyle_events::bus::EventBus;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One consistent observation of a job, as pushed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub status: JobStatus,
    /// 0-based queue position; present only while `status` is queued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

/// Ownership-checked view of the store, behind a seam so the loop can
/// be driven by a test double.
#[async_trait::async_trait]
pub trait StatusSource: Send + Sync {
    async fn snapshot(
        &self,
        job_id: JobId,
        session_id: SessionId,
    ) -> Result<StatusSnapshot, CoreError>;
}

/// Why a stream session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The job reached a terminal state and its final status was sent.
    Done,
    /// The session outlived its maximum lifetime.
    TimedOut,
    /// The job does not exist for this session (never did, or was
    /// purged by retention mid-stream).
    NotFound,
    /// The job exists but belongs to another session. Only ever
    /// surfaced when the visibility policy reveals foreign jobs;
    /// otherwise the source folds this case into `NotFound` before it
    /// reaches the loop.
    NotOwned,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Done => "done",
            CloseReason::TimedOut => "timed_out",
            CloseReason::NotFound => "not_found",
            CloseReason::NotOwned => "not_owned",
        }
    }
}

/// A message pushed to the stream's client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    Status(StatusSnapshot),
    /// Keep-alive sent in place of a heartbeat resend while no snapshot
    /// has been read yet.
    Ping,
    Closed(CloseReason),
}

/// Timing knobs of one stream session.
#[derive(Debug, Clone, Copy)]
pub struct StreamParams {
    /// Maximum session lifetime.
    pub session_timeout: Duration,
    /// Polling fallback interval. Also the only thing that surfaces
    /// queue-position changes, which fire no record notification.
    pub poll_interval: Duration,
    /// Idle resend interval, so the client can tell a quiet stream from
    /// a dead one.
    pub heartbeat_interval: Duration,
}

/// Drive one stream session to completion.
///
/// An update is pushed immediately on entry whatever the state, then
/// only on change (bus wake or poll), plus an unconditional heartbeat
/// resend when nothing changed for a while. Returns when the job is
/// terminal, the session times out, the job disappears, or the client
/// side goes away (`client_closed` fires or `tx` closes).
pub async fn run(
    source: Arc<dyn StatusSource>,
    bus: Arc<EventBus>,
    job_id: JobId,
    session_id: SessionId,
    params: StreamParams,
    client_closed: CancellationToken,
    tx: mpsc::Sender<StreamUpdate>,
) {
    // Subscribe before the first read so a transition landing between
    // the two cannot be missed.
    let mut bus_rx = bus.subscribe();
    let mut bus_open = true;

    let deadline = tokio::time::sleep(params.session_timeout);
    tokio::pin!(deadline);

    // Delay the first tick by one period; the initial send below covers
    // time zero.
    let start = tokio::time::Instant::now();
    let mut poll = tokio::time::interval_at(start + params.poll_interval, params.poll_interval);
    let mut heartbeat =
        tokio::time::interval_at(start + params.heartbeat_interval, params.heartbeat_interval);

    let mut last_sent: Option<StatusSnapshot> = None;

    match source.snapshot(job_id, session_id).await {
        Ok(snapshot) => {
            let terminal = snapshot.status.is_terminal();
            if tx.send(StreamUpdate::Status(snapshot.clone())).await.is_err() {
                return;
            }
            if terminal {
                let _ = tx.send(StreamUpdate::Closed(CloseReason::Done)).await;
                return;
            }
            last_sent = Some(snapshot);
        }
        Err(CoreError::NotFound { .. }) => {
            let _ = tx.send(StreamUpdate::Closed(CloseReason::NotFound)).await;
            return;
        }
        Err(CoreError::NotOwned { .. }) => {
            let _ = tx.send(StreamUpdate::Closed(CloseReason::NotOwned)).await;
            return;
        }
        Err(e) => {
            // Transient store trouble: keep the session, the poll
            // fallback retries.
            tracing::warn!(job_id = %job_id, error = %e, "Initial status read failed");
        }
    }

    loop {
        let refresh = tokio::select! {
            _ = &mut deadline => {
                let _ = tx.send(StreamUpdate::Closed(CloseReason::TimedOut)).await;
                return;
            }
            _ = client_closed.cancelled() => {
                tracing::debug!(job_id = %job_id, "Stream client left");
                return;
            }
            event = bus_rx.recv(), if bus_open => {
                match event {
                    Ok(event) if event.job_id == job_id => true,
                    Ok(_) => continue,
                    // Lagged: events were dropped, one of them may have
                    // been ours. Re-read.
                    Err(RecvError::Lagged(_)) => true,
                    Err(RecvError::Closed) => {
                        bus_open = false;
                        continue;
                    }
                }
            }
            _ = poll.tick() => true,
            _ = heartbeat.tick() => false,
        };

        if !refresh {
            // Heartbeat: resend the last snapshot unchanged, or a bare
            // ping while a failed initial read has left nothing to
            // resend, so intermediaries never see a silent connection.
            let update = match &last_sent {
                Some(snapshot) => StreamUpdate::Status(snapshot.clone()),
                None => StreamUpdate::Ping,
            };
            if tx.send(update).await.is_err() {
                return;
            }
            continue;
        }

        let snapshot = match source.snapshot(job_id, session_id).await {
            Ok(snapshot) => snapshot,
            Err(CoreError::NotFound { .. }) => {
                let _ = tx.send(StreamUpdate::Closed(CloseReason::NotFound)).await;
                return;
            }
            Err(CoreError::NotOwned { .. }) => {
                let _ = tx.send(StreamUpdate::Closed(CloseReason::NotOwned)).await;
                return;
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Status read failed, will retry");
                continue;
            }
        };

        if last_sent.as_ref() != Some(&snapshot) {
            let terminal = snapshot.status.is_terminal();
            if tx.send(StreamUpdate::Status(snapshot.clone())).await.is_err() {
                return;
            }
            if terminal {
                let _ = tx.send(StreamUpdate::Closed(CloseReason::Done)).await;
                return;
            }
            last_sent = Some(snapshot);
            heartbeat.reset();
        }
    }
}
