//! WebSocket transport for status stream sessions.
//!
//! The transport stays dumb: it shuttles [`StreamUpdate`]s from the
//! session loop onto the socket and maps a client disconnect onto the
//! loop's cancellation token. All timing and state logic lives in
//! [`crate::stream`].

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use picstyle_core::types::{JobId, SessionId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;
use crate::stream::{self, StreamParams, StreamUpdate};

/// Session id header set by the fronting web layer.
pub const SESSION_HEADER: &str = "x-session-id";

/// Extract the caller's session id from request headers.
pub fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// HTTP handler that upgrades to a WebSocket status stream for one job.
///
/// A missing or malformed session header still upgrades; the stream
/// then closes with `not_found`, indistinguishable from a job that does
/// not exist.
pub async fn status_stream_handler(
    ws: WebSocketUpgrade,
    Path(job_id): Path<JobId>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let session_id = session_from_headers(&headers);
    ws.on_upgrade(move |socket| handle_socket(socket, state, job_id, session_id))
}

/// Manage a single status stream connection after upgrade.
///
/// Splits the socket, spawns the session loop, forwards its updates to
/// the sink on this task, and watches the inbound half for the client
/// going away.
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    job_id: JobId,
    session_id: Option<SessionId>,
) {
    tracing::info!(job_id = %job_id, "Status stream connected");

    let (mut sink, mut inbound) = socket.split();

    let (tx, mut rx) = mpsc::channel::<StreamUpdate>(16);
    let client_closed = CancellationToken::new();

    let params = StreamParams {
        session_timeout: state.config.stream_session_timeout,
        poll_interval: state.config.stream_poll_interval,
        heartbeat_interval: state.config.stream_heartbeat_interval,
    };

    // An absent session owns nothing; feed a random id so the lookup
    // falls out as not-found without a special case in the loop.
    let session_id = session_id.unwrap_or_else(picstyle_core::types::new_session_id);

    let session = tokio::spawn(stream::run(
        state.lifecycle.clone(),
        state.bus.clone(),
        job_id,
        session_id,
        params,
        client_closed.clone(),
        tx,
    ));

    // Inbound watcher: the only inbound signal we care about is the
    // client leaving.
    let watcher_closed = client_closed.clone();
    let watcher = tokio::spawn(async move {
        while let Some(result) = inbound.next().await {
            match result {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        watcher_closed.cancel();
    });

    while let Some(update) = rx.recv().await {
        let outcome = match update {
            StreamUpdate::Status(snapshot) => match serde_json::to_string(&snapshot) {
                Ok(text) => sink.send(Message::Text(Utf8Bytes::from(text))).await,
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Status serialization failed");
                    break;
                }
            },
            StreamUpdate::Ping => sink.send(Message::Ping(Bytes::new())).await,
            StreamUpdate::Closed(reason) => {
                tracing::debug!(job_id = %job_id, ?reason, "Status stream closing");
                let frame = CloseFrame {
                    code: close_code::NORMAL,
                    reason: Utf8Bytes::from_static(reason.as_str()),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                break;
            }
        };
        if outcome.is_err() {
            tracing::debug!(job_id = %job_id, "Status stream sink closed");
            break;
        }
    }

    client_closed.cancel();
    session.abort();
    watcher.abort();
    tracing::info!(job_id = %job_id, "Status stream disconnected");
}
