//! Status stream session behavior, driven through a scripted store so
//! no database is involved. Time is paused; tokio auto-advances it
//! whenever every task is idle, so interval- and deadline-driven
//! behavior runs instantly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use picstyle_api::stream::{
    self, CloseReason, StatusSnapshot, StatusSource, StreamParams, StreamUpdate,
};
use picstyle_core::error::CoreError;
use picstyle_core::status::JobStatus;
use picstyle_core::types::{new_job_id, new_session_id, JobId, SessionId};
use picstyle_events::{EventBus, JobEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
enum Resp {
    Snap(StatusSnapshot),
    NotFound,
    NotOwned,
    Infra,
}

/// Store double: pops scripted responses, the last one sticks.
struct FakeSource {
    script: Mutex<VecDeque<Resp>>,
}

impl FakeSource {
    fn new(script: Vec<Resp>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }

    /// Replace whatever is left of the script with a single sticky
    /// response.
    fn set(&self, resp: Resp) {
        let mut script = self.script.lock().unwrap();
        script.clear();
        script.push_back(resp);
    }
}

#[async_trait::async_trait]
impl StatusSource for FakeSource {
    async fn snapshot(
        &self,
        job_id: JobId,
        _session_id: SessionId,
    ) -> Result<StatusSnapshot, CoreError> {
        let mut script = self.script.lock().unwrap();
        let resp = if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().expect("script exhausted")
        };
        match resp {
            Resp::Snap(snapshot) => Ok(snapshot),
            Resp::NotFound => Err(CoreError::NotFound { job_id }),
            Resp::NotOwned => Err(CoreError::NotOwned { job_id }),
            Resp::Infra => Err(CoreError::Infra("store down".into())),
        }
    }
}

fn queued(position: i64) -> StatusSnapshot {
    StatusSnapshot {
        status: JobStatus::Queued,
        position: Some(position),
    }
}

fn snap(status: JobStatus) -> StatusSnapshot {
    StatusSnapshot {
        status,
        position: None,
    }
}

fn params() -> StreamParams {
    StreamParams {
        session_timeout: Duration::from_secs(600),
        poll_interval: Duration::from_secs(2),
        heartbeat_interval: Duration::from_secs(30),
    }
}

/// Long intervals so only bus wakes can drive the loop within a test's
/// horizon.
fn quiet_params() -> StreamParams {
    StreamParams {
        session_timeout: Duration::from_secs(100_000),
        poll_interval: Duration::from_secs(50_000),
        heartbeat_interval: Duration::from_secs(50_000),
    }
}

struct Session {
    rx: mpsc::Receiver<StreamUpdate>,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

fn spawn_session(
    source: Arc<FakeSource>,
    bus: Arc<EventBus>,
    job_id: JobId,
    params: StreamParams,
) -> Session {
    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(stream::run(
        source,
        bus,
        job_id,
        new_session_id(),
        params,
        cancel.clone(),
        tx,
    ));
    Session { rx, cancel, handle }
}

#[tokio::test(start_paused = true)]
async fn already_terminal_job_sends_exactly_one_status_then_done() {
    let source = FakeSource::new(vec![Resp::Snap(snap(JobStatus::Finished))]);
    let bus = Arc::new(EventBus::default());
    let mut session = spawn_session(source, bus, new_job_id(), params());

    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Status(snap(JobStatus::Finished)))
    );
    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Closed(CloseReason::Done))
    );
    assert_eq!(session.rx.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn unknown_job_closes_with_not_found() {
    let source = FakeSource::new(vec![Resp::NotFound]);
    let bus = Arc::new(EventBus::default());
    let mut session = spawn_session(source, bus, new_job_id(), params());

    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Closed(CloseReason::NotFound))
    );
    assert_eq!(session.rx.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn foreign_job_closes_with_not_owned_when_policy_reveals_it() {
    // When hiding is off the source surfaces NotOwned unfolded; the
    // stream must close with not_owned, mirroring the 403 the poll
    // endpoint returns for the same request.
    let source = FakeSource::new(vec![Resp::NotOwned]);
    let bus = Arc::new(EventBus::default());
    let mut session = spawn_session(source, bus, new_job_id(), params());

    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Closed(CloseReason::NotOwned))
    );
    assert_eq!(session.rx.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn ownership_loss_mid_stream_closes_not_owned() {
    let job_id = new_job_id();
    let source = FakeSource::new(vec![Resp::Snap(queued(0))]);
    let bus = Arc::new(EventBus::default());
    let mut session = spawn_session(source.clone(), bus.clone(), job_id, quiet_params());

    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Status(queued(0)))
    );

    source.set(Resp::NotOwned);
    bus.publish(JobEvent::new(job_id));
    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Closed(CloseReason::NotOwned))
    );
    assert_eq!(session.rx.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn deadline_closes_with_timed_out_and_nothing_after() {
    let source = FakeSource::new(vec![Resp::Snap(queued(0))]);
    let bus = Arc::new(EventBus::default());
    let mut session = spawn_session(source, bus, new_job_id(), params());

    // Drain until close: everything before it must be the unchanged
    // queued status (heartbeats), never a duplicate-free violation.
    let mut closed = None;
    while let Some(update) = session.rx.recv().await {
        match update {
            StreamUpdate::Status(s) => assert_eq!(s, queued(0)),
            StreamUpdate::Ping => panic!("heartbeat must resend the status once one was sent"),
            StreamUpdate::Closed(reason) => {
                closed = Some(reason);
                break;
            }
        }
    }
    assert_eq!(closed, Some(CloseReason::TimedOut));
    assert_eq!(session.rx.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn bus_wake_pushes_change_and_dedups_unchanged() {
    let job_id = new_job_id();
    let source = FakeSource::new(vec![Resp::Snap(queued(2))]);
    let bus = Arc::new(EventBus::default());
    let mut session = spawn_session(source.clone(), bus.clone(), job_id, quiet_params());

    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Status(queued(2)))
    );

    // A wake with nothing changed is swallowed...
    bus.publish(JobEvent::new(job_id));
    tokio::task::yield_now().await;

    // ...so the next message delivered is the actual change.
    source.set(Resp::Snap(snap(JobStatus::Started)));
    bus.publish(JobEvent::new(job_id));
    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Status(snap(JobStatus::Started)))
    );

    session.cancel.cancel();
    let _ = session.handle.await;
}

#[tokio::test(start_paused = true)]
async fn events_for_other_jobs_are_ignored() {
    let job_id = new_job_id();
    let source = FakeSource::new(vec![Resp::Snap(queued(0))]);
    let bus = Arc::new(EventBus::default());
    let mut session = spawn_session(source.clone(), bus.clone(), job_id, quiet_params());

    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Status(queued(0)))
    );

    // A foreign job's change must not trigger a refresh of this stream.
    source.set(Resp::Snap(snap(JobStatus::Started)));
    bus.publish(JobEvent::new(new_job_id()));
    tokio::task::yield_now().await;
    assert!(session.rx.try_recv().is_err());

    bus.publish(JobEvent::new(job_id));
    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Status(snap(JobStatus::Started)))
    );

    session.cancel.cancel();
    let _ = session.handle.await;
}

#[tokio::test(start_paused = true)]
async fn terminal_transition_mid_stream_sends_final_status_then_done() {
    let job_id = new_job_id();
    let source = FakeSource::new(vec![Resp::Snap(snap(JobStatus::Started))]);
    let bus = Arc::new(EventBus::default());
    let mut session = spawn_session(source.clone(), bus.clone(), job_id, quiet_params());

    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Status(snap(JobStatus::Started)))
    );

    source.set(Resp::Snap(snap(JobStatus::Finished)));
    bus.publish(JobEvent::new(job_id));

    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Status(snap(JobStatus::Finished)))
    );
    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Closed(CloseReason::Done))
    );
    assert_eq!(session.rx.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_resends_unchanged_status() {
    let source = FakeSource::new(vec![Resp::Snap(queued(1))]);
    let bus = Arc::new(EventBus::default());
    // Heartbeat fires well before poll or deadline.
    let params = StreamParams {
        session_timeout: Duration::from_secs(100_000),
        poll_interval: Duration::from_secs(50_000),
        heartbeat_interval: Duration::from_secs(30),
    };
    let mut session = spawn_session(source, bus, new_job_id(), params);

    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Status(queued(1)))
    );
    // Identical resend, no change required.
    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Status(queued(1)))
    );

    session.cancel.cancel();
    let _ = session.handle.await;
}

#[tokio::test(start_paused = true)]
async fn transient_store_error_is_retried_not_fatal() {
    // Initial read fails; the poll fallback retries and succeeds.
    let source = FakeSource::new(vec![Resp::Infra, Resp::Snap(queued(0))]);
    let bus = Arc::new(EventBus::default());
    let mut session = spawn_session(source, bus, new_job_id(), params());

    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Status(queued(0)))
    );

    session.cancel.cancel();
    let _ = session.handle.await;
}

#[tokio::test(start_paused = true)]
async fn heartbeat_pings_while_store_is_down() {
    // A sustained store outage leaves no snapshot to resend; the
    // heartbeat must still emit something so an intermediary does not
    // time the connection out during the blip.
    let source = FakeSource::new(vec![Resp::Infra]);
    let bus = Arc::new(EventBus::default());
    // Heartbeat fires well before the poll retries.
    let params = StreamParams {
        session_timeout: Duration::from_secs(100_000),
        poll_interval: Duration::from_secs(50_000),
        heartbeat_interval: Duration::from_secs(30),
    };
    let mut session = spawn_session(source, bus, new_job_id(), params);

    assert_eq!(session.rx.recv().await, Some(StreamUpdate::Ping));
    assert_eq!(session.rx.recv().await, Some(StreamUpdate::Ping));

    session.cancel.cancel();
    let _ = session.handle.await;
}

#[tokio::test(start_paused = true)]
async fn client_close_releases_session_without_close_message() {
    let source = FakeSource::new(vec![Resp::Snap(queued(0))]);
    let bus = Arc::new(EventBus::default());
    let mut session = spawn_session(source, bus, new_job_id(), quiet_params());

    assert_eq!(
        session.rx.recv().await,
        Some(StreamUpdate::Status(queued(0)))
    );

    session.cancel.cancel();
    let _ = session.handle.await;
    assert_eq!(session.rx.recv().await, None);
}
