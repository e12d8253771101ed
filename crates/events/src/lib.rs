//! Job-change notification bus.
//!
//! In-process fan-out via [`bus::EventBus`], bridged across processes by
//! Postgres `LISTEN`/`NOTIFY` ([`pg`]). The bus is strictly a wake-up
//! hint: consumers re-read the job store on every event, and the status
//! stream's polling fallback guarantees delivery even if every event is
//! dropped.

pub mod bus;
pub mod pg;

pub use bus::{EventBus, JobEvent};
