//! System job bodies, dispatched by the runner on job kind.

pub mod canary;
pub mod cleanup;
pub mod history;
pub mod stats;
