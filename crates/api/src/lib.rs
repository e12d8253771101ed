//! Picstyle API server library.
//!
//! Exposes the building blocks (config, state, error handling, the job
//! lifecycle core, admission control, the status stream, routes) so
//! integration tests and the binary entrypoint can both access them.

pub mod admission;
pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod lifecycle;
pub mod routes;
pub mod state;
pub mod stream;
pub mod ws;
