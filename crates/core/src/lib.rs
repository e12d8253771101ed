//! Pure domain types and logic for the picstyle job pipeline.
//!
//! This crate has no internal dependencies so it can be used by the API
//! server, the worker binary, and any future CLI tooling.

pub mod error;
pub mod health;
pub mod job;
pub mod registry;
pub mod retention;
pub mod status;
pub mod types;
