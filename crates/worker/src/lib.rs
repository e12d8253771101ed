//! Picstyle worker library.
//!
//! The worker claims jobs from the shared queue, executes them under
//! their timeout while watching for cancellation, and writes the
//! terminal transition back to the store.

pub mod config;
pub mod runner;
pub mod tasks;
pub mod transform;
