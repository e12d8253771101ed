pub mod job;
pub mod schedule;
