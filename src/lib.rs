//! chime — booking and scheduling engine for a lesson-booking service.
//!
//! Slots are capacity-limited lesson openings; users book seats in them,
//! reminders fire ahead of each lesson, and admin delays or cancellations
//! propagate to every dependent booking. All state lives in memory behind
//! an event-sourced write-ahead log, so a restart replays back to exactly
//! the pre-crash state.

pub mod config;
pub mod engine;
pub mod limits;
pub mod migrate;
pub mod model;
pub mod notify;
pub mod observability;
pub mod scheduler;
pub mod wal;
