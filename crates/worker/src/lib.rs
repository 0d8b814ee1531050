//! Queue worker for the narrated video pipeline.
//!
//! Library target so integration tests can reach the pool and
//! configuration; the binary lives in `main.rs`.

pub mod config;
pub mod pool;
pub mod setup;
pub mod telemetry;
