//! Logging setup for fleximod.
//!
//! # Feature Flags
//!
//! - `release-logs`: strip debug/trace events at compile time
//! - `max-perf`: disable all tracing

mod init;

pub use init::{init_telemetry, LogFormat, TelemetryConfig};
