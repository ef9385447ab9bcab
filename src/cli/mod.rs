//! CLI layer
//!
//! Command handlers, the shared context and terminal output.

pub mod commands;
pub mod context;
pub mod output;

pub use context::{SyncContext, SyncOptions};
pub use output::Output;
