//! Utility functions and helpers

pub mod cmd;
pub mod retry;

pub use cmd::{describe_cmd, log_cmd};
pub use retry::{is_transient, retry_with_backoff, RetryOptions};
