//! Backoff for the network-facing git commands (clone, fetch, ls-remote)

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How often and how patiently a transient git failure is repeated
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Attempts after the first one
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay added at random, clamped to 0..=1
    pub jitter: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::with_retries(2)
    }
}

impl RetryOptions {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: 0.1,
        }
    }

    pub fn none() -> Self {
        Self::with_retries(0)
    }

    /// Pause before retry `n` (zero-based): base * 2^n, capped, plus jitter.
    pub fn delay_for(&self, n: u32) -> Duration {
        let doubled = self
            .base_delay
            .checked_mul(1u32 << n.min(20))
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        let spread = doubled.mul_f64(self.jitter.clamp(0.0, 1.0) * clock_noise());
        doubled + spread
    }
}

/// Value in [0, 1) derived from the sub-second clock
fn clock_noise() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 1000) / 1000.0
}

/// Stderr fragments that mean the transport, not the request, went wrong.
/// Missing refs, bad credentials and malformed URLs fail the same way every
/// time and are not listed.
const TRANSIENT_MARKERS: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "could not resolve host",
    "temporary failure in name resolution",
    "early eof",
    "the remote end hung up",
    "rpc failed",
    "unexpected disconnect",
    "502",
    "503",
    "504",
];

pub fn is_transient(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Run `operation` until it succeeds, fails permanently, or `options.retries`
/// extra attempts are spent.
pub async fn retry_with_backoff<T, E, F, Fut>(options: &RetryOptions, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut n = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let message = err.to_string();
        if n >= options.retries || !is_transient(&message) {
            return Err(err);
        }
        let delay = options.delay_for(n);
        tracing::warn!(attempt = n + 1, error = %message, ?delay, "git command failed, retrying");
        tokio::time::sleep(delay).await;
        n += 1;
    }
}
