//! Global pacing of outbound feed fetches.
//!
//! Every poll in the process goes through one [`RateLimiter`] before it
//! touches the network. The limiter is a one-slot gate: a caller that is
//! granted permission closes the gate, and the gate reopens
//! `60s / max_per_minute` after that grant. Callers queue on the gate in
//! FIFO order, so fetches are spaced at least one interval apart no matter
//! how many subscriptions are due at the same time.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Configuration for the fetch rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum fetches allowed per minute.
    pub max_per_minute: u32,
}

impl RateLimitConfig {
    /// Create a new rate limit configuration.
    ///
    /// A limit of zero is treated as one fetch per minute.
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute: max_per_minute.max(1),
        }
    }

    /// Minimum spacing between two granted fetches.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(60_000 / u64::from(self.max_per_minute.max(1)))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(6)
    }
}

/// Process-wide fetch gate.
///
/// # Example
///
/// ```
/// use feedwatch::rate_limit::{RateLimitConfig, RateLimiter};
/// use std::time::Duration;
///
/// let limiter = RateLimiter::new(RateLimitConfig::new(3));
/// assert_eq!(limiter.interval(), Duration::from_secs(20));
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    /// Instant at which the gate reopens; `None` until the first grant.
    reopens_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            interval: config.interval(),
            reopens_at: Mutex::new(None),
        }
    }

    /// Create a rate limiter allowing `max_per_minute` fetches per minute.
    pub fn per_minute(max_per_minute: u32) -> Self {
        Self::new(RateLimitConfig::new(max_per_minute))
    }

    /// Minimum spacing between two granted fetches.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until a fetch may be issued.
    ///
    /// Never fails. If the waiting future is dropped, the gate state is left
    /// untouched and the next waiter in line takes over.
    pub async fn acquire(&self) {
        let mut reopens_at = self.reopens_at.lock().await;

        if let Some(at) = *reopens_at {
            if at > Instant::now() {
                trace!("Rate limiter closed, waiting {:?}", at - Instant::now());
                tokio::time::sleep_until(at).await;
            }
        }

        // Reopening is measured from the grant, not from fetch completion
        *reopens_at = Some(Instant::now() + self.interval);
    }

    /// Time until the gate reopens, or zero if a fetch could be granted now.
    ///
    /// Returns `None` while another caller holds the gate queue.
    pub fn time_until_open(&self) -> Option<Duration> {
        let reopens_at = self.reopens_at.try_lock().ok()?;
        Some(
            reopens_at
                .map(|at| at.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::ZERO),
        )
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
