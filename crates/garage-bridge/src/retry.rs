//! # Retry Policies
//!
//! Retry intervals and caps for both links, held as data so tests can run
//! the loops with zero delays.
//!
//! ```text
//!   Local link        fixed 2 s between attempts, no growth, optional cap
//!   Cloud session     1 s while reconnecting, 2 s while busy (restart > 50)
//!   Cloud update      immediate retry, optional cap
//! ```

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};

// =============================================================================
// Local Reconnect
// =============================================================================

/// Fixed-interval reconnect policy for the local broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    interval: Duration,
    max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// `max_attempts` of `None` retries forever.
    pub fn new(interval: Duration, max_attempts: Option<u32>) -> Self {
        ReconnectPolicy {
            interval,
            max_attempts,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Starts a fresh schedule of waits.
    ///
    /// A cap of `n` attempts allows `n - 1` waits between them.
    pub fn schedule(&self) -> ReconnectSchedule {
        ReconnectSchedule {
            inner: Constant::new(self.interval),
            max_waits: self.max_attempts.map(|max| max.saturating_sub(1)),
            waits: 0,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::new(Duration::from_secs(2), None)
    }
}

/// Constant backoff that stops after an optional number of waits.
pub struct ReconnectSchedule {
    inner: Constant,
    max_waits: Option<u32>,
    waits: u32,
}

impl ReconnectSchedule {
    /// Waits handed out so far.
    pub fn waits(&self) -> u32 {
        self.waits
    }
}

impl Backoff for ReconnectSchedule {
    fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_waits {
            if self.waits >= max {
                return None;
            }
        }
        self.waits = self.waits.saturating_add(1);
        self.inner.next_backoff()
    }

    fn reset(&mut self) {
        self.waits = 0;
        self.inner.reset();
    }
}

// =============================================================================
// Cloud Update Protocol
// =============================================================================

/// Waits and caps for the outbound shadow-update protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowRetryPolicy {
    /// Sleep after a yield reports the session is reconnecting.
    pub reconnect_wait: Duration,
    /// Sleep after a yield reports the client is busy.
    pub not_idle_wait: Duration,
    /// Busy yields tolerated in one publish before the session is restarted.
    pub not_idle_limit: u32,
    /// Sleep between failed update calls.
    pub update_retry_delay: Duration,
    /// Update attempts before the publish is dropped. `None` retries forever.
    pub update_retry_limit: Option<u32>,
}

impl Default for ShadowRetryPolicy {
    fn default() -> Self {
        ShadowRetryPolicy {
            reconnect_wait: Duration::from_secs(1),
            not_idle_wait: Duration::from_secs(2),
            not_idle_limit: 50,
            update_retry_delay: Duration::ZERO,
            update_retry_limit: None,
        }
    }
}

impl ShadowRetryPolicy {
    /// Policy with every wait set to zero, for fast-failing fakes.
    pub fn immediate() -> Self {
        ShadowRetryPolicy {
            reconnect_wait: Duration::ZERO,
            not_idle_wait: Duration::ZERO,
            update_retry_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}
