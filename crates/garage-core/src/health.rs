//! # Dead-Man Health Monitor
//!
//! Declares the sensor hardware dead after a bounded silence and decides
//! when the verdict is worth reporting to the cloud.
//!
//! ```text
//!   tick:      1    2    3    4    5    6    7    8    9   10
//!   update:    ✓    ✓    ✓    ✓    ✓    ✓    ✓    ✓    ✓    ✓   (model)
//!   report:                        ✓                        ✓   (cloud)
//! ```
//!
//! Time is passed in by the caller, so the monitor is deterministic under
//! test.

use std::time::{Duration, Instant};

/// Silence after which the hardware is considered dead.
pub const DEFAULT_DEAD_AFTER: Duration = Duration::from_secs(2);

/// Report the health flag every this many ticks.
pub const DEFAULT_REPORT_EVERY: u64 = 5;

/// Outcome of one health tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthTick {
    /// 1-based tick number.
    pub tick: u64,
    pub hardware_dead: bool,
    /// Whether this tick should publish the flag to the cloud.
    pub report: bool,
}

/// Tracks time since the last telemetry message.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    dead_after: Duration,
    report_every: u64,
    last_telemetry: Option<Instant>,
    ticks: u64,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        HealthMonitor::new(DEFAULT_DEAD_AFTER, DEFAULT_REPORT_EVERY)
    }
}

impl HealthMonitor {
    /// Creates a monitor. A `report_every` of 0 is treated as 1.
    pub fn new(dead_after: Duration, report_every: u64) -> Self {
        HealthMonitor {
            dead_after,
            report_every: report_every.max(1),
            last_telemetry: None,
            ticks: 0,
        }
    }

    /// Notes that a telemetry message was handled at `at`.
    pub fn record_telemetry(&mut self, at: Instant) {
        self.last_telemetry = Some(at);
    }

    /// True when nothing was heard for longer than the threshold.
    ///
    /// Before the first message the hardware counts as dead.
    pub fn is_hardware_dead(&self, now: Instant) -> bool {
        match self.last_telemetry {
            Some(last) => now.saturating_duration_since(last) > self.dead_after,
            None => true,
        }
    }

    /// Advances the tick counter and evaluates the dead-man check.
    pub fn tick(&mut self, now: Instant) -> HealthTick {
        self.ticks += 1;
        HealthTick {
            tick: self.ticks,
            hardware_dead: self.is_hardware_dead(now),
            report: self.ticks % self.report_every == 0,
        }
    }
}
