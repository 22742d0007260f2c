//! # Module Topics
//!
//! The local-bus topics a sensor module declares. The bridge subscribes to
//! everything the module publishes and publishes commands on the topics the
//! module subscribes to.
//!
//! ```text
//!   Hardware ── home/garage/general ──►┐
//!   Hardware ── home/garage/sensor  ──►├── bridge (subscribed)
//!   Hardware ── home/garage/debug   ──►┘
//!   Hardware ◄── home/garage/command ─── bridge ("open" | "close")
//! ```

use serde::Serialize;

/// General status topic. Accepted, content ignored.
pub const GARAGE_GENERAL_TOPIC: &str = "home/garage/general";

/// Door/system state telemetry topic.
pub const GARAGE_SENSOR_TOPIC: &str = "home/garage/sensor";

/// Debug telemetry topic.
pub const GARAGE_DEBUG_TOPIC: &str = "home/garage/debug";

/// Command topic the hardware listens on.
pub const GARAGE_COMMAND_TOPIC: &str = "home/garage/command";

// =============================================================================
// Topic Set
// =============================================================================

/// Immutable pair of topic lists declared by a module.
///
/// Built once when the local transport is initialised and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicSet {
    subscribes: Vec<String>,
    publishes: Vec<String>,
}

impl TopicSet {
    /// Creates a topic set from the module's subscribe and publish lists.
    pub fn new<S, P>(subscribes: S, publishes: P) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        TopicSet {
            subscribes: subscribes.into_iter().map(Into::into).collect(),
            publishes: publishes.into_iter().map(Into::into).collect(),
        }
    }

    /// Topics the garage sensor module uses.
    pub fn garage() -> Self {
        TopicSet::new(
            [GARAGE_COMMAND_TOPIC],
            [GARAGE_GENERAL_TOPIC, GARAGE_SENSOR_TOPIC, GARAGE_DEBUG_TOPIC],
        )
    }

    /// Topics the module subscribes to (the bridge publishes here).
    pub fn subscribes(&self) -> &[String] {
        &self.subscribes
    }

    /// Topics the module publishes (the bridge subscribes to these).
    pub fn publishes(&self) -> &[String] {
        &self.publishes
    }
}

// =============================================================================
// Inbound Topic Classification
// =============================================================================

/// What kind of hardware message arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareTopic {
    General,
    Sensor,
    Debug,
}

impl HardwareTopic {
    /// Classifies an inbound topic, ignoring ASCII case.
    ///
    /// Returns `None` for topics the garage module does not publish.
    pub fn classify(topic: &str) -> Option<Self> {
        if topic.eq_ignore_ascii_case(GARAGE_DEBUG_TOPIC) {
            Some(HardwareTopic::Debug)
        } else if topic.eq_ignore_ascii_case(GARAGE_SENSOR_TOPIC) {
            Some(HardwareTopic::Sensor)
        } else if topic.eq_ignore_ascii_case(GARAGE_GENERAL_TOPIC) {
            Some(HardwareTopic::General)
        } else {
            None
        }
    }
}
