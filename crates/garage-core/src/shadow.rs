//! # Garage Shadow Model
//!
//! The single in-memory snapshot of the monitored garage sensor.
//!
//! ## Model Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ShadowModel                                    │
//! │                                                                         │
//! │  ┌─────────────────────────┐   ┌─────────────────────────────────────┐ │
//! │  │ sensor                  │   │ debug                               │ │
//! │  │ ─────────────────────── │   │ ─────────────────────────────────── │ │
//! │  │ system_state  Booting   │   │ closed/opened/current distance      │ │
//! │  │ door_state    Unknown   │   │ uptime days/hours/minutes           │ │
//! │  └─────────────────────────┘   │ reconnect_count                     │ │
//! │                                │ worst_case_frame_time_ms            │ │
//! │                                │ hardware_dead  (bridge-owned)       │ │
//! │                                └─────────────────────────────────────┘ │
//! │                                                                         │
//! │  apply_*(telemetry) → changed?   (diff first, then overwrite always)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `hardware_dead` is never sent by the hardware; only the health monitor
//! writes it.

use serde::Serialize;

use crate::document::{fields, ReportedField};

// =============================================================================
// Enumerations
// =============================================================================

/// Calibration state reported by the sensor firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    /// No idea where the opened/closed positions are.
    #[default]
    Booting,
    /// Knows the opened OR the closed position.
    Calibrating,
    /// Knows both positions.
    Nominal,
}

impl SystemState {
    /// Ordinal reported in the shadow's `systemState` field.
    pub const fn ordinal(self) -> i32 {
        match self {
            SystemState::Booting => 0,
            SystemState::Calibrating => 1,
            SystemState::Nominal => 2,
        }
    }
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemState::Booting => write!(f, "booting"),
            SystemState::Calibrating => write!(f, "calibrating"),
            SystemState::Nominal => write!(f, "nominal"),
        }
    }
}

/// Door position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorState {
    Closed,
    Opened,
    #[default]
    Unknown,
}

impl DoorState {
    /// Ordinal reported in the shadow's `open` field.
    pub const fn ordinal(self) -> i32 {
        match self {
            DoorState::Closed => 0,
            DoorState::Opened => 1,
            DoorState::Unknown => 2,
        }
    }
}

impl std::fmt::Display for DoorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DoorState::Closed => write!(f, "closed"),
            DoorState::Opened => write!(f, "opened"),
            DoorState::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Sub-models
// =============================================================================

/// Door and calibration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SensorModel {
    pub system_state: SystemState,
    pub door_state: DoorState,
}

/// Sonar distances, uptime and firmware health counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DebugModel {
    pub closed_distance: u32,
    pub opened_distance: u32,
    pub current_distance: u32,
    pub uptime_days: u32,
    pub uptime_hours: u32,
    pub uptime_minutes: u32,
    /// Local-bus reconnects counted by the firmware.
    pub reconnect_count: u32,
    /// Worst-case foreground frame time.
    pub worst_case_frame_time_ms: u32,
    /// Decided by the bridge, not by the hardware.
    pub hardware_dead: bool,
}

/// Debug values carried by one debug telemetry message.
///
/// Same as [`DebugModel`] minus the bridge-owned `hardware_dead` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugTelemetry {
    pub closed_distance: u32,
    pub opened_distance: u32,
    pub current_distance: u32,
    pub uptime_days: u32,
    pub uptime_hours: u32,
    pub uptime_minutes: u32,
    pub reconnect_count: u32,
    pub worst_case_frame_time_ms: u32,
}

// =============================================================================
// Shadow Model
// =============================================================================

/// Canonical device state mirrored to the cloud shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ShadowModel {
    pub sensor: SensorModel,
    pub debug: DebugModel,
}

impl ShadowModel {
    /// Fresh model: Booting, door Unknown, all debug values zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the sensor section, returning whether it differed.
    pub fn apply_sensor(&mut self, sensor: SensorModel) -> bool {
        let changed = self.sensor != sensor;
        self.sensor = sensor;
        changed
    }

    /// Overwrites the debug values, returning whether any differed.
    ///
    /// `hardware_dead` is neither compared nor touched.
    pub fn apply_debug(&mut self, t: DebugTelemetry) -> bool {
        let d = &mut self.debug;
        let changed = d.opened_distance != t.opened_distance
            || d.closed_distance != t.closed_distance
            || d.current_distance != t.current_distance
            || d.uptime_days != t.uptime_days
            || d.uptime_hours != t.uptime_hours
            || d.uptime_minutes != t.uptime_minutes
            || d.reconnect_count != t.reconnect_count
            || d.worst_case_frame_time_ms != t.worst_case_frame_time_ms;

        d.opened_distance = t.opened_distance;
        d.closed_distance = t.closed_distance;
        d.current_distance = t.current_distance;
        d.uptime_days = t.uptime_days;
        d.uptime_hours = t.uptime_hours;
        d.uptime_minutes = t.uptime_minutes;
        d.reconnect_count = t.reconnect_count;
        d.worst_case_frame_time_ms = t.worst_case_frame_time_ms;

        changed
    }

    /// Sets the dead-man flag, returning whether it flipped.
    pub fn set_hardware_dead(&mut self, dead: bool) -> bool {
        let changed = self.debug.hardware_dead != dead;
        self.debug.hardware_dead = dead;
        changed
    }

    /// The full sensor/debug report, split in two update documents.
    ///
    /// A single document with all ten fields sits right at the 200-byte
    /// bound, so the report always goes out as two batches of five.
    pub fn report_batches(&self) -> [Vec<ReportedField>; 2] {
        let d = &self.debug;
        let s = &self.sensor;
        [
            vec![
                ReportedField::uint(fields::DBG_CURRENT, d.current_distance),
                ReportedField::uint(fields::DBG_CLOSED, d.closed_distance),
                ReportedField::uint(fields::DBG_OPEN, d.opened_distance),
                ReportedField::uint(fields::DBG_DAYS, d.uptime_days),
                ReportedField::uint(fields::DBG_HOURS, d.uptime_hours),
            ],
            vec![
                ReportedField::uint(fields::DBG_MINS, d.uptime_minutes),
                ReportedField::uint(fields::DBG_RECONNECTS, d.reconnect_count),
                ReportedField::uint(fields::DBG_WCF, d.worst_case_frame_time_ms),
                ReportedField::int(fields::SYSTEM_STATE, s.system_state.ordinal()),
                ReportedField::int(fields::OPEN, s.door_state.ordinal()),
            ],
        ]
    }

    /// The single-field health report.
    pub fn health_report(&self) -> ReportedField {
        ReportedField::bool(fields::GARAGE_SENSOR_DEAD, self.debug.hardware_dead)
    }
}
