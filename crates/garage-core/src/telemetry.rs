//! # Telemetry Parser
//!
//! Parses the fixed-grammar text messages the sensor firmware publishes.
//!
//! ## Grammars
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  home/garage/debug                                                     │
//! │  "Open:17 Close:29 Current:29 Days:0 Hours:0 Mins:1 Secs:37            │
//! │   Reconnects:0 WCF:10 "                                                │
//! │                                                                         │
//! │   idx: 0    1  2     3  4       5  6    7 8     9 10   11 12  13 ...   │
//! │        Open 17 Close 29 Current 29 Days 0 Hours 0 Mins 1  Secs 37 ...  │
//! │                                                                         │
//! │  home/garage/sensor                                                    │
//! │  "Door:opened State:nominal"                                           │
//! │                                                                         │
//! │   idx: 0    1      2     3                                             │
//! │        Door opened State nominal                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tokens come from splitting on spaces and colons (runs of delimiters
//! collapse). Values are taken by POSITION; labels are not checked. Parsing
//! never fails: a non-numeric value reads as 0, and unknown enum words map
//! to the fallback state.

use crate::shadow::{DebugTelemetry, DoorState, SensorModel, ShadowModel, SystemState};

/// Number of positional tokens in a debug message.
const DEBUG_TOKEN_COUNT: usize = 18;

/// Number of positional tokens in a sensor message.
const SENSOR_TOKEN_COUNT: usize = 4;

fn tokens(raw: &str, limit: usize) -> Vec<&str> {
    raw.split(|c| c == ' ' || c == ':')
        .filter(|t| !t.is_empty())
        .take(limit)
        .collect()
}

/// Reads the leading decimal digits of a token.
///
/// No sign, no whitespace. Anything that is not a digit ends the number; no
/// digits at all reads as 0. Values past `u32::MAX` saturate.
fn parse_unsigned(token: &str) -> u32 {
    token
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u32, |acc, b| {
            acc.saturating_mul(10).saturating_add(u32::from(b - b'0'))
        })
}

// =============================================================================
// Debug Telemetry
// =============================================================================

/// Parses a debug message into its numeric fields.
///
/// Missing trailing tokens read as 0.
pub fn parse_debug_telemetry(raw: &str) -> DebugTelemetry {
    let toks = tokens(raw, DEBUG_TOKEN_COUNT);
    let value = |idx: usize| toks.get(idx).map_or(0, |t| parse_unsigned(t));

    DebugTelemetry {
        opened_distance: value(1),
        closed_distance: value(3),
        current_distance: value(5),
        uptime_days: value(7),
        uptime_hours: value(9),
        uptime_minutes: value(11),
        // 13 is seconds, not mirrored to the shadow.
        reconnect_count: value(15),
        worst_case_frame_time_ms: value(17),
    }
}

// =============================================================================
// Sensor Telemetry
// =============================================================================

fn door_state(word: Option<&&str>) -> DoorState {
    match word {
        Some(w) if w.eq_ignore_ascii_case("opened") => DoorState::Opened,
        Some(w) if w.eq_ignore_ascii_case("closed") => DoorState::Closed,
        _ => DoorState::Unknown,
    }
}

// Anything unrecognised is Nominal, not Unknown/Booting. Kept as the
// firmware contract has always behaved; see DESIGN.md.
fn system_state(word: Option<&&str>) -> SystemState {
    match word {
        Some(w) if w.eq_ignore_ascii_case("booting") => SystemState::Booting,
        Some(w) if w.eq_ignore_ascii_case("calibrating") => SystemState::Calibrating,
        _ => SystemState::Nominal,
    }
}

/// Parses a sensor message into door and system state.
pub fn parse_sensor_telemetry(raw: &str) -> SensorModel {
    let toks = tokens(raw, SENSOR_TOKEN_COUNT);
    SensorModel {
        door_state: door_state(toks.get(1)),
        system_state: system_state(toks.get(3)),
    }
}

// =============================================================================
// Model Integration
// =============================================================================

impl ShadowModel {
    /// Parses debug telemetry into the model. Returns whether it changed.
    pub fn ingest_debug(&mut self, raw: &str) -> bool {
        self.apply_debug(parse_debug_telemetry(raw))
    }

    /// Parses sensor telemetry into the model. Returns whether it changed.
    pub fn ingest_sensor(&mut self, raw: &str) -> bool {
        self.apply_sensor(parse_sensor_telemetry(raw))
    }
}
