//! # garage-core: Pure Shadow Logic for the Garage Bridge
//!
//! This crate contains everything about the garage sensor that can be
//! decided without touching a network: the canonical shadow model, the
//! telemetry grammars, delta command decoding and deduplication, the
//! dead-man check, and the bounded shadow update document.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Garage Shadow Bridge Architecture                   │
//! │                                                                         │
//! │  ┌───────────────────────┐              ┌────────────────────────────┐ │
//! │  │ Local MQTT broker     │              │ Cloud device shadow        │ │
//! │  │ (sensor hardware)     │              │ (TLS MQTT)                 │ │
//! │  └──────────┬────────────┘              └──────────────┬─────────────┘ │
//! │             │                                          │               │
//! │  ┌──────────▼──────────────────────────────────────────▼─────────────┐ │
//! │  │                 garage-bridge (transports, orchestration)         │ │
//! │  └──────────────────────────────┬────────────────────────────────────┘ │
//! │                                 │                                       │
//! │  ┌──────────────────────────────▼────────────────────────────────────┐ │
//! │  │               ★ garage-core (THIS CRATE) ★                        │ │
//! │  │                                                                   │ │
//! │  │  ┌─────────┐ ┌───────────┐ ┌─────────┐ ┌────────┐ ┌───────────┐  │ │
//! │  │  │ shadow  │ │ telemetry │ │ command │ │ health │ │ document  │  │ │
//! │  │  └─────────┘ └───────────┘ └─────────┘ └────────┘ └───────────┘  │ │
//! │  │                                                                   │ │
//! │  │   NO I/O • NO SOCKETS • NO SLEEPING • TIME IS PASSED IN          │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`shadow`] - Shadow model, states, diff-then-overwrite updates
//! - [`telemetry`] - Debug/sensor text grammars
//! - [`command`] - Delta decoding and at-most-once command tracking
//! - [`health`] - Dead-man timer and report rate limiting
//! - [`document`] - Reported fields and the bounded update document
//! - [`topics`] - Local-bus topic declarations
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use garage_core::{decode_delta, CommandTracker, GarageCommand, ShadowModel};
//!
//! let mut model = ShadowModel::new();
//! assert!(model.ingest_sensor("Door:opened State:nominal"));
//!
//! let mut tracker = CommandTracker::new();
//! let delta = decode_delta(r#"{"state":{"open":0,"timestamp":42}}"#);
//! assert_eq!(tracker.accept(delta), Some(GarageCommand::Close));
//! assert_eq!(tracker.accept(delta), None);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod command;
pub mod document;
pub mod error;
pub mod health;
pub mod shadow;
pub mod telemetry;
pub mod topics;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use command::{decode_delta, CommandTracker, DecodedCommand, GarageCommand};
pub use document::{fields, FieldValue, ReportedField, ShadowDocument, MAX_UPDATE_DOCUMENT_LEN};
pub use error::{CoreError, CoreResult};
pub use health::{HealthMonitor, HealthTick};
pub use shadow::{DebugModel, DebugTelemetry, DoorState, SensorModel, ShadowModel, SystemState};
pub use telemetry::{parse_debug_telemetry, parse_sensor_telemetry};
pub use topics::{HardwareTopic, TopicSet};
