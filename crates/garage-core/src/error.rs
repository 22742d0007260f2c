//! # Error Types
//!
//! Domain-specific error types for garage-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  garage-core errors (this file)                                        │
//! │  └── CoreError        - Shadow document construction failures          │
//! │                                                                         │
//! │  garage-bridge errors (separate crate)                                 │
//! │  └── BridgeError      - Transport, config and protocol failures        │
//! │                                                                         │
//! │  Flow: CoreError → BridgeError → log line (never surfaced further)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Telemetry and command parsing never fail: malformed input falls back to
//! safe default values instead. The only fallible pure operation is building
//! a bounded shadow document.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core logic errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The shadow document would exceed its fixed capacity.
    ///
    /// ## When This Occurs
    /// - Too many reported fields in one update
    /// - Very long client token
    ///
    /// The publish is abandoned; the next scheduled report re-sends state.
    #[error("Shadow document needs {needed} bytes but capacity is {capacity}")]
    DocumentOverflow { needed: usize, capacity: usize },

    /// A reported field name that cannot appear in a shadow document.
    #[error("Invalid reported field name: {0:?}")]
    InvalidFieldName(String),

    /// The document was finalized without any reported section.
    #[error("Shadow document has no reported fields")]
    EmptyDocument,
}
