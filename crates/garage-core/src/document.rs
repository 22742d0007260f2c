//! # Shadow Update Documents
//!
//! Builds the bounded-size JSON document sent to the device-shadow service.
//!
//! ## Document Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Update Document Construction                         │
//! │                                                                         │
//! │  new(capacity)        {"state":{                                       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  add_reported(fields) {"state":{"reported":{"dbgOpen":17,"open":1},    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  finalize(token)      {"state":{"reported":{...}}, "clientToken":"x-1"} │
//! │                                                                         │
//! │  Every step checks the running length against the capacity; an        │
//! │  overflow aborts the whole update (nothing partial is ever sent).      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Fields are written in the order the caller supplies them.

use std::fmt::Write as _;

use serde::Serialize;

use crate::error::{CoreError, CoreResult};

/// Default update document capacity in bytes.
pub const MAX_UPDATE_DOCUMENT_LEN: usize = 200;

// =============================================================================
// Field Names
// =============================================================================

/// Reported field names used in the garage shadow.
pub mod fields {
    pub const GARAGE_SENSOR_DEAD: &str = "garageSensorDead";
    pub const OPEN: &str = "open";
    pub const SYSTEM_STATE: &str = "systemState";
    pub const DBG_OPEN: &str = "dbgOpen";
    pub const DBG_CLOSED: &str = "dbgClosed";
    pub const DBG_CURRENT: &str = "dbgCurrent";
    pub const DBG_DAYS: &str = "dbgDays";
    pub const DBG_HOURS: &str = "dbgHours";
    pub const DBG_MINS: &str = "dbgMins";
    pub const DBG_RECONNECTS: &str = "dbgReconnects";
    pub const DBG_WCF: &str = "dbgWcf";
}

// =============================================================================
// Reported Fields
// =============================================================================

/// A single typed value in the reported section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
        }
    }
}

/// A named observation to report to the shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportedField {
    pub name: &'static str,
    pub value: FieldValue,
}

impl ReportedField {
    pub const fn bool(name: &'static str, value: bool) -> Self {
        ReportedField {
            name,
            value: FieldValue::Bool(value),
        }
    }

    pub const fn int(name: &'static str, value: i32) -> Self {
        ReportedField {
            name,
            value: FieldValue::Int(value),
        }
    }

    pub const fn uint(name: &'static str, value: u32) -> Self {
        ReportedField {
            name,
            value: FieldValue::UInt(value),
        }
    }
}

// =============================================================================
// Shadow Document Builder
// =============================================================================

/// Bounded shadow update document under construction.
#[derive(Debug, Clone)]
pub struct ShadowDocument {
    buf: String,
    capacity: usize,
    has_reported: bool,
}

impl ShadowDocument {
    const PREFIX: &'static str = "{\"state\":{";

    /// Starts a new document with the given byte capacity.
    pub fn new(capacity: usize) -> CoreResult<Self> {
        let mut doc = ShadowDocument {
            buf: String::with_capacity(capacity),
            capacity,
            has_reported: false,
        };
        doc.push(Self::PREFIX)?;
        Ok(doc)
    }

    /// Appends a `"reported"` object holding the fields in order.
    pub fn add_reported(&mut self, fields: &[ReportedField]) -> CoreResult<()> {
        let mut section = String::from("\"reported\":{");
        for (i, field) in fields.iter().enumerate() {
            if field.name.is_empty() || field.name.contains(|c| c == '"' || c == '\\') {
                return Err(CoreError::InvalidFieldName(field.name.to_string()));
            }
            if i > 0 {
                section.push(',');
            }
            // Writing to a String cannot fail.
            let _ = write!(section, "\"{}\":{}", field.name, field.value);
        }
        section.push_str("},");

        self.push(&section)?;
        self.has_reported = true;
        Ok(())
    }

    /// Closes the document and appends the client token.
    pub fn finalize(mut self, client_token: &str) -> CoreResult<String> {
        if !self.has_reported {
            return Err(CoreError::EmptyDocument);
        }

        // Drop the trailing comma left by the last section.
        if self.buf.ends_with(',') {
            self.buf.pop();
        }

        let token = serde_json::to_string(client_token)
            .map_err(|_| CoreError::InvalidFieldName(client_token.to_string()))?;
        let suffix = format!("}}, \"clientToken\":{}}}", token);
        self.push(&suffix)?;
        Ok(self.buf)
    }

    /// Builds a complete reported-only document in one call.
    pub fn reported(
        fields: &[ReportedField],
        client_token: &str,
        capacity: usize,
    ) -> CoreResult<String> {
        let mut doc = ShadowDocument::new(capacity)?;
        doc.add_reported(fields)?;
        doc.finalize(client_token)
    }

    fn push(&mut self, s: &str) -> CoreResult<()> {
        let needed = self.buf.len() + s.len();
        if needed > self.capacity {
            return Err(CoreError::DocumentOverflow {
                needed,
                capacity: self.capacity,
            });
        }
        self.buf.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape_and_order() {
        let doc = ShadowDocument::reported(
            &[
                ReportedField::uint(fields::DBG_CURRENT, 29),
                ReportedField::int(fields::OPEN, 1),
                ReportedField::bool(fields::GARAGE_SENSOR_DEAD, false),
            ],
            "GarageManager-0",
            MAX_UPDATE_DOCUMENT_LEN,
        )
        .unwrap();

        assert_eq!(
            doc,
            r#"{"state":{"reported":{"dbgCurrent":29,"open":1,"garageSensorDead":false}}, "clientToken":"GarageManager-0"}"#
        );

        let parsed: serde_json::Value = serde_json::from_str(&doc).unwrap();
        assert_eq!(parsed["state"]["reported"]["dbgCurrent"], 29);
        assert_eq!(parsed["clientToken"], "GarageManager-0");
    }

    #[test]
    fn test_overflow_is_rejected() {
        let many = [ReportedField::uint(fields::DBG_RECONNECTS, u32::MAX); 12];
        let err = ShadowDocument::reported(&many, "GarageManager-1", MAX_UPDATE_DOCUMENT_LEN)
            .unwrap_err();
        assert!(matches!(err, CoreError::DocumentOverflow { capacity: 200, .. }));
    }

    #[test]
    fn test_capacity_too_small_for_prefix() {
        assert!(ShadowDocument::new(4).is_err());
    }

    #[test]
    fn test_finalize_requires_reported() {
        let doc = ShadowDocument::new(MAX_UPDATE_DOCUMENT_LEN).unwrap();
        assert_eq!(doc.finalize("t-1"), Err(CoreError::EmptyDocument));
    }

    #[test]
    fn test_invalid_field_name() {
        let mut doc = ShadowDocument::new(MAX_UPDATE_DOCUMENT_LEN).unwrap();
        let bad = ReportedField::uint("bad\"name", 1);
        assert!(matches!(
            doc.add_reported(&[bad]),
            Err(CoreError::InvalidFieldName(_))
        ));
    }
}
