//! # Command Decoder
//!
//! Turns cloud delta documents into door commands and makes sure each
//! command is applied at most once.
//!
//! ## Decode + Dedup Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  {"state":{"open":0,"timestamp":42}}                                   │
//! │        │                                                                │
//! │        ▼  decode_delta()  (bounded token scan, 32 tokens)              │
//! │  DecodedCommand { command: Some(Close), sequence_token: 42 }           │
//! │        │                                                                │
//! │        ▼  CommandTracker::accept()                                     │
//! │  token 42 != last token?  ── no ──► None (duplicate delivery)          │
//! │        │ yes                                                            │
//! │        ▼                                                                │
//! │  record 42, return Some(Close)  ──► publish "close" on the local bus   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tokens are compared for inequality only. A late redelivery of an older
//! token is treated as new.

use serde::Serialize;
use serde_json::Value;

/// Size of the token table used when scanning a delta document.
///
/// Fields past this many JSON tokens are not seen.
pub const MAX_DELTA_TOKENS: usize = 32;

const OPEN_KEY: &str = "open";
const TIMESTAMP_KEY: &str = "timestamp";

// =============================================================================
// Commands
// =============================================================================

/// A door command relayed to the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GarageCommand {
    Open,
    Close,
}

impl GarageCommand {
    /// Payload the firmware expects on the command topic.
    pub const fn payload(self) -> &'static str {
        match self {
            GarageCommand::Open => "open",
            GarageCommand::Close => "close",
        }
    }

    fn from_open_value(value: &Value) -> Option<Self> {
        let raw = match value {
            Value::Bool(b) => u64::from(*b),
            Value::Number(n) => n.as_u64()?,
            _ => return None,
        };
        match raw {
            0 => Some(GarageCommand::Close),
            1 => Some(GarageCommand::Open),
            _ => None,
        }
    }
}

impl std::fmt::Display for GarageCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.payload())
    }
}

/// Result of decoding one delta document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodedCommand {
    /// `None` when `open` is absent or not 0/1.
    pub command: Option<GarageCommand>,
    /// 0 when `timestamp` is absent.
    pub sequence_token: u64,
}

// =============================================================================
// Decoder
// =============================================================================

fn take_token(budget: &mut usize) -> bool {
    if *budget == 0 {
        return false;
    }
    *budget -= 1;
    true
}

/// Walks `value` in document order, charging one token per object, array,
/// key and scalar. Calls `visit(key, value)` for every object member whose
/// value token still fits in the table. Returns false once the table is full.
fn scan(value: &Value, budget: &mut usize, visit: &mut dyn FnMut(&str, &Value)) -> bool {
    if !take_token(budget) {
        return false;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if !take_token(budget) || *budget == 0 {
                    return false;
                }
                visit(key, child);
                if !scan(child, budget, visit) {
                    return false;
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                if !scan(item, budget, visit) {
                    return false;
                }
            }
        }
        _ => {}
    }
    true
}

/// Decodes a delta document.
///
/// Never fails: invalid JSON decodes to no command with token 0.
pub fn decode_delta(raw: &str) -> DecodedCommand {
    decode_delta_with_table(raw, MAX_DELTA_TOKENS)
}

/// Decodes with an explicit token table size.
pub fn decode_delta_with_table(raw: &str, table_size: usize) -> DecodedCommand {
    let mut decoded = DecodedCommand::default();
    let Ok(doc) = serde_json::from_str::<Value>(raw) else {
        return decoded;
    };

    let mut budget = table_size;
    scan(&doc, &mut budget, &mut |key: &str, value: &Value| match key {
        OPEN_KEY => decoded.command = GarageCommand::from_open_value(value),
        TIMESTAMP_KEY => {
            if let Some(ts) = value.as_u64() {
                decoded.sequence_token = ts;
            }
        }
        _ => {}
    });

    decoded
}

// =============================================================================
// Pending Command State
// =============================================================================

/// Last applied command sequence token and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CommandTracker {
    last_token: u64,
    last_command: Option<GarageCommand>,
}

impl CommandTracker {
    /// Starts with token 0 and no command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a decoded delta and returns the command to dispatch, if any.
    ///
    /// A token equal to the last one is a no-op. A new token is recorded even
    /// when the document carried no command.
    pub fn accept(&mut self, decoded: DecodedCommand) -> Option<GarageCommand> {
        if decoded.sequence_token == self.last_token {
            return None;
        }
        self.last_token = decoded.sequence_token;

        let command = decoded.command?;
        self.last_command = Some(command);
        Some(command)
    }

    pub fn last_token(&self) -> u64 {
        self.last_token
    }

    pub fn last_command(&self) -> Option<GarageCommand> {
        self.last_command
    }
}
