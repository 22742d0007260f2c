//! # Bridge Error Types
//!
//! Error types for bridge operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Bridge Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │  Shadow session codes   │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  AttemptingReconnect    │ │
//! │  │  ConfigLoad     │  │  Disconnected   │  │  ClientNotIdle          │ │
//! │  │  Credentials    │  │  Timeout / TLS  │  │  UpdateFailed           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Protocol     │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  Document       │  │  StartupFailed  │                              │
//! │  │  Serialization  │  │                 │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only startup can be fatal. Once both links are up, every error here is
//! logged and absorbed by a retry loop or a dropped update.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error type covering all possible bridge failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid bridge configuration.
    #[error("Invalid bridge configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// A certificate or key file could not be read.
    #[error("Failed to read credential {path}: {reason}")]
    CredentialLoadFailed { path: String, reason: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Failed to establish a session.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Link went away.
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// Connection or handshake timeout.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// MQTT client request could not be queued.
    #[error("MQTT client error: {0}")]
    MqttClient(String),

    /// Operation on a session that was never connected.
    #[error("Not connected")]
    NotConnected,

    /// Local reconnect loop hit its configured cap.
    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectAbandoned { attempts: u32 },

    // =========================================================================
    // Shadow Session Codes
    // =========================================================================
    /// The shadow session is reconnecting; try again shortly.
    #[error("Network attempting reconnect")]
    NetworkAttemptingReconnect,

    /// The shadow session is busy with earlier requests.
    #[error("Shadow client not idle")]
    ClientNotIdle,

    /// The shadow update request was not accepted by the client.
    #[error("Shadow update failed: {0}")]
    UpdateFailed(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Could not build the shadow update document.
    #[error("Shadow document error: {0}")]
    Document(#[from] garage_core::CoreError),

    /// Failed to serialize or parse JSON.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// One of the links could not be brought up at startup.
    #[error("Startup failed on {link} link: {reason}")]
    StartupFailed { link: &'static str, reason: String },
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::ConfigLoadFailed(err.to_string())
    }
}

impl From<rumqttc::ClientError> for BridgeError {
    fn from(err: rumqttc::ClientError) -> Self {
        BridgeError::MqttClient(err.to_string())
    }
}

impl From<rumqttc::ConnectionError> for BridgeError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        use rumqttc::ConnectionError as CE;
        match err {
            CE::Tls(tls) => BridgeError::TlsError(tls.to_string()),
            CE::NetworkTimeout | CE::FlushTimeout => BridgeError::Disconnected(err.to_string()),
            CE::Io(io) => BridgeError::ConnectionFailed(io.to_string()),
            CE::ConnectionRefused(code) => {
                BridgeError::ConnectionFailed(format!("refused: {:?}", code))
            }
            other => BridgeError::Disconnected(other.to_string()),
        }
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl BridgeError {
    /// Returns true if the operation can simply be tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionFailed(_)
                | BridgeError::Disconnected(_)
                | BridgeError::Timeout(_)
                | BridgeError::MqttClient(_)
                | BridgeError::NetworkAttemptingReconnect
                | BridgeError::ClientNotIdle
                | BridgeError::UpdateFailed(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidConfig(_)
                | BridgeError::ConfigLoadFailed(_)
                | BridgeError::CredentialLoadFailed { .. }
        )
    }

    /// Returns true if the process should exit instead of retrying.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(self, BridgeError::StartupFailed { .. }) || self.is_config_error()
    }

    /// Returns true for the shadow session's transient yield codes.
    pub fn is_transient_session(&self) -> bool {
        matches!(
            self,
            BridgeError::NetworkAttemptingReconnect | BridgeError::ClientNotIdle
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_fatal_errors() {
        let err = BridgeError::StartupFailed {
            link: "cloud",
            reason: "tls handshake".into(),
        };
        assert!(err.is_startup_fatal());
        assert!(BridgeError::InvalidConfig("no host".into()).is_startup_fatal());
        assert!(!BridgeError::ClientNotIdle.is_startup_fatal());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(BridgeError::ConnectionFailed("refused".into()).is_retryable());
        assert!(BridgeError::ClientNotIdle.is_retryable());
        assert!(BridgeError::NetworkAttemptingReconnect.is_transient_session());

        assert!(!BridgeError::InvalidConfig("bad".into()).is_retryable());
        assert!(!BridgeError::StartupFailed {
            link: "local",
            reason: "refused".into(),
        }
        .is_retryable());
        assert!(!BridgeError::UpdateFailed("x".into()).is_transient_session());
    }

    #[test]
    fn test_config_errors() {
        let err = BridgeError::CredentialLoadFailed {
            path: "/srv/certs/root".into(),
            reason: "No such file".into(),
        };
        assert!(err.is_config_error());
        assert!(err.to_string().contains("/srv/certs/root"));
    }

    #[test]
    fn test_document_error_conversion() {
        let err: BridgeError = garage_core::CoreError::DocumentOverflow {
            needed: 300,
            capacity: 200,
        }
        .into();
        assert!(matches!(err, BridgeError::Document(_)));
    }
}
