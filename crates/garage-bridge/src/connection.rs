//! # Connection State
//!
//! Link state shared between a transport manager and the bridge status.
//!
//! ```text
//!  ┌────────────┐  connect()  ┌────────────┐  ConnAck  ┌───────────┐
//!  │Disconnected│ ──────────► │ Connecting │ ────────► │ Connected │
//!  └────────────┘             └─────┬──────┘           └─────┬─────┘
//!        ▲     ▲                    │                        │ link lost
//!        │     └──── failure ───────┘                        ▼
//!        │                                             ┌────────────┐
//!        └──────────────── gave up ─────────────────── │Reconnecting│ ◄─┐
//!                                                      └─────┬──────┘   │
//!                                                            └─ wait ───┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

/// Connection state for one MQTT link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Attempting the first connect.
    Connecting,
    /// Connected and subscribed.
    Connected,
    /// Link lost. Covers both the attempts and the waits between them.
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Cloneable handle on a link's current state.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    state: Arc<RwLock<ConnectionState>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Connected
    }

    pub(crate) async fn set(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_tracker_shared_between_clones() {
        let tracker = ConnectionTracker::new();
        let observer = tracker.clone();

        tracker.set(ConnectionState::Connected).await;
        assert!(observer.is_connected().await);

        tracker.set(ConnectionState::Reconnecting).await;
        assert_eq!(observer.state().await, ConnectionState::Reconnecting);
    }
}
