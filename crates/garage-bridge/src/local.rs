//! # Local Transport
//!
//! Keeps the link to the local broker up and turns inbound traffic into
//! [`LocalEvent`]s for the bridge.
//!
//! ## Event Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   LocalBusClient (adapter)                LocalTransportManager         │
//! │   ┌──────────────────────┐                ┌──────────────────────────┐ │
//! │   │ connect / subscribe  │ ◄───────────── │ connect()                │ │
//! │   │ publish              │ ◄───────────── │ publish()  (fire+forget) │ │
//! │   │                      │                │                          │ │
//! │   │ event stream ────────┼── LocalEvent ─►│ bridge event consumer    │ │
//! │   │  ConnectionLost      │                │  → on_connection_lost()  │ │
//! │   │  Message             │                │  → handle message        │ │
//! │   │  Delivered           │                │  → debug log             │ │
//! │   └──────────────────────┘                └──────────────────────────┘ │
//! │                                                                         │
//! │   RECONNECT: fixed interval, no growth, retries until connected        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inbound messages are owned values. Dropping the event after dispatch
//! releases the payload.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use garage_core::TopicSet;
use rumqttc::QoS;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionState, ConnectionTracker};
use crate::error::{BridgeError, BridgeResult};
use crate::retry::ReconnectPolicy;

// =============================================================================
// Collaborator Contract
// =============================================================================

/// Events emitted by a local-bus adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    /// The session dropped; the manager must reconnect.
    ConnectionLost { cause: String },
    /// A message arrived on a subscribed topic.
    Message { topic: String, payload: String },
    /// The broker acknowledged one of our publishes.
    Delivered { packet_id: u16 },
}

/// Whether an inbound message was consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    Handled,
    NotHandled,
}

impl MessageDisposition {
    pub fn is_handled(self) -> bool {
        self == MessageDisposition::Handled
    }
}

/// Operations the bridge needs from a local MQTT client.
///
/// Implementations deliver inbound traffic through their own
/// [`LocalEvent`] channel.
#[async_trait]
pub trait LocalBusClient: Send + Sync + 'static {
    /// Opens a fresh session, replacing any previous one.
    async fn connect(&self) -> BridgeResult<()>;

    async fn subscribe(&self, topic: &str, qos: QoS) -> BridgeResult<()>;

    async fn publish(&self, topic: &str, payload: &str, qos: QoS) -> BridgeResult<()>;

    /// Gives the client a chance to service its session.
    async fn yield_now(&self) -> BridgeResult<()> {
        Ok(())
    }
}

// =============================================================================
// Transport Manager
// =============================================================================

/// Connection management for the local broker.
pub struct LocalTransportManager<L> {
    client: L,
    topics: TopicSet,
    qos: QoS,
    policy: ReconnectPolicy,
    state: ConnectionTracker,
}

impl<L: LocalBusClient> LocalTransportManager<L> {
    pub fn new(client: L, topics: TopicSet, qos: QoS, policy: ReconnectPolicy) -> Self {
        LocalTransportManager {
            client,
            topics,
            qos,
            policy,
            state: ConnectionTracker::new(),
        }
    }

    pub fn state(&self) -> &ConnectionTracker {
        &self.state
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    /// Connects and subscribes to every topic the hardware publishes on.
    pub async fn connect(&self) -> BridgeResult<()> {
        self.state.set(ConnectionState::Connecting).await;

        match self.establish().await {
            Ok(()) => {
                self.state.set(ConnectionState::Connected).await;
                info!(topics = ?self.topics.publishes(), "Connected to local broker");
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Disconnected).await;
                Err(e)
            }
        }
    }

    async fn establish(&self) -> BridgeResult<()> {
        self.client.connect().await?;
        for topic in self.topics.publishes() {
            self.client.subscribe(topic, self.qos).await?;
        }
        Ok(())
    }

    /// Reconnects after a lost link, waiting a fixed interval between
    /// attempts.
    ///
    /// Runs until connected unless the policy carries an attempt cap.
    pub async fn on_connection_lost(&self, cause: &str) -> BridgeResult<()> {
        warn!(cause = %cause, "Local broker connection lost");

        let mut schedule = self.policy.schedule();
        let mut attempts: u32 = 0;

        loop {
            self.state.set(ConnectionState::Reconnecting).await;
            attempts = attempts.saturating_add(1);
            info!(attempt = attempts, "Reconnecting to local broker...");

            match self.establish().await {
                Ok(()) => {
                    self.state.set(ConnectionState::Connected).await;
                    info!(attempts, "Reconnected to local broker");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, attempt = attempts, "Local reconnect failed");
                }
            }

            match schedule.next_backoff() {
                Some(wait) => tokio::time::sleep(wait).await,
                None => {
                    self.state.set(ConnectionState::Disconnected).await;
                    return Err(BridgeError::ReconnectAbandoned { attempts });
                }
            }
        }
    }

    /// Publishes without waiting for delivery.
    pub async fn publish(&self, topic: &str, payload: &str) -> BridgeResult<()> {
        debug!(topic, payload, "Publishing to local broker");
        self.client.publish(topic, payload, self.qos).await
    }

    pub async fn yield_now(&self) -> BridgeResult<()> {
        self.client.yield_now().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLocalBus;
    use garage_core::topics::{GARAGE_COMMAND_TOPIC, GARAGE_DEBUG_TOPIC};
    use std::time::Duration;

    fn manager(bus: FakeLocalBus, policy: ReconnectPolicy) -> LocalTransportManager<FakeLocalBus> {
        LocalTransportManager::new(bus, TopicSet::garage(), QoS::AtLeastOnce, policy)
    }

    #[tokio::test]
    async fn test_connect_subscribes_to_hardware_topics() {
        let bus = FakeLocalBus::new();
        let manager = manager(bus.clone(), ReconnectPolicy::default());

        manager.connect().await.unwrap();

        assert!(manager.state().is_connected().await);
        let subs = bus.subscriptions();
        assert_eq!(subs.len(), TopicSet::garage().publishes().len());
        assert!(subs.iter().all(|(_, qos)| *qos == QoS::AtLeastOnce));
        assert!(subs.iter().any(|(t, _)| t == GARAGE_DEBUG_TOPIC));
        assert!(!subs.iter().any(|(t, _)| t == GARAGE_COMMAND_TOPIC));
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let bus = FakeLocalBus::new();
        bus.fail_next_connects(1);
        let manager = manager(bus, ReconnectPolicy::default());

        assert!(manager.connect().await.is_err());
        assert_eq!(manager.state().state().await, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_retries_at_fixed_interval() {
        let bus = FakeLocalBus::new();
        let manager = manager(bus.clone(), ReconnectPolicy::default());
        bus.fail_next_connects(3);

        let started = tokio::time::Instant::now();
        manager.on_connection_lost("broker restarted").await.unwrap();

        assert_eq!(bus.connect_calls(), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert!(manager.state().is_connected().await);
        // Subscriptions are re-issued on the new session.
        assert_eq!(bus.subscriptions().len(), TopicSet::garage().publishes().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_is_reconnecting_between_attempts() {
        let bus = FakeLocalBus::new();
        let manager = std::sync::Arc::new(manager(bus.clone(), ReconnectPolicy::default()));
        bus.fail_next_connects(1);

        let task = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.on_connection_lost("keep-alive timeout").await })
        };

        // First attempt failed, waiting out the interval.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(bus.connect_calls(), 1);
        assert_eq!(manager.state().state().await, ConnectionState::Reconnecting);

        task.await.unwrap().unwrap();
        assert_eq!(manager.state().state().await, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_cap_gives_up() {
        let bus = FakeLocalBus::new();
        bus.fail_next_connects(10);
        let manager = manager(bus.clone(), ReconnectPolicy::new(Duration::from_secs(2), Some(3)));

        let err = manager.on_connection_lost("gone").await.unwrap_err();
        assert!(matches!(err, BridgeError::ReconnectAbandoned { attempts: 3 }));
        assert_eq!(bus.connect_calls(), 3);
        assert_eq!(manager.state().state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_publish_is_fire_and_forget() {
        let bus = FakeLocalBus::new();
        let manager = manager(bus.clone(), ReconnectPolicy::default());
        manager.connect().await.unwrap();

        manager.publish(GARAGE_COMMAND_TOPIC, "open").await.unwrap();
        assert_eq!(
            bus.published(),
            vec![(GARAGE_COMMAND_TOPIC.to_string(), "open".to_string())]
        );
    }
}
