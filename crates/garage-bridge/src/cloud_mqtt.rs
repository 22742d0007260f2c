//! # Device Shadow Adapter
//!
//! [`ShadowClient`] over MQTT with mutual TLS, speaking the device-shadow
//! topic protocol.
//!
//! ## Topics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  $aws/things/<thing>/shadow/update            ◄── update documents     │
//! │  $aws/things/<thing>/shadow/update/delta      ──► ShadowEvent::Delta   │
//! │  $aws/things/<thing>/shadow/update/accepted   ──► UpdateAck(Accepted)  │
//! │  $aws/things/<thing>/shadow/update/rejected   ──► UpdateAck(Rejected)  │
//! │                                                                         │
//! │  Pending acks: clientToken → deadline. Expired tokens → Timeout.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no background task here. The event loop only advances inside
//! [`ShadowClient::yield_session`], which the manager calls under its lock.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS, TlsConfiguration, Transport,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cloud::{
    AckStatus, ShadowClient, ShadowConnectParams, ShadowEvent, ShadowInitParams, ShadowUpdate,
    YieldOutcome,
};
use crate::error::{BridgeError, BridgeResult};
use crate::local_mqtt::wait_for_connack;

const REQUEST_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 64;

// =============================================================================
// Topics
// =============================================================================

/// Shadow topics for one thing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTopics {
    pub update: String,
    pub delta: String,
    pub accepted: String,
    pub rejected: String,
}

impl ShadowTopics {
    pub fn for_thing(thing_name: &str) -> Self {
        let update = format!("$aws/things/{}/shadow/update", thing_name);
        ShadowTopics {
            delta: format!("{}/delta", update),
            accepted: format!("{}/accepted", update),
            rejected: format!("{}/rejected", update),
            update,
        }
    }
}

// =============================================================================
// Payload Helpers
// =============================================================================

/// JSON text of the `state` member of a delta document.
pub fn delta_state(payload: &[u8]) -> Option<String> {
    let doc: Value = serde_json::from_slice(payload).ok()?;
    doc.get("state").map(Value::to_string)
}

fn client_token(payload: &[u8]) -> Option<String> {
    let doc: Value = serde_json::from_slice(payload).ok()?;
    doc.get("clientToken")?.as_str().map(str::to_string)
}

fn read_credential(path: &Path) -> BridgeResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| BridgeError::CredentialLoadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Adapter
// =============================================================================

struct Credentials {
    root_ca: Vec<u8>,
    client_cert: Vec<u8>,
    private_key: Vec<u8>,
}

struct DeltaRegistration {
    topics: ShadowTopics,
    buffer_len: usize,
}

struct ShadowSession {
    client: AsyncClient,
    eventloop: EventLoop,
    reconnecting: bool,
    backlogged: bool,
}

/// Device-shadow client backed by `rumqttc` over TLS.
pub struct AwsShadowClient {
    events: mpsc::Sender<ShadowEvent>,
    max_in_flight: usize,
    endpoint: Option<ShadowInitParams>,
    credentials: Option<Credentials>,
    session: Option<ShadowSession>,
    auto_reconnect: bool,
    registration: Option<DeltaRegistration>,
    /// clientToken → ack deadline.
    pending: HashMap<String, Instant>,
}

impl AwsShadowClient {
    /// Creates the adapter and the receiving end of its event stream.
    pub fn new(max_in_flight: usize) -> (Self, mpsc::Receiver<ShadowEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CAPACITY);
        let client = AwsShadowClient {
            events,
            max_in_flight: max_in_flight.max(1),
            endpoint: None,
            credentials: None,
            session: None,
            auto_reconnect: false,
            registration: None,
            pending: HashMap::new(),
        };
        (client, rx)
    }

    fn emit(&self, event: ShadowEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!(error = %e, "Shadow event dropped");
        }
    }

    fn route_publish(&mut self, publish: &Publish) {
        let Some(registration) = self.registration.as_ref() else {
            return;
        };
        let topics = &registration.topics;

        if publish.topic == topics.delta {
            if publish.payload.len() > registration.buffer_len {
                warn!(
                    len = publish.payload.len(),
                    max = registration.buffer_len,
                    "Delta document too large, dropped"
                );
                return;
            }
            match delta_state(&publish.payload) {
                Some(state) => {
                    debug!(state = %state, "Shadow delta received");
                    self.emit(ShadowEvent::Delta(state));
                }
                None => warn!("Delta document without state, ignored"),
            }
        } else if publish.topic == topics.accepted || publish.topic == topics.rejected {
            let status = if publish.topic == topics.accepted {
                AckStatus::Accepted
            } else {
                AckStatus::Rejected
            };
            // Acks for other clients' updates are also broadcast here.
            if let Some(token) = client_token(&publish.payload) {
                if self.pending.remove(&token).is_some() {
                    self.emit(ShadowEvent::UpdateAck {
                        client_token: token,
                        status,
                    });
                }
            }
        }
    }

    fn expire_pending(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(token, _)| token.clone())
            .collect();

        for token in expired {
            self.pending.remove(&token);
            self.emit(ShadowEvent::UpdateAck {
                client_token: token,
                status: AckStatus::Timeout,
            });
        }
    }

    fn fail_all_pending(&mut self) {
        let tokens: Vec<String> = self.pending.drain().map(|(token, _)| token).collect();
        for token in tokens {
            self.emit(ShadowEvent::UpdateAck {
                client_token: token,
                status: AckStatus::Timeout,
            });
        }
    }
}

async fn subscribe_shadow(client: &AsyncClient, topics: &ShadowTopics) -> BridgeResult<()> {
    for topic in [&topics.delta, &topics.accepted, &topics.rejected] {
        client.subscribe(topic.as_str(), QoS::AtLeastOnce).await?;
    }
    Ok(())
}

#[async_trait]
impl ShadowClient for AwsShadowClient {
    async fn init(&mut self, params: &ShadowInitParams) -> BridgeResult<()> {
        let credentials = Credentials {
            root_ca: read_credential(&params.root_ca)?,
            client_cert: read_credential(&params.client_cert)?,
            private_key: read_credential(&params.private_key)?,
        };

        self.credentials = Some(credentials);
        self.auto_reconnect = params.auto_reconnect;
        self.endpoint = Some(params.clone());
        Ok(())
    }

    async fn connect(&mut self, params: &ShadowConnectParams) -> BridgeResult<()> {
        let (Some(endpoint), Some(credentials)) = (self.endpoint.as_ref(), self.credentials.as_ref())
        else {
            return Err(BridgeError::InvalidConfig(
                "shadow client connected before init".into(),
            ));
        };

        let mut options = MqttOptions::new(&params.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(endpoint.keep_alive);
        options.set_clean_session(true);
        options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
            ca: credentials.root_ca.clone(),
            alpn: None,
            client_auth: Some((credentials.client_cert.clone(), credentials.private_key.clone())),
        }));

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let timeout = endpoint.connect_timeout;
        tokio::time::timeout(timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| BridgeError::Timeout(timeout))??;

        info!(thing = %params.thing_name, client_id = %params.client_id, "Shadow session open");
        self.session = Some(ShadowSession {
            client,
            eventloop,
            reconnecting: false,
            backlogged: false,
        });
        Ok(())
    }

    fn set_auto_reconnect(&mut self, enabled: bool) -> BridgeResult<()> {
        self.auto_reconnect = enabled;
        Ok(())
    }

    async fn register_delta(&mut self, thing_name: &str, buffer_len: usize) -> BridgeResult<()> {
        let session = self.session.as_ref().ok_or(BridgeError::NotConnected)?;
        let topics = ShadowTopics::for_thing(thing_name);
        subscribe_shadow(&session.client, &topics).await?;

        self.registration = Some(DeltaRegistration { topics, buffer_len });
        Ok(())
    }

    async fn yield_session(&mut self, timeout: Duration) -> BridgeResult<YieldOutcome> {
        let connect_timeout = self
            .endpoint
            .as_ref()
            .map(|e| e.connect_timeout)
            .unwrap_or(timeout);
        let mut outcome = YieldOutcome::Idle;
        let was_backlogged;

        {
            let Some(session) = self.session.as_mut() else {
                return Err(BridgeError::NotConnected);
            };
            was_backlogged = std::mem::take(&mut session.backlogged);

            // A reconnect handshake needs longer than one poll slice.
            let budget = if session.reconnecting {
                connect_timeout.max(timeout)
            } else {
                timeout
            };
            let deadline = Instant::now() + budget;

            loop {
                let Some(session) = self.session.as_mut() else {
                    break;
                };
                let polled = tokio::time::timeout_at(deadline, session.eventloop.poll()).await;

                match polled {
                    Err(_) if session.reconnecting => {
                        debug!("Shadow reconnect still in progress");
                        return Err(BridgeError::NetworkAttemptingReconnect);
                    }
                    Err(_) => break,
                    Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                        if session.reconnecting {
                            session.reconnecting = false;
                            outcome = YieldOutcome::Reconnected;
                            if let Some(registration) = self.registration.as_ref() {
                                subscribe_shadow(&session.client, &registration.topics).await?;
                            }
                        }
                    }
                    Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                        self.route_publish(&publish);
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        if self.auto_reconnect {
                            warn!(error = %e, "Shadow session lost, attempting reconnect");
                            session.reconnecting = true;
                            return Err(BridgeError::NetworkAttemptingReconnect);
                        }
                        warn!(error = %e, "Shadow session lost");
                        self.session = None;
                        self.fail_all_pending();
                        return Err(e.into());
                    }
                }
            }
        }

        self.expire_pending(Instant::now());

        if was_backlogged || self.pending.len() >= self.max_in_flight {
            return Err(BridgeError::ClientNotIdle);
        }
        Ok(outcome)
    }

    async fn update(&mut self, update: &ShadowUpdate) -> BridgeResult<()> {
        let registration = self.registration.as_ref().ok_or(BridgeError::NotConnected)?;
        let topic = registration.topics.update.clone();
        let session = self.session.as_mut().ok_or(BridgeError::NotConnected)?;

        if session.reconnecting {
            return Err(BridgeError::NetworkAttemptingReconnect);
        }

        if let Err(e) = session.client.try_publish(
            topic,
            QoS::AtMostOnce,
            false,
            update.document.as_bytes().to_vec(),
        ) {
            session.backlogged = true;
            return Err(BridgeError::UpdateFailed(e.to_string()));
        }

        self.pending
            .insert(update.client_token.clone(), Instant::now() + update.ack_timeout);
        Ok(())
    }

    async fn disconnect(&mut self) -> BridgeResult<()> {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.client.try_disconnect() {
                debug!(error = %e, "Shadow disconnect request not queued");
            }
        }
        self.fail_all_pending();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn registered(max_in_flight: usize) -> (AwsShadowClient, mpsc::Receiver<ShadowEvent>) {
        let (mut client, rx) = AwsShadowClient::new(max_in_flight);
        client.registration = Some(DeltaRegistration {
            topics: ShadowTopics::for_thing("VirtualGarage"),
            buffer_len: 513,
        });
        (client, rx)
    }

    #[test]
    fn test_shadow_topics() {
        let topics = ShadowTopics::for_thing("VirtualGarage");
        assert_eq!(topics.update, "$aws/things/VirtualGarage/shadow/update");
        assert_eq!(topics.delta, "$aws/things/VirtualGarage/shadow/update/delta");
        assert_eq!(topics.accepted, "$aws/things/VirtualGarage/shadow/update/accepted");
        assert_eq!(topics.rejected, "$aws/things/VirtualGarage/shadow/update/rejected");
    }

    #[test]
    fn test_delta_state_extraction() {
        let payload = br#"{"version":12,"timestamp":1700000000,"state":{"open":1,"timestamp":43},"metadata":{}}"#;
        assert_eq!(
            delta_state(payload).as_deref(),
            Some(r#"{"open":1,"timestamp":43}"#)
        );
        assert_eq!(delta_state(br#"{"version":1}"#), None);
        assert_eq!(delta_state(b"not json"), None);
    }

    #[test]
    fn test_delta_routed_to_events() {
        let (mut client, mut rx) = registered(10);
        let publish = Publish::new(
            "$aws/things/VirtualGarage/shadow/update/delta",
            QoS::AtLeastOnce,
            br#"{"state":{"open":0,"timestamp":42}}"#.to_vec(),
        );

        client.route_publish(&publish);

        assert_eq!(
            rx.try_recv().unwrap(),
            ShadowEvent::Delta(r#"{"open":0,"timestamp":42}"#.into())
        );
    }

    #[test]
    fn test_oversized_delta_dropped() {
        let (mut client, mut rx) = registered(10);
        let padding = "x".repeat(600);
        let payload = format!(r#"{{"state":{{"open":1,"note":"{}"}}}}"#, padding);
        let publish = Publish::new(
            "$aws/things/VirtualGarage/shadow/update/delta",
            QoS::AtLeastOnce,
            payload.into_bytes(),
        );

        client.route_publish(&publish);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ack_correlation() {
        let (mut client, mut rx) = registered(10);
        let far = Instant::now() + Duration::from_secs(60);
        client.pending.insert("GarageManager-3".into(), far);

        // Someone else's token is ignored.
        client.route_publish(&Publish::new(
            "$aws/things/VirtualGarage/shadow/update/accepted",
            QoS::AtLeastOnce,
            br#"{"clientToken":"other-1"}"#.to_vec(),
        ));
        assert!(rx.try_recv().is_err());

        client.route_publish(&Publish::new(
            "$aws/things/VirtualGarage/shadow/update/rejected",
            QoS::AtLeastOnce,
            br#"{"code":400,"message":"bad","clientToken":"GarageManager-3"}"#.to_vec(),
        ));
        assert_eq!(
            rx.try_recv().unwrap(),
            ShadowEvent::UpdateAck {
                client_token: "GarageManager-3".into(),
                status: AckStatus::Rejected,
            }
        );
        assert!(client.pending.is_empty());
    }

    #[test]
    fn test_expired_acks_time_out() {
        let (mut client, mut rx) = registered(10);
        let now = Instant::now();
        client.pending.insert("GarageManager-0".into(), now);
        client.pending.insert("GarageManager-1".into(), now + Duration::from_secs(4));

        client.expire_pending(now);

        assert_eq!(
            rx.try_recv().unwrap(),
            ShadowEvent::UpdateAck {
                client_token: "GarageManager-0".into(),
                status: AckStatus::Timeout,
            }
        );
        assert_eq!(client.pending.len(), 1);
    }

    #[tokio::test]
    async fn test_unfinished_reconnect_is_not_idle() {
        // Accepts TCP but never answers CONNECT.
        let silent = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = silent.local_addr().unwrap().port();

        let (mut client, _rx) = registered(10);
        let (mqtt, eventloop) =
            AsyncClient::new(MqttOptions::new("GarageManager", "127.0.0.1", port), REQUEST_CAPACITY);
        client.auto_reconnect = true;
        client.session = Some(ShadowSession {
            client: mqtt,
            eventloop,
            reconnecting: true,
            backlogged: false,
        });

        let result = client.yield_session(Duration::from_millis(100)).await;

        assert!(matches!(result, Err(BridgeError::NetworkAttemptingReconnect)));
        assert!(client.session.as_ref().unwrap().reconnecting);
    }

    #[tokio::test]
    async fn test_calls_before_connect() {
        let (mut client, _rx) = AwsShadowClient::new(10);
        assert!(matches!(
            client.yield_session(Duration::from_millis(10)).await,
            Err(BridgeError::NotConnected)
        ));

        let params = ShadowConnectParams {
            thing_name: "VirtualGarage".into(),
            client_id: "GarageManager".into(),
        };
        assert!(client.connect(&params).await.unwrap_err().is_config_error());
    }

    #[tokio::test]
    async fn test_init_reports_missing_credentials() {
        let (mut client, _rx) = AwsShadowClient::new(10);
        let params = ShadowInitParams {
            host: "shadow.test".into(),
            port: 8883,
            root_ca: PathBuf::from("/nonexistent/certs/root"),
            client_cert: PathBuf::from("/nonexistent/certs/cert"),
            private_key: PathBuf::from("/nonexistent/certs/key"),
            keep_alive: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
            auto_reconnect: false,
        };

        let err = client.init(&params).await.unwrap_err();
        assert!(matches!(err, BridgeError::CredentialLoadFailed { ref path, .. } if path.ends_with("root")));
    }
}
