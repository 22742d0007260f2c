//! # Local Broker Adapter
//!
//! [`LocalBusClient`] on top of `rumqttc`. Each `connect()` opens a fresh
//! session and spawns a driver task that polls the event loop and forwards
//! traffic as [`LocalEvent`]s.
//!
//! ```text
//!   connect() ──► AsyncClient + EventLoop ──► wait for CONNACK
//!                                                  │
//!                      spawn driver ◄──────────────┘
//!                          │
//!        Publish  ──► LocalEvent::Message
//!        PubAck   ──► LocalEvent::Delivered
//!        error    ──► LocalEvent::ConnectionLost, driver exits
//! ```
//!
//! The driver stops polling after the first error, so rumqttc never
//! reconnects on its own. Reconnecting is the manager's job.

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::LocalSettings;
use crate::error::{BridgeError, BridgeResult};
use crate::local::{LocalBusClient, LocalEvent};

/// Requests queued between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// Inbound events buffered for the bridge.
const EVENT_CAPACITY: usize = 256;

struct LocalSession {
    client: AsyncClient,
    driver: JoinHandle<()>,
}

/// Local broker client backed by `rumqttc`.
pub struct MqttLocalBus {
    settings: LocalSettings,
    events: mpsc::Sender<LocalEvent>,
    session: Mutex<Option<LocalSession>>,
}

impl MqttLocalBus {
    /// Creates the adapter and the receiving end of its event stream.
    pub fn new(settings: LocalSettings) -> (Self, mpsc::Receiver<LocalEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CAPACITY);
        let bus = MqttLocalBus {
            settings,
            events,
            session: Mutex::new(None),
        };
        (bus, rx)
    }

    fn options(&self) -> MqttOptions {
        let s = &self.settings;
        let mut options = MqttOptions::new(&s.client_id, &s.host, s.port);
        options.set_credentials(&s.username, &s.password);
        options.set_keep_alive(s.keep_alive());
        options.set_clean_session(s.clean_session);
        options
    }

    async fn client(&self) -> BridgeResult<AsyncClient> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.client.clone())
            .ok_or(BridgeError::NotConnected)
    }
}

#[async_trait]
impl LocalBusClient for MqttLocalBus {
    async fn connect(&self) -> BridgeResult<()> {
        let mut session = self.session.lock().await;
        if let Some(old) = session.take() {
            old.driver.abort();
        }

        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        let timeout = self.settings.connect_timeout();
        tokio::time::timeout(timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| BridgeError::Timeout(timeout))??;

        debug!(
            host = %self.settings.host,
            port = self.settings.port,
            client_id = %self.settings.client_id,
            "Local broker session open"
        );

        let driver = tokio::spawn(drive(eventloop, self.events.clone()));
        *session = Some(LocalSession { client, driver });
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> BridgeResult<()> {
        self.client().await?.subscribe(topic, qos).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str, qos: QoS) -> BridgeResult<()> {
        self.client()
            .await?
            .publish(topic, qos, false, payload.as_bytes().to_vec())
            .await?;
        Ok(())
    }
}

impl Drop for MqttLocalBus {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.driver.abort();
        }
    }
}

pub(crate) async fn wait_for_connack(eventloop: &mut EventLoop) -> BridgeResult<()> {
    loop {
        match eventloop.poll().await? {
            Event::Incoming(Packet::ConnAck(ack)) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(BridgeError::ConnectionFailed(format!("refused: {:?}", code))),
                };
            }
            other => trace!(event = ?other, "Waiting for CONNACK"),
        }
    }
}

async fn drive(mut eventloop: EventLoop, events: mpsc::Sender<LocalEvent>) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => LocalEvent::Message {
                topic: publish.topic,
                payload: String::from_utf8_lossy(&publish.payload).into_owned(),
            },
            Ok(Event::Incoming(Packet::PubAck(ack))) => LocalEvent::Delivered { packet_id: ack.pkid },
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Local broker event loop stopped");
                let _ = events
                    .send(LocalEvent::ConnectionLost {
                        cause: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        if events.send(event).await.is_err() {
            debug!("Local event receiver dropped, stopping driver");
            return;
        }
    }
}
