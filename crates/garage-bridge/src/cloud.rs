//! # Cloud Transport
//!
//! Owns the device-shadow session and runs the outbound-update protocol.
//!
//! ## Outbound Update Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       publish_update(fields)                            │
//! │                                                                         │
//! │  1. SERIALIZE                                                          │
//! │     {"state":{"reported":{...}}, "clientToken":"GarageManager-7"}      │
//! │     overflow ──────────────────────────────────► Dropped(Serialization) │
//! │                                                                         │
//! │  2. DRIVE THE SESSION (lock held per yield only)                       │
//! │     ┌──────────────► yield ───────────────┐                             │
//! │     │                                     │                             │
//! │     │  attempting reconnect: sleep 1 s    │  idle / reconnected         │
//! │     │  not idle:  sleep 2 s, busy += 1    │         │                   │
//! │     └──────────── busy > 50 ? ── yes ─────┼──► disconnect + connect     │
//! │                                           │   Dropped(SessionRestarted) │
//! │                                           ▼                             │
//! │  3. UPDATE (lock held per call only)                                   │
//! │     update() ── error ──► retry (no delay by default)                  │
//! │        │ ok                                                             │
//! │        ▼                                                                │
//! │     Sent { client_token }    accepted/rejected/timeout arrive later    │
//! │                              as ShadowEvent::UpdateAck (log only)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The session handle sits behind one mutex. The main loop's yield and the
//! protocol above both take it per call, never across a retry loop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use garage_core::ReportedField;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{CertificatePaths, CloudSettings};
use crate::connection::{ConnectionState, ConnectionTracker};
use crate::error::{BridgeError, BridgeResult};
use crate::retry::ShadowRetryPolicy;

// =============================================================================
// Collaborator Contract
// =============================================================================

/// Endpoint and credentials for [`ShadowClient::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowInitParams {
    pub host: String,
    pub port: u16,
    pub root_ca: PathBuf,
    pub client_cert: PathBuf,
    pub private_key: PathBuf,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    /// Always false at init. Enabled explicitly once connected.
    pub auto_reconnect: bool,
}

/// Identity for [`ShadowClient::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowConnectParams {
    pub thing_name: String,
    pub client_id: String,
}

/// One shadow update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowUpdate {
    pub thing_name: String,
    pub client_token: String,
    pub document: String,
    pub ack_timeout: Duration,
}

/// Successful yield outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldOutcome {
    /// Session serviced, nothing outstanding.
    Idle,
    /// The client re-established the session during this yield.
    Reconnected,
}

/// Final status of an update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Accepted,
    Rejected,
    Timeout,
}

impl std::fmt::Display for AckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AckStatus::Accepted => write!(f, "accepted"),
            AckStatus::Rejected => write!(f, "rejected"),
            AckStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Events emitted by a shadow adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadowEvent {
    /// JSON text of the delta document's `state` value.
    Delta(String),
    UpdateAck { client_token: String, status: AckStatus },
}

/// Operations the bridge needs from a device-shadow client.
///
/// Calls take `&mut self`; the manager serializes them behind its mutex.
/// Transient yield conditions are returned as
/// [`BridgeError::NetworkAttemptingReconnect`] and
/// [`BridgeError::ClientNotIdle`].
#[async_trait]
pub trait ShadowClient: Send + 'static {
    async fn init(&mut self, params: &ShadowInitParams) -> BridgeResult<()>;

    async fn connect(&mut self, params: &ShadowConnectParams) -> BridgeResult<()>;

    fn set_auto_reconnect(&mut self, enabled: bool) -> BridgeResult<()>;

    /// Starts delivering deltas for `thing_name`, dropping documents longer
    /// than `buffer_len`.
    async fn register_delta(&mut self, thing_name: &str, buffer_len: usize) -> BridgeResult<()>;

    async fn yield_session(&mut self, timeout: Duration) -> BridgeResult<YieldOutcome>;

    async fn update(&mut self, update: &ShadowUpdate) -> BridgeResult<()>;

    async fn disconnect(&mut self) -> BridgeResult<()>;
}

// =============================================================================
// Publish Outcome
// =============================================================================

/// Why an update was given up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The document did not fit the update buffer.
    Serialization,
    /// The client stayed busy and the session was restarted.
    SessionRestarted,
    /// The update call failed more often than the retry limit allows.
    RetriesExhausted,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Serialization => write!(f, "serialization"),
            DropReason::SessionRestarted => write!(f, "session_restarted"),
            DropReason::RetriesExhausted => write!(f, "retries_exhausted"),
        }
    }
}

/// Result of one [`CloudTransportManager::publish_update`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent { client_token: String },
    Dropped(DropReason),
}

impl PublishOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, PublishOutcome::Sent { .. })
    }
}

// =============================================================================
// Transport Manager
// =============================================================================

/// Session management and update protocol for the cloud shadow.
pub struct CloudTransportManager<C> {
    client: Mutex<C>,
    init: ShadowInitParams,
    identity: ShadowConnectParams,
    delta_buffer_len: usize,
    max_document_len: usize,
    yield_timeout: Duration,
    ack_timeout: Duration,
    policy: ShadowRetryPolicy,
    next_token: AtomicU64,
    state: ConnectionTracker,
}

impl<C: ShadowClient> CloudTransportManager<C> {
    pub fn new(client: C, settings: &CloudSettings, certificates: CertificatePaths) -> Self {
        CloudTransportManager {
            client: Mutex::new(client),
            init: ShadowInitParams {
                host: settings.host.clone(),
                port: settings.port,
                root_ca: certificates.root_ca,
                client_cert: certificates.client_cert,
                private_key: certificates.private_key,
                keep_alive: settings.keep_alive(),
                connect_timeout: settings.connect_timeout(),
                auto_reconnect: false,
            },
            identity: ShadowConnectParams {
                thing_name: settings.thing_name.clone(),
                client_id: settings.client_id.clone(),
            },
            delta_buffer_len: settings.delta_buffer_len,
            max_document_len: settings.max_document_len,
            yield_timeout: settings.yield_timeout(),
            ack_timeout: settings.ack_timeout(),
            policy: settings.retry_policy(),
            next_token: AtomicU64::new(0),
            state: ConnectionTracker::new(),
        }
    }

    /// Replaces the retry policy taken from the settings.
    pub fn with_retry_policy(mut self, policy: ShadowRetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> &ConnectionTracker {
        &self.state
    }

    pub fn thing_name(&self) -> &str {
        &self.identity.thing_name
    }

    /// Initialises the client, connects, enables auto-reconnect and
    /// registers for deltas.
    pub async fn connect(&self) -> BridgeResult<()> {
        self.state.set(ConnectionState::Connecting).await;

        let result = {
            let mut client = self.client.lock().await;
            self.establish(&mut *client).await
        };

        match result {
            Ok(()) => {
                self.state.set(ConnectionState::Connected).await;
                info!(
                    host = %self.init.host,
                    thing = %self.identity.thing_name,
                    "Connected to cloud shadow"
                );
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Disconnected).await;
                error!(error = %e, "Cloud shadow connect failed");
                Err(e)
            }
        }
    }

    async fn establish(&self, client: &mut C) -> BridgeResult<()> {
        client.init(&self.init).await?;
        client.connect(&self.identity).await?;
        client.set_auto_reconnect(true)?;
        client
            .register_delta(&self.identity.thing_name, self.delta_buffer_len)
            .await
    }

    /// Services the session once, holding the lock for this call only.
    pub async fn yield_session(&self) -> BridgeResult<YieldOutcome> {
        let result = {
            let mut client = self.client.lock().await;
            client.yield_session(self.yield_timeout).await
        };

        match &result {
            Ok(YieldOutcome::Reconnected) => {
                info!("Cloud shadow session reconnected");
                self.state.set(ConnectionState::Connected).await;
            }
            Err(BridgeError::NetworkAttemptingReconnect) => {
                self.state.set(ConnectionState::Reconnecting).await;
            }
            _ => {}
        }
        result
    }

    /// Sends one reported-state update.
    ///
    /// Never returns an error: every failure after startup is logged and
    /// either retried or reported as a dropped update.
    pub async fn publish_update(&self, fields: &[ReportedField]) -> PublishOutcome {
        let client_token = self.next_client_token();
        let document =
            match garage_core::ShadowDocument::reported(fields, &client_token, self.max_document_len)
            {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(error = %e, fields = fields.len(), "Shadow update dropped");
                    return PublishOutcome::Dropped(DropReason::Serialization);
                }
            };

        if let Some(reason) = self.wait_until_ready().await {
            return PublishOutcome::Dropped(reason);
        }

        let update = ShadowUpdate {
            thing_name: self.identity.thing_name.clone(),
            client_token,
            document,
            ack_timeout: self.ack_timeout,
        };
        self.send_update(update).await
    }

    /// Yields until the session is usable. Returns a drop reason when the
    /// session had to be restarted instead.
    async fn wait_until_ready(&self) -> Option<DropReason> {
        let mut busy: u32 = 0;

        loop {
            match self.yield_session().await {
                Ok(_) => return None,
                Err(BridgeError::NetworkAttemptingReconnect) => {
                    debug!("Cloud session attempting reconnect");
                    tokio::time::sleep(self.policy.reconnect_wait).await;
                }
                Err(BridgeError::ClientNotIdle) => {
                    busy += 1;
                    warn!(count = busy, "Ran into not idle");
                    tokio::time::sleep(self.policy.not_idle_wait).await;
                    if busy > self.policy.not_idle_limit {
                        self.restart_session().await;
                        return Some(DropReason::SessionRestarted);
                    }
                }
                Err(BridgeError::NotConnected) => {
                    tokio::time::sleep(self.policy.reconnect_wait).await;
                    if let Err(e) = self.connect().await {
                        warn!(error = %e, "Cloud session still down");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Cloud session yield failed");
                    tokio::time::sleep(self.policy.reconnect_wait).await;
                }
            }
        }
    }

    async fn send_update(&self, update: ShadowUpdate) -> PublishOutcome {
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let result = {
                let mut client = self.client.lock().await;
                client.update(&update).await
            };

            match result {
                Ok(()) => {
                    debug!(token = %update.client_token, attempts, "Shadow update sent");
                    return PublishOutcome::Sent {
                        client_token: update.client_token,
                    };
                }
                Err(e) => {
                    debug!(error = %e, attempts, "Shadow update not sent, retrying");
                    if let Some(limit) = self.policy.update_retry_limit {
                        if attempts >= limit {
                            warn!(
                                token = %update.client_token,
                                attempts,
                                "Shadow update dropped after retries"
                            );
                            return PublishOutcome::Dropped(DropReason::RetriesExhausted);
                        }
                    }
                    if !self.policy.update_retry_delay.is_zero() {
                        tokio::time::sleep(self.policy.update_retry_delay).await;
                    }
                    // A full request queue or a reconnect only clears when
                    // the session is polled.
                    if let Some(reason) = self.wait_until_ready().await {
                        return PublishOutcome::Dropped(reason);
                    }
                }
            }
        }
    }

    /// Drops the session and connects from scratch.
    async fn restart_session(&self) {
        warn!(limit = self.policy.not_idle_limit, "Client stuck busy, restarting session");
        {
            let mut client = self.client.lock().await;
            if let Err(e) = client.disconnect().await {
                debug!(error = %e, "Disconnect before restart failed");
            }
        }
        self.state.set(ConnectionState::Disconnected).await;

        match self.connect().await {
            Ok(()) => info!("Cloud session restarted"),
            Err(e) => error!(error = %e, "Cloud session restart failed"),
        }
    }

    /// Disconnects the session for shutdown.
    pub async fn disconnect(&self) -> BridgeResult<()> {
        let result = {
            let mut client = self.client.lock().await;
            client.disconnect().await
        };
        self.state.set(ConnectionState::Disconnected).await;
        result
    }

    fn next_client_token(&self) -> String {
        let n = self.next_token.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.identity.client_id, n)
    }
}
