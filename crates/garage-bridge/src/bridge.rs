//! # Synchronization Bridge
//!
//! Main orchestrator. Owns the shadow model and wires the two transports
//! together.
//!
//! ## Bridge Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    SynchronizationBridge Architecture                   │
//! │                                                                         │
//! │  local events task           main loop (1 s)          cloud events task │
//! │  ─────────────────           ───────────────          ───────────────── │
//! │  Message ──► parse ──┐       cloud yield ◄─┐          Delta             │
//! │   (debug / sensor)   │       local yield   │            │               │
//! │                      ▼       health tick   │            ▼               │
//! │              ┌──────────────┐     │        │     decode + dedup         │
//! │              │ ShadowModel  │◄────┘        │            │               │
//! │              │ (RwLock)     │              │            ▼               │
//! │              └──────┬───────┘              │     publish "open"/"close" │
//! │                     │ changed / 5th tick   │     on the local bus       │
//! │                     ▼                      │                            │
//! │           CloudTransportManager ───────────┘                            │
//! │           (session mutex, per call)                                     │
//! │                                                                         │
//! │  ConnectionLost ──► LocalTransportManager::on_connection_lost()        │
//! │  UpdateAck      ──► log only                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no ordering between a command dispatch and a telemetry publish
//! that run at the same time. Each takes the session lock per call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use garage_core::{
    decode_delta, CommandTracker, GarageCommand, HardwareTopic, HealthMonitor, HealthTick,
    ReportedField, ShadowModel,
};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cloud::{AckStatus, CloudTransportManager, PublishOutcome, ShadowClient, ShadowEvent};
use crate::config::HealthSettings;
use crate::connection::ConnectionState;
use crate::error::{BridgeError, BridgeResult};
use crate::local::{LocalBusClient, LocalEvent, LocalTransportManager, MessageDisposition};

// =============================================================================
// Bridge Status
// =============================================================================

/// Snapshot of the bridge for logging and inspection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BridgeStatus {
    pub local_state: ConnectionState,
    pub cloud_state: ConnectionState,
    pub hardware_dead: bool,
    /// Wall-clock time of the last handled hardware message.
    pub last_telemetry_at: Option<DateTime<Utc>>,
    pub updates_sent: u64,
    pub updates_dropped: u64,
    pub commands_dispatched: u64,
    pub last_command: Option<GarageCommand>,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives bridge notifications (status reports, dispatched commands).
pub trait BridgeEventEmitter: Send + Sync {
    /// Called with a fresh snapshot whenever health is reported.
    fn emit_status(&self, status: &BridgeStatus);

    /// Called after a command was published to the hardware.
    fn emit_command(&self, command: GarageCommand, sequence_token: u64);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl BridgeEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &BridgeStatus) {}
    fn emit_command(&self, _command: GarageCommand, _sequence_token: u64) {}
}

// =============================================================================
// Synchronization Bridge
// =============================================================================

/// Keeps the hardware and its cloud shadow in sync.
pub struct SynchronizationBridge<L, C> {
    local: Arc<LocalTransportManager<L>>,
    cloud: Arc<CloudTransportManager<C>>,
    model: Arc<RwLock<ShadowModel>>,
    commands: Arc<Mutex<CommandTracker>>,
    health: Arc<Mutex<HealthMonitor>>,
    status: Arc<RwLock<BridgeStatus>>,
    emitter: Arc<dyn BridgeEventEmitter>,
    tick_interval: Duration,
}

impl<L, C> Clone for SynchronizationBridge<L, C> {
    fn clone(&self) -> Self {
        SynchronizationBridge {
            local: self.local.clone(),
            cloud: self.cloud.clone(),
            model: self.model.clone(),
            commands: self.commands.clone(),
            health: self.health.clone(),
            status: self.status.clone(),
            emitter: self.emitter.clone(),
            tick_interval: self.tick_interval,
        }
    }
}

impl<L: LocalBusClient, C: ShadowClient> SynchronizationBridge<L, C> {
    /// Creates a bridge over the two transports.
    pub fn new(
        local: LocalTransportManager<L>,
        cloud: CloudTransportManager<C>,
        health: &HealthSettings,
    ) -> Self {
        SynchronizationBridge {
            local: Arc::new(local),
            cloud: Arc::new(cloud),
            model: Arc::new(RwLock::new(ShadowModel::new())),
            commands: Arc::new(Mutex::new(CommandTracker::new())),
            health: Arc::new(Mutex::new(HealthMonitor::new(
                health.dead_after(),
                health.report_every_ticks,
            ))),
            status: Arc::new(RwLock::new(BridgeStatus::default())),
            emitter: Arc::new(NoOpEmitter),
            tick_interval: health.tick_interval(),
        }
    }

    /// Sets the event emitter.
    pub fn with_emitter(mut self, emitter: Arc<dyn BridgeEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Returns the current bridge status.
    pub async fn status(&self) -> BridgeStatus {
        self.refresh_link_states().await;
        self.status.read().await.clone()
    }

    /// Returns a copy of the shadow model.
    pub async fn model(&self) -> ShadowModel {
        *self.model.read().await
    }

    /// Connects the cloud session, then the local broker.
    ///
    /// Either failure is fatal for the process.
    pub async fn start(&self) -> BridgeResult<()> {
        info!(thing = %self.cloud.thing_name(), "Starting synchronization bridge");

        self.cloud
            .connect()
            .await
            .map_err(|e| BridgeError::StartupFailed {
                link: "cloud",
                reason: e.to_string(),
            })?;

        self.local
            .connect()
            .await
            .map_err(|e| BridgeError::StartupFailed {
                link: "local",
                reason: e.to_string(),
            })?;

        self.refresh_link_states().await;
        info!("Synchronization bridge started");
        Ok(())
    }

    // =========================================================================
    // Hardware → Cloud
    // =========================================================================

    /// Routes one message from the local broker.
    ///
    /// Any message on a known hardware topic counts as a sign of life, even
    /// when it changes nothing.
    pub async fn handle_hardware_message(&self, topic: &str, payload: &str) -> MessageDisposition {
        let Some(kind) = HardwareTopic::classify(topic) else {
            debug!(topic, "Message on unknown topic");
            return MessageDisposition::NotHandled;
        };

        self.record_telemetry().await;

        let changed = match kind {
            HardwareTopic::Debug => {
                debug!(payload, "Debug telemetry");
                self.model.write().await.ingest_debug(payload)
            }
            HardwareTopic::Sensor => {
                debug!(payload, "Sensor telemetry");
                self.model.write().await.ingest_sensor(payload)
            }
            HardwareTopic::General => {
                debug!(payload, "General message ignored");
                false
            }
        };

        if changed {
            self.report_model().await;
        }
        MessageDisposition::Handled
    }

    async fn record_telemetry(&self) {
        let now = tokio::time::Instant::now().into_std();
        self.health.lock().await.record_telemetry(now);
        self.status.write().await.last_telemetry_at = Some(Utc::now());
    }

    /// Reports the full model as two update documents.
    async fn report_model(&self) {
        let batches = self.model.read().await.report_batches();
        for batch in batches {
            self.publish(&batch).await;
        }
    }

    async fn publish(&self, fields: &[ReportedField]) -> PublishOutcome {
        let outcome = self.cloud.publish_update(fields).await;
        let mut status = self.status.write().await;
        match &outcome {
            PublishOutcome::Sent { .. } => status.updates_sent += 1,
            PublishOutcome::Dropped(reason) => {
                status.updates_dropped += 1;
                debug!(%reason, "Update dropped");
            }
        }
        outcome
    }

    // =========================================================================
    // Cloud → Hardware
    // =========================================================================

    /// Decodes a delta and forwards a new command to the hardware.
    ///
    /// Returns the dispatched command, or `None` for duplicates and deltas
    /// without a usable `open` value.
    pub async fn handle_delta(&self, state_json: &str) -> Option<GarageCommand> {
        let decoded = decode_delta(state_json);
        let command = self.commands.lock().await.accept(decoded)?;

        info!(%command, token = decoded.sequence_token, "Dispatching door command");
        for topic in self.local.topics().subscribes() {
            if let Err(e) = self.local.publish(topic, command.payload()).await {
                warn!(error = %e, topic = %topic, "Command publish failed");
            }
        }

        {
            let mut status = self.status.write().await;
            status.commands_dispatched += 1;
            status.last_command = Some(command);
        }
        self.emitter.emit_command(command, decoded.sequence_token);
        Some(command)
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Runs the dead-man check and reports it every N-th tick.
    pub async fn health_tick(&self, now: Instant) -> HealthTick {
        let tick = self.health.lock().await.tick(now);

        let flipped = self.model.write().await.set_hardware_dead(tick.hardware_dead);
        if flipped {
            if tick.hardware_dead {
                warn!(tick = tick.tick, "Sensor hardware went silent");
            } else {
                info!(tick = tick.tick, "Sensor hardware is back");
            }
        }
        self.status.write().await.hardware_dead = tick.hardware_dead;

        if tick.report {
            let field = self.model.read().await.health_report();
            self.publish(&[field]).await;
            let snapshot = self.status().await;
            self.emitter.emit_status(&snapshot);
        }
        tick
    }

    // =========================================================================
    // Run Loop
    // =========================================================================

    /// Runs until `shutdown` fires or its sender is dropped.
    pub async fn run(
        &self,
        local_events: mpsc::Receiver<LocalEvent>,
        cloud_events: mpsc::Receiver<ShadowEvent>,
        mut shutdown: mpsc::Receiver<()>,
    ) {
        let local_task = tokio::spawn(Self::consume_local(self.clone(), local_events));
        let cloud_task = tokio::spawn(Self::consume_cloud(self.clone(), cloud_events));

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        // A cycle can sit in the update retry loop for a long time, so the
        // shutdown signal is raced against the cycle itself as well.
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.recv() => break,
            }
            tokio::select! {
                _ = self.cycle() => {}
                _ = shutdown.recv() => break,
            }
        }
        info!("Bridge received shutdown");

        local_task.abort();
        cloud_task.abort();
        if let Err(e) = self.cloud.disconnect().await {
            debug!(error = %e, "Cloud disconnect on shutdown failed");
        }
        info!("Bridge stopped");
    }

    async fn cycle(&self) {
        match self.cloud.yield_session().await {
            Ok(_) => {}
            Err(e) if e.is_transient_session() => debug!(error = %e, "Cloud session busy"),
            Err(e) => warn!(error = %e, "Cloud session yield failed"),
        }

        if let Err(e) = self.local.yield_now().await {
            debug!(error = %e, "Local yield failed");
        }

        self.health_tick(tokio::time::Instant::now().into_std()).await;
    }

    async fn consume_local(bridge: Self, mut events: mpsc::Receiver<LocalEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                LocalEvent::ConnectionLost { cause } => {
                    if let Err(e) = bridge.local.on_connection_lost(&cause).await {
                        error!(error = %e, "Local broker unreachable");
                    }
                }
                LocalEvent::Message { topic, payload } => {
                    let disposition = bridge.handle_hardware_message(&topic, &payload).await;
                    if !disposition.is_handled() {
                        debug!(topic = %topic, "Message not handled");
                    }
                }
                LocalEvent::Delivered { packet_id } => {
                    debug!(packet_id, "Message delivery confirmed");
                }
            }
        }
        debug!("Local event stream closed");
    }

    async fn consume_cloud(bridge: Self, mut events: mpsc::Receiver<ShadowEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ShadowEvent::Delta(state) => {
                    debug!(state = %state, "Shadow delta");
                    bridge.handle_delta(&state).await;
                }
                ShadowEvent::UpdateAck {
                    client_token,
                    status,
                } => match status {
                    AckStatus::Accepted => debug!(token = %client_token, "Update accepted"),
                    AckStatus::Rejected | AckStatus::Timeout => {
                        warn!(token = %client_token, %status, "Update not acknowledged")
                    }
                },
            }
        }
        debug!("Shadow event stream closed");
    }

    async fn refresh_link_states(&self) {
        let local_state = self.local.state().state().await;
        let cloud_state = self.cloud.state().state().await;
        let mut status = self.status.write().await;
        status.local_state = local_state;
        status.cloud_state = cloud_state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CloudSettings;
    use crate::retry::{ReconnectPolicy, ShadowRetryPolicy};
    use crate::testing::{FakeLocalBus, FakeShadowClient};
    use garage_core::topics::{GARAGE_COMMAND_TOPIC, GARAGE_DEBUG_TOPIC, GARAGE_SENSOR_TOPIC};
    use garage_core::{DoorState, TopicSet};
    use rumqttc::QoS;
    use std::path::Path;

    type TestBridge = SynchronizationBridge<FakeLocalBus, FakeShadowClient>;

    const DEBUG_LINE: &str =
        "Open:17 Close:29 Current:29 Days:0 Hours:0 Mins:1 Secs:37 Reconnects:0 WCF:10 ";

    fn bridge() -> (TestBridge, FakeLocalBus, FakeShadowClient) {
        bridge_with_policy(ShadowRetryPolicy::immediate())
    }

    fn bridge_with_policy(policy: ShadowRetryPolicy) -> (TestBridge, FakeLocalBus, FakeShadowClient) {
        let bus = FakeLocalBus::new();
        let shadow = FakeShadowClient::new();

        let local = LocalTransportManager::new(
            bus.clone(),
            TopicSet::garage(),
            QoS::AtLeastOnce,
            ReconnectPolicy::default(),
        );
        let mut settings = CloudSettings::default();
        settings.host = "shadow.test".into();
        let certs = settings.certificate_paths_in(Path::new("/tmp"));
        let cloud = CloudTransportManager::new(shadow.clone(), &settings, certs)
            .with_retry_policy(policy);

        let bridge = SynchronizationBridge::new(local, cloud, &HealthSettings::default());
        (bridge, bus, shadow)
    }

    fn documents(shadow: &FakeShadowClient) -> Vec<String> {
        shadow.updates().into_iter().map(|u| u.document).collect()
    }

    #[derive(Default)]
    struct RecordingEmitter {
        commands: std::sync::Mutex<Vec<(GarageCommand, u64)>>,
        statuses: std::sync::Mutex<u32>,
    }

    impl BridgeEventEmitter for RecordingEmitter {
        fn emit_status(&self, _status: &BridgeStatus) {
            *self.statuses.lock().unwrap() += 1;
        }
        fn emit_command(&self, command: GarageCommand, sequence_token: u64) {
            self.commands.lock().unwrap().push((command, sequence_token));
        }
    }

    #[tokio::test]
    async fn test_start_connects_cloud_then_local() {
        let (bridge, bus, shadow) = bridge();

        bridge.start().await.unwrap();

        assert_eq!(shadow.connect_calls(), 1);
        assert_eq!(bus.connect_calls(), 1);
        let status = bridge.status().await;
        assert_eq!(status.cloud_state, ConnectionState::Connected);
        assert_eq!(status.local_state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_cloud_startup_failure_is_fatal() {
        let (bridge, bus, shadow) = bridge();
        shadow.fail_connect(true);

        let err = bridge.start().await.unwrap_err();

        assert!(matches!(err, BridgeError::StartupFailed { link: "cloud", .. }));
        assert_eq!(bus.connect_calls(), 0);
    }

    #[tokio::test]
    async fn test_local_startup_failure_is_fatal() {
        let (bridge, bus, _shadow) = bridge();
        bus.fail_next_connects(1);

        let err = bridge.start().await.unwrap_err();
        assert!(matches!(err, BridgeError::StartupFailed { link: "local", .. }));
    }

    #[tokio::test]
    async fn test_debug_telemetry_reports_two_batches_once() {
        let (bridge, _bus, shadow) = bridge();

        let disposition = bridge.handle_hardware_message(GARAGE_DEBUG_TOPIC, DEBUG_LINE).await;
        assert_eq!(disposition, MessageDisposition::Handled);

        let docs = documents(&shadow);
        assert_eq!(docs.len(), 2);
        assert!(docs[0].contains(
            r#""reported":{"dbgCurrent":29,"dbgClosed":29,"dbgOpen":17,"dbgDays":0,"dbgHours":0}"#
        ));
        assert!(docs[1].contains(
            r#""reported":{"dbgMins":1,"dbgReconnects":0,"dbgWcf":10,"systemState":0,"open":2}"#
        ));
        assert!(docs.iter().all(|d| d.len() <= 200));

        // Same telemetry again: nothing changed, nothing sent.
        bridge.handle_hardware_message(GARAGE_DEBUG_TOPIC, DEBUG_LINE).await;
        assert_eq!(shadow.updates().len(), 2);
        assert_eq!(bridge.status().await.updates_sent, 2);
    }

    #[tokio::test]
    async fn test_sensor_topic_is_case_insensitive() {
        let (bridge, _bus, shadow) = bridge();

        let disposition = bridge
            .handle_hardware_message("HOME/Garage/SENSOR", "Door:opened State:nominal")
            .await;

        assert!(disposition.is_handled());
        assert_eq!(bridge.model().await.sensor.door_state, DoorState::Opened);
        let docs = documents(&shadow);
        assert_eq!(docs.len(), 2);
        assert!(docs[1].contains(r#""systemState":2,"open":1"#));
    }

    #[tokio::test]
    async fn test_general_topic_handled_but_ignored() {
        let (bridge, _bus, shadow) = bridge();

        let disposition = bridge
            .handle_hardware_message("home/garage/general", "hello")
            .await;

        assert!(disposition.is_handled());
        assert!(shadow.updates().is_empty());
        // Still counts as a sign of life.
        assert!(bridge.status().await.last_telemetry_at.is_some());
        let now = tokio::time::Instant::now().into_std();
        assert!(!bridge.health_tick(now).await.hardware_dead);
    }

    #[tokio::test]
    async fn test_unknown_topic_not_handled() {
        let (bridge, _bus, shadow) = bridge();

        let disposition = bridge.handle_hardware_message("home/kitchen/light", "on").await;

        assert_eq!(disposition, MessageDisposition::NotHandled);
        assert!(shadow.updates().is_empty());
        assert!(bridge.status().await.last_telemetry_at.is_none());
    }

    #[tokio::test]
    async fn test_delta_dispatched_once_per_token() {
        let (bridge, bus, _shadow) = bridge();
        let emitter = Arc::new(RecordingEmitter::default());
        let bridge = bridge.with_emitter(emitter.clone());
        bridge.start().await.unwrap();

        let close = r#"{"open":0,"timestamp":42}"#;
        assert_eq!(bridge.handle_delta(close).await, Some(GarageCommand::Close));
        assert_eq!(bridge.handle_delta(close).await, None);
        assert_eq!(
            bridge.handle_delta(r#"{"timestamp":43,"open":1}"#).await,
            Some(GarageCommand::Open)
        );

        assert_eq!(
            bus.published(),
            vec![
                (GARAGE_COMMAND_TOPIC.to_string(), "close".to_string()),
                (GARAGE_COMMAND_TOPIC.to_string(), "open".to_string()),
            ]
        );
        assert_eq!(
            *emitter.commands.lock().unwrap(),
            vec![(GarageCommand::Close, 42), (GarageCommand::Open, 43)]
        );
        let status = bridge.status().await;
        assert_eq!(status.commands_dispatched, 2);
        assert_eq!(status.last_command, Some(GarageCommand::Open));
    }

    #[tokio::test]
    async fn test_health_reported_every_fifth_tick() {
        let (bridge, _bus, shadow) = bridge();
        let emitter = Arc::new(RecordingEmitter::default());
        let bridge = bridge.with_emitter(emitter.clone());
        let t0 = Instant::now();

        let mut reported = Vec::new();
        for s in 1..=12 {
            let tick = bridge.health_tick(t0 + Duration::from_secs(s)).await;
            assert!(tick.hardware_dead);
            if tick.report {
                reported.push(tick.tick);
            }
        }

        assert_eq!(reported, vec![5, 10]);
        let docs = documents(&shadow);
        assert_eq!(docs.len(), 2);
        assert!(docs
            .iter()
            .all(|d| d.contains(r#""reported":{"garageSensorDead":true}"#)));
        assert_eq!(*emitter.statuses.lock().unwrap(), 2);
        assert!(bridge.model().await.debug.hardware_dead);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_man_follows_telemetry() {
        let (bridge, _bus, _shadow) = bridge();

        bridge
            .handle_hardware_message(GARAGE_SENSOR_TOPIC, "Door:closed State:booting")
            .await;
        let t0 = tokio::time::Instant::now().into_std();

        assert!(!bridge.health_tick(t0 + Duration::from_secs(1)).await.hardware_dead);
        assert!(!bridge.health_tick(t0 + Duration::from_secs(2)).await.hardware_dead);
        assert!(bridge.health_tick(t0 + Duration::from_secs(3)).await.hardware_dead);
        assert!(bridge.status().await.hardware_dead);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_end_to_end() {
        let (bridge, bus, shadow) = bridge();
        bridge.start().await.unwrap();

        let (local_tx, local_rx) = mpsc::channel(8);
        let (cloud_tx, cloud_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let runner = bridge.clone();
        let handle = tokio::spawn(async move { runner.run(local_rx, cloud_rx, shutdown_rx).await });

        local_tx
            .send(LocalEvent::Message {
                topic: GARAGE_SENSOR_TOPIC.into(),
                payload: "Door:opened State:nominal".into(),
            })
            .await
            .unwrap();
        cloud_tx
            .send(ShadowEvent::Delta(r#"{"open":0,"timestamp":7}"#.into()))
            .await
            .unwrap();
        cloud_tx
            .send(ShadowEvent::Delta(r#"{"open":0,"timestamp":7}"#.into()))
            .await
            .unwrap();

        // Five ticks: sensor goes silent after 2 s, health reported on tick 5.
        tokio::time::sleep(Duration::from_millis(5500)).await;

        let docs = documents(&shadow);
        assert_eq!(docs.len(), 3);
        assert!(docs[2].contains(r#""garageSensorDead":true"#));
        assert_eq!(
            bus.published(),
            vec![(GARAGE_COMMAND_TOPIC.to_string(), "close".to_string())]
        );
        assert!(shadow.yield_calls() >= 5);

        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap();
        assert_eq!(shadow.disconnect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_stuck_health_report() {
        let (bridge, _bus, shadow) = bridge_with_policy(ShadowRetryPolicy::default());
        bridge.start().await.unwrap();
        // Busy for far longer than the test runs.
        shadow.script_yields((0..40).map(|_| Err(BridgeError::ClientNotIdle)));

        let (_local_tx, local_rx) = mpsc::channel(8);
        let (_cloud_tx, cloud_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let runner = bridge.clone();
        let handle = tokio::spawn(async move { runner.run(local_rx, cloud_rx, shutdown_rx).await });

        // Tick 5 starts the health report, which waits out busy yields.
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert!(shadow.updates().is_empty());

        shutdown_tx.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("shutdown waited for the retry loop")
            .unwrap();
        assert_eq!(shadow.disconnect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_lost_event_reconnects() {
        let (bridge, bus, _shadow) = bridge();
        bridge.start().await.unwrap();
        bus.fail_next_connects(2);

        let (local_tx, local_rx) = mpsc::channel(8);
        let (_cloud_tx, cloud_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let runner = bridge.clone();
        let handle = tokio::spawn(async move { runner.run(local_rx, cloud_rx, shutdown_rx).await });

        local_tx
            .send(LocalEvent::ConnectionLost {
                cause: "keep-alive timeout".into(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(4500)).await;

        // One startup connect plus three reconnect attempts.
        assert_eq!(bus.connect_calls(), 4);
        assert_eq!(bridge.status().await.local_state, ConnectionState::Connected);

        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap();
    }
}
