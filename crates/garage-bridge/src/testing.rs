//! In-memory transport fakes for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::QoS;

use crate::cloud::{ShadowClient, ShadowConnectParams, ShadowInitParams, ShadowUpdate, YieldOutcome};
use crate::error::{BridgeError, BridgeResult};
use crate::local::LocalBusClient;

// =============================================================================
// Local Bus
// =============================================================================

#[derive(Default)]
struct LocalBusState {
    connect_failures: u32,
    connect_calls: u32,
    subscriptions: Vec<(String, QoS)>,
    published: Vec<(String, String)>,
}

/// Records subscriptions and publishes; fails a set number of connects.
#[derive(Clone, Default)]
pub struct FakeLocalBus {
    state: Arc<Mutex<LocalBusState>>,
}

impl FakeLocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().unwrap().connect_failures = n;
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().unwrap().connect_calls
    }

    /// Subscriptions made on the current session.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().published.clone()
    }
}

#[async_trait]
impl LocalBusClient for FakeLocalBus {
    async fn connect(&self) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(BridgeError::ConnectionFailed("broker unavailable".into()));
        }
        state.subscriptions.clear();
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> BridgeResult<()> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .push((topic.to_string(), qos));
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str, _qos: QoS) -> BridgeResult<()> {
        self.state
            .lock()
            .unwrap()
            .published
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

// =============================================================================
// Shadow Client
// =============================================================================

#[derive(Default)]
struct ShadowState {
    calls: Vec<String>,
    init_params: Option<ShadowInitParams>,
    delta_buffer_len: Option<usize>,
    fail_connect: bool,
    connect_calls: u32,
    disconnect_calls: u32,
    yields: VecDeque<BridgeResult<YieldOutcome>>,
    yield_calls: u32,
    update_failures: u32,
    updates_blocked_until_yield: u32,
    update_calls: u32,
    updates: Vec<ShadowUpdate>,
}

/// Scripted shadow client. Yields pop from a queue and fall back to
/// `Idle` once it is empty.
#[derive(Clone, Default)]
pub struct FakeShadowClient {
    state: Arc<Mutex<ShadowState>>,
}

impl FakeShadowClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().unwrap().fail_connect = fail;
    }

    pub fn script_yields<I>(&self, results: I)
    where
        I: IntoIterator<Item = BridgeResult<YieldOutcome>>,
    {
        self.state.lock().unwrap().yields.extend(results);
    }

    pub fn fail_next_updates(&self, n: u32) {
        self.state.lock().unwrap().update_failures = n;
    }

    /// Fails every update until the session has been yielded `n` times in
    /// total, like a request queue that only drains when polled.
    pub fn block_updates_until_yields(&self, n: u32) {
        self.state.lock().unwrap().updates_blocked_until_yield = n;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn init_params(&self) -> Option<ShadowInitParams> {
        self.state.lock().unwrap().init_params.clone()
    }

    pub fn delta_buffer_len(&self) -> Option<usize> {
        self.state.lock().unwrap().delta_buffer_len
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().unwrap().connect_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.state.lock().unwrap().disconnect_calls
    }

    pub fn yield_calls(&self) -> u32 {
        self.state.lock().unwrap().yield_calls
    }

    pub fn update_calls(&self) -> u32 {
        self.state.lock().unwrap().update_calls
    }

    /// Updates the client accepted.
    pub fn updates(&self) -> Vec<ShadowUpdate> {
        self.state.lock().unwrap().updates.clone()
    }
}

#[async_trait]
impl ShadowClient for FakeShadowClient {
    async fn init(&mut self, params: &ShadowInitParams) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("init".into());
        state.init_params = Some(params.clone());
        Ok(())
    }

    async fn connect(&mut self, _params: &ShadowConnectParams) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("connect".into());
        state.connect_calls += 1;
        if state.fail_connect {
            return Err(BridgeError::TlsError("handshake failed".into()));
        }
        Ok(())
    }

    fn set_auto_reconnect(&mut self, enabled: bool) -> BridgeResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("auto_reconnect:{}", enabled));
        Ok(())
    }

    async fn register_delta(&mut self, _thing_name: &str, buffer_len: usize) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("register_delta".into());
        state.delta_buffer_len = Some(buffer_len);
        Ok(())
    }

    async fn yield_session(&mut self, _timeout: Duration) -> BridgeResult<YieldOutcome> {
        let mut state = self.state.lock().unwrap();
        state.yield_calls += 1;
        state.yields.pop_front().unwrap_or(Ok(YieldOutcome::Idle))
    }

    async fn update(&mut self, update: &ShadowUpdate) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.update_calls += 1;
        if state.update_failures > 0 {
            state.update_failures -= 1;
            return Err(BridgeError::UpdateFailed("request queue full".into()));
        }
        if state.yield_calls < state.updates_blocked_until_yield {
            return Err(BridgeError::UpdateFailed("request queue full".into()));
        }
        state.updates.push(update.clone());
        Ok(())
    }

    async fn disconnect(&mut self) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("disconnect".into());
        state.disconnect_calls += 1;
        Ok(())
    }
}
