//! Shared test helpers: a scripted eAPI transport and client builders.

// Not every test binary uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use nrfu_core::device::DeviceConfig;
use nrfu_core::error::NrfuError;
use nrfu_core::transport::EapiTransport;
use nrfu_core::EapiClient;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted transport: maps command strings to canned outputs, counts
/// RPC round trips and tracks peak in-flight requests.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, Value>>,
    rpc_error: Mutex<Option<(i64, String)>>,
    fail_transport: AtomicBool,
    delay: Mutex<Option<Duration>>,
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the output for one command.
    pub fn respond(&self, command: &str, output: Value) {
        self.responses.lock().insert(command.to_string(), output);
    }

    /// Script a probe answer for the given hardware model.
    pub fn respond_probe(&self, model: &str) {
        self.respond("show version", json!({ "modelName": model }));
    }

    /// Make every subsequent call fail at the transport layer.
    pub fn fail_transport(&self, fail: bool) {
        self.fail_transport.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent call return an RPC error envelope.
    pub fn fail_rpc(&self, code: i64, message: &str) {
        *self.rpc_error.lock() = Some((code, message.to_string()));
    }

    /// Stop returning RPC errors.
    pub fn clear_rpc_error(&self) {
        *self.rpc_error.lock() = None;
    }

    /// Add latency to every call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of RPC round trips observed.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously in-flight calls observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.requests.store(0, Ordering::SeqCst);
        self.peak_in_flight.store(0, Ordering::SeqCst);
    }

    fn command_strings(envelope: &Value) -> Vec<String> {
        envelope["params"]["cmds"]
            .as_array()
            .map(|cmds| {
                cmds.iter()
                    .map(|entry| match entry {
                        Value::String(cmd) => cmd.clone(),
                        other => other["cmd"].as_str().unwrap_or_default().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Thin local wrapper so the orphan rules allow implementing the
/// (foreign) `EapiTransport` trait for a shared (foreign `Arc`) handle.
pub struct SharedTransport(Arc<MockTransport>);

impl SharedTransport {
    pub fn new(inner: Arc<MockTransport>) -> Self {
        Self(inner)
    }
}

#[async_trait]
impl EapiTransport for SharedTransport {
    async fn call(&self, envelope: &Value) -> Result<Value, NrfuError> {
        self.0.call(envelope).await
    }
}

#[async_trait]
impl EapiTransport for MockTransport {
    async fn call(&self, envelope: &Value) -> Result<Value, NrfuError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_transport.load(Ordering::SeqCst) {
            return Err(NrfuError::TransportError(
                "connection reset by peer".to_string(),
            ));
        }

        if let Some((code, message)) = self.rpc_error.lock().clone() {
            return Ok(json!({ "error": { "code": code, "message": message } }));
        }

        let responses = self.responses.lock();
        let results: Vec<Value> = Self::command_strings(envelope)
            .iter()
            .map(|cmd| responses.get(cmd).cloned().unwrap_or_else(|| json!({})))
            .collect();
        Ok(json!({ "result": results }))
    }
}

/// A device config pointing nowhere; the mock transport never dials.
pub fn device_config(name: &str) -> DeviceConfig {
    DeviceConfig::new(name, format!("{}.lab.invalid", name), "admin", "arista")
}

/// Build a client over the mock and connect it.
pub async fn established_client(name: &str, transport: Arc<MockTransport>) -> Arc<EapiClient> {
    let client = EapiClient::with_transport(device_config(name), Box::new(SharedTransport::new(transport)));
    client
        .connect()
        .await
        .expect("mock probe must succeed once scripted");
    Arc::new(client)
}
