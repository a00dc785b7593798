use crate::cache::CommandCache;
use crate::command::{Command, CommandResult};
use crate::device::{ConnectionState, DeviceConfig};
use crate::error::NrfuError;
use crate::response;
use crate::transport::{EapiTransport, HttpTransport};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// The command used to probe a device and learn its hardware model.
const PROBE_COMMAND: &str = "show version";

/// Per-device command client over eAPI.
///
/// Owns the connection state machine, the hardware model learned from the
/// probe, and an optional command cache. All state transitions are
/// linearized under the state lock; the lock is never held across a wire
/// call.
pub struct EapiClient {
    config: DeviceConfig,
    transport: Box<dyn EapiTransport>,
    state: RwLock<ConnectionState>,
    model: RwLock<Option<String>>,
    cache: Option<CommandCache>,
    // Monotonic request ids for both single and batched RPCs
    request_id: AtomicU64,
}

impl EapiClient {
    /// Create a client with the production HTTPS transport.
    pub fn new(config: DeviceConfig) -> Result<Self, NrfuError> {
        let transport = Box::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Create a client over a caller-supplied transport.
    pub fn with_transport(config: DeviceConfig, transport: Box<dyn EapiTransport>) -> Self {
        let cache = if config.disable_cache {
            None
        } else {
            Some(CommandCache::new())
        };

        Self {
            config,
            transport,
            state: RwLock::new(ConnectionState::Closed),
            model: RwLock::new(None),
            cache,
            request_id: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Hardware model string, populated once the client is established.
    pub fn model(&self) -> Option<String> {
        self.model.read().clone()
    }

    /// Connect to the device.
    ///
    /// Idempotent when already established. Runs the probe command, parses
    /// the hardware model and transitions to `Established`; a probe failure
    /// transitions to `Error` and returns a connect failure.
    #[instrument(skip(self), fields(device = %self.config.name), level = "debug")]
    pub async fn connect(&self) -> Result<(), NrfuError> {
        if self.state() == ConnectionState::Established {
            debug!("already established, connect is a no-op");
            return Ok(());
        }

        *self.state.write() = ConnectionState::Connecting;

        match self.probe().await {
            Ok(model) => {
                *self.state.write() = ConnectionState::Connected;
                info!(model = %model, "device probe succeeded");
                *self.model.write() = Some(model);
                *self.state.write() = ConnectionState::Established;
                Ok(())
            }
            Err(err) => {
                *self.state.write() = ConnectionState::Error;
                warn!(host = %self.config.host, error = %err, "device probe failed");
                Err(NrfuError::connect_error(
                    self.config.host.clone(),
                    err.to_string(),
                ))
            }
        }
    }

    /// Execute one command.
    ///
    /// Requires `Established`. Serves from the cache when the command
    /// allows it; otherwise performs a single-command RPC and stores the
    /// result if caching was requested. RPC-level errors are returned as
    /// `RpcError` and leave the client established.
    #[instrument(skip(self, cmd), fields(device = %self.config.name), level = "debug")]
    pub async fn execute(&self, cmd: &Command) -> Result<CommandResult, NrfuError> {
        self.ensure_established()?;
        let expanded = cmd.expand()?;

        if cmd.use_cache {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.get(&expanded) {
                    debug!(command = %expanded, "cache hit");
                    return Ok(hit.as_cached());
                }
            }
        }

        let started = Instant::now();
        let envelope = self.envelope(json!([expanded]), cmd.format.as_str());
        let body = self.transport.call(&envelope).await?;
        let mut outputs = Self::decode(body, 1)?;

        let result = CommandResult::new(
            expanded.clone(),
            outputs.remove(0),
            started.elapsed().as_millis() as u64,
        );

        if cmd.use_cache {
            if let Some(cache) = &self.cache {
                cache.set(&expanded, result.clone());
            }
        }

        Ok(result)
    }

    /// Execute several commands, batching the cache misses into one RPC.
    ///
    /// Cache hits are served locally; the remaining commands go out as a
    /// single batched request and the responses are spliced back so the
    /// returned vector matches the input order and length.
    #[instrument(skip(self, cmds), fields(device = %self.config.name, count = cmds.len()), level = "debug")]
    pub async fn execute_batch(&self, cmds: &[Command]) -> Result<Vec<CommandResult>, NrfuError> {
        self.ensure_established()?;
        if cmds.is_empty() {
            return Ok(Vec::new());
        }

        let expanded: Vec<String> = cmds
            .iter()
            .map(|cmd| cmd.expand())
            .collect::<Result<_, _>>()?;

        let mut slots: Vec<Option<CommandResult>> = vec![None; cmds.len()];
        let mut wire_indices: Vec<usize> = Vec::new();

        for (i, cmd) in cmds.iter().enumerate() {
            let hit = if cmd.use_cache {
                self.cache.as_ref().and_then(|c| c.get(&expanded[i]))
            } else {
                None
            };
            match hit {
                Some(result) => slots[i] = Some(result.as_cached()),
                None => wire_indices.push(i),
            }
        }

        if !wire_indices.is_empty() {
            let started = Instant::now();
            let wire_cmds: Vec<Value> = wire_indices
                .iter()
                .map(|&i| {
                    let mut entry = json!({
                        "cmd": expanded[i],
                        "version": cmds[i].version,
                        "format": cmds[i].format.as_str(),
                    });
                    if let Some(revision) = cmds[i].revision {
                        entry["revision"] = json!(revision);
                    }
                    entry
                })
                .collect();

            let envelope = self.envelope(Value::Array(wire_cmds), "json");
            let body = self.transport.call(&envelope).await?;
            let outputs = Self::decode(body, wire_indices.len())?;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            for (&i, output) in wire_indices.iter().zip(outputs) {
                let result = CommandResult::new(expanded[i].clone(), output, elapsed_ms);
                if cmds[i].use_cache {
                    if let Some(cache) = &self.cache {
                        cache.set(&expanded[i], result.clone());
                    }
                }
                slots[i] = Some(result);
            }
        }

        let mut results = Vec::with_capacity(cmds.len());
        for slot in slots {
            match slot {
                Some(result) => results.push(result),
                None => {
                    return Err(NrfuError::TransportError(
                        "batch response misaligned with request".to_string(),
                    ))
                }
            }
        }
        Ok(results)
    }

    /// Re-run the probe and refresh the hardware model, bypassing the
    /// cache. The client stays established if the probe fails mid-run.
    #[instrument(skip(self), fields(device = %self.config.name), level = "debug")]
    pub async fn refresh(&self) -> Result<(), NrfuError> {
        self.ensure_established()?;
        let model = self.probe().await?;
        debug!(model = %model, "hardware model refreshed");
        *self.model.write() = Some(model);
        Ok(())
    }

    /// Close the client and clear its cache. Safe to call repeatedly.
    pub fn disconnect(&self) {
        *self.state.write() = ConnectionState::Closed;
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        debug!(device = %self.config.name, "disconnected");
    }

    fn ensure_established(&self) -> Result<(), NrfuError> {
        match self.state() {
            ConnectionState::Established => Ok(()),
            _ => Err(NrfuError::NotConnected(self.config.name.clone())),
        }
    }

    async fn probe(&self) -> Result<String, NrfuError> {
        let envelope = self.envelope(json!([PROBE_COMMAND]), "json");
        let body = self.transport.call(&envelope).await?;
        let outputs = Self::decode(body, 1)?;
        Ok(response::lookup_str(&outputs[0], "modelName")?.to_string())
    }

    fn envelope(&self, cmds: Value, format: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "runCmds",
            "params": {
                "version": 1,
                "cmds": cmds,
                "format": format,
            },
            "id": self.request_id.fetch_add(1, Ordering::Relaxed) + 1,
        })
    }

    /// Decode an RPC response body into per-command outputs.
    fn decode(body: Value, expected: usize) -> Result<Vec<Value>, NrfuError> {
        if let Some(err) = body.get("error") {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error");
            return Err(NrfuError::rpc_error(code, message));
        }

        let results = body
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| NrfuError::parse_error("result"))?;

        if results.len() != expected {
            return Err(NrfuError::TransportError(format!(
                "expected {} results, device returned {}",
                expected,
                results.len()
            )));
        }

        Ok(results.to_vec())
    }
}

/// Connect a fleet of devices.
///
/// A device whose probe fails is excluded from the returned list with a
/// warning; the remaining devices proceed to the run.
pub async fn connect_devices(configs: Vec<DeviceConfig>) -> Vec<std::sync::Arc<EapiClient>> {
    let mut clients = Vec::with_capacity(configs.len());
    for config in configs {
        let name = config.name.clone();
        let client = match EapiClient::new(config) {
            Ok(client) => client,
            Err(err) => {
                warn!(device = %name, error = %err, "excluding device: client setup failed");
                continue;
            }
        };
        match client.connect().await {
            Ok(()) => clients.push(std::sync::Arc::new(client)),
            Err(err) => {
                warn!(device = %name, error = %err, "excluding device: connect failed");
            }
        }
    }
    clients
}

impl std::fmt::Debug for EapiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EapiClient")
            .field("device", &self.config.name)
            .field("host", &self.config.host)
            .field("state", &self.state())
            .finish()
    }
}
