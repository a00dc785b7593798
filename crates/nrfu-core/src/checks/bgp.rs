//! BGP checks: peer counts, peer health, specific sessions, timers and
//! advertised capabilities.

use super::{conclude, error_result};
use crate::client::EapiClient;
use crate::command::Command;
use crate::error::NrfuError;
use crate::inputs::{self, parse_inputs};
use crate::registry::TestRegistry;
use crate::response;
use crate::result::TestResult;
use crate::test_contract::{NrfuTest, TestMeta};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;

pub fn register(registry: &TestRegistry) -> Result<(), NrfuError> {
    registry.register("bgp", "VerifyBgpPeerCount", VerifyBgpPeerCount::from_inputs)?;
    registry.register("bgp", "VerifyBgpPeersHealth", VerifyBgpPeersHealth::from_inputs)?;
    registry.register("bgp", "VerifyBgpSpecificPeers", VerifyBgpSpecificPeers::from_inputs)?;
    registry.register("bgp", "VerifyBgpTimers", VerifyBgpTimers::from_inputs)?;
    registry.register(
        "bgp",
        "VerifyBgpMultiprotocolCaps",
        VerifyBgpMultiprotocolCaps::from_inputs,
    )?;
    Ok(())
}

fn default_vrf() -> String {
    "default".to_string()
}

const ESTABLISHED: &str = "Established";

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PeerCountInputs {
    #[serde(default = "default_vrf")]
    vrf: String,
    /// Exact number of established peers expected in the VRF
    #[serde(deserialize_with = "inputs::lenient_u64")]
    expected_peers: u64,
}

/// The VRF holds exactly the expected number of established peers.
pub struct VerifyBgpPeerCount {
    meta: TestMeta,
    inputs: PeerCountInputs,
}

impl VerifyBgpPeerCount {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Established BGP peer count matches", &["bgp"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyBgpPeerCount {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if self.inputs.expected_peers == 0 {
            return Err(NrfuError::InvalidConfig(
                "expected_peers must be positive".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let cmd = Command::new("show bgp summary vrf {vrf}").with_param("vrf", &self.inputs.vrf);
        let output = match client.execute(&cmd).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let peers = match response::lookup_object(&output, &format!("vrfs.{}.peers", self.inputs.vrf))
        {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let established = peers
            .values()
            .filter(|peer| {
                peer.get("peerState")
                    .and_then(Value::as_str)
                    .map(|state| state.eq_ignore_ascii_case(ESTABLISHED))
                    .unwrap_or(false)
            })
            .count() as u64;

        let mut failures = Vec::new();
        if established != self.inputs.expected_peers {
            failures.push(format!(
                "VRF {} has {} established peers, expected {}",
                self.inputs.vrf, established, self.inputs.expected_peers
            ));
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PeersHealthInputs {}

/// Every configured peer in every VRF is established with drained queues.
pub struct VerifyBgpPeersHealth {
    meta: TestMeta,
    #[allow(dead_code)]
    inputs: PeersHealthInputs,
}

impl VerifyBgpPeersHealth {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "All BGP peers are healthy", &["bgp"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyBgpPeersHealth {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client.execute(&Command::new("show bgp summary vrf all")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let vrfs = match response::lookup_object(&output, "vrfs") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for (vrf, data) in vrfs {
            let Some(peers) = data.get("peers").and_then(Value::as_object) else {
                continue;
            };
            for (address, peer) in peers {
                let state = peer
                    .get("peerState")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                if !state.eq_ignore_ascii_case(ESTABLISHED) {
                    failures.push(format!(
                        "peer {} in VRF {} is {}, expected {}",
                        address, vrf, state, ESTABLISHED
                    ));
                    continue;
                }
                for queue in ["inMsgQueue", "outMsgQueue"] {
                    let depth = peer.get(queue).and_then(Value::as_f64).unwrap_or(0.0);
                    if depth > 0.0 {
                        failures.push(format!(
                            "peer {} in VRF {} has {} messages in {}",
                            address, vrf, depth, queue
                        ));
                    }
                }
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpecificPeersInputs {
    #[serde(default = "default_vrf")]
    vrf: String,
    /// Peer addresses that must be present and established
    peers: Vec<String>,
}

/// Each named peer exists in the VRF and is established.
pub struct VerifyBgpSpecificPeers {
    meta: TestMeta,
    inputs: SpecificPeersInputs,
}

impl VerifyBgpSpecificPeers {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Named BGP peers are established", &["bgp"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyBgpSpecificPeers {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if self.inputs.peers.is_empty() {
            return Err(NrfuError::InvalidConfig("peers must not be empty".to_string()));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let cmd = Command::new("show bgp summary vrf {vrf}").with_param("vrf", &self.inputs.vrf);
        let output = match client.execute(&cmd).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let peers = match response::lookup_object(&output, &format!("vrfs.{}.peers", self.inputs.vrf))
        {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for address in &self.inputs.peers {
            match peers.get(address) {
                None => failures.push(format!(
                    "peer {} not configured in VRF {}",
                    address, self.inputs.vrf
                )),
                Some(peer) => {
                    let state = peer
                        .get("peerState")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    if !state.eq_ignore_ascii_case(ESTABLISHED) {
                        failures.push(format!(
                            "peer {} in VRF {} is {}, expected {}",
                            address, self.inputs.vrf, state, ESTABLISHED
                        ));
                    }
                }
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimersInputs {
    #[serde(default = "default_vrf")]
    vrf: String,
    /// Peers whose timers are asserted
    peers: Vec<String>,
    /// Exact hold time in seconds
    #[serde(deserialize_with = "inputs::lenient_u64")]
    hold_time: u64,
    /// Exact keepalive interval in seconds
    #[serde(deserialize_with = "inputs::lenient_u64")]
    keepalive_time: u64,
}

/// Negotiated hold and keepalive timers match exactly.
pub struct VerifyBgpTimers {
    meta: TestMeta,
    inputs: TimersInputs,
}

impl VerifyBgpTimers {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "BGP timers match the declared values", &["bgp"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyBgpTimers {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if self.inputs.peers.is_empty() {
            return Err(NrfuError::InvalidConfig("peers must not be empty".to_string()));
        }
        if self.inputs.hold_time < 3 || self.inputs.hold_time > 7200 {
            return Err(NrfuError::InvalidConfig(
                "hold_time must be between 3 and 7200 seconds".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let cmd = Command::new("show bgp neighbors vrf {vrf}").with_param("vrf", &self.inputs.vrf);
        let output = match client.execute(&cmd).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let peer_list = match response::lookup_array(
            &output,
            &format!("vrfs.{}.peerList", self.inputs.vrf),
        ) {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for address in &self.inputs.peers {
            let Some(peer) = peer_list.iter().find(|peer| {
                peer.get("peerAddress").and_then(Value::as_str) == Some(address.as_str())
            }) else {
                failures.push(format!(
                    "peer {} not found in VRF {}",
                    address, self.inputs.vrf
                ));
                continue;
            };

            let hold = peer.get("holdTime").and_then(Value::as_u64).unwrap_or(0);
            let keepalive = peer
                .get("keepaliveTime")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if hold != self.inputs.hold_time {
                failures.push(format!(
                    "peer {} hold time is {}s, expected {}s",
                    address, hold, self.inputs.hold_time
                ));
            }
            if keepalive != self.inputs.keepalive_time {
                failures.push(format!(
                    "peer {} keepalive time is {}s, expected {}s",
                    address, keepalive, self.inputs.keepalive_time
                ));
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MultiprotocolCapsInputs {
    #[serde(default = "default_vrf")]
    vrf: String,
    /// Peers whose capabilities are asserted
    peers: Vec<String>,
    /// Capability names that must be advertised, received and enabled
    capabilities: Vec<String>,
}

/// Each named peer negotiated the required multiprotocol capabilities.
pub struct VerifyBgpMultiprotocolCaps {
    meta: TestMeta,
    inputs: MultiprotocolCapsInputs,
}

impl VerifyBgpMultiprotocolCaps {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "BGP multiprotocol capabilities negotiated", &["bgp"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyBgpMultiprotocolCaps {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if self.inputs.peers.is_empty() || self.inputs.capabilities.is_empty() {
            return Err(NrfuError::InvalidConfig(
                "peers and capabilities must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let cmd = Command::new("show bgp neighbors vrf {vrf}").with_param("vrf", &self.inputs.vrf);
        let output = match client.execute(&cmd).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let peer_list = match response::lookup_array(
            &output,
            &format!("vrfs.{}.peerList", self.inputs.vrf),
        ) {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for address in &self.inputs.peers {
            let Some(peer) = peer_list.iter().find(|peer| {
                peer.get("peerAddress").and_then(Value::as_str) == Some(address.as_str())
            }) else {
                failures.push(format!(
                    "peer {} not found in VRF {}",
                    address, self.inputs.vrf
                ));
                continue;
            };

            for capability in &self.inputs.capabilities {
                let cap = peer
                    .get("neighborCapabilities")
                    .and_then(|c| c.get("multiprotocolCaps"))
                    .and_then(|c| c.get(capability));
                let Some(cap) = cap else {
                    failures.push(format!(
                        "peer {} did not negotiate capability {}",
                        address, capability
                    ));
                    continue;
                };
                for side in ["advertised", "received", "enabled"] {
                    if !cap.get(side).and_then(Value::as_bool).unwrap_or(false) {
                        failures.push(format!(
                            "peer {} capability {} is not {}",
                            address, capability, side
                        ));
                    }
                }
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn peer_count_defaults_vrf() {
        let test = VerifyBgpPeerCount::from_inputs("T1", json!({"expected_peers": 2})).unwrap();
        assert!(test.validate_input().is_ok());
    }

    #[test]
    fn timers_validate_hold_range() {
        let test = VerifyBgpTimers::from_inputs(
            "T1",
            json!({"peers": ["10.0.0.1"], "hold_time": 2, "keepalive_time": 1}),
        )
        .unwrap();
        assert!(test.validate_input().is_err());
    }

    #[test]
    fn specific_peers_require_at_least_one() {
        let test = VerifyBgpSpecificPeers::from_inputs("T1", json!({"peers": []})).unwrap();
        assert!(test.validate_input().is_err());
    }
}
