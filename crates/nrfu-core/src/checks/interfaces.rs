//! Interface checks: status, error/discard counters, utilization,
//! port-channels and storm control.

use super::{conclude, error_result, skip_if_platform};
use crate::client::EapiClient;
use crate::command::Command;
use crate::error::NrfuError;
use crate::registry::TestRegistry;
use crate::response;
use crate::result::TestResult;
use crate::test_contract::{NrfuTest, TestMeta};
use crate::inputs::parse_inputs;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;

pub fn register(registry: &TestRegistry) -> Result<(), NrfuError> {
    registry.register(
        "interfaces",
        "VerifyInterfacesStatus",
        VerifyInterfacesStatus::from_inputs,
    )?;
    registry.register(
        "interfaces",
        "VerifyInterfaceErrors",
        VerifyInterfaceErrors::from_inputs,
    )?;
    registry.register(
        "interfaces",
        "VerifyInterfaceDiscards",
        VerifyInterfaceDiscards::from_inputs,
    )?;
    registry.register(
        "interfaces",
        "VerifyInterfaceUtilization",
        VerifyInterfaceUtilization::from_inputs,
    )?;
    registry.register(
        "interfaces",
        "VerifyPortChannels",
        VerifyPortChannels::from_inputs,
    )?;
    registry.register(
        "interfaces",
        "VerifyStormControlDrops",
        VerifyStormControlDrops::from_inputs,
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InterfacesStatusInputs {
    /// Interfaces expected up/up
    interfaces: Vec<String>,
}

/// Every listed interface is administratively and operationally up.
pub struct VerifyInterfacesStatus {
    meta: TestMeta,
    inputs: InterfacesStatusInputs,
}

impl VerifyInterfacesStatus {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Listed interfaces are up/up", &["interfaces"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyInterfacesStatus {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if self.inputs.interfaces.is_empty() {
            return Err(NrfuError::InvalidConfig(
                "interfaces must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client
            .execute(&Command::new("show interfaces description"))
            .await
        {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let descriptions = match response::lookup_object(&output, "interfaceDescriptions") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for name in &self.inputs.interfaces {
            let Some(interface) = descriptions.get(name) else {
                failures.push(format!("interface {} not found", name));
                continue;
            };
            let status = interface
                .get("interfaceStatus")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let protocol = interface
                .get("lineProtocolStatus")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            if !status.eq_ignore_ascii_case("up") || !protocol.eq_ignore_ascii_case("up") {
                failures.push(format!(
                    "interface {} is {}/{}, expected up/up",
                    name, status, protocol
                ));
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct InterfaceErrorsInputs {
    /// Restrict the check to these interfaces; empty checks all of them
    #[serde(default)]
    interfaces: Vec<String>,
}

/// No interface reports error counters above zero.
///
/// Whether scoped to a list or checking every interface, failures feed a
/// single consolidated list.
pub struct VerifyInterfaceErrors {
    meta: TestMeta,
    inputs: InterfaceErrorsInputs,
}

impl VerifyInterfaceErrors {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Interface error counters are zero", &["interfaces"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyInterfaceErrors {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client
            .execute(&Command::new("show interfaces counters errors"))
            .await
        {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let counters = match response::lookup_object(&output, "interfaceErrorCounters") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for (name, fields) in counters {
            if !self.inputs.interfaces.is_empty() && !self.inputs.interfaces.contains(name) {
                continue;
            }
            let Some(fields) = fields.as_object() else {
                continue;
            };
            for (counter, value) in fields {
                if value.as_f64().unwrap_or(0.0) > 0.0 {
                    failures.push(format!("interface {} has {} {}", name, value, counter));
                }
            }
        }
        // Interfaces requested but absent from the counters table
        for name in &self.inputs.interfaces {
            if !counters.contains_key(name) {
                failures.push(format!("interface {} not found", name));
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct InterfaceDiscardsInputs {
    #[serde(default)]
    interfaces: Vec<String>,
}

/// No interface reports discarded packets.
pub struct VerifyInterfaceDiscards {
    meta: TestMeta,
    inputs: InterfaceDiscardsInputs,
}

impl VerifyInterfaceDiscards {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Interface discard counters are zero", &["interfaces"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyInterfaceDiscards {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client
            .execute(&Command::new("show interfaces counters discards"))
            .await
        {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let interfaces = match response::lookup_object(&output, "interfaces") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for (name, fields) in interfaces {
            if !self.inputs.interfaces.is_empty() && !self.inputs.interfaces.contains(name) {
                continue;
            }
            for counter in ["inDiscards", "outDiscards"] {
                let value = fields.get(counter).and_then(Value::as_f64).unwrap_or(0.0);
                if value > 0.0 {
                    failures.push(format!("interface {} has {} {}", name, value, counter));
                }
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

fn default_utilization_threshold() -> f64 {
    75.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UtilizationInputs {
    /// Maximum acceptable load as a percentage of interface bandwidth
    #[serde(default = "default_utilization_threshold")]
    maximum_utilization: f64,
}

/// Interface rate does not exceed a share of its bandwidth.
pub struct VerifyInterfaceUtilization {
    meta: TestMeta,
    inputs: UtilizationInputs,
}

impl VerifyInterfaceUtilization {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(
                name,
                "Interface utilization is under the threshold",
                &["interfaces"],
            ),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyInterfaceUtilization {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if !(0.0..=100.0).contains(&self.inputs.maximum_utilization) {
            return Err(NrfuError::InvalidConfig(
                "maximum_utilization must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let commands = [
            Command::new("show interfaces counters rates"),
            Command::new("show interfaces"),
        ];
        let outputs = match client.execute_batch(&commands).await {
            Ok(results) => results,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let rates = match response::lookup_object(&outputs[0].output, "interfaces") {
            Ok(value) => value.clone(),
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };
        let details = match response::lookup_object(&outputs[1].output, "interfaces") {
            Ok(value) => value.clone(),
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for (name, rate) in &rates {
            let bandwidth = details
                .get(name)
                .and_then(|d| d.get("bandwidth"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            if bandwidth <= 0.0 {
                // Unconnected or management interfaces report no bandwidth
                continue;
            }
            for direction in ["inBpsRate", "outBpsRate"] {
                let bps = rate.get(direction).and_then(Value::as_f64).unwrap_or(0.0);
                let utilization = bps / bandwidth * 100.0;
                if utilization > self.inputs.maximum_utilization {
                    failures.push(format!(
                        "interface {} {} utilization {:.1}% exceeds {:.1}%",
                        name, direction, utilization, self.inputs.maximum_utilization
                    ));
                }
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PortChannelsInputs {}

/// No port-channel has inactive member ports.
pub struct VerifyPortChannels {
    meta: TestMeta,
    #[allow(dead_code)]
    inputs: PortChannelsInputs,
}

impl VerifyPortChannels {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Port-channels have no inactive ports", &["interfaces"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyPortChannels {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client.execute(&Command::new("show port-channel")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let port_channels = match response::lookup_object(&output, "portChannels") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for (name, channel) in port_channels {
            if let Some(inactive) = channel.get("inactivePorts").and_then(Value::as_object) {
                if !inactive.is_empty() {
                    let ports: Vec<&str> = inactive.keys().map(String::as_str).collect();
                    failures.push(format!(
                        "port-channel {} has inactive ports: {}",
                        name,
                        ports.join(", ")
                    ));
                }
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StormControlInputs {}

/// No storm-control policer has dropped traffic.
///
/// Storm-control counters only exist on hardware forwarding paths, so lab
/// images are skipped.
pub struct VerifyStormControlDrops {
    meta: TestMeta,
    #[allow(dead_code)]
    inputs: StormControlInputs,
}

impl VerifyStormControlDrops {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Storm-control drop counters are zero", &["interfaces"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyStormControlDrops {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        if let Some(skip) = skip_if_platform(
            &self.meta,
            client,
            &["cEOSLab", "vEOS-lab"],
            "storm-control counters require hardware forwarding",
            started,
        ) {
            return skip;
        }

        let output = match client.execute(&Command::new("show storm-control")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let interfaces = match response::lookup_object(&output, "interfaces") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for (name, interface) in interfaces {
            let Some(traffic_types) = interface.get("trafficTypes").and_then(Value::as_object)
            else {
                continue;
            };
            for (traffic, stats) in traffic_types {
                let drops = stats.get("drop").and_then(Value::as_f64).unwrap_or(0.0);
                if drops > 0.0 {
                    failures.push(format!(
                        "interface {} dropped {} {} packets",
                        name, drops, traffic
                    ));
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
    fn interfaces_status_requires_a_list() {
        let test =
            VerifyInterfacesStatus::from_inputs("T1", json!({"interfaces": []})).unwrap();
        assert!(test.validate_input().is_err());
        assert!(VerifyInterfacesStatus::from_inputs("T1", json!({})).is_err());
    }

    #[test]
    fn error_check_defaults_to_all_interfaces() {
        let test = VerifyInterfaceErrors::from_inputs("T1", json!(null)).unwrap();
        assert!(test.validate_input().is_ok());
    }
}
