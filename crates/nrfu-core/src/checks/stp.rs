//! Spanning-tree checks.

use super::{conclude, error_result};
use crate::client::EapiClient;
use crate::command::Command;
use crate::error::NrfuError;
use crate::inputs::parse_inputs;
use crate::registry::TestRegistry;
use crate::response;
use crate::result::TestResult;
use crate::test_contract::{NrfuTest, TestMeta};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;

pub fn register(registry: &TestRegistry) -> Result<(), NrfuError> {
    registry.register("stp", "VerifyStpMode", VerifyStpMode::from_inputs)?;
    registry.register("stp", "VerifyStpBlockedPorts", VerifyStpBlockedPorts::from_inputs)?;
    Ok(())
}

const STP_MODES: [&str; 3] = ["mstp", "rstp", "rapidPvst"];

// ---------------------------------------------------------------------------

fn default_stp_mode() -> String {
    "mstp".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StpModeInputs {
    /// Expected spanning-tree operating mode
    #[serde(default = "default_stp_mode")]
    mode: String,
}

/// The device runs the expected spanning-tree mode.
pub struct VerifyStpMode {
    meta: TestMeta,
    inputs: StpModeInputs,
}

impl VerifyStpMode {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Spanning-tree mode matches", &["stp"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyStpMode {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if !STP_MODES.contains(&self.inputs.mode.as_str()) {
            return Err(NrfuError::InvalidConfig(format!(
                "mode must be one of {:?}, got '{}'",
                STP_MODES, self.inputs.mode
            )));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client
            .execute(&Command::new("show spanning-tree summary"))
            .await
        {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mode = match response::lookup_str(&output, "spanningTreeMode") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        if mode != self.inputs.mode {
            failures.push(format!(
                "spanning-tree mode is '{}', expected '{}'",
                mode, self.inputs.mode
            ));
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BlockedPortsInputs {}

/// No spanning-tree instance has blocked ports.
pub struct VerifyStpBlockedPorts {
    meta: TestMeta,
    #[allow(dead_code)]
    inputs: BlockedPortsInputs,
}

impl VerifyStpBlockedPorts {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "No spanning-tree blocked ports", &["stp"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyStpBlockedPorts {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client
            .execute(&Command::new("show spanning-tree blockedports"))
            .await
        {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let instances = match response::lookup_object(&output, "spanningTreeInstances") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for (instance, data) in instances {
            let blocked: Vec<String> = data
                .get("spanningTreeBlockedPorts")
                .and_then(Value::as_array)
                .map(|ports| {
                    ports
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if !blocked.is_empty() {
                failures.push(format!(
                    "instance {} has blocked ports: {}",
                    instance,
                    blocked.join(", ")
                ));
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}
