//! MLAG checks.

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
    registry.register("mlag", "VerifyMlagStatus", VerifyMlagStatus::from_inputs)?;
    registry.register("mlag", "VerifyMlagInterfaces", VerifyMlagInterfaces::from_inputs)?;
    Ok(())
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MlagStatusInputs {}

/// The MLAG domain is active with a connected peer over a healthy
/// peer-link.
pub struct VerifyMlagStatus {
    meta: TestMeta,
    #[allow(dead_code)]
    inputs: MlagStatusInputs,
}

impl VerifyMlagStatus {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "MLAG domain is healthy", &["mlag"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyMlagStatus {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client.execute(&Command::new("show mlag")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let state = match response::lookup_str(&output, "state") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        if state != "active" {
            failures.push(format!("MLAG state is '{}', expected 'active'", state));
        } else {
            for (field, expected) in [
                ("negStatus", "connected"),
                ("localIntfStatus", "up"),
                ("peerLinkStatus", "up"),
            ] {
                let value = output.get(field).and_then(Value::as_str).unwrap_or("unknown");
                if value != expected {
                    failures.push(format!("{} is '{}', expected '{}'", field, value, expected));
                }
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MlagInterfacesInputs {}

/// No MLAG interface is inactive or only partially active.
pub struct VerifyMlagInterfaces {
    meta: TestMeta,
    #[allow(dead_code)]
    inputs: MlagInterfacesInputs,
}

impl VerifyMlagInterfaces {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "MLAG interfaces are fully active", &["mlag"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyMlagInterfaces {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client.execute(&Command::new("show mlag detail")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let ports = match response::lookup(&output, "mlagPorts") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for bucket in ["Inactive", "Active-partial"] {
            let count = ports.get(bucket).and_then(Value::as_u64).unwrap_or(0);
            if count > 0 {
                failures.push(format!("{} MLAG ports are {}", count, bucket));
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}
