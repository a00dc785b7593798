//! OSPF checks.

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
    registry.register(
        "ospf",
        "VerifyOspfNeighborState",
        VerifyOspfNeighborState::from_inputs,
    )?;
    registry.register(
        "ospf",
        "VerifyOspfNeighborCount",
        VerifyOspfNeighborCount::from_inputs,
    )?;
    Ok(())
}

/// Walk every OSPF instance and collect (neighbor, state) pairs.
fn neighbor_states(output: &Value) -> Result<Vec<(String, String)>, NrfuError> {
    let vrfs = response::lookup_object(output, "vrfs")?;
    let mut neighbors = Vec::new();
    for vrf in vrfs.values() {
        let Some(instances) = vrf.get("instList").and_then(Value::as_object) else {
            continue;
        };
        for instance in instances.values() {
            let Some(entries) = instance
                .get("ospfNeighborEntries")
                .and_then(Value::as_array)
            else {
                continue;
            };
            for entry in entries {
                let router = entry
                    .get("routerId")
                    .and_then(Value::as_str)
                    .unwrap_or("?")
                    .to_string();
                let state = entry
                    .get("adjacencyState")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                neighbors.push((router, state));
            }
        }
    }
    Ok(neighbors)
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct NeighborStateInputs {}

/// Every OSPF adjacency is full.
pub struct VerifyOspfNeighborState {
    meta: TestMeta,
    #[allow(dead_code)]
    inputs: NeighborStateInputs,
}

impl VerifyOspfNeighborState {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "OSPF adjacencies are full", &["ospf"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyOspfNeighborState {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client.execute(&Command::new("show ip ospf neighbor")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let neighbors = match neighbor_states(&output) {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for (router, state) in neighbors {
            if !state.eq_ignore_ascii_case("full") {
                failures.push(format!("neighbor {} is '{}', expected 'full'", router, state));
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NeighborCountInputs {
    /// Exact number of full adjacencies expected
    #[serde(deserialize_with = "inputs::lenient_u64")]
    number: u64,
}

/// The device has exactly the expected number of full adjacencies.
pub struct VerifyOspfNeighborCount {
    meta: TestMeta,
    inputs: NeighborCountInputs,
}

impl VerifyOspfNeighborCount {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "OSPF full adjacency count matches", &["ospf"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyOspfNeighborCount {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client.execute(&Command::new("show ip ospf neighbor")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let neighbors = match neighbor_states(&output) {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let full = neighbors
            .iter()
            .filter(|(_, state)| state.eq_ignore_ascii_case("full"))
            .count() as u64;

        let mut failures = Vec::new();
        if full != self.inputs.number {
            failures.push(format!(
                "device has {} full OSPF adjacencies, expected {}",
                full, self.inputs.number
            ));
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}
