//! Generic routing-table checks.

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
    registry.register(
        "routing",
        "VerifyRoutingProtocolModel",
        VerifyRoutingProtocolModel::from_inputs,
    )?;
    registry.register(
        "routing",
        "VerifyRoutingTableEntry",
        VerifyRoutingTableEntry::from_inputs,
    )?;
    Ok(())
}

fn default_vrf() -> String {
    "default".to_string()
}

// ---------------------------------------------------------------------------

fn default_protocol_model() -> String {
    "multi-agent".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProtocolModelInputs {
    /// Expected routing protocol model
    #[serde(default = "default_protocol_model")]
    model: String,
}

/// The configured and operating routing protocol models both match.
pub struct VerifyRoutingProtocolModel {
    meta: TestMeta,
    inputs: ProtocolModelInputs,
}

impl VerifyRoutingProtocolModel {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Routing protocol model matches", &["routing"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyRoutingProtocolModel {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client.execute(&Command::new("show ip route summary")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let configured = match response::lookup_str(&output, "protoModelStatus.configuredProtoModel")
        {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };
        let operating = match response::lookup_str(&output, "protoModelStatus.operatingProtoModel")
        {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        if configured != self.inputs.model {
            failures.push(format!(
                "configured protocol model is '{}', expected '{}'",
                configured, self.inputs.model
            ));
        }
        if operating != self.inputs.model {
            failures.push(format!(
                "operating protocol model is '{}', expected '{}'",
                operating, self.inputs.model
            ));
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableEntryInputs {
    #[serde(default = "default_vrf")]
    vrf: String,
    /// Prefixes that must be present
    routes: Vec<String>,
    /// Acceptable next-hop addresses; empty accepts any next hop
    #[serde(default)]
    nexthops: Vec<String>,
}

/// Each route exists, is hardware-programmed, and points at an accepted
/// next hop.
pub struct VerifyRoutingTableEntry {
    meta: TestMeta,
    inputs: TableEntryInputs,
}

impl VerifyRoutingTableEntry {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Declared routes are installed", &["routing"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyRoutingTableEntry {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if self.inputs.routes.is_empty() {
            return Err(NrfuError::InvalidConfig("routes must not be empty".to_string()));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        // One lookup per declared prefix, batched into a single RPC
        let commands: Vec<Command> = self
            .inputs
            .routes
            .iter()
            .map(|route| {
                Command::new("show ip route vrf {vrf} {route}")
                    .with_param("vrf", &self.inputs.vrf)
                    .with_param("route", route)
            })
            .collect();

        let outputs = match client.execute_batch(&commands).await {
            Ok(results) => results,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for (route, result) in self.inputs.routes.iter().zip(&outputs) {
            let routes = match response::lookup_object(
                &result.output,
                &format!("vrfs.{}.routes", self.inputs.vrf),
            ) {
                Ok(value) => value,
                Err(err) => return error_result(&self.meta, client.name(), started, err),
            };

            let Some(entry) = routes.get(route) else {
                failures.push(format!(
                    "route {} not present in VRF {}",
                    route, self.inputs.vrf
                ));
                continue;
            };

            if !entry
                .get("hardwareProgrammed")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                failures.push(format!("route {} is not hardware-programmed", route));
            }

            if !self.inputs.nexthops.is_empty() {
                let vias = entry.get("vias").and_then(Value::as_array);
                let matched = vias
                    .map(|vias| {
                        vias.iter().any(|via| {
                            via.get("nexthopAddr")
                                .and_then(Value::as_str)
                                .map(|nh| self.inputs.nexthops.iter().any(|n| n == nh))
                                .unwrap_or(false)
                        })
                    })
                    .unwrap_or(false);
                if !matched {
                    failures.push(format!(
                        "route {} has no next hop in {:?}",
                        route, self.inputs.nexthops
                    ));
                }
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}
