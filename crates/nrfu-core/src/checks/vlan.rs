//! VLAN checks.

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
        "vlan",
        "VerifyVlanInternalPolicy",
        VerifyVlanInternalPolicy::from_inputs,
    )?;
    Ok(())
}

const ALLOCATION_POLICIES: [&str; 2] = ["ascending", "descending"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VlanPolicyInputs {
    /// Expected allocation direction
    policy: String,
    /// First VLAN id of the internal range
    #[serde(deserialize_with = "inputs::lenient_u64")]
    start_vlan_id: u64,
    /// Last VLAN id of the internal range
    #[serde(deserialize_with = "inputs::lenient_u64")]
    end_vlan_id: u64,
}

/// The internal VLAN allocation policy and range match exactly.
pub struct VerifyVlanInternalPolicy {
    meta: TestMeta,
    inputs: VlanPolicyInputs,
}

impl VerifyVlanInternalPolicy {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Internal VLAN allocation policy matches", &["vlan"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyVlanInternalPolicy {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if !ALLOCATION_POLICIES.contains(&self.inputs.policy.as_str()) {
            return Err(NrfuError::InvalidConfig(format!(
                "policy must be one of {:?}, got '{}'",
                ALLOCATION_POLICIES, self.inputs.policy
            )));
        }
        if self.inputs.start_vlan_id > self.inputs.end_vlan_id {
            return Err(NrfuError::InvalidConfig(
                "start_vlan_id must not exceed end_vlan_id".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client
            .execute(&Command::new("show vlan internal allocation policy"))
            .await
        {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let policy = match response::lookup_str(&output, "policy") {
            Ok(value) => value.to_string(),
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };
        let start = match response::lookup_u64(&output, "startVlanId") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };
        let end = match response::lookup_u64(&output, "endVlanId") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        if policy != self.inputs.policy {
            failures.push(format!(
                "allocation policy is '{}', expected '{}'",
                policy, self.inputs.policy
            ));
        }
        if start != self.inputs.start_vlan_id {
            failures.push(format!(
                "internal range starts at {}, expected {}",
                start, self.inputs.start_vlan_id
            ));
        }
        if end != self.inputs.end_vlan_id {
            failures.push(format!(
                "internal range ends at {}, expected {}",
                end, self.inputs.end_vlan_id
            ));
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn policy_value_validated() {
        let test = VerifyVlanInternalPolicy::from_inputs(
            "T1",
            json!({"policy": "sideways", "start_vlan_id": 1006, "end_vlan_id": 4094}),
        )
        .unwrap();
        assert!(test.validate_input().is_err());
    }
}
