//! Management-plane security checks.

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
    registry.register("security", "VerifyApiHttpsSsl", VerifyApiHttpsSsl::from_inputs)?;
    registry.register("security", "VerifySshStatus", VerifySshStatus::from_inputs)?;
    Ok(())
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApiSslInputs {
    /// SSL profile the API server must use
    profile: String,
}

/// The eAPI HTTPS server runs with the declared, valid SSL profile.
pub struct VerifyApiHttpsSsl {
    meta: TestMeta,
    inputs: ApiSslInputs,
}

impl VerifyApiHttpsSsl {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "eAPI SSL profile is valid", &["security"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyApiHttpsSsl {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if self.inputs.profile.is_empty() {
            return Err(NrfuError::InvalidConfig("profile must not be empty".to_string()));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client
            .execute(&Command::new("show management api http-commands"))
            .await
        {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        match output.get("sslProfile") {
            None => failures.push("eAPI has no SSL profile configured".to_string()),
            Some(profile) => {
                let name = profile.get("name").and_then(Value::as_str).unwrap_or("");
                let state = profile
                    .get("state")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                if name != self.inputs.profile {
                    failures.push(format!(
                        "eAPI SSL profile is '{}', expected '{}'",
                        name, self.inputs.profile
                    ));
                }
                if state != "valid" {
                    failures.push(format!("SSL profile state is '{}', expected 'valid'", state));
                }
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

fn default_false() -> bool {
    false
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SshStatusInputs {
    /// Whether the SSH server should be enabled
    #[serde(default = "default_false")]
    enabled: bool,
}

/// The management SSH server matches the declared enablement.
pub struct VerifySshStatus {
    meta: TestMeta,
    inputs: SshStatusInputs,
}

impl VerifySshStatus {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "SSH server state matches", &["security"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifySshStatus {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client.execute(&Command::new("show management ssh")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let enabled = match response::lookup_bool(&output, "enabled") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        if enabled != self.inputs.enabled {
            failures.push(format!(
                "SSH server is {}, expected {}",
                if enabled { "enabled" } else { "disabled" },
                if self.inputs.enabled { "enabled" } else { "disabled" }
            ));
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}
