//! System-level checks: uptime, NTP, reload cause, CPU and memory load.

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
    registry.register("system", "VerifyUptime", VerifyUptime::from_inputs)?;
    registry.register("system", "VerifyNtp", VerifyNtp::from_inputs)?;
    registry.register("system", "VerifyReloadCause", VerifyReloadCause::from_inputs)?;
    registry.register("system", "VerifyCpuUtilization", VerifyCpuUtilization::from_inputs)?;
    registry.register(
        "system",
        "VerifyMemoryUtilization",
        VerifyMemoryUtilization::from_inputs,
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UptimeInputs {
    /// Required uptime floor in seconds
    #[serde(deserialize_with = "inputs::lenient_u64")]
    minimum_uptime: u64,
}

/// Device uptime is above a configured floor.
pub struct VerifyUptime {
    meta: TestMeta,
    inputs: UptimeInputs,
}

impl VerifyUptime {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Device uptime is above the configured floor", &["system"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyUptime {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if self.inputs.minimum_uptime == 0 {
            return Err(NrfuError::InvalidConfig(
                "minimum_uptime must be positive".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client.execute(&Command::new("show version")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let uptime = match response::lookup_f64(&output, "uptime") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        if uptime < self.inputs.minimum_uptime as f64 {
            failures.push(format!(
                "device uptime {}s is below the required minimum {}s",
                uptime, self.inputs.minimum_uptime
            ));
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct NtpInputs {}

/// The NTP client is synchronised to a source.
pub struct VerifyNtp {
    meta: TestMeta,
    #[allow(dead_code)]
    inputs: NtpInputs,
}

impl VerifyNtp {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "NTP is synchronised", &["system"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyNtp {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client.execute(&Command::new("show ntp status")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let status = match response::lookup_str(&output, "status") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        if !status.eq_ignore_ascii_case("synchronised") {
            failures.push(format!(
                "NTP status is '{}', expected 'synchronised'",
                status
            ));
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

fn default_allowed_causes() -> Vec<String> {
    vec![
        "Reload requested by the user.".to_string(),
        "Reload requested after FPGA upgrade".to_string(),
    ]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReloadCauseInputs {
    /// Reload descriptions considered acceptable
    #[serde(default = "default_allowed_causes")]
    allowed_causes: Vec<String>,
}

/// The last reload was operator-initiated, not a crash.
pub struct VerifyReloadCause {
    meta: TestMeta,
    inputs: ReloadCauseInputs,
}

impl VerifyReloadCause {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Last reload cause is acceptable", &["system"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyReloadCause {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if self.inputs.allowed_causes.is_empty() {
            return Err(NrfuError::InvalidConfig(
                "allowed_causes must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        let output = match client.execute(&Command::new("show reload cause")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let causes = match response::lookup_array(&output, "resetCauses") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        // A device that never reloaded reports no causes; that passes.
        for cause in causes {
            let description = match response::lookup_str(cause, "description") {
                Ok(value) => value,
                Err(err) => return error_result(&self.meta, client.name(), started, err),
            };
            if !self.inputs.allowed_causes.iter().any(|c| c == description) {
                failures.push(format!("unexpected reload cause '{}'", description));
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

fn default_max_utilization() -> f64 {
    75.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CpuInputs {
    /// Maximum acceptable CPU utilization percentage
    #[serde(default = "default_max_utilization")]
    maximum_utilization: f64,
}

/// CPU utilization is under a threshold.
pub struct VerifyCpuUtilization {
    meta: TestMeta,
    inputs: CpuInputs,
}

impl VerifyCpuUtilization {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "CPU utilization is under the threshold", &["system"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyCpuUtilization {
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
        let output = match client
            .execute(&Command::new("show processes top once"))
            .await
        {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        // The idle gauge lives under a key with metacharacters, so the
        // dotted-path accessor stops one level above it.
        let cpu_info = match response::lookup(&output, "cpuInfo") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };
        let idle = match cpu_info
            .get("%Cpu(us)")
            .and_then(|v| v.get("idle"))
            .and_then(Value::as_f64)
        {
            Some(value) => value,
            None => {
                return error_result(
                    &self.meta,
                    client.name(),
                    started,
                    NrfuError::parse_error("cpuInfo.%Cpu(us).idle"),
                )
            }
        };

        let utilization = 100.0 - idle;
        let mut failures = Vec::new();
        if utilization > self.inputs.maximum_utilization {
            failures.push(format!(
                "CPU utilization {:.1}% exceeds the {:.1}% threshold",
                utilization, self.inputs.maximum_utilization
            ));
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MemoryInputs {
    /// Maximum acceptable memory utilization percentage
    #[serde(default = "default_max_utilization")]
    maximum_utilization: f64,
}

/// Memory utilization is under a threshold.
pub struct VerifyMemoryUtilization {
    meta: TestMeta,
    inputs: MemoryInputs,
}

impl VerifyMemoryUtilization {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Memory utilization is under the threshold", &["system"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyMemoryUtilization {
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
        let output = match client.execute(&Command::new("show version")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let total = match response::lookup_f64(&output, "memTotal") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };
        let free = match response::lookup_f64(&output, "memFree") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        if total <= 0.0 {
            return error_result(
                &self.meta,
                client.name(),
                started,
                NrfuError::parse_error("memTotal"),
            );
        }
        let utilization = (1.0 - free / total) * 100.0;
        if utilization > self.inputs.maximum_utilization {
            failures.push(format!(
                "memory utilization {:.1}% exceeds the {:.1}% threshold",
                utilization, self.inputs.maximum_utilization
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
    fn uptime_inputs_accept_both_numeric_forms() {
        assert!(VerifyUptime::from_inputs("T1", json!({"minimum_uptime": 60})).is_ok());
        assert!(VerifyUptime::from_inputs("T1", json!({"minimum_uptime": 60.0})).is_ok());
        assert!(VerifyUptime::from_inputs("T1", json!({})).is_err());
    }

    #[test]
    fn uptime_zero_floor_fails_validation() {
        let test = VerifyUptime::from_inputs("T1", json!({"minimum_uptime": 0})).unwrap();
        assert!(matches!(
            test.validate_input(),
            Err(NrfuError::InvalidConfig(_))
        ));
    }

    #[test]
    fn cpu_threshold_range_validated() {
        let test =
            VerifyCpuUtilization::from_inputs("T1", json!({"maximum_utilization": 140.0})).unwrap();
        assert!(test.validate_input().is_err());
        let test = VerifyCpuUtilization::from_inputs("T1", json!({})).unwrap();
        assert!(test.validate_input().is_ok());
    }

    #[test]
    fn unknown_input_fields_rejected() {
        let err = VerifyUptime::from_inputs("T1", json!({"minimum_uptime": 60, "bogus": 1}))
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, NrfuError::BadInputs { .. }));
    }
}
