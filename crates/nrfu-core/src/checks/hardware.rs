//! Hardware environment checks. None of these sensors exist on lab or
//! container images, so every check here goes through the virtual
//! platform gate first.

use super::{conclude, error_result, skip_if_virtual};
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
        "hardware",
        "VerifyTransceiversManufacturers",
        VerifyTransceiversManufacturers::from_inputs,
    )?;
    registry.register("hardware", "VerifyTemperature", VerifyTemperature::from_inputs)?;
    registry.register(
        "hardware",
        "VerifyTransceiversTemperature",
        VerifyTransceiversTemperature::from_inputs,
    )?;
    registry.register(
        "hardware",
        "VerifyEnvironmentPower",
        VerifyEnvironmentPower::from_inputs,
    )?;
    registry.register(
        "hardware",
        "VerifyEnvironmentCooling",
        VerifyEnvironmentCooling::from_inputs,
    )?;
    Ok(())
}

fn default_ok_states() -> Vec<String> {
    vec!["ok".to_string()]
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManufacturersInputs {
    /// Approved transceiver vendors
    manufacturers: Vec<String>,
}

/// Every installed transceiver comes from an approved vendor.
pub struct VerifyTransceiversManufacturers {
    meta: TestMeta,
    inputs: ManufacturersInputs,
}

impl VerifyTransceiversManufacturers {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Transceiver vendors are approved", &["hardware"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyTransceiversManufacturers {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    fn validate_input(&self) -> Result<(), NrfuError> {
        if self.inputs.manufacturers.is_empty() {
            return Err(NrfuError::InvalidConfig(
                "manufacturers must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        if let Some(skip) = skip_if_virtual(
            &self.meta,
            client,
            "no transceivers on virtual platforms",
            started,
        ) {
            return skip;
        }

        let output = match client.execute(&Command::new("show inventory")).await {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let slots = match response::lookup_object(&output, "xcvrSlots") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for (slot, xcvr) in slots {
            let vendor = xcvr.get("mfgName").and_then(Value::as_str).unwrap_or("");
            if vendor.is_empty() {
                // Empty slot
                continue;
            }
            if !self.inputs.manufacturers.iter().any(|m| m == vendor) {
                failures.push(format!(
                    "transceiver in slot {} is from '{}', not an approved vendor",
                    slot, vendor
                ));
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TemperatureInputs {}

/// The overall temperature status is nominal.
pub struct VerifyTemperature {
    meta: TestMeta,
    #[allow(dead_code)]
    inputs: TemperatureInputs,
}

impl VerifyTemperature {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "System temperature is nominal", &["hardware"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyTemperature {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        if let Some(skip) = skip_if_virtual(
            &self.meta,
            client,
            "temperature sensors are not modeled on virtual platforms",
            started,
        ) {
            return skip;
        }

        let output = match client
            .execute(&Command::new("show system environment temperature"))
            .await
        {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let status = match response::lookup_str(&output, "systemStatus") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        if status != "temperatureOk" {
            failures.push(format!(
                "system temperature status is '{}', expected 'temperatureOk'",
                status
            ));
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TransceiverTempInputs {}

/// Every transceiver sensor reports ok with no alerts.
pub struct VerifyTransceiversTemperature {
    meta: TestMeta,
    #[allow(dead_code)]
    inputs: TransceiverTempInputs,
}

impl VerifyTransceiversTemperature {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Transceiver temperatures are nominal", &["hardware"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyTransceiversTemperature {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        if let Some(skip) = skip_if_virtual(
            &self.meta,
            client,
            "no transceivers on virtual platforms",
            started,
        ) {
            return skip;
        }

        let output = match client
            .execute(&Command::new(
                "show system environment temperature transceiver",
            ))
            .await
        {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let sensors = match response::lookup_array(&output, "tempSensors") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for sensor in sensors {
            let name = sensor.get("name").and_then(Value::as_str).unwrap_or("?");
            let hw_status = sensor
                .get("hwStatus")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let alerts = sensor
                .get("alertCount")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if hw_status != "ok" {
                failures.push(format!("sensor {} status is '{}'", name, hw_status));
            }
            if alerts > 0 {
                failures.push(format!("sensor {} raised {} alerts", name, alerts));
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PowerInputs {
    /// Power supply states considered healthy
    #[serde(default = "default_ok_states")]
    states: Vec<String>,
}

/// Every power supply is in an accepted state.
pub struct VerifyEnvironmentPower {
    meta: TestMeta,
    inputs: PowerInputs,
}

impl VerifyEnvironmentPower {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Power supplies are healthy", &["hardware"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyEnvironmentPower {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        if let Some(skip) = skip_if_virtual(
            &self.meta,
            client,
            "power supplies are not modeled on virtual platforms",
            started,
        ) {
            return skip;
        }

        let output = match client
            .execute(&Command::new("show system environment power"))
            .await
        {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let supplies = match response::lookup_object(&output, "powerSupplies") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for (id, supply) in supplies {
            let state = supply
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            if !self.inputs.states.iter().any(|s| s == state) {
                failures.push(format!("power supply {} is '{}'", id, state));
            }
        }
        conclude(&self.meta, client.name(), started, failures)
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CoolingInputs {
    /// Fan states considered healthy
    #[serde(default = "default_ok_states")]
    states: Vec<String>,
}

/// Every fan tray is in an accepted state.
pub struct VerifyEnvironmentCooling {
    meta: TestMeta,
    inputs: CoolingInputs,
}

impl VerifyEnvironmentCooling {
    pub fn from_inputs(name: &str, inputs: Value) -> Result<Box<dyn NrfuTest>, NrfuError> {
        Ok(Box::new(Self {
            meta: TestMeta::new(name, "Fan trays are healthy", &["hardware"]),
            inputs: parse_inputs(name, inputs)?,
        }))
    }
}

#[async_trait]
impl NrfuTest for VerifyEnvironmentCooling {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self, client: &EapiClient) -> TestResult {
        let started = Instant::now();
        if let Some(skip) = skip_if_virtual(
            &self.meta,
            client,
            "fan trays are not modeled on virtual platforms",
            started,
        ) {
            return skip;
        }

        let output = match client
            .execute(&Command::new("show system environment cooling"))
            .await
        {
            Ok(result) => result.output,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let trays = match response::lookup_array(&output, "fanTraySlots") {
            Ok(value) => value,
            Err(err) => return error_result(&self.meta, client.name(), started, err),
        };

        let mut failures = Vec::new();
        for tray in trays {
            let label = tray.get("label").and_then(Value::as_str).unwrap_or("?");
            let status = tray
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            if !self.inputs.states.iter().any(|s| s == status) {
                failures.push(format!("fan tray {} is '{}'", label, status));
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
    fn manufacturers_must_be_listed() {
        let test =
            VerifyTransceiversManufacturers::from_inputs("T1", json!({"manufacturers": []}))
                .unwrap();
        assert!(test.validate_input().is_err());
    }

    #[test]
    fn power_states_default_to_ok() {
        assert!(VerifyEnvironmentPower::from_inputs("T1", json!(null)).is_ok());
    }
}
