//! Built-in NRFU checks, grouped by registry module.
//!
//! Every check follows the same shape: parse declarative inputs into a
//! typed struct at construction, issue one to three read-only commands,
//! walk the response tree, and accumulate per-item failure strings into a
//! single list. An empty list concludes as Success, anything else as
//! Failure; wire and parse faults become Error results; the platform gate
//! is the only producer of Skipped.

pub mod bgp;
pub mod hardware;
pub mod interfaces;
pub mod mlag;
pub mod ospf;
pub mod routing;
pub mod security;
pub mod stp;
pub mod system;
pub mod vlan;

use crate::client::EapiClient;
use crate::error::NrfuError;
use crate::platform;
use crate::registry::TestRegistry;
use crate::result::TestResult;
use crate::test_contract::TestMeta;
use std::time::Instant;

/// Register every built-in check. Called once from
/// `TestRegistry::builtin`.
pub fn register_builtin(registry: &TestRegistry) -> Result<(), NrfuError> {
    system::register(registry)?;
    interfaces::register(registry)?;
    bgp::register(registry)?;
    hardware::register(registry)?;
    mlag::register(registry)?;
    stp::register(registry)?;
    vlan::register(registry)?;
    ospf::register(registry)?;
    routing::register(registry)?;
    security::register(registry)?;
    Ok(())
}

/// Conclude a check from its accumulated failures.
pub(crate) fn conclude(
    meta: &TestMeta,
    device: &str,
    started: Instant,
    failures: Vec<String>,
) -> TestResult {
    if failures.is_empty() {
        TestResult::success(&meta.name, device, &meta.categories, started.elapsed())
    } else {
        TestResult::failure(
            &meta.name,
            device,
            &meta.categories,
            failures.join("; "),
            started.elapsed(),
        )
    }
}

/// Convert an infrastructure fault into an Error result.
pub(crate) fn error_result(
    meta: &TestMeta,
    device: &str,
    started: Instant,
    err: NrfuError,
) -> TestResult {
    TestResult::error(
        &meta.name,
        device,
        &meta.categories,
        err.to_string(),
        started.elapsed(),
    )
}

/// Skip when the device is a virtual platform.
pub(crate) fn skip_if_virtual(
    meta: &TestMeta,
    client: &EapiClient,
    reason: &str,
    started: Instant,
) -> Option<TestResult> {
    let model = client.model().unwrap_or_default();
    platform::virtual_skip(&model, reason).map(|message| {
        TestResult::skipped(
            &meta.name,
            client.name(),
            &meta.categories,
            message,
            started.elapsed(),
        )
    })
}

/// Skip when the device model matches a check-specific skip list.
pub(crate) fn skip_if_platform(
    meta: &TestMeta,
    client: &EapiClient,
    skip_models: &[&str],
    reason: &str,
    started: Instant,
) -> Option<TestResult> {
    let model = client.model().unwrap_or_default();
    platform::platform_skip(&model, skip_models, reason).map(|message| {
        TestResult::skipped(
            &meta.name,
            client.name(),
            &meta.categories,
            message,
            started.elapsed(),
        )
    })
}
