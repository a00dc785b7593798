//! Platform gate: skip tests that cannot run on lab or container images.

/// Model substrings that identify virtual (container/lab) platforms.
pub const VIRTUAL_PLATFORMS: [&str; 4] = ["cEOSLab", "vEOS-lab", "cEOSCloudLab", "vEOS"];

/// Whether the hardware model string names a virtual platform.
pub fn is_virtual_platform(model: &str) -> bool {
    VIRTUAL_PLATFORMS
        .iter()
        .any(|platform| model.contains(platform))
}

/// Skip message when the model indicates a virtual platform.
///
/// Returns `None` when the test should proceed.
pub fn virtual_skip(model: &str, reason: &str) -> Option<String> {
    if is_virtual_platform(model) {
        Some(skip_message(reason, model))
    } else {
        None
    }
}

/// Skip message when the model matches a test-specific skip list
/// (tests needing hardware counters pass the model families they cannot
/// run on).
pub fn platform_skip(model: &str, skip_models: &[&str], reason: &str) -> Option<String> {
    if skip_models.iter().any(|skip| model.contains(skip)) {
        Some(skip_message(reason, model))
    } else {
        None
    }
}

fn skip_message(reason: &str, model: &str) -> String {
    format!("Test skipped: {} (platform: {})", reason, model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_platforms_match_by_substring() {
        assert!(is_virtual_platform("cEOSLab"));
        assert!(is_virtual_platform("vEOS-lab"));
        // "vEOS" matches "vEOS-something" builds too
        assert!(is_virtual_platform("vEOS-extended"));
        assert!(!is_virtual_platform("DCS-7050SX-64"));
    }

    #[test]
    fn virtual_skip_carries_model_and_reason() {
        let msg = virtual_skip("cEOSLab", "hardware sensors not modeled").unwrap();
        assert_eq!(
            msg,
            "Test skipped: hardware sensors not modeled (platform: cEOSLab)"
        );
        assert!(virtual_skip("DCS-7280SR", "hardware sensors not modeled").is_none());
    }

    #[test]
    fn per_test_skip_list() {
        let msg = platform_skip("DCS-7010T-48", &["7010T"], "no transceiver slots");
        assert!(msg.unwrap().contains("DCS-7010T-48"));
        assert!(platform_skip("DCS-7280SR", &["7010T"], "no transceiver slots").is_none());
    }

    #[test]
    fn gate_is_deterministic_for_matching_pairs() {
        for _ in 0..3 {
            assert!(virtual_skip("vEOS-lab", "x").is_some());
        }
    }
}
