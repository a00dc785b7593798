//! Navigation helpers for the untyped response trees returned by devices.
//!
//! Device output schemas drift across software versions, so responses stay
//! as `serde_json::Value` and tests walk them through a dotted-path
//! accessor that reports the exact failing path on a miss.

use crate::error::NrfuError;
use serde_json::{Map, Value};

/// Follow a dotted path (`"vrfs.default.peers"`) through a response tree.
///
/// Returns `ParseError` naming the first missing segment.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Result<&'a Value, NrfuError> {
    let mut current = value;
    let mut walked = String::new();

    for segment in path.split('.') {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);

        current = current
            .get(segment)
            .ok_or_else(|| NrfuError::parse_error(walked.clone()))?;
    }

    Ok(current)
}

/// String at `path`.
pub fn lookup_str<'a>(value: &'a Value, path: &str) -> Result<&'a str, NrfuError> {
    lookup(value, path)?
        .as_str()
        .ok_or_else(|| NrfuError::parse_error(path))
}

/// Float at `path`. Integer wire forms are accepted and widened.
pub fn lookup_f64(value: &Value, path: &str) -> Result<f64, NrfuError> {
    lookup(value, path)?
        .as_f64()
        .ok_or_else(|| NrfuError::parse_error(path))
}

/// Unsigned integer at `path`. Floats with a zero fraction are accepted;
/// devices report some counters either way depending on version.
pub fn lookup_u64(value: &Value, path: &str) -> Result<u64, NrfuError> {
    let v = lookup(value, path)?;
    if let Some(n) = v.as_u64() {
        return Ok(n);
    }
    if let Some(f) = v.as_f64() {
        if f >= 0.0 && f.fract() == 0.0 {
            return Ok(f as u64);
        }
    }
    Err(NrfuError::parse_error(path))
}

/// Boolean at `path`.
pub fn lookup_bool(value: &Value, path: &str) -> Result<bool, NrfuError> {
    lookup(value, path)?
        .as_bool()
        .ok_or_else(|| NrfuError::parse_error(path))
}

/// Object at `path`.
pub fn lookup_object<'a>(
    value: &'a Value,
    path: &str,
) -> Result<&'a Map<String, Value>, NrfuError> {
    lookup(value, path)?
        .as_object()
        .ok_or_else(|| NrfuError::parse_error(path))
}

/// Array at `path`.
pub fn lookup_array<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>, NrfuError> {
    lookup(value, path)?
        .as_array()
        .ok_or_else(|| NrfuError::parse_error(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Value {
        json!({
            "vrfs": {
                "default": {
                    "peers": {"10.0.0.1": {"peerState": "Established"}},
                    "peerCount": 3,
                    "asn": "65001",
                    "active": true,
                    "routes": []
                }
            },
            "uptime": 3600.0
        })
    }

    #[test]
    fn lookup_walks_nested_objects() {
        let v = tree();
        let peers = lookup_object(&v, "vrfs.default.peers").unwrap();
        assert!(peers.contains_key("10.0.0.1"));
        assert_eq!(
            lookup_str(peers.get("10.0.0.1").unwrap(), "peerState").unwrap(),
            "Established"
        );
    }

    #[test]
    fn missing_segment_reports_failing_path() {
        let v = tree();
        let err = lookup(&v, "vrfs.PROD.peerCount").unwrap_err();
        assert!(err.to_string().contains("vrfs.PROD"));
    }

    #[test]
    fn numeric_coercion() {
        let v = tree();
        // Float wire form read as u64
        assert_eq!(lookup_u64(&v, "uptime").unwrap(), 3600);
        // Integer wire form read as f64
        assert_eq!(lookup_f64(&v, "vrfs.default.peerCount").unwrap(), 3.0);
    }

    #[test]
    fn typed_mismatch_reports_path() {
        let v = tree();
        let err = lookup_u64(&v, "vrfs.default.asn").unwrap_err();
        assert!(matches!(err, NrfuError::ParseError { .. }));
        assert!(err.to_string().contains("vrfs.default.asn"));
    }

    #[test]
    fn bool_and_array_accessors() {
        let v = tree();
        assert!(lookup_bool(&v, "vrfs.default.active").unwrap());
        assert!(lookup_array(&v, "vrfs.default.routes").unwrap().is_empty());
    }
}
