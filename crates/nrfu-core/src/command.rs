use crate::error::NrfuError;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

lazy_static! {
    // {placeholder} tokens inside command templates
    static ref PLACEHOLDER_PATTERN: Regex = Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap();
}

/// Output encoding requested from the device for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Json,
    Text,
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Json => "json",
            ResponseFormat::Text => "text",
        }
    }
}

/// A command to run on a device.
///
/// The template may contain `{placeholder}` tokens which are substituted
/// from `params` when the command is expanded for the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command template, e.g. `show bgp summary vrf {vrf}`
    pub template: String,
    /// Placeholder substitutions
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Requested output format
    pub format: ResponseFormat,
    /// eAPI protocol version for this command
    pub version: u32,
    /// Optional command revision (newer schema for the same command)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
    /// Whether the client may serve this command from its cache
    pub use_cache: bool,
}

impl Command {
    /// Create a JSON-format command with no placeholders.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            params: HashMap::new(),
            format: ResponseFormat::Json,
            version: 1,
            revision: None,
            use_cache: true,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Expand the template into the literal command string for the wire.
    ///
    /// Fails if a `{placeholder}` token has no matching entry in `params`.
    pub fn expand(&self) -> Result<String, NrfuError> {
        let mut missing: Option<String> = None;
        let expanded = PLACEHOLDER_PATTERN
            .replace_all(&self.template, |caps: &regex::Captures| {
                let key = &caps[1];
                match self.params.get(key) {
                    Some(value) => value.clone(),
                    None => {
                        missing.get_or_insert_with(|| key.to_string());
                        String::new()
                    }
                }
            })
            .into_owned();

        match missing {
            Some(key) => Err(NrfuError::TemplateError(format!(
                "no value for placeholder '{{{}}}' in '{}'",
                key, self.template
            ))),
            None => Ok(expanded),
        }
    }
}

/// The outcome of running a single command on a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// The expanded command string this result belongs to
    pub command: String,
    /// Response tree from the wire (one element of the RPC `result` array)
    pub output: serde_json::Value,
    /// Error message if the command failed on the device
    pub error: Option<String>,
    /// Round-trip duration in milliseconds
    pub duration_ms: u64,
    /// Time the command completed
    pub timestamp: DateTime<Utc>,
    /// Whether this result was served from the client cache
    pub cached: bool,
}

impl CommandResult {
    pub fn new(command: String, output: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            command,
            output,
            error: None,
            duration_ms,
            timestamp: Utc::now(),
            cached: false,
        }
    }

    /// Clone of this result marked as a cache hit.
    pub fn as_cached(&self) -> Self {
        let mut clone = self.clone();
        clone.cached = true;
        clone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_without_placeholders() {
        let cmd = Command::new("show version");
        assert_eq!(cmd.expand().unwrap(), "show version");
    }

    #[test]
    fn expand_substitutes_params() {
        let cmd = Command::new("show bgp summary vrf {vrf}").with_param("vrf", "PROD");
        assert_eq!(cmd.expand().unwrap(), "show bgp summary vrf PROD");
    }

    #[test]
    fn expand_fails_on_missing_param() {
        let cmd = Command::new("show bgp summary vrf {vrf}");
        let err = cmd.expand().unwrap_err();
        assert!(matches!(err, NrfuError::TemplateError(_)));
        assert!(err.to_string().contains("vrf"));
    }

    #[test]
    fn cached_clone_keeps_output() {
        let result = CommandResult::new(
            "show version".to_string(),
            serde_json::json!({"uptime": 3600.0}),
            12,
        );
        let hit = result.as_cached();
        assert!(hit.cached);
        assert!(!result.cached);
        assert_eq!(hit.output, result.output);
    }
}
