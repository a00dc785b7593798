use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NrfuError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Connect error: failed to reach {host}: {message}")]
    ConnectError { host: String, message: String },

    #[error("Device {0} is not connected")]
    NotConnected(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("RPC error {code}: {message}")]
    RpcError { code: i64, message: String },

    #[error("Parse error: missing or invalid field at '{path}'")]
    ParseError { path: String },

    #[error("Bad inputs for test {test}: {message}")]
    BadInputs { test: String, message: String },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Duplicate test registration: {module}.{name}")]
    DuplicateTest { module: String, name: String },

    #[error("Invalid registry key: {0}")]
    InvalidKey(String),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Unknown test: {module}.{name}")]
    UnknownTest { module: String, name: String },

    #[error("Catalog error: {0}")]
    CatalogError(String),

    #[error("Command template error: {0}")]
    TemplateError(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Logger error: {0}")]
    LogError(String),
}

// Helper methods for error context
impl NrfuError {
    pub fn connect_error(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectError {
            host: host.into(),
            message: message.into(),
        }
    }

    pub fn rpc_error(code: i64, message: impl Into<String>) -> Self {
        Self::RpcError {
            code,
            message: message.into(),
        }
    }

    pub fn parse_error(path: impl Into<String>) -> Self {
        Self::ParseError { path: path.into() }
    }

    pub fn bad_inputs(test: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadInputs {
            test: test.into(),
            message: message.into(),
        }
    }

    pub fn unknown_test(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownTest {
            module: module.into(),
            name: name.into(),
        }
    }

    pub fn duplicate_test(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DuplicateTest {
            module: module.into(),
            name: name.into(),
        }
    }
}
