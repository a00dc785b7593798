use crate::device::DeviceConfig;
use crate::error::NrfuError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

/// Per-request deadline for an eAPI round trip. The caller's cancellation
/// context composes with this; the shorter of the two wins.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(15);

/// Seam between the device client and the wire.
///
/// The production implementation is [`HttpTransport`]; tests substitute a
/// scripted mock.
#[async_trait]
pub trait EapiTransport: Send + Sync {
    /// Send one JSON-RPC envelope and return the decoded response body.
    async fn call(&self, envelope: &Value) -> Result<Value, NrfuError>;
}

/// JSON-RPC 2.0 over HTTPS POST, the eAPI wire protocol.
///
/// Keep-alives are disabled: older device firmware mishandles pipelined
/// requests on a reused connection, so every call opens a fresh one. The
/// TLS floor is 1.0 with the legacy ECDHE/AES suites still offered by such
/// firmware; certificate verification is skipped only when the device
/// config says so.
pub struct HttpTransport {
    endpoint: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &DeviceConfig) -> Result<Self, NrfuError> {
        let client = reqwest::Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_0)
            .danger_accept_invalid_certs(config.insecure)
            .connect_timeout(config.timeout)
            .timeout(REQUEST_DEADLINE)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            endpoint: config.endpoint(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        })
    }
}

#[async_trait]
impl EapiTransport for HttpTransport {
    async fn call(&self, envelope: &Value) -> Result<Value, NrfuError> {
        trace!(endpoint = %self.endpoint, "sending eAPI request");

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(envelope)
            .send()
            .await
            .map_err(|e| NrfuError::TransportError(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NrfuError::TransportError(format!(
                "HTTP {} from {}",
                status, self.endpoint
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| NrfuError::TransportError(format!("invalid response body: {}", e)))?;

        debug!(endpoint = %self.endpoint, "eAPI response received");
        Ok(body)
    }
}
