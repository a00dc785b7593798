use crate::client::EapiClient;
use crate::error::NrfuError;
use crate::result::TestResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Static metadata every test carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestMeta {
    /// Name this instance runs under (from the catalog entry)
    pub name: String,
    /// What the test asserts
    pub description: String,
    /// Report-grouping categories, copied into every result
    pub categories: Vec<String>,
}

impl TestMeta {
    pub fn new(name: impl Into<String>, description: impl Into<String>, categories: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Contract every runnable test satisfies.
///
/// Instances are constructed by a registry factory from declarative
/// inputs, optionally re-validated, then executed once per device.
/// `execute` never escapes an error: transport, RPC and parse faults are
/// converted into a result with status `Error` so one broken unit cannot
/// take down a run.
#[async_trait]
pub trait NrfuTest: Send + Sync {
    /// Metadata declared at construction time.
    fn meta(&self) -> &TestMeta;

    /// Secondary validation for constraints that only make sense after
    /// parsing (ranges, cross-field rules).
    fn validate_input(&self) -> Result<(), NrfuError> {
        Ok(())
    }

    /// Run the predicate against one device.
    async fn execute(&self, client: &EapiClient) -> TestResult;
}
