use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Verdict of one (test, device) evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Result not yet produced. Illegal in a returned result.
    Unset,
    /// Every predicate held
    Success,
    /// A policy predicate was violated
    Failure,
    /// Test infrastructure fault (transport, RPC, parse, cancellation)
    Error,
    /// Not applicable on this platform
    Skipped,
}

/// Result of running one test against one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Test name from the catalog
    pub test: String,
    /// Device name from the inventory
    pub device: String,
    /// Final status; never `Unset` in a returned result
    pub status: TestStatus,
    /// Human-readable outcome message
    pub message: String,
    /// Categories copied from the test's metadata at construction time
    pub categories: Vec<String>,
    /// Wall-clock duration of the test invocation in milliseconds
    pub duration_ms: u64,
    /// Time the result was produced
    pub timestamp: DateTime<Utc>,
    /// Free-form details for reporters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl TestResult {
    fn build(
        test: &str,
        device: &str,
        status: TestStatus,
        message: String,
        categories: &[String],
        elapsed: Duration,
    ) -> Self {
        Self {
            test: test.to_string(),
            device: device.to_string(),
            status,
            message,
            categories: categories.to_vec(),
            duration_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
            details: None,
        }
    }

    pub fn success(test: &str, device: &str, categories: &[String], elapsed: Duration) -> Self {
        Self::build(
            test,
            device,
            TestStatus::Success,
            "all checks passed".to_string(),
            categories,
            elapsed,
        )
    }

    pub fn failure(
        test: &str,
        device: &str,
        categories: &[String],
        message: String,
        elapsed: Duration,
    ) -> Self {
        Self::build(test, device, TestStatus::Failure, message, categories, elapsed)
    }

    pub fn error(
        test: &str,
        device: &str,
        categories: &[String],
        message: String,
        elapsed: Duration,
    ) -> Self {
        Self::build(test, device, TestStatus::Error, message, categories, elapsed)
    }

    pub fn skipped(
        test: &str,
        device: &str,
        categories: &[String],
        message: String,
        elapsed: Duration,
    ) -> Self {
        Self::build(test, device, TestStatus::Skipped, message, categories, elapsed)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Summary counts over a result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub error: usize,
    pub skipped: usize,
}

impl RunStatistics {
    /// Single pass over a result slice.
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut stats = Self::default();
        for result in results {
            stats.count(result.status);
        }
        stats
    }

    fn count(&mut self, status: TestStatus) {
        self.total += 1;
        match status {
            TestStatus::Success => self.success += 1,
            TestStatus::Failure => self.failure += 1,
            TestStatus::Error => self.error += 1,
            TestStatus::Skipped => self.skipped += 1,
            TestStatus::Unset => {}
        }
    }
}

/// Container for all results of one run, in completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResults {
    /// Results in the order units reported
    pub results: Vec<TestResult>,
    /// Running summary counts
    pub statistics: RunStatistics,
    /// Time the run started
    pub start_time: DateTime<Utc>,
    /// Time the run ended
    pub end_time: DateTime<Utc>,
    /// Duration of the run in milliseconds
    pub duration_ms: u64,
}

impl RunResults {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            results: Vec::new(),
            statistics: RunStatistics::default(),
            start_time: now,
            end_time: now,
            duration_ms: 0,
        }
    }

    pub fn add_result(&mut self, result: TestResult) {
        self.statistics.count(result.status);
        self.results.push(result);
    }

    /// Stamp the end time once every unit has reported.
    pub fn complete(&mut self) {
        self.end_time = Utc::now();
        let duration = self.end_time.signed_duration_since(self.start_time);
        self.duration_ms = duration.num_milliseconds().max(0) as u64;
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results for one device.
    pub fn device_results(&self, device: &str) -> Vec<&TestResult> {
        self.results.iter().filter(|r| r.device == device).collect()
    }

    /// Results with a given status.
    pub fn filter_by_status(&self, status: TestStatus) -> Vec<&TestResult> {
        self.results.iter().filter(|r| r.status == status).collect()
    }
}

impl Default for RunResults {
    fn default() -> Self {
        Self::new()
    }
}
