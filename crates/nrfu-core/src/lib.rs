pub mod cache;
pub mod catalog;
pub mod checks;
pub mod client;
pub mod command;
pub mod device;
pub mod error;
pub mod inputs;
pub mod logging;
pub mod platform;
pub mod progress;
pub mod registry;
pub mod response;
pub mod result;
pub mod runner;
pub mod test_contract;
pub mod transport;

// Re-export core types
pub use cache::{CommandCache, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
pub use catalog::{Catalog, TestDefinition};
pub use client::{connect_devices, EapiClient};
pub use command::{Command, CommandResult, ResponseFormat};
pub use device::{ConnectionState, DeviceConfig, DEFAULT_EAPI_PORT, DEFAULT_TIMEOUT};
pub use error::NrfuError;
pub use logging::init_logging;
pub use progress::ProgressRunner;
pub use registry::{TestFactory, TestRegistry};
pub use result::{RunResults, RunStatistics, TestResult, TestStatus};
pub use runner::{RunObserver, Runner, RunnerConfig, DEFAULT_CONCURRENCY};
pub use test_contract::{NrfuTest, TestMeta};
pub use transport::{EapiTransport, HttpTransport, REQUEST_DEADLINE};
