use crate::catalog::Catalog;
use crate::client::EapiClient;
use crate::error::NrfuError;
use crate::registry::TestRegistry;
use crate::result::{RunResults, TestResult};
use crate::test_contract::NrfuTest;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

/// Default number of (test, device) units evaluated at once.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Configuration for a run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum number of simultaneously running units
    pub concurrency: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Hook fired from inside worker units as they progress. Implementations
/// must be cheap and non-blocking; they run on the worker's task.
pub trait RunObserver: Send + Sync {
    fn unit_started(&self, _test: &str, _device: &str) {}
    fn unit_completed(&self, _result: &TestResult) {}
}

/// Bounded concurrent executor over the (test × device) matrix.
///
/// Every pair yields exactly one result: predicate outcomes, transport
/// faults, cancellations and worker panics all land in the result stream
/// as their respective statuses. The runner does not open or close device
/// clients; they arrive established and are torn down by the caller.
pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config: RunnerConfig {
                concurrency: config.concurrency.max(1),
            },
        }
    }

    /// Run every catalog test against every device.
    pub async fn run(
        &self,
        ctx: CancellationToken,
        catalog: &Catalog,
        registry: &TestRegistry,
        devices: &[Arc<EapiClient>],
    ) -> Result<RunResults, NrfuError> {
        self.run_with_observer(ctx, catalog, registry, devices, None)
            .await
    }

    /// `run` with a per-unit observer (used by the progress runner).
    #[instrument(skip_all, fields(tests = catalog.len(), devices = devices.len()), level = "debug")]
    pub async fn run_with_observer(
        &self,
        ctx: CancellationToken,
        catalog: &Catalog,
        registry: &TestRegistry,
        devices: &[Arc<EapiClient>],
        observer: Option<Arc<dyn RunObserver>>,
    ) -> Result<RunResults, NrfuError> {
        catalog.validate()?;

        // Construct and validate every instance before dispatching
        // anything: malformed declarations abort the run up front.
        let mut instances: Vec<Arc<dyn NrfuTest>> = Vec::with_capacity(catalog.len());
        for def in &catalog.tests {
            let instance = registry.get(&def.module, &def.name, def.inputs.clone())?;
            instance.validate_input()?;
            instances.push(Arc::from(instance));
        }

        debug!(
            units = instances.len() * devices.len(),
            concurrency = self.config.concurrency,
            "dispatching run"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut units: Vec<(String, String, JoinHandle<TestResult>)> = Vec::new();

        for instance in &instances {
            for device in devices {
                let test = Arc::clone(instance);
                let client = Arc::clone(device);
                let semaphore = Arc::clone(&semaphore);
                let ctx = ctx.clone();
                let observer = observer.clone();
                let test_name = test.meta().name.clone();
                let device_name = client.name().to_string();

                let handle = tokio::spawn(async move {
                    let result = evaluate_unit(&ctx, &semaphore, &test, &client, &observer).await;
                    if let Some(obs) = &observer {
                        obs.unit_completed(&result);
                    }
                    result
                });

                units.push((test_name, device_name, handle));
            }
        }

        let mut results = RunResults::new();
        for (test_name, device_name, handle) in units {
            match handle.await {
                Ok(result) => results.add_result(result),
                Err(join_err) => {
                    // A panicked unit still owes the stream a row.
                    error!(
                        test = %test_name,
                        device = %device_name,
                        error = %join_err,
                        "test unit panicked"
                    );
                    let result = TestResult::error(
                        &test_name,
                        &device_name,
                        &[],
                        format!("test task panicked: {}", join_err),
                        Duration::ZERO,
                    );
                    if let Some(obs) = &observer {
                        obs.unit_completed(&result);
                    }
                    results.add_result(result);
                }
            }
        }

        results.complete();
        Ok(results)
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate one (test, device) pair under the concurrency gate,
/// abandoning with an Error result when the context is cancelled.
async fn evaluate_unit(
    ctx: &CancellationToken,
    semaphore: &Arc<Semaphore>,
    test: &Arc<dyn NrfuTest>,
    client: &Arc<EapiClient>,
    observer: &Option<Arc<dyn RunObserver>>,
) -> TestResult {
    let meta = test.meta();
    let started = Instant::now();

    let cancelled = |message: &str, elapsed: Duration| {
        TestResult::error(
            &meta.name,
            client.name(),
            &meta.categories,
            NrfuError::Cancelled(message.to_string()).to_string(),
            elapsed,
        )
    };

    let permit = tokio::select! {
        _ = ctx.cancelled() => {
            return cancelled("run cancelled before dispatch", started.elapsed());
        }
        permit = Arc::clone(semaphore).acquire_owned() => permit,
    };

    let _permit = match permit {
        Ok(permit) => permit,
        Err(_) => {
            return TestResult::error(
                &meta.name,
                client.name(),
                &meta.categories,
                "concurrency gate closed during dispatch".to_string(),
                started.elapsed(),
            )
        }
    };

    if let Some(obs) = observer {
        obs.unit_started(&meta.name, client.name());
    }

    tokio::select! {
        _ = ctx.cancelled() => cancelled("run cancelled during execution", started.elapsed()),
        result = test.execute(client) => result,
    }
}
