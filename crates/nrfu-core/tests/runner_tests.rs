//! Runner invariants: result counts, concurrency bound, cancellation,
//! isolation, and pre-dispatch validation.

mod common;

use common::{established_client, MockTransport};
use nrfu_core::catalog::{Catalog, TestDefinition};
use nrfu_core::error::NrfuError;
use nrfu_core::registry::TestRegistry;
use nrfu_core::result::{TestResult, TestStatus};
use nrfu_core::runner::{RunObserver, Runner, RunnerConfig};
use nrfu_core::EapiClient;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn definition(name: &str, module: &str, inputs: serde_json::Value) -> TestDefinition {
    TestDefinition {
        name: name.to_string(),
        module: module.to_string(),
        categories: Vec::new(),
        tags: Vec::new(),
        inputs,
    }
}

/// Ten catalog entries that parse without declarative inputs.
fn wide_catalog() -> Catalog {
    Catalog::new(vec![
        definition("VerifyUptime", "system", json!({"minimum_uptime": 60})),
        definition("VerifyNtp", "system", json!(null)),
        definition("VerifyReloadCause", "system", json!(null)),
        definition("VerifyCpuUtilization", "system", json!(null)),
        definition("VerifyMemoryUtilization", "system", json!(null)),
        definition("VerifyInterfaceErrors", "interfaces", json!(null)),
        definition("VerifyInterfaceDiscards", "interfaces", json!(null)),
        definition("VerifyPortChannels", "interfaces", json!(null)),
        definition("VerifyBgpPeersHealth", "bgp", json!(null)),
        definition("VerifyStpBlockedPorts", "stp", json!(null)),
    ])
}

/// A fleet of clients sharing one scripted transport, so request counts
/// and the in-flight gauge are global across devices.
async fn fleet(
    count: usize,
    delay: Option<Duration>,
) -> (Vec<Arc<EapiClient>>, Arc<MockTransport>) {
    let transport = MockTransport::new();
    transport.respond_probe("DCS-7050SX");
    let mut clients = Vec::new();
    for i in 0..count {
        clients.push(established_client(&format!("leaf{}", i + 1), transport.clone()).await);
    }
    if let Some(delay) = delay {
        transport.set_delay(delay);
    }
    transport.reset_counters();
    (clients, transport)
}

#[tokio::test]
async fn every_pair_reports_exactly_once() {
    let registry = TestRegistry::builtin();
    let catalog = wide_catalog();
    let (clients, _) = fleet(3, None).await;

    let results = Runner::new()
        .run(CancellationToken::new(), &catalog, &registry, &clients)
        .await
        .unwrap();

    assert_eq!(results.len(), catalog.len() * clients.len());
    assert_eq!(results.statistics.total, results.len());
    for result in &results.results {
        assert_ne!(result.status, TestStatus::Unset);
    }

    // Each (test, device) pair appears exactly once
    for def in &catalog.tests {
        for client in &clients {
            let count = results
                .results
                .iter()
                .filter(|r| r.test == def.name && r.device == client.name())
                .count();
            assert_eq!(count, 1, "pair ({}, {})", def.name, client.name());
        }
    }
}

#[tokio::test]
async fn concurrency_cap_bounds_in_flight_requests() {
    let registry = TestRegistry::builtin();
    let catalog = wide_catalog();
    let (clients, transport) = fleet(5, Some(Duration::from_millis(20))).await;

    let runner = Runner::with_config(RunnerConfig { concurrency: 5 });
    let results = runner
        .run(CancellationToken::new(), &catalog, &registry, &clients)
        .await
        .unwrap();

    assert_eq!(results.len(), 50);
    let peak = transport.peak_in_flight();
    assert!(peak <= 5, "observed {} simultaneous requests", peak);
}

#[tokio::test]
async fn cancellation_still_yields_a_result_per_pair() {
    let registry = TestRegistry::builtin();
    let catalog = wide_catalog();
    let (clients, _) = fleet(2, Some(Duration::from_millis(500))).await;

    let runner = Runner::with_config(RunnerConfig { concurrency: 2 });
    let ctx = CancellationToken::new();
    let cancel = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let results = runner
        .run(ctx, &catalog, &registry, &clients)
        .await
        .unwrap();

    // Well under the per-request deadline once cancelled
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(results.len(), 20);
    let cancelled = results
        .results
        .iter()
        .filter(|r| r.status == TestStatus::Error && r.message.contains("cancelled"))
        .count();
    assert!(cancelled > 0, "expected at least one cancellation result");
}

#[tokio::test]
async fn device_failures_are_isolated() {
    let registry = TestRegistry::builtin();
    let catalog = Catalog::new(vec![definition(
        "VerifyNtp",
        "system",
        json!(null),
    )]);

    let healthy = MockTransport::new();
    healthy.respond_probe("DCS-7050SX");
    healthy.respond("show ntp status", json!({"status": "synchronised"}));
    let broken = MockTransport::new();
    broken.respond_probe("DCS-7050SX");

    let clients = vec![
        established_client("leaf1", healthy.clone()).await,
        established_client("leaf2", broken.clone()).await,
    ];
    broken.fail_transport(true);

    let results = Runner::new()
        .run(CancellationToken::new(), &catalog, &registry, &clients)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    let by_device = |device: &str| -> &TestResult {
        results
            .results
            .iter()
            .find(|r| r.device == device)
            .unwrap()
    };
    assert_eq!(by_device("leaf1").status, TestStatus::Success);
    assert_eq!(by_device("leaf2").status, TestStatus::Error);
}

#[tokio::test]
async fn bad_inputs_abort_before_dispatch() {
    let registry = TestRegistry::builtin();
    let catalog = Catalog::new(vec![definition(
        "VerifyUptime",
        "system",
        json!({"minimum_uptime": "soon"}),
    )]);
    let (clients, transport) = fleet(1, None).await;

    let err = Runner::new()
        .run(CancellationToken::new(), &catalog, &registry, &clients)
        .await
        .unwrap_err();
    assert!(matches!(err, NrfuError::BadInputs { .. }));
    // Nothing was dispatched
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn invalid_config_aborts_before_dispatch() {
    let registry = TestRegistry::builtin();
    let catalog = Catalog::new(vec![definition(
        "VerifyUptime",
        "system",
        json!({"minimum_uptime": 0}),
    )]);
    let (clients, _) = fleet(1, None).await;

    let err = Runner::new()
        .run(CancellationToken::new(), &catalog, &registry, &clients)
        .await
        .unwrap_err();
    assert!(matches!(err, NrfuError::InvalidConfig(_)));
}

#[tokio::test]
async fn unknown_module_aborts_the_run() {
    let registry = TestRegistry::builtin();
    let catalog = Catalog::new(vec![definition("VerifyUptime", "nosuch", json!(null))]);
    let (clients, _) = fleet(1, None).await;

    let err = Runner::new()
        .run(CancellationToken::new(), &catalog, &registry, &clients)
        .await
        .unwrap_err();
    assert!(matches!(err, NrfuError::UnknownModule(_)));
}

struct CountingObserver {
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl RunObserver for CountingObserver {
    fn unit_started(&self, _test: &str, _device: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn unit_completed(&self, _result: &TestResult) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn observer_sees_every_unit_without_altering_results() {
    let registry = TestRegistry::builtin();
    let catalog = wide_catalog();
    let (clients, _) = fleet(2, None).await;

    let observer = Arc::new(CountingObserver {
        started: AtomicUsize::new(0),
        completed: AtomicUsize::new(0),
    });

    let results = Runner::new()
        .run_with_observer(
            CancellationToken::new(),
            &catalog,
            &registry,
            &clients,
            Some(observer.clone()),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 20);
    assert_eq!(observer.started.load(Ordering::SeqCst), 20);
    assert_eq!(observer.completed.load(Ordering::SeqCst), 20);
}
