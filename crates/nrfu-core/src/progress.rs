use crate::catalog::Catalog;
use crate::client::EapiClient;
use crate::error::NrfuError;
use crate::registry::TestRegistry;
use crate::result::{RunResults, RunStatistics, TestResult, TestStatus};
use crate::runner::{RunObserver, Runner};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Wraps the runner with interactive progress reporting: one bar per
/// device plus a global bar over all units. The result stream and the
/// concurrency contract are untouched.
pub struct ProgressRunner {
    runner: Runner,
}

struct ProgressObserver {
    multi: MultiProgress,
    global: ProgressBar,
    device_bars: HashMap<String, ProgressBar>,
    device_counts: Mutex<HashMap<String, RunStatistics>>,
}

impl ProgressObserver {
    fn new(devices: &[Arc<EapiClient>], total_units: u64) -> Self {
        let multi = MultiProgress::new();

        let global = multi.add(ProgressBar::new(total_units));
        global.set_style(bar_style("total"));

        let per_device = total_units / devices.len().max(1) as u64;
        let mut device_bars = HashMap::new();
        let mut device_counts = HashMap::new();
        for device in devices {
            let bar = multi.add(ProgressBar::new(per_device));
            bar.set_style(bar_style(device.name()));
            device_bars.insert(device.name().to_string(), bar);
            device_counts.insert(device.name().to_string(), RunStatistics::default());
        }

        Self {
            multi,
            global,
            device_bars,
            device_counts: Mutex::new(device_counts),
        }
    }

    fn finish(&self) {
        for bar in self.device_bars.values() {
            bar.finish();
        }
        self.global.finish();
        let _ = self.multi.clear();
    }

    fn print_summary(&self) {
        let counts = self.device_counts.lock();
        let mut devices: Vec<&String> = counts.keys().collect();
        devices.sort();

        println!();
        println!("Run summary:");
        for device in devices {
            let stats = counts[device];
            println!(
                "  {}: {} / {} / {} / {}",
                console::style(device).bold(),
                console::style(format!("{} passed", stats.success)).green(),
                console::style(format!("{} failed", stats.failure)).red(),
                console::style(format!("{} errored", stats.error)).red().bold(),
                console::style(format!("{} skipped", stats.skipped)).yellow(),
            );
        }
    }
}

impl RunObserver for ProgressObserver {
    fn unit_completed(&self, result: &TestResult) {
        self.global.inc(1);
        if let Some(bar) = self.device_bars.get(&result.device) {
            bar.inc(1);
        }

        let mut counts = self.device_counts.lock();
        if let Some(stats) = counts.get_mut(&result.device) {
            stats.total += 1;
            match result.status {
                TestStatus::Success => stats.success += 1,
                TestStatus::Failure => stats.failure += 1,
                TestStatus::Error => stats.error += 1,
                TestStatus::Skipped => stats.skipped += 1,
                TestStatus::Unset => {}
            }
        }
    }
}

fn bar_style(label: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} {:<16} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{elapsed}})",
            label
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

impl ProgressRunner {
    pub fn new(runner: Runner) -> Self {
        Self { runner }
    }

    /// Run the catalog with live progress bars and a final per-device
    /// summary.
    pub async fn run(
        &self,
        ctx: CancellationToken,
        catalog: &Catalog,
        registry: &TestRegistry,
        devices: &[Arc<EapiClient>],
    ) -> Result<RunResults, NrfuError> {
        let total_units = (catalog.len() * devices.len()) as u64;
        let observer = Arc::new(ProgressObserver::new(devices, total_units));

        let outcome = self
            .runner
            .run_with_observer(ctx, catalog, registry, devices, Some(observer.clone()))
            .await;

        observer.finish();
        if outcome.is_ok() {
            observer.print_summary();
        }
        outcome
    }
}
