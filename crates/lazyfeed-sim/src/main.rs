//! lazyfeed simulator: drives a synthetic catalog through a scripted scroll
//! session and prints a JSON report. Used to tune overscan and the load
//! threshold against different page sizes and latencies.
use anyhow::Result;
use clap::Parser;
use core_config::{ConfigContext, load_from};
use core_events::{
    EVENT_CHANNEL_CAP, Event, EventSourceRegistry, ScriptedEventSource, TelemetrySnapshot,
    ViewportMetrics,
};
use core_feed::{FeedStats, FeedView};
use core_loader::Coordinator;
use core_window::{HeadlessSurface, ScrollSurface, SurfaceSlot};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};
use tracing_appender::non_blocking::WorkerGuard;

mod synthetic;

use synthetic::{CatalogShape, SyntheticCatalog, SyntheticRow};

const LOG_FILE: &str = "lazyfeed.log";
const SOURCE_JOIN_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "lazyfeed-sim", version, about = "Scripted scroll session over a synthetic feed")]
struct Args {
    /// Configuration file path (overrides discovery of `lazyfeed.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Number of records the synthetic server holds.
    #[arg(long, default_value_t = 500)]
    items: u32,
    /// Page size; defaults to `loader.page_size` from the config.
    #[arg(long)]
    page_size: Option<usize>,
    /// Rows each later page repeats from the one before it.
    #[arg(long, default_value_t = 0)]
    overlap: u32,
    /// Page number whose first request fails.
    #[arg(long)]
    fail_at: Option<u32>,
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,
    /// Number of wheel events in the script.
    #[arg(long, default_value_t = 60)]
    steps: usize,
    /// Pixels scrolled per wheel event.
    #[arg(long, default_value_t = 400.0)]
    step_px: f64,
    #[arg(long, default_value_t = 16)]
    interval_ms: u64,
    #[arg(long, default_value_t = 800.0)]
    viewport: f64,
    /// Emit single-line JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,
}

#[derive(Debug, Clone)]
struct SimOptions {
    shape: CatalogShape,
    page_size: usize,
    steps: usize,
    step_px: f64,
    interval: Duration,
    viewport: f64,
}

#[derive(Debug, Serialize)]
struct StatsReport {
    events: u64,
    frames: u64,
    loads_started: u64,
    loaded: u64,
    failed: u64,
    discarded: u64,
    skipped: u64,
}

impl From<FeedStats> for StatsReport {
    fn from(s: FeedStats) -> Self {
        Self {
            events: s.events,
            frames: s.frames,
            loads_started: s.loads_started,
            loaded: s.loaded,
            failed: s.failed,
            discarded: s.discarded,
            skipped: s.skipped,
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    page_size: usize,
    overscan: usize,
    proximity_px: f64,
    requests: u64,
    len: usize,
    has_more: bool,
    total_height: f64,
    measured: usize,
    final_metrics: ViewportMetrics,
    stats: StatsReport,
    telemetry: TelemetrySnapshot,
}

fn configure_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let log_path = log_dir.join(LOG_FILE);
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }
    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(_) => Some(guard),
        // Another subscriber is already installed; dropping the guard stops the writer.
        Err(_) => None,
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

/// Wheel events with a retry every eighth step when a failure is scripted,
/// closed by `Shutdown`.
fn scroll_script(opts: &SimOptions) -> Vec<Event> {
    let mut events = Vec::with_capacity(opts.steps + opts.steps / 8 + 1);
    for step in 1..=opts.steps {
        events.push(Event::Wheel {
            delta: opts.step_px,
        });
        if opts.shape.fail_at.is_some() && step % 8 == 0 {
            events.push(Event::Retry);
        }
    }
    events.push(Event::Shutdown);
    events
}

async fn join_sources(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        match tokio::time::timeout(SOURCE_JOIN_TIMEOUT, handle).await {
            Ok(Ok(())) => trace!(target: "runtime.shutdown", "event_source_task_stopped"),
            Ok(Err(err)) if err.is_cancelled() => {
                trace!(target: "runtime.shutdown", "event_source_task_cancelled")
            }
            Ok(Err(err)) => error!(target: "runtime.shutdown", ?err, "event_source_task_error"),
            Err(_) => warn!(target: "runtime.shutdown", "event_source_task_timeout"),
        }
    }
}

async fn simulate(opts: &SimOptions, mut config: core_config::Config) -> Report {
    let before = TelemetrySnapshot::capture();
    let effective = config.apply_context(ConfigContext::from_viewport_height(opts.viewport));

    let coordinator = Arc::new(Coordinator::new(
        SyntheticCatalog::new(opts.shape.clone()),
        opts.page_size,
    ));
    let slot = SurfaceSlot::new();
    let surface = HeadlessSurface::new(opts.viewport, 0.0);
    slot.mount(surface.clone());

    let mut view = FeedView::new(coordinator.clone(), &slot, config)
        .with_measure(|_index: usize, row: &SyntheticRow| -> f64 { row.height });

    let (tx, rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAP);
    let mut registry = EventSourceRegistry::new();
    registry.register(ScriptedEventSource::new(scroll_script(opts), opts.interval));
    let handles = registry.spawn_all(&tx);
    drop(tx);

    info!(
        target: "runtime",
        items = opts.shape.items,
        page_size = opts.page_size,
        overscan = effective.overscan,
        proximity_px = effective.proximity_px,
        "simulation_started"
    );
    let stats = view.run(rx).await;
    join_sources(handles).await;

    let status = coordinator.status();
    let renderer = view.renderer();
    let measured = (0..renderer.len())
        .filter(|&i| renderer.is_measured(i))
        .count();
    Report {
        page_size: coordinator.page_size(),
        overscan: renderer.config().overscan,
        proximity_px: effective.proximity_px,
        requests: coordinator.source().requests(),
        len: status.len,
        has_more: status.has_more,
        total_height: renderer.total_height(),
        measured,
        final_metrics: surface.metrics(),
        stats: stats.into(),
        telemetry: TelemetrySnapshot::capture().since(&before),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = configure_logging(Path::new("."));
    install_panic_hook();
    info!(target: "runtime", "startup");

    let args = Args::parse();
    let config_override = args.config.is_some();
    let config = load_from(args.config.clone())?;
    let opts = SimOptions {
        shape: CatalogShape {
            items: args.items,
            overlap: args.overlap,
            fail_at: args.fail_at,
            latency: Duration::from_millis(args.latency_ms),
        },
        page_size: args
            .page_size
            .unwrap_or_else(|| config.file.loader.sanitized_page_size()),
        steps: args.steps,
        step_px: args.step_px,
        interval: Duration::from_millis(args.interval_ms),
        viewport: args.viewport,
    };
    info!(target: "runtime.startup", config_override, ?opts, "bootstrap_complete");

    let report = simulate(&opts, config).await;
    let json = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{json}");
    info!(target: "runtime.shutdown", len = report.len, "shutdown_complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn opts(shape: CatalogShape) -> SimOptions {
        SimOptions {
            shape,
            page_size: 20,
            steps: 30,
            step_px: 2_000.0,
            interval: Duration::ZERO,
            viewport: 600.0,
        }
    }

    #[test]
    fn script_interleaves_retries_only_when_failing() {
        let plain = scroll_script(&opts(CatalogShape::default()));
        assert_eq!(plain.len(), 31);
        assert!(!plain.contains(&Event::Retry));
        assert_eq!(plain.last(), Some(&Event::Shutdown));

        let failing = scroll_script(&opts(CatalogShape {
            fail_at: Some(2),
            ..CatalogShape::default()
        }));
        assert_eq!(failing.iter().filter(|e| **e == Event::Retry).count(), 3);
        assert_eq!(failing[8], Event::Retry);
    }

    #[tokio::test]
    async fn short_catalog_is_read_to_the_end() {
        let report = simulate(
            &opts(CatalogShape {
                items: 60,
                overlap: 3,
                ..CatalogShape::default()
            }),
            core_config::Config::default(),
        )
        .await;
        assert_eq!(report.len, 60);
        assert!(!report.has_more);
        assert_eq!(report.requests, 3);
        assert_eq!(report.stats.failed, 0);
        assert!(report.measured > 0);
        assert!(report.telemetry.duplicates_dropped >= 6);
    }

    #[tokio::test]
    async fn scripted_retry_recovers_from_a_failed_page() {
        let report = simulate(
            &opts(CatalogShape {
                items: 60,
                fail_at: Some(2),
                ..CatalogShape::default()
            }),
            core_config::Config::default(),
        )
        .await;
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.len, 60);
        assert!(!report.has_more);
    }

    #[test]
    fn report_serializes_counters() {
        let report = Report {
            page_size: 20,
            overscan: 5,
            proximity_px: 200.0,
            requests: 1,
            len: 20,
            has_more: true,
            total_height: 1280.0,
            measured: 0,
            final_metrics: ViewportMetrics::new(0.0, 640.0, 1280.0),
            stats: FeedStats::default().into(),
            telemetry: TelemetrySnapshot::default(),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["len"], 20);
        assert_eq!(value["stats"]["loaded"], 0);
        assert_eq!(value["final_metrics"]["content_height"], 1280.0);
    }
}
