//! Host event types, shared viewport metrics and telemetry counters for lazyfeed.
//!
//! This crate sits at the bottom of the workspace: the windowed renderer, the
//! load coordinator and the feed view all speak in terms of the types defined
//! here, so none of them need to depend on each other for plumbing.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

// -------------------------------------------------------------------------------------------------
// Channel Policy
// -------------------------------------------------------------------------------------------------
// The feed loop consumes a bounded mpsc channel sized by `EVENT_CHANNEL_CAP`. Scroll producers
// fire far more often than the loop can fetch pages, but every trigger funnels into a guarded
// `load_more`, so a full channel only delays position updates; it never duplicates a fetch.
// -------------------------------------------------------------------------------------------------
pub const EVENT_CHANNEL_CAP: usize = 1024;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Relaxed atomic counters. They are process-global so tests that assert on exact values should
// compare deltas between two snapshots rather than absolute numbers.
// -------------------------------------------------------------------------------------------------
pub static FETCHES_STARTED: AtomicU64 = AtomicU64::new(0);
pub static FETCH_FAILURES: AtomicU64 = AtomicU64::new(0);
pub static LOAD_MORE_SKIPPED: AtomicU64 = AtomicU64::new(0); // guarded no-ops (in flight / exhausted / not ready)
pub static STALE_DISCARDS: AtomicU64 = AtomicU64::new(0); // results dropped after a generation bump
pub static DUPLICATES_DROPPED: AtomicU64 = AtomicU64::new(0);
pub static MEASUREMENT_CLAMPS: AtomicU64 = AtomicU64::new(0); // negative / non-finite heights
pub static SCROLL_EVENTS: AtomicU64 = AtomicU64::new(0);
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct TelemetrySnapshot {
    pub fetches_started: u64,
    pub fetch_failures: u64,
    pub load_more_skipped: u64,
    pub stale_discards: u64,
    pub duplicates_dropped: u64,
    pub measurement_clamps: u64,
    pub scroll_events: u64,
    pub channel_send_failures: u64,
}

impl TelemetrySnapshot {
    pub fn capture() -> Self {
        use Ordering::Relaxed;
        Self {
            fetches_started: FETCHES_STARTED.load(Relaxed),
            fetch_failures: FETCH_FAILURES.load(Relaxed),
            load_more_skipped: LOAD_MORE_SKIPPED.load(Relaxed),
            stale_discards: STALE_DISCARDS.load(Relaxed),
            duplicates_dropped: DUPLICATES_DROPPED.load(Relaxed),
            measurement_clamps: MEASUREMENT_CLAMPS.load(Relaxed),
            scroll_events: SCROLL_EVENTS.load(Relaxed),
            channel_send_failures: CHANNEL_SEND_FAILURES.load(Relaxed),
        }
    }

    /// Counter growth between `earlier` and `self`.
    pub fn since(&self, earlier: &TelemetrySnapshot) -> TelemetrySnapshot {
        TelemetrySnapshot {
            fetches_started: self.fetches_started.saturating_sub(earlier.fetches_started),
            fetch_failures: self.fetch_failures.saturating_sub(earlier.fetch_failures),
            load_more_skipped: self
                .load_more_skipped
                .saturating_sub(earlier.load_more_skipped),
            stale_discards: self.stale_discards.saturating_sub(earlier.stale_discards),
            duplicates_dropped: self
                .duplicates_dropped
                .saturating_sub(earlier.duplicates_dropped),
            measurement_clamps: self
                .measurement_clamps
                .saturating_sub(earlier.measurement_clamps),
            scroll_events: self.scroll_events.saturating_sub(earlier.scroll_events),
            channel_send_failures: self
                .channel_send_failures
                .saturating_sub(earlier.channel_send_failures),
        }
    }
}

#[inline]
pub fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// -------------------------------------------------------------------------------------------------
// Viewport metrics
// -------------------------------------------------------------------------------------------------

/// Live geometry of a scroll surface, in pixels.
///
/// `content_height` is the full scrollable height; `scroll_offset` is the top
/// edge of the visible region measured from the top of the content.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct ViewportMetrics {
    pub scroll_offset: f64,
    pub viewport_height: f64,
    pub content_height: f64,
}

impl ViewportMetrics {
    pub fn new(scroll_offset: f64, viewport_height: f64, content_height: f64) -> Self {
        Self {
            scroll_offset,
            viewport_height,
            content_height,
        }
    }

    /// Largest reachable scroll offset (0 when the content fits).
    pub fn max_scroll_offset(&self) -> f64 {
        (self.content_height - self.viewport_height).max(0.0)
    }

    /// Pixels between the bottom edge of the viewport and the end of the content.
    pub fn distance_to_end(&self) -> f64 {
        (self.content_height - self.scroll_offset - self.viewport_height).max(0.0)
    }

    pub fn with_scroll_offset(mut self, offset: f64) -> Self {
        self.scroll_offset = offset;
        self
    }
}

// -------------------------------------------------------------------------------------------------
// Host events
// -------------------------------------------------------------------------------------------------

/// How the hosting page lays out the collection. Both modes share one data
/// layer; the choice only affects presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum DisplayMode {
    /// Virtualized single-column list.
    #[default]
    List,
    /// Plain numbered-page grid.
    Grid,
}

/// Top-level event enum consumed by the feed loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The surface scrolled (by the user or programmatically).
    Scrolled(ViewportMetrics),
    /// Wheel / keyboard scroll request expressed as a pixel delta.
    Wheel { delta: f64 },
    /// The viewport changed height.
    Resized { viewport_height: f64 },
    /// The trailing sentinel's visibility changed. `top` is the sentinel's
    /// offset within the content.
    Sentinel { top: f64, height: f64 },
    /// The host measured a rendered item.
    Measured { index: usize, height: f64 },
    Refresh,
    Retry,
    SetDisplayMode(DisplayMode),
    /// Jump to a numbered page in grid mode (1-based).
    GridPage(usize),
    Shutdown,
}

impl Event {
    /// Short stable name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Scrolled(_) => "scrolled",
            Event::Wheel { .. } => "wheel",
            Event::Resized { .. } => "resized",
            Event::Sentinel { .. } => "sentinel",
            Event::Measured { .. } => "measured",
            Event::Refresh => "refresh",
            Event::Retry => "retry",
            Event::SetDisplayMode(_) => "set_display_mode",
            Event::GridPage(_) => "grid_page",
            Event::Shutdown => "shutdown",
        }
    }
}

/// Optional hooks that observe events at the loop boundary. Must not block.
pub trait EventHooks: Send + Sync + 'static {
    fn pre_handle(&self, _event: &Event) {}
    fn post_handle(&self, _event: &Event) {}
}

/// Default no-op hooks implementation.
pub struct NoopEventHooks;

impl EventHooks for NoopEventHooks {}

/// Create the bounded channel the feed loop consumes.
pub fn event_channel() -> (Sender<Event>, Receiver<Event>) {
    mpsc::channel(EVENT_CHANNEL_CAP)
}

// -------------------------------------------------------------------------------------------------
// Async Event Sources
// -------------------------------------------------------------------------------------------------
// Producers that push events into the shared channel from their own task (scripted scrollers,
// resize watchers, timers). Each source stops when `tx.send(..).await` fails, i.e. when the loop
// has gone away.
// -------------------------------------------------------------------------------------------------

/// Trait implemented by any async event producer.
pub trait AsyncEventSource: Send + 'static {
    /// Stable identifier used in logs.
    fn name(&self) -> &'static str;
    /// Consume self and spawn the background task.
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()>;
}

/// Registry of event sources spawned together at startup.
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn AsyncEventSource>>,
}

impl Default for EventSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register<S: AsyncEventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Spawn all registered sources. Each source receives its own `Sender`
    /// clone; the registry is drained so a second call spawns nothing.
    pub fn spawn_all(&mut self, tx: &Sender<Event>) -> Vec<JoinHandle<()>> {
        let mut out = Vec::with_capacity(self.sources.len());
        for src in self.sources.drain(..) {
            let name = src.name();
            tracing::info!(target: "runtime.events", source = name, "spawning event source");
            out.push(src.spawn(tx.clone()));
        }
        out
    }
}

/// Replays a fixed list of events with a delay between each one, then stops.
pub struct ScriptedEventSource {
    events: Vec<Event>,
    interval: std::time::Duration,
}

impl ScriptedEventSource {
    pub fn new(events: Vec<Event>, interval: std::time::Duration) -> Self {
        Self { events, interval }
    }
}

impl AsyncEventSource for ScriptedEventSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let ScriptedEventSource { events, interval } = *self;
        tokio::spawn(async move {
            for ev in events {
                if !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
                if tx.send(ev).await.is_err() {
                    bump(&CHANNEL_SEND_FAILURES);
                    tracing::debug!(target: "runtime.events", "scripted_source_channel_closed");
                    break;
                }
            }
        })
    }
}
