//! Page controller tying one coordinator to one windowed renderer.
//!
//! `handle_event` is synchronous and returns a [`FeedAction`]; loads are
//! started by `run`, which keeps at most one initial/refresh future and at
//! most one load-more future alive and polls them alongside the event channel.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use core_config::{Config, ConfigContext};
use core_events::{DisplayMode, Event, EventHooks, NoopEventHooks, ViewportMetrics};
use core_loader::{
    Coordinator, ErrorOrigin, Keyed, LoadOutcome, LoadPhase, PagedSource, ProximityTrigger,
    SentinelTrigger, TriggerGate,
};
use core_window::{Align, SurfaceSlot, WindowConfig, WindowRenderer};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, trace};

use crate::pager::GridPager;
use crate::present::{Presentation, present_grid, present_list};
use crate::signals::{ScrollSignals, SignalTracker};

type LoadFuture = Pin<Box<dyn Future<Output = LoadOutcome> + Send>>;

pub type FeedPresentation<S> = Presentation<<<S as PagedSource>::Item as Keyed>::Key>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedAction {
    None,
    LoadMore,
    Refresh,
    Retry,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    Initial,
    More,
    Refresh,
    Retry,
}

/// Host layout callback: the rendered height of a row.
pub trait RowMeasure<T>: Send {
    fn measure(&self, index: usize, item: &T) -> f64;
}

impl<T, F> RowMeasure<T> for F
where
    F: Fn(usize, &T) -> f64 + Send,
{
    fn measure(&self, index: usize, item: &T) -> f64 {
        self(index, item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedStats {
    pub events: u64,
    pub frames: u64,
    pub loads_started: u64,
    pub loaded: u64,
    pub failed: u64,
    pub discarded: u64,
    pub skipped: u64,
}

pub struct FeedView<S: PagedSource> {
    coordinator: Arc<Coordinator<S>>,
    renderer: WindowRenderer,
    config: Config,
    mode: DisplayMode,
    proximity: ProximityTrigger,
    sentinel: SentinelTrigger,
    gate: TriggerGate,
    signals: SignalTracker,
    pager: GridPager,
    measure: Option<Box<dyn RowMeasure<S::Item>>>,
    hooks: Box<dyn EventHooks>,
    seen_epoch: u64,
    last_frame: Option<FeedPresentation<S>>,
    stats: FeedStats,
}

impl<S: PagedSource + 'static> FeedView<S> {
    pub fn new(coordinator: Arc<Coordinator<S>>, slot: &SurfaceSlot, config: Config) -> Self {
        let window = WindowConfig {
            estimate_item_size: config.file.window.sanitized_estimate(),
            overscan: config.effective.overscan,
        };
        let snapshot = coordinator.snapshot();
        let renderer = WindowRenderer::configure(snapshot.items.len(), window, slot);
        let loader = &config.file.loader;
        let header = &config.file.header;
        Self {
            proximity: ProximityTrigger::new(config.effective.proximity_px),
            sentinel: SentinelTrigger::new(loader.sentinel_margin_px),
            gate: TriggerGate {
                pause_on_error: loader.pause_on_error,
            },
            signals: SignalTracker::new(header.collapse_offset_px, header.bottom_tolerance_px),
            pager: GridPager::new(coordinator.page_size()),
            coordinator,
            renderer,
            mode: DisplayMode::List,
            measure: None,
            hooks: Box::new(NoopEventHooks),
            seen_epoch: snapshot.epoch,
            last_frame: None,
            stats: FeedStats::default(),
            config,
        }
    }

    pub fn with_measure(mut self, measure: impl RowMeasure<S::Item> + 'static) -> Self {
        self.measure = Some(Box::new(measure));
        self
    }

    pub fn with_hooks(mut self, hooks: Box<dyn EventHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn coordinator(&self) -> &Arc<Coordinator<S>> {
        &self.coordinator
    }

    pub fn renderer(&self) -> &WindowRenderer {
        &self.renderer
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn signals(&self) -> ScrollSignals {
        self.signals.current()
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    pub fn last_frame(&self) -> Option<&FeedPresentation<S>> {
        self.last_frame.as_ref()
    }

    /// Resume at `index` once the first page that contains it has loaded.
    pub fn restore_once(&mut self, index: usize) {
        self.renderer.restore_once(index, Align::Start);
    }

    /// Bring the renderer in line with the coordinator's collection.
    pub fn sync_collection(&mut self) {
        let snapshot = self.coordinator.snapshot();
        let len = snapshot.items.len();
        if snapshot.epoch != self.seen_epoch {
            let replaced = self.seen_epoch != 0;
            self.seen_epoch = snapshot.epoch;
            self.renderer.reset(len);
            if replaced {
                self.renderer.scroll_to_index(0, Align::Start);
            }
            debug!(target: "feed.event", len, epoch = snapshot.epoch, "collection_replaced");
        } else {
            self.renderer.set_len(len);
        }
        self.renderer.sync();
    }

    pub fn handle_event(&mut self, event: &Event) -> FeedAction {
        self.stats.events += 1;
        self.sync_collection();
        trace!(target: "feed.event", kind = event.kind(), "event_received");
        match event {
            Event::Scrolled(reported) => {
                let metrics = self.renderer.metrics().unwrap_or(*reported);
                self.after_scroll(metrics)
            }
            Event::Wheel { delta } => {
                self.renderer.scroll_by(*delta);
                match self.renderer.metrics() {
                    Some(metrics) => self.after_scroll(metrics),
                    None => FeedAction::None,
                }
            }
            Event::Resized { viewport_height } => {
                let ctx = ConfigContext::from_viewport_height(*viewport_height);
                if let Some(effective) = self.config.recompute_with_context(ctx) {
                    self.renderer.set_overscan(effective.overscan);
                    self.proximity = ProximityTrigger::new(effective.proximity_px);
                    info!(
                        target: "feed.event",
                        overscan = effective.overscan,
                        proximity_px = effective.proximity_px,
                        "effective_settings_changed"
                    );
                }
                match self.renderer.metrics() {
                    Some(metrics) => self.after_scroll(metrics),
                    None => FeedAction::None,
                }
            }
            Event::Sentinel { top, height } => {
                if self.mode != DisplayMode::List {
                    return FeedAction::None;
                }
                let Some(metrics) = self.renderer.metrics() else {
                    return FeedAction::None;
                };
                if self.sentinel.should_fire(&metrics, *top, *height)
                    && self.gate.allows(&self.coordinator.status())
                {
                    FeedAction::LoadMore
                } else {
                    FeedAction::None
                }
            }
            Event::Measured { index, height } => {
                self.renderer.report_measured_size(*index, *height);
                FeedAction::None
            }
            Event::Refresh => FeedAction::Refresh,
            Event::Retry => FeedAction::Retry,
            Event::SetDisplayMode(mode) => {
                if *mode != self.mode {
                    info!(target: "feed.event", from = ?self.mode, to = ?mode, "display_mode_changed");
                    self.mode = *mode;
                }
                self.grid_wants_more()
            }
            Event::GridPage(page) => {
                self.pager.set_page(*page);
                self.grid_wants_more()
            }
            Event::Shutdown => FeedAction::Shutdown,
        }
    }

    fn after_scroll(&mut self, metrics: ViewportMetrics) -> FeedAction {
        if let Some(signals) = self.signals.observe(&metrics) {
            debug!(
                target: "feed.event",
                header_collapsed = signals.header_collapsed,
                at_bottom = signals.at_bottom,
                "scroll_signals_changed"
            );
        }
        if self.list_wants_more(&metrics) {
            FeedAction::LoadMore
        } else {
            FeedAction::None
        }
    }

    fn list_wants_more(&self, metrics: &ViewportMetrics) -> bool {
        self.mode == DisplayMode::List
            && self.proximity.should_fire(metrics)
            && self.gate.allows(&self.coordinator.status())
    }

    // Explicit page navigation is not held back by a displayed error.
    fn grid_wants_more(&self) -> FeedAction {
        if self.mode == DisplayMode::Grid
            && self.pager.needs_more(self.renderer.len())
            && self.coordinator.status().can_load_more()
        {
            FeedAction::LoadMore
        } else {
            FeedAction::None
        }
    }

    /// Record a finished load and decide whether the new content still
    /// leaves the trigger armed.
    fn settle(&mut self, outcome: &LoadOutcome) -> FeedAction {
        match outcome {
            LoadOutcome::Loaded { .. } => self.stats.loaded += 1,
            LoadOutcome::Failed(_) => self.stats.failed += 1,
            LoadOutcome::Discarded => self.stats.discarded += 1,
            LoadOutcome::Skipped(_) => self.stats.skipped += 1,
        }
        self.sync_collection();
        debug!(target: "feed.event", ?outcome, len = self.renderer.len(), "load_settled");
        if !matches!(outcome, LoadOutcome::Loaded { .. }) {
            return FeedAction::None;
        }
        match self.mode {
            DisplayMode::List => match self.renderer.metrics() {
                Some(metrics) if self.list_wants_more(&metrics) => FeedAction::LoadMore,
                _ => FeedAction::None,
            },
            DisplayMode::Grid => self.grid_wants_more(),
        }
    }

    /// Build the current presentation. In list mode, rows that have never
    /// been measured are measured through the host callback first.
    pub fn frame(&mut self) -> FeedPresentation<S> {
        self.stats.frames += 1;
        self.sync_collection();
        let status = self.coordinator.status();
        let items = self.coordinator.items();
        let frame = match self.mode {
            DisplayMode::List => {
                let mut window = self.renderer.virtual_items();
                if let Some(measure) = &self.measure {
                    let mut measured = false;
                    for v in &window {
                        if self.renderer.is_measured(v.index) {
                            continue;
                        }
                        if let Some(item) = items.get(v.index) {
                            let height = measure.measure(v.index, item);
                            self.renderer.report_measured_size(v.index, height);
                            measured = true;
                        }
                    }
                    if measured {
                        window = self.renderer.virtual_items();
                    }
                }
                present_list(&status, items.as_slice(), &window, self.renderer.total_height())
            }
            DisplayMode::Grid => {
                let total_pages = self.pager.total_pages(items.len());
                present_grid(
                    &status,
                    items.as_slice(),
                    self.pager.page(),
                    total_pages,
                    self.pager.slice(items.as_slice()),
                )
            }
        };
        self.last_frame = Some(frame.clone());
        frame
    }

    fn start(&mut self, kind: LoadKind) -> LoadFuture {
        self.stats.loads_started += 1;
        debug!(target: "feed.event", ?kind, "load_started");
        let c = self.coordinator.clone();
        match kind {
            LoadKind::Initial => Box::pin(async move { c.load_initial().await }),
            LoadKind::More => Box::pin(async move { c.load_more().await }),
            LoadKind::Refresh => Box::pin(async move { c.refresh().await }),
            LoadKind::Retry => Box::pin(async move { c.retry().await }),
        }
    }

    /// Drive the view from `rx` until `Shutdown` or until every sender is
    /// gone. Starts the initial load if nothing has been loaded yet.
    pub async fn run(&mut self, mut rx: Receiver<Event>) -> FeedStats {
        let mut initial: Option<LoadFuture> = None;
        let mut more: Option<LoadFuture> = None;

        let status = self.coordinator.status();
        if status.phase == LoadPhase::Idle && status.error.is_none() {
            initial = Some(self.start(LoadKind::Initial));
        }
        info!(target: "feed", mode = ?self.mode, "feed_loop_started");
        self.frame();

        loop {
            tokio::select! {
                biased;

                outcome = poll_slot(&mut initial), if initial.is_some() => {
                    initial = None;
                    if self.settle(&outcome) == FeedAction::LoadMore && more.is_none() {
                        more = Some(self.start(LoadKind::More));
                    }
                    self.frame();
                }
                outcome = poll_slot(&mut more), if more.is_some() => {
                    more = None;
                    if self.settle(&outcome) == FeedAction::LoadMore {
                        more = Some(self.start(LoadKind::More));
                    }
                    self.frame();
                }
                maybe = rx.recv() => {
                    let Some(event) = maybe else {
                        break;
                    };
                    self.hooks.pre_handle(&event);
                    match self.handle_event(&event) {
                        FeedAction::None => {}
                        FeedAction::Shutdown => {
                            self.hooks.post_handle(&event);
                            break;
                        }
                        FeedAction::LoadMore => {
                            if more.is_none() {
                                more = Some(self.start(LoadKind::More));
                            }
                        }
                        FeedAction::Refresh => initial = Some(self.start(LoadKind::Refresh)),
                        FeedAction::Retry => {
                            match self.coordinator.status().error.map(|e| e.origin) {
                                Some(ErrorOrigin::Initial) => {
                                    initial = Some(self.start(LoadKind::Retry));
                                }
                                Some(ErrorOrigin::More) if more.is_none() => {
                                    more = Some(self.start(LoadKind::Retry));
                                }
                                _ => {}
                            }
                        }
                    }
                    self.frame();
                    self.hooks.post_handle(&event);
                }
            }
        }

        info!(
            target: "feed",
            events = self.stats.events,
            loads = self.stats.loads_started,
            len = self.renderer.len(),
            "feed_loop_stopped"
        );
        self.stats
    }
}

async fn poll_slot(slot: &mut Option<LoadFuture>) -> LoadOutcome {
    match slot {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}
