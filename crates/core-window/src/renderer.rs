//! Windowed renderer: decides which items to materialize for the current
//! scroll position and keeps per-item heights as they get measured.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use core_events::{MEASUREMENT_CLAMPS, SCROLL_EVENTS, ViewportMetrics, bump};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::size_table::SizeTable;
use crate::surface::{Subscription, SurfaceRef, SurfaceSlot};

/// Fallback row height when the configured estimate is unusable.
pub const DEFAULT_ESTIMATE: f64 = 64.0;

/// Offsets closer than this are treated as the same position.
const SCROLL_EPSILON: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowConfig {
    /// Height assumed for rows that have not been measured yet.
    pub estimate_item_size: f64,
    /// Extra rows rendered beyond each edge of the viewport.
    pub overscan: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            estimate_item_size: DEFAULT_ESTIMATE,
            overscan: 5,
        }
    }
}

/// Half-open index range of items to materialize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
    /// Full virtual height of the collection.
    pub total_height: f64,
}

impl VisibleRange {
    pub fn empty(total_height: f64) -> Self {
        Self {
            start: 0,
            end: 0,
            total_height,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// One materialized row: where it sits and how tall it currently is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualItem {
    pub index: usize,
    pub start: f64,
    pub size: f64,
}

impl VirtualItem {
    pub fn end(&self) -> f64 {
        self.start + self.size
    }
}

/// Where the target item should land inside the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Start,
    Center,
    End,
    /// Leave the viewport alone if the item is fully visible, otherwise
    /// scroll the minimum distance.
    Auto,
}

struct Attached {
    surface: SurfaceRef,
    _subscription: Subscription,
}

pub struct WindowRenderer {
    config: WindowConfig,
    sizes: SizeTable,
    slot: watch::Receiver<Option<SurfaceRef>>,
    attached: Option<Attached>,
    scroll_epoch: Arc<AtomicU64>,
    seen_epoch: u64,
    /// Last geometry read from the surface. Its `content_height` is ignored;
    /// the size table is the source of truth for the virtual height.
    metrics: ViewportMetrics,
    cached: Option<VisibleRange>,
    published_height: Option<f64>,
    pending_restore: Option<(usize, Align)>,
    restore_used: bool,
}

impl WindowRenderer {
    /// Bind a renderer to a collection of `collection_len` items and to the
    /// (possibly not yet mounted) surface in `slot`.
    pub fn configure(collection_len: usize, config: WindowConfig, slot: &SurfaceSlot) -> Self {
        let config = sanitize(config);
        let mut rx = slot.watch();
        let current = rx.borrow_and_update().clone();
        let mut renderer = Self {
            config,
            sizes: SizeTable::with_len(config.estimate_item_size, collection_len),
            slot: rx,
            attached: None,
            scroll_epoch: Arc::new(AtomicU64::new(0)),
            seen_epoch: 0,
            metrics: ViewportMetrics::default(),
            cached: None,
            published_height: None,
            pending_restore: None,
            restore_used: false,
        };
        renderer.attach(current);
        debug!(
            target: "window",
            collection_len,
            estimate = config.estimate_item_size,
            overscan = config.overscan,
            "renderer_configured"
        );
        renderer
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn is_mounted(&self) -> bool {
        self.attached.is_some()
    }

    pub fn total_height(&self) -> f64 {
        self.sizes.total()
    }

    pub fn offset_of(&self, index: usize) -> f64 {
        self.sizes.offset_of(index)
    }

    pub fn item_size(&self, index: usize) -> f64 {
        self.sizes.get(index)
    }

    pub fn is_measured(&self, index: usize) -> bool {
        self.sizes.is_measured(index)
    }

    pub fn set_overscan(&mut self, overscan: usize) {
        if overscan != self.config.overscan {
            self.config.overscan = overscan;
            self.cached = None;
        }
    }

    /// The collection grew or shrank at the tail. Measurements for surviving
    /// indices are kept.
    pub fn set_len(&mut self, len: usize) {
        if len != self.sizes.len() {
            self.sizes.set_len(len);
            self.cached = None;
        }
    }

    /// The collection was replaced; every index may now hold a different item.
    pub fn reset(&mut self, len: usize) {
        self.sizes.reset(len);
        self.cached = None;
    }

    /// Pull in surface changes (mount / detach / scroll). Returns whether the
    /// visible range needs recomputing.
    pub fn sync(&mut self) -> bool {
        let mut changed = false;
        if self.slot.has_changed().unwrap_or(false) {
            let next = self.slot.borrow_and_update().clone();
            self.attach(next);
            changed = true;
        }
        if let Some(att) = &self.attached {
            let epoch = self.scroll_epoch.load(Ordering::Acquire);
            if epoch != self.seen_epoch {
                self.seen_epoch = epoch;
                self.metrics = att.surface.metrics();
                changed = true;
            }
        }
        if changed {
            self.cached = None;
        }
        self.publish_content_height();
        self.apply_pending_restore();
        changed
    }

    fn attach(&mut self, next: Option<SurfaceRef>) {
        // Dropping the old attachment releases its listener.
        self.attached = None;
        self.published_height = None;
        self.cached = None;
        let Some(surface) = next else {
            self.metrics = ViewportMetrics::default();
            info!(target: "window.surface", "renderer_detached");
            return;
        };
        let epoch = self.scroll_epoch.clone();
        let subscription = surface.on_scroll(Arc::new(move |_m: &ViewportMetrics| {
            epoch.fetch_add(1, Ordering::Release);
            bump(&SCROLL_EVENTS);
        }));
        self.metrics = surface.metrics();
        self.seen_epoch = self.scroll_epoch.load(Ordering::Acquire);
        info!(
            target: "window.surface",
            viewport_height = self.metrics.viewport_height,
            scroll_offset = self.metrics.scroll_offset,
            "renderer_attached"
        );
        self.attached = Some(Attached {
            surface,
            _subscription: subscription,
        });
        self.publish_content_height();
    }

    fn publish_content_height(&mut self) {
        let Some(att) = &self.attached else {
            return;
        };
        let total = self.sizes.total();
        if self.published_height != Some(total) {
            att.surface.set_content_height(total);
            self.published_height = Some(total);
        }
    }

    /// Current geometry with `content_height` set to the virtual height.
    pub fn metrics(&mut self) -> Option<ViewportMetrics> {
        self.sync();
        self.attached.as_ref()?;
        Some(ViewportMetrics {
            content_height: self.sizes.total(),
            ..self.metrics
        })
    }

    /// Items to materialize right now. Empty while no surface is mounted or
    /// the collection is empty.
    pub fn visible_range(&mut self) -> VisibleRange {
        self.sync();
        if let Some(range) = self.cached {
            return range;
        }
        let range = if self.attached.is_some() {
            self.compute_range(&self.metrics)
        } else {
            VisibleRange::empty(self.sizes.total())
        };
        trace!(
            target: "window",
            start = range.start,
            end = range.end,
            total = range.total_height,
            "range_recomputed"
        );
        self.cached = Some(range);
        range
    }

    /// Range for arbitrary geometry, independent of the mounted surface.
    pub fn compute_range(&self, metrics: &ViewportMetrics) -> VisibleRange {
        let total = self.sizes.total();
        let len = self.sizes.len();
        if len == 0 {
            return VisibleRange::empty(total);
        }
        let viewport = metrics.viewport_height.max(0.0);
        let max_offset = (total - viewport).max(0.0);
        let offset = if metrics.scroll_offset.is_finite() {
            metrics.scroll_offset.clamp(0.0, max_offset)
        } else {
            0.0
        };
        let first = self.sizes.index_at(offset).min(len - 1);
        let last = self.sizes.index_at(offset + viewport).min(len - 1).max(first);
        VisibleRange {
            start: first.saturating_sub(self.config.overscan),
            end: (last + 1 + self.config.overscan).min(len),
            total_height: total,
        }
    }

    pub fn virtual_items(&mut self) -> Vec<VirtualItem> {
        let mut out = Vec::new();
        self.for_each_visible(|item| out.push(item));
        out
    }

    pub fn for_each_visible(&mut self, mut f: impl FnMut(VirtualItem)) {
        let range = self.visible_range();
        let mut start = self.sizes.offset_of(range.start);
        for index in range.as_range() {
            let size = self.sizes.get(index);
            f(VirtualItem { index, start, size });
            start += size;
        }
    }

    /// Record the rendered height of `index`. Invalid heights fall back to
    /// the estimate. When the item sits wholly above the viewport the scroll
    /// offset is shifted by the size change so the visible content stays put;
    /// the applied shift is returned.
    pub fn report_measured_size(&mut self, index: usize, height: f64) -> f64 {
        self.sync();
        if index >= self.sizes.len() {
            trace!(target: "window.measure", index, len = self.sizes.len(), "measure_out_of_range");
            return 0.0;
        }
        let height = if height.is_finite() && height >= 0.0 {
            height
        } else {
            bump(&MEASUREMENT_CLAMPS);
            warn!(
                target: "window.measure",
                index,
                reported = %height,
                fallback = self.sizes.estimate(),
                "measurement_clamped"
            );
            self.sizes.estimate()
        };
        let old = self.sizes.get(index);
        let item_end = self.sizes.offset_of(index) + old;
        let delta = self.sizes.set(index, height);
        if delta == 0.0 {
            return 0.0;
        }
        self.cached = None;
        self.publish_content_height();

        let offset = self.metrics.scroll_offset;
        let Some(att) = &self.attached else {
            return 0.0;
        };
        if offset <= 0.0 || item_end > offset {
            return 0.0;
        }
        let anchored = (offset + delta).max(0.0);
        att.surface.scroll_to(anchored);
        self.metrics.scroll_offset = anchored;
        debug!(target: "window.measure", index, delta, offset = anchored, "scroll_anchored");
        anchored - offset
    }

    fn target_offset(&self, index: usize, align: Align) -> f64 {
        let start = self.sizes.offset_of(index);
        let size = self.sizes.get(index);
        let viewport = self.metrics.viewport_height.max(0.0);
        let max = (self.sizes.total() - viewport).max(0.0);
        let current = self.metrics.scroll_offset;
        let raw = match align {
            Align::Start => start,
            Align::End => start + size - viewport,
            Align::Center => start + size / 2.0 - viewport / 2.0,
            Align::Auto => {
                if start >= current && start + size <= current + viewport {
                    current
                } else if start < current {
                    start
                } else {
                    start + size - viewport
                }
            }
        };
        raw.clamp(0.0, max)
    }

    /// Bring `index` into view. Out-of-range indices are clamped to the last
    /// item. Returns the target offset, or `None` when there is no surface or
    /// nothing to scroll to. Repeating the call once the surface is already
    /// there issues no further scroll.
    pub fn scroll_to_index(&mut self, index: usize, align: Align) -> Option<f64> {
        self.sync();
        let surface = self.attached.as_ref()?.surface.clone();
        let len = self.sizes.len();
        if len == 0 {
            return None;
        }
        let index = index.min(len - 1);
        let target = self.target_offset(index, align);
        if (self.metrics.scroll_offset - target).abs() < SCROLL_EPSILON {
            trace!(target: "window.scroll", index, target, "scroll_settled");
            return Some(target);
        }
        surface.scroll_to(target);
        self.metrics.scroll_offset = target;
        self.cached = None;
        debug!(target: "window.scroll", index, ?align, target, "scroll_to_index");
        Some(target)
    }

    /// Scroll by a pixel delta, clamped to the content.
    pub fn scroll_by(&mut self, delta: f64) -> Option<f64> {
        self.sync();
        let surface = self.attached.as_ref()?.surface.clone();
        if !delta.is_finite() {
            return None;
        }
        let max = (self.sizes.total() - self.metrics.viewport_height.max(0.0)).max(0.0);
        let target = (self.metrics.scroll_offset + delta).clamp(0.0, max);
        if (self.metrics.scroll_offset - target).abs() < SCROLL_EPSILON {
            return Some(self.metrics.scroll_offset);
        }
        surface.scroll_to(target);
        self.metrics.scroll_offset = target;
        self.cached = None;
        Some(target)
    }

    /// Request a one-time jump to `index`, applied as soon as a surface is
    /// mounted and the collection holds that index. Later calls are ignored
    /// once a restore has been applied.
    pub fn restore_once(&mut self, index: usize, align: Align) {
        if self.restore_used {
            return;
        }
        self.pending_restore = Some((index, align));
        self.apply_pending_restore();
    }

    pub fn restore_pending(&self) -> bool {
        self.pending_restore.is_some()
    }

    fn apply_pending_restore(&mut self) {
        let Some((index, align)) = self.pending_restore else {
            return;
        };
        if self.attached.is_none() || index >= self.sizes.len() {
            return;
        }
        self.pending_restore = None;
        self.restore_used = true;
        info!(target: "window.scroll", index, "restore_applied");
        self.scroll_to_index(index, align);
    }
}

fn sanitize(mut config: WindowConfig) -> WindowConfig {
    if !(config.estimate_item_size.is_finite() && config.estimate_item_size > 0.0) {
        warn!(
            target: "window",
            estimate = config.estimate_item_size,
            fallback = DEFAULT_ESTIMATE,
            "estimate_invalid"
        );
        config.estimate_item_size = DEFAULT_ESTIMATE;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeadlessSurface;
    use crate::surface::ScrollSurface;
    use core_events::TelemetrySnapshot;
    use pretty_assertions::assert_eq;

    fn mounted(len: usize, viewport: f64) -> (WindowRenderer, Arc<HeadlessSurface>, SurfaceSlot) {
        let slot = SurfaceSlot::new();
        let surface = HeadlessSurface::new(viewport, 0.0);
        slot.mount(surface.clone());
        let r = WindowRenderer::configure(
            len,
            WindowConfig {
                estimate_item_size: 50.0,
                overscan: 2,
            },
            &slot,
        );
        (r, surface, slot)
    }

    #[test]
    fn no_surface_means_empty_range() {
        let slot = SurfaceSlot::new();
        let mut r = WindowRenderer::configure(100, WindowConfig::default(), &slot);
        let range = r.visible_range();
        assert!(range.is_empty());
        assert_eq!(range.total_height, 6400.0);
        assert!(r.virtual_items().is_empty());
        assert_eq!(r.scroll_to_index(3, Align::Start), None);
    }

    #[test]
    fn empty_collection_means_empty_range() {
        let (mut r, _s, _slot) = mounted(0, 300.0);
        assert!(r.visible_range().is_empty());
        assert_eq!(r.scroll_to_index(0, Align::Start), None);
    }

    #[test]
    fn range_at_top_includes_overscan_below() {
        let (mut r, _s, _slot) = mounted(100, 300.0);
        let range = r.visible_range();
        // rows 0..=6 touch [0, 300]; +2 overscan
        assert_eq!(range.as_range(), 0..9);
        assert_eq!(range.total_height, 5000.0);
    }

    #[test]
    fn range_follows_user_scroll() {
        let (mut r, s, _slot) = mounted(100, 300.0);
        r.visible_range();
        s.user_scroll(1000.0);
        let range = r.visible_range();
        assert_eq!(range.as_range(), 18..29);
    }

    #[test]
    fn range_follows_viewport_resize() {
        let (mut r, s, _slot) = mounted(100, 300.0);
        assert_eq!(r.visible_range().as_range(), 0..9);
        let calls = s.scroll_calls();

        s.set_viewport_height(600.0);
        // rows 0..=12 touch [0, 600]
        assert_eq!(r.visible_range().as_range(), 0..15);
        assert_eq!(r.metrics().map(|m| m.viewport_height), Some(600.0));

        s.set_viewport_height(100.0);
        assert_eq!(r.visible_range().as_range(), 0..5);
        assert_eq!(s.scroll_calls(), calls);
    }

    #[test]
    fn late_mount_is_picked_up() {
        let slot = SurfaceSlot::new();
        let mut r = WindowRenderer::configure(10, WindowConfig::default(), &slot);
        assert!(!r.is_mounted());
        assert!(r.visible_range().is_empty());

        let s = HeadlessSurface::new(128.0, 0.0);
        slot.mount(s.clone());
        let range = r.visible_range();
        assert!(r.is_mounted());
        assert!(range.contains(0));
        assert_eq!(s.metrics().content_height, 640.0, "spacer sized to the virtual height");
        assert_eq!(s.listener_count(), 1);

        slot.detach();
        assert!(r.visible_range().is_empty());
        assert_eq!(s.listener_count(), 0);
    }

    #[test]
    fn measuring_below_viewport_does_not_scroll() {
        let (mut r, s, _slot) = mounted(100, 300.0);
        r.visible_range();
        let calls = s.scroll_calls();
        assert_eq!(r.report_measured_size(10, 80.0), 0.0);
        assert_eq!(r.total_height(), 5030.0);
        assert_eq!(s.scroll_calls(), calls);
    }

    #[test]
    fn measuring_above_viewport_anchors_scroll() {
        let (mut r, s, _slot) = mounted(100, 300.0);
        s.user_scroll(1000.0);
        r.visible_range();
        let shift = r.report_measured_size(3, 90.0);
        assert_eq!(shift, 40.0);
        assert_eq!(s.metrics().scroll_offset, 1040.0);
        // item 20 started at 1000 before and at 1040 now; still on top
        assert_eq!(r.offset_of(20), 1040.0);
        assert_eq!(r.visible_range().as_range(), 18..29);
    }

    #[test]
    fn invalid_measurement_falls_back_to_estimate() {
        let before = TelemetrySnapshot::capture();
        let (mut r, _s, _slot) = mounted(10, 300.0);
        r.report_measured_size(1, 120.0);
        r.report_measured_size(1, -4.0);
        assert_eq!(r.item_size(1), 50.0);
        r.report_measured_size(2, f64::NAN);
        assert_eq!(r.item_size(2), 50.0);
        assert!(r.is_measured(2));
        let delta = TelemetrySnapshot::capture().since(&before);
        assert!(delta.measurement_clamps >= 2);
    }

    #[test]
    fn measuring_out_of_range_is_ignored() {
        let (mut r, _s, _slot) = mounted(3, 300.0);
        assert_eq!(r.report_measured_size(7, 10.0), 0.0);
        assert_eq!(r.total_height(), 150.0);
    }

    #[test]
    fn scroll_to_index_alignments() {
        let (mut r, s, _slot) = mounted(100, 300.0);
        assert_eq!(r.scroll_to_index(40, Align::Start), Some(2000.0));
        assert_eq!(r.scroll_to_index(40, Align::End), Some(1750.0));
        assert_eq!(r.scroll_to_index(40, Align::Center), Some(1875.0));
        // fully visible already
        assert_eq!(r.scroll_to_index(41, Align::Auto), Some(1875.0));
        assert_eq!(r.scroll_to_index(60, Align::Auto), Some(2750.0));
        assert_eq!(s.metrics().scroll_offset, 2750.0);
    }

    #[test]
    fn scroll_to_index_clamps_target() {
        let (mut r, s, _slot) = mounted(100, 300.0);
        assert_eq!(r.scroll_to_index(99, Align::Start), Some(4700.0));
        assert_eq!(r.scroll_to_index(500, Align::Start), Some(4700.0));
        assert_eq!(s.metrics().scroll_offset, 4700.0);
    }

    #[test]
    fn scroll_to_index_is_idempotent() {
        let (mut r, s, _slot) = mounted(100, 300.0);
        r.scroll_to_index(42, Align::Start);
        let calls = s.scroll_calls();
        r.scroll_to_index(42, Align::Start);
        r.scroll_to_index(42, Align::Start);
        assert_eq!(s.scroll_calls(), calls);
    }

    #[test]
    fn scroll_by_clamps() {
        let (mut r, s, _slot) = mounted(10, 300.0);
        assert_eq!(r.scroll_by(120.0), Some(120.0));
        assert_eq!(r.scroll_by(10_000.0), Some(200.0));
        assert_eq!(r.scroll_by(-10_000.0), Some(0.0));
        assert_eq!(s.metrics().scroll_offset, 0.0);
    }

    #[test]
    fn restore_waits_for_data_and_applies_once() {
        let (mut r, s, _slot) = mounted(0, 300.0);
        r.restore_once(42, Align::Start);
        assert!(r.restore_pending());
        assert_eq!(s.scroll_calls(), 0);

        r.set_len(100);
        r.sync();
        assert!(!r.restore_pending());
        assert_eq!(s.metrics().scroll_offset, 2100.0);

        s.user_scroll(0.0);
        r.restore_once(80, Align::Start);
        r.sync();
        assert_eq!(s.metrics().scroll_offset, 0.0, "second restore ignored");
    }

    #[test]
    fn set_len_keeps_measurements_reset_drops_them() {
        let (mut r, _s, _slot) = mounted(5, 300.0);
        r.report_measured_size(0, 10.0);
        r.set_len(8);
        assert!(r.is_measured(0));
        assert_eq!(r.total_height(), 10.0 + 7.0 * 50.0);
        r.reset(8);
        assert!(!r.is_measured(0));
        assert_eq!(r.total_height(), 400.0);
    }

    #[test]
    fn overscan_change_invalidates_cache() {
        let (mut r, _s, _slot) = mounted(100, 300.0);
        assert_eq!(r.visible_range().end, 9);
        r.set_overscan(0);
        assert_eq!(r.visible_range().end, 7);
    }

    #[test]
    fn invalid_estimate_is_replaced() {
        let slot = SurfaceSlot::new();
        let r = WindowRenderer::configure(
            2,
            WindowConfig {
                estimate_item_size: -1.0,
                overscan: 0,
            },
            &slot,
        );
        assert_eq!(r.config().estimate_item_size, DEFAULT_ESTIMATE);
        assert_eq!(r.total_height(), 128.0);
    }

    #[test]
    fn virtual_items_are_contiguous() {
        let (mut r, _s, _slot) = mounted(20, 120.0);
        r.report_measured_size(1, 20.0);
        let items = r.virtual_items();
        assert_eq!(items.first().map(|i| i.index), Some(0));
        for pair in items.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start);
            assert_eq!(pair[0].index + 1, pair[1].index);
        }
    }
}
