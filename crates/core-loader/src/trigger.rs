//! Scroll-driven load-more triggers.
//!
//! Both triggers only answer "should we ask for more now?"; the coordinator's
//! own guards still decide whether a fetch actually happens.

use core_events::ViewportMetrics;

use crate::status::LoadStatus;

/// Fires when the bottom of the viewport comes within `threshold_px` of the
/// end of the content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityTrigger {
    pub threshold_px: f64,
}

impl ProximityTrigger {
    pub fn new(threshold_px: f64) -> Self {
        Self {
            threshold_px: threshold_px.max(0.0),
        }
    }

    pub fn should_fire(&self, metrics: &ViewportMetrics) -> bool {
        metrics.content_height > 0.0 && metrics.distance_to_end() <= self.threshold_px
    }
}

/// Fires while a trailing sentinel intersects the viewport grown by
/// `root_margin_px` on each edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentinelTrigger {
    pub root_margin_px: f64,
}

impl SentinelTrigger {
    pub fn new(root_margin_px: f64) -> Self {
        Self {
            root_margin_px: root_margin_px.max(0.0),
        }
    }

    /// `top` is the sentinel's offset within the content.
    pub fn should_fire(&self, metrics: &ViewportMetrics, top: f64, height: f64) -> bool {
        let root_top = metrics.scroll_offset - self.root_margin_px;
        let root_bottom = metrics.scroll_offset + metrics.viewport_height + self.root_margin_px;
        let bottom = top + height.max(0.0);
        bottom >= root_top && top <= root_bottom
    }
}

/// Status-side gate shared by both triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerGate {
    /// Hold automatic triggers while an error is on display; only an explicit
    /// retry resumes loading.
    pub pause_on_error: bool,
}

impl Default for TriggerGate {
    fn default() -> Self {
        Self {
            pause_on_error: true,
        }
    }
}

impl TriggerGate {
    pub fn allows(&self, status: &LoadStatus) -> bool {
        status.can_load_more() && !(self.pause_on_error && status.error.is_some())
    }
}
