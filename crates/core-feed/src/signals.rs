//! Header state derived from the scroll position.

use core_events::ViewportMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollSignals {
    /// Scrolled past the collapse offset; the host shrinks its header.
    pub header_collapsed: bool,
    /// Within the tolerance of the end of the content.
    pub at_bottom: bool,
}

/// Turns raw metrics into [`ScrollSignals`], reporting only transitions.
#[derive(Debug, Clone)]
pub struct SignalTracker {
    collapse_offset_px: f64,
    bottom_tolerance_px: f64,
    last: Option<ScrollSignals>,
}

impl SignalTracker {
    pub fn new(collapse_offset_px: f64, bottom_tolerance_px: f64) -> Self {
        Self {
            collapse_offset_px,
            bottom_tolerance_px: bottom_tolerance_px.max(0.0),
            last: None,
        }
    }

    pub fn current(&self) -> ScrollSignals {
        self.last.unwrap_or_default()
    }

    pub fn observe(&mut self, metrics: &ViewportMetrics) -> Option<ScrollSignals> {
        let next = ScrollSignals {
            header_collapsed: metrics.scroll_offset > self.collapse_offset_px,
            at_bottom: metrics.content_height > 0.0
                && metrics.scroll_offset + metrics.viewport_height
                    >= metrics.content_height - self.bottom_tolerance_px,
        };
        if self.last == Some(next) {
            return None;
        }
        self.last = Some(next);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_only_changes() {
        let mut t = SignalTracker::new(50.0, 10.0);
        let first = t.observe(&ViewportMetrics::new(0.0, 600.0, 3000.0));
        assert_eq!(first, Some(ScrollSignals::default()));
        assert_eq!(t.observe(&ViewportMetrics::new(40.0, 600.0, 3000.0)), None);

        let collapsed = t.observe(&ViewportMetrics::new(51.0, 600.0, 3000.0));
        assert_eq!(
            collapsed,
            Some(ScrollSignals {
                header_collapsed: true,
                at_bottom: false
            })
        );
    }

    #[test]
    fn bottom_tolerance() {
        let mut t = SignalTracker::new(50.0, 10.0);
        t.observe(&ViewportMetrics::new(2389.0, 600.0, 3000.0));
        assert!(!t.current().at_bottom);
        t.observe(&ViewportMetrics::new(2390.0, 600.0, 3000.0));
        assert!(t.current().at_bottom);
        assert!(t.current().header_collapsed);
    }
}
