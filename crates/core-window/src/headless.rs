//! In-memory scroll surface used by the simulator and by tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use core_events::ViewportMetrics;

use crate::surface::{ScrollListener, ScrollSurface, Subscription};

type ListenerList = Arc<Mutex<Vec<(u64, ScrollListener)>>>;

pub struct HeadlessSurface {
    metrics: Mutex<ViewportMetrics>,
    listeners: ListenerList,
    next_id: AtomicU64,
    scroll_calls: AtomicU64,
}

impl HeadlessSurface {
    pub fn new(viewport_height: f64, content_height: f64) -> Arc<Self> {
        Arc::new(Self {
            metrics: Mutex::new(ViewportMetrics::new(0.0, viewport_height, content_height)),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
            scroll_calls: AtomicU64::new(0),
        })
    }

    /// Number of programmatic `scroll_to` calls received.
    pub fn scroll_calls(&self) -> u64 {
        self.scroll_calls.load(Ordering::Relaxed)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Simulate the user dragging the surface to `offset`.
    pub fn user_scroll(&self, offset: f64) {
        self.move_to(offset);
    }

    pub fn set_viewport_height(&self, height: f64) {
        {
            let mut m = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
            m.viewport_height = height.max(0.0);
            m.scroll_offset = m.scroll_offset.clamp(0.0, m.max_scroll_offset());
        }
        self.notify();
    }

    fn move_to(&self, offset: f64) {
        let changed = {
            let mut m = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
            let next = if offset.is_finite() {
                offset.clamp(0.0, m.max_scroll_offset())
            } else {
                m.scroll_offset
            };
            let changed = next != m.scroll_offset;
            m.scroll_offset = next;
            changed
        };
        if changed {
            self.notify();
        }
    }

    fn notify(&self) {
        let metrics = self.metrics();
        // Listeners may call back into the surface; never hold the lock while they run.
        let listeners: Vec<ScrollListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for l in listeners {
            l(&metrics);
        }
    }
}

impl ScrollSurface for HeadlessSurface {
    fn metrics(&self) -> ViewportMetrics {
        *self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_scroll(&self, listener: ScrollListener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        let listeners = self.listeners.clone();
        Subscription::new(move || {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(other, _)| *other != id);
        })
    }

    fn scroll_to(&self, offset: f64) {
        self.scroll_calls.fetch_add(1, Ordering::Relaxed);
        self.move_to(offset);
    }

    fn set_content_height(&self, height: f64) {
        let clamped = {
            let mut m = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
            m.content_height = height.max(0.0);
            let max = m.max_scroll_offset();
            if m.scroll_offset > max {
                m.scroll_offset = max;
                true
            } else {
                false
            }
        };
        if clamped {
            self.notify();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn scroll_is_clamped_to_content() {
        let s = HeadlessSurface::new(100.0, 1000.0);
        s.scroll_to(5000.0);
        assert_eq!(s.metrics().scroll_offset, 900.0);
        s.scroll_to(-20.0);
        assert_eq!(s.metrics().scroll_offset, 0.0);
        assert_eq!(s.scroll_calls(), 2);
    }

    #[test]
    fn listeners_fire_until_unsubscribed() {
        let s = HeadlessSurface::new(100.0, 1000.0);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = s.on_scroll(Arc::new(move |_m: &ViewportMetrics| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        s.user_scroll(10.0);
        s.user_scroll(10.0); // no movement, no notification
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        drop(sub);
        assert_eq!(s.listener_count(), 0);
        s.user_scroll(20.0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shrinking_content_pulls_offset_back() {
        let s = HeadlessSurface::new(100.0, 1000.0);
        s.user_scroll(800.0);
        s.set_content_height(500.0);
        assert_eq!(s.metrics().scroll_offset, 400.0);
    }
}
