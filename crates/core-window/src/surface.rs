//! The scroll surface contract and the slot a host mounts it into.
//!
//! A host owns the actual scrolling container. Until it mounts one the
//! renderer has nothing to read geometry from, so the surface reference is
//! published through a `watch` channel: the renderer holds a receiver and
//! re-subscribes to scroll notifications whenever the slot changes, whether
//! that happens before or after the renderer was configured.

use std::fmt;
use std::sync::Arc;

use core_events::ViewportMetrics;
use tokio::sync::watch;
use tracing::info;

/// Callback invoked with fresh metrics whenever the surface scrolls or resizes.
pub type ScrollListener = Arc<dyn Fn(&ViewportMetrics) + Send + Sync>;

pub type SurfaceRef = Arc<dyn ScrollSurface>;

/// A scrollable container owned by the host.
pub trait ScrollSurface: Send + Sync {
    /// Current geometry. `content_height` is whatever the host last laid out.
    fn metrics(&self) -> ViewportMetrics;

    /// Register a listener; dropping the returned handle unregisters it.
    fn on_scroll(&self, listener: ScrollListener) -> Subscription;

    /// Programmatically move the top edge of the viewport to `offset`.
    fn scroll_to(&self, offset: f64);

    /// Size the spacer that gives the surface its scrollable extent.
    fn set_content_height(&self, _height: f64) {}
}

/// Handle for a registered scroll listener.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Shared, late-bindable reference to the host's scroll surface.
#[derive(Clone)]
pub struct SurfaceSlot {
    tx: Arc<watch::Sender<Option<SurfaceRef>>>,
}

impl SurfaceSlot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn mount(&self, surface: SurfaceRef) {
        let m = surface.metrics();
        info!(
            target: "window.surface",
            viewport_height = m.viewport_height,
            "surface_mounted"
        );
        self.tx.send_replace(Some(surface));
    }

    pub fn detach(&self) {
        if self.tx.send_replace(None).is_some() {
            info!(target: "window.surface", "surface_detached");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn current(&self) -> Option<SurfaceRef> {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every later mount / detach.
    pub fn watch(&self) -> watch::Receiver<Option<SurfaceRef>> {
        self.tx.subscribe()
    }
}

impl Default for SurfaceSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SurfaceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceSlot")
            .field("mounted", &self.is_mounted())
            .finish()
    }
}
