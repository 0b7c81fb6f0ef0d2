//! Windowed rendering for long feeds.
//!
//! Only the rows intersecting the viewport (plus a configurable overscan on
//! each side) are materialized. Rows start at an estimated height and are
//! corrected as the host reports measurements; offsets are kept in a
//! [`SizeTable`] so a correction never forces a full recompute.

mod headless;
mod renderer;
mod size_table;
mod surface;

pub use headless::HeadlessSurface;
pub use renderer::{
    Align, DEFAULT_ESTIMATE, VirtualItem, VisibleRange, WindowConfig, WindowRenderer,
};
pub use size_table::SizeTable;
pub use surface::{ScrollListener, ScrollSurface, Subscription, SurfaceRef, SurfaceSlot};
