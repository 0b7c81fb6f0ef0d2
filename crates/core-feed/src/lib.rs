//! Feed page controller: composes the load coordinator, the windowed
//! renderer and the host event channel, and decides what the page shows in
//! list and grid display modes.

mod pager;
mod present;
mod signals;
mod view;

pub use pager::GridPager;
pub use present::{Body, Footer, Presentation, Row, footer, present_grid, present_list};
pub use signals::{ScrollSignals, SignalTracker};
pub use view::{FeedAction, FeedPresentation, FeedStats, FeedView, RowMeasure};
