//! Incremental loading for paged feeds: the data source contract, identity
//! de-duplication, the load coordinator and the scroll triggers that drive it.

mod coordinator;
mod error;
mod merge;
mod source;
mod status;
mod trigger;

pub use coordinator::{Coordinator, LoadOutcome, SkipReason, Snapshot};
pub use error::SourceError;
pub use merge::{Keyed, MergeReport, merge_unique};
pub use source::{
    CursorSource, Page, PageHints, PageNumber, PageNumberSource, PagedSource, resolve_has_more,
};
pub use status::{ErrorInfo, ErrorOrigin, LoadPhase, LoadStatus};
pub use trigger::{ProximityTrigger, SentinelTrigger, TriggerGate};
