//! Observable load state.

use crate::error::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    #[default]
    Idle,
    InitialLoading,
    Ready,
}

/// Which operation produced the error on display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    Initial,
    More,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub origin: ErrorOrigin,
    pub message: String,
    pub code: Option<i64>,
}

impl ErrorInfo {
    pub fn from_source(origin: ErrorOrigin, err: &SourceError) -> Self {
        Self {
            origin,
            message: err.to_string(),
            code: err.code(),
        }
    }
}

/// Snapshot of the coordinator's state, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadStatus {
    pub phase: LoadPhase,
    pub loading_more: bool,
    pub has_more: bool,
    pub error: Option<ErrorInfo>,
    /// Number of items in the collection.
    pub len: usize,
}

impl LoadStatus {
    pub fn initial_loading(&self) -> bool {
        self.phase == LoadPhase::InitialLoading
    }

    pub fn is_ready(&self) -> bool {
        self.phase == LoadPhase::Ready
    }

    /// Whether a `load_more` call would actually fetch.
    pub fn can_load_more(&self) -> bool {
        self.is_ready() && !self.loading_more && self.has_more
    }

    /// Ready with nothing further to fetch.
    pub fn exhausted(&self) -> bool {
        self.is_ready() && !self.has_more
    }
}
