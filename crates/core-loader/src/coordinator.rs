//! Incremental load coordinator.
//!
//! Owns the collection, the continuation cursor and the load state for one
//! paged source. Every public operation is async and infallible: failures are
//! written into [`LoadStatus`] and reported through [`LoadOutcome`].
//!
//! Concurrency: state sits behind a mutex that is only taken between awaits.
//! A generation counter is bumped by every initial load (including refresh);
//! a fetch whose generation no longer matches when it resolves is dropped
//! without touching state.
//!
//! A load whose future is dropped before the fetch resolves (host shutdown,
//! a cancelled task) releases its in-flight marker on drop, so the next call
//! is not refused as a duplicate.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ahash::AHashSet;
use core_events::{FETCH_FAILURES, FETCHES_STARTED, LOAD_MORE_SKIPPED, STALE_DISCARDS, bump};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::merge::{Keyed, merge_unique};
use crate::source::{PagedSource, resolve_has_more};
use crate::status::{ErrorInfo, ErrorOrigin, LoadPhase, LoadStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another load-more is outstanding.
    InFlight,
    /// The source reported no further pages.
    Exhausted,
    /// No successful initial load yet (or one is running).
    NotReady,
    /// `retry` was called with no error on display.
    NothingToRetry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded { fetched: usize, appended: usize },
    Skipped(SkipReason),
    Failed(SourceError),
    /// The result arrived after a newer initial load started.
    Discarded,
}

/// Immutable view of the collection at one revision.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub items: Arc<Vec<T>>,
    /// Bumped on every change to the collection.
    pub revision: u64,
    /// Bumped only when the collection is replaced wholesale.
    pub epoch: u64,
}

struct State<T: Keyed, C> {
    items: Arc<Vec<T>>,
    seen: AHashSet<T::Key>,
    cursor: Option<C>,
    phase: LoadPhase,
    loading_more: bool,
    has_more: bool,
    error: Option<ErrorInfo>,
    generation: u64,
    revision: u64,
    epoch: u64,
}

impl<T: Keyed, C> State<T, C> {
    fn status(&self) -> LoadStatus {
        LoadStatus {
            phase: self.phase,
            loading_more: self.loading_more,
            has_more: self.has_more,
            error: self.error.clone(),
            len: self.items.len(),
        }
    }
}

pub struct Coordinator<S: PagedSource> {
    source: S,
    page_size: usize,
    state: Mutex<State<S::Item, S::Cursor>>,
    status_tx: watch::Sender<LoadStatus>,
}

impl<S: PagedSource> Coordinator<S> {
    pub fn new(source: S, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let (status_tx, _rx) = watch::channel(LoadStatus::default());
        Self {
            source,
            page_size,
            state: Mutex::new(State {
                items: Arc::new(Vec::new()),
                seen: AHashSet::new(),
                cursor: None,
                phase: LoadPhase::Idle,
                loading_more: false,
                has_more: false,
                error: None,
                generation: 0,
                revision: 0,
                epoch: 0,
            }),
            status_tx,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn lock(&self) -> MutexGuard<'_, State<S::Item, S::Cursor>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State<S::Item, S::Cursor>) {
        self.status_tx.send_replace(state.status());
    }

    pub fn status(&self) -> LoadStatus {
        self.lock().status()
    }

    /// Receiver notified on every status transition.
    pub fn subscribe(&self) -> watch::Receiver<LoadStatus> {
        self.status_tx.subscribe()
    }

    pub fn items(&self) -> Arc<Vec<S::Item>> {
        self.lock().items.clone()
    }

    pub fn snapshot(&self) -> Snapshot<S::Item> {
        let st = self.lock();
        Snapshot {
            items: st.items.clone(),
            revision: st.revision,
            epoch: st.epoch,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Fetch the first page and replace the collection with it. Supersedes
    /// any load already in flight. On failure the previous collection stays
    /// and the phase returns to `Idle` with the error recorded.
    pub async fn load_initial(&self) -> LoadOutcome {
        let generation = {
            let mut st = self.lock();
            st.generation += 1;
            st.phase = LoadPhase::InitialLoading;
            st.loading_more = false;
            st.has_more = false;
            st.cursor = None;
            st.error = None;
            self.publish(&st);
            st.generation
        };
        bump(&FETCHES_STARTED);
        info!(
            target: "loader.initial",
            source = self.source.name(),
            generation,
            page_size = self.page_size,
            "initial_load_started"
        );

        let pending = PendingLoad::new(self, generation, ErrorOrigin::Initial);
        let result = self.source.fetch_page(None, self.page_size).await;
        pending.disarm();

        let mut st = self.lock();
        if st.generation != generation {
            return self.discard(generation, st.generation, "initial");
        }
        match result {
            Ok(page) => {
                let hints = page.hints();
                let mut items = Vec::with_capacity(hints.fetched);
                let mut seen = AHashSet::with_capacity(hints.fetched);
                let report = merge_unique(&mut items, &mut seen, page.items);
                let has_more = resolve_has_more(hints, items.len(), self.page_size);
                st.items = Arc::new(items);
                st.seen = seen;
                st.cursor = page.next_cursor;
                st.has_more = has_more;
                st.phase = LoadPhase::Ready;
                st.revision += 1;
                st.epoch += 1;
                self.publish(&st);
                info!(
                    target: "loader.initial",
                    generation,
                    fetched = report.fetched,
                    len = st.items.len(),
                    has_more,
                    "initial_load_completed"
                );
                LoadOutcome::Loaded {
                    fetched: report.fetched,
                    appended: report.appended,
                }
            }
            Err(err) => {
                bump(&FETCH_FAILURES);
                warn!(target: "loader.initial", generation, error = %err, "initial_load_failed");
                st.phase = LoadPhase::Idle;
                st.error = Some(ErrorInfo::from_source(ErrorOrigin::Initial, &err));
                self.publish(&st);
                LoadOutcome::Failed(err)
            }
        }
    }

    /// Fetch and append the next page. A no-op unless the collection is
    /// ready, more pages exist and no other load-more is outstanding.
    pub async fn load_more(&self) -> LoadOutcome {
        let (generation, cursor) = {
            let mut st = self.lock();
            let skip = if st.phase != LoadPhase::Ready {
                Some(SkipReason::NotReady)
            } else if st.loading_more {
                Some(SkipReason::InFlight)
            } else if !st.has_more {
                Some(SkipReason::Exhausted)
            } else {
                None
            };
            if let Some(reason) = skip {
                bump(&LOAD_MORE_SKIPPED);
                debug!(target: "loader.more", ?reason, "load_more_skipped");
                return LoadOutcome::Skipped(reason);
            }
            st.loading_more = true;
            st.error = None;
            self.publish(&st);
            (st.generation, st.cursor.clone())
        };
        bump(&FETCHES_STARTED);
        debug!(target: "loader.more", generation, ?cursor, "load_more_started");

        let pending = PendingLoad::new(self, generation, ErrorOrigin::More);
        let result = self.source.fetch_page(cursor, self.page_size).await;
        pending.disarm();

        let mut st = self.lock();
        if st.generation != generation {
            return self.discard(generation, st.generation, "more");
        }
        st.loading_more = false;
        match result {
            Ok(page) => {
                let hints = page.hints();
                let state = &mut *st;
                let items = Arc::make_mut(&mut state.items);
                let report = merge_unique(items, &mut state.seen, page.items);
                let len = items.len();
                let has_more = resolve_has_more(hints, len, self.page_size);
                if report.appended > 0 {
                    state.revision += 1;
                }
                state.cursor = page.next_cursor;
                state.has_more = has_more;
                self.publish(state);
                debug!(
                    target: "loader.more",
                    generation,
                    fetched = report.fetched,
                    appended = report.appended,
                    duplicates = report.duplicates,
                    len,
                    has_more,
                    "load_more_completed"
                );
                LoadOutcome::Loaded {
                    fetched: report.fetched,
                    appended: report.appended,
                }
            }
            Err(err) => {
                bump(&FETCH_FAILURES);
                warn!(target: "loader.more", generation, error = %err, "load_more_failed");
                st.error = Some(ErrorInfo::from_source(ErrorOrigin::More, &err));
                self.publish(&st);
                LoadOutcome::Failed(err)
            }
        }
    }

    /// Start over from the first page. The current collection stays visible
    /// until the new first page arrives; outstanding load-more results are
    /// discarded when they resolve.
    pub async fn refresh(&self) -> LoadOutcome {
        info!(target: "loader.refresh", len = self.len(), "refresh_requested");
        self.load_initial().await
    }

    /// Re-run whichever operation failed last.
    pub async fn retry(&self) -> LoadOutcome {
        let origin = self.lock().error.as_ref().map(|e| e.origin);
        match origin {
            Some(ErrorOrigin::Initial) => {
                info!(target: "loader.initial", "retry_initial");
                self.load_initial().await
            }
            Some(ErrorOrigin::More) => {
                info!(target: "loader.more", "retry_more");
                self.load_more().await
            }
            None => LoadOutcome::Skipped(SkipReason::NothingToRetry),
        }
    }

    fn discard(&self, started: u64, current: u64, op: &'static str) -> LoadOutcome {
        bump(&STALE_DISCARDS);
        debug!(target: "loader.stale", op, started, current, "stale_result_discarded");
        LoadOutcome::Discarded
    }
}

/// In-flight marker for one fetch. Dropped while still armed, it rolls back
/// the state the load set up front: `loading_more` for a load-more, the
/// `InitialLoading` phase for an initial load. Nothing happens when a newer
/// generation has taken over in the meantime.
struct PendingLoad<'a, S: PagedSource> {
    coordinator: &'a Coordinator<S>,
    generation: u64,
    origin: ErrorOrigin,
    armed: bool,
}

impl<'a, S: PagedSource> PendingLoad<'a, S> {
    fn new(coordinator: &'a Coordinator<S>, generation: u64, origin: ErrorOrigin) -> Self {
        Self {
            coordinator,
            generation,
            origin,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<S: PagedSource> Drop for PendingLoad<'_, S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut st = self.coordinator.lock();
        if st.generation != self.generation {
            return;
        }
        match self.origin {
            ErrorOrigin::More => {
                st.loading_more = false;
                debug!(target: "loader.more", generation = self.generation, "load_more_abandoned");
            }
            ErrorOrigin::Initial => {
                if st.phase == LoadPhase::InitialLoading {
                    st.phase = LoadPhase::Idle;
                }
                debug!(target: "loader.initial", generation = self.generation, "initial_load_abandoned");
            }
        }
        self.coordinator.publish(&st);
    }
}
