//! What the host should draw, as a pure function of the collection, the load
//! status and the window/page selection.

use core_loader::{ErrorOrigin, Keyed, LoadStatus};
use core_window::VirtualItem;

/// One materialized list row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row<K> {
    pub index: usize,
    pub key: K,
    pub start: f64,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body<K> {
    /// First page still loading.
    Skeleton,
    /// First page failed with nothing to show; offer a retry.
    InitialError { message: String },
    /// Loaded and empty.
    Empty,
    List { rows: Vec<Row<K>>, total_height: f64 },
    Grid {
        page: usize,
        total_pages: usize,
        keys: Vec<K>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Footer {
    Hidden,
    LoadingMore,
    Retry { message: String },
    NoMore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Presentation<K> {
    pub body: Body<K>,
    pub footer: Footer,
}

/// Placeholder bodies shared by both display modes. `None` means the
/// collection itself should be shown.
fn placeholder<K>(status: &LoadStatus, len: usize) -> Option<Body<K>> {
    if len > 0 {
        return None;
    }
    if status.initial_loading() {
        return Some(Body::Skeleton);
    }
    match &status.error {
        Some(err) if err.origin == ErrorOrigin::Initial => Some(Body::InitialError {
            message: err.message.clone(),
        }),
        _ if status.is_ready() => Some(Body::Empty),
        _ => Some(Body::Skeleton),
    }
}

/// Footer below a non-empty collection. A failed refresh keeps the old items
/// on screen, so its retry is offered here as well as a failed next page.
pub fn footer(status: &LoadStatus, len: usize) -> Footer {
    if len == 0 {
        return Footer::Hidden;
    }
    if status.loading_more {
        return Footer::LoadingMore;
    }
    match &status.error {
        Some(err) => Footer::Retry {
            message: err.message.clone(),
        },
        _ if status.exhausted() => Footer::NoMore,
        _ => Footer::Hidden,
    }
}

pub fn present_list<T: Keyed>(
    status: &LoadStatus,
    items: &[T],
    window: &[VirtualItem],
    total_height: f64,
) -> Presentation<T::Key> {
    let body = placeholder(status, items.len()).unwrap_or_else(|| Body::List {
        rows: window
            .iter()
            .filter_map(|v| {
                items.get(v.index).map(|item| Row {
                    index: v.index,
                    key: item.key(),
                    start: v.start,
                    size: v.size,
                })
            })
            .collect(),
        total_height,
    });
    Presentation {
        body,
        footer: footer(status, items.len()),
    }
}

pub fn present_grid<T: Keyed>(
    status: &LoadStatus,
    items: &[T],
    page: usize,
    total_pages: usize,
    page_items: &[T],
) -> Presentation<T::Key> {
    let body = placeholder(status, items.len()).unwrap_or_else(|| Body::Grid {
        page,
        total_pages,
        keys: page_items.iter().map(Keyed::key).collect(),
    });
    Presentation {
        body,
        footer: footer(status, items.len()),
    }
}
