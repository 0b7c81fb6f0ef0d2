//! Synthetic paged catalog used by the simulator.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use core_loader::{Keyed, Page, PageNumber, PagedSource, SourceError};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticRow {
    pub id: u32,
    /// Height the host would lay this row out at.
    pub height: f64,
}

impl SyntheticRow {
    pub fn new(id: u32) -> Self {
        // 40..=164px, scattered but stable per id
        let bucket = id.wrapping_mul(2_654_435_761) >> 27;
        Self {
            id,
            height: 40.0 + f64::from(bucket) * 4.0,
        }
    }
}

impl Keyed for SyntheticRow {
    type Key = u32;
    fn key(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogShape {
    pub items: u32,
    /// Rows repeated from the end of the previous page at the start of each
    /// later page.
    pub overlap: u32,
    /// Page number whose first request fails.
    pub fail_at: Option<u32>,
    pub latency: Duration,
}

pub struct SyntheticCatalog {
    shape: CatalogShape,
    failed: Arc<AtomicBool>,
    requests: Arc<AtomicU64>,
}

impl SyntheticCatalog {
    pub fn new(shape: CatalogShape) -> Self {
        Self {
            shape,
            failed: Arc::new(AtomicBool::new(false)),
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

impl PagedSource for SyntheticCatalog {
    type Item = SyntheticRow;
    type Cursor = PageNumber;

    fn fetch_page(
        &self,
        cursor: Option<PageNumber>,
        page_size: usize,
    ) -> impl Future<Output = Result<Page<SyntheticRow, PageNumber>, SourceError>> + Send {
        let page = cursor.unwrap_or(PageNumber::first(page_size));
        let shape = self.shape.clone();
        let failed = self.failed.clone();
        self.requests.fetch_add(1, Ordering::Relaxed);
        async move {
            if !shape.latency.is_zero() {
                tokio::time::sleep(shape.latency).await;
            }
            if shape.fail_at == Some(page.number) && !failed.swap(true, Ordering::Relaxed) {
                debug!(target: "sim.source", page = page.number, "synthetic_failure");
                return Err(SourceError::Transport("synthetic outage".into()));
            }
            let offset = u32::try_from(page.offset()).unwrap_or(u32::MAX);
            let size = u32::try_from(page.size).unwrap_or(u32::MAX);
            let start = if page.number > 1 {
                offset.saturating_sub(shape.overlap)
            } else {
                offset
            };
            let end = offset.saturating_add(size).min(shape.items);
            let rows = (start..end).map(SyntheticRow::new).collect();
            debug!(target: "sim.source", page = page.number, start, end, "synthetic_page");
            Ok(Page::new(rows)
                .with_cursor(page.next())
                .with_total(shape.items as usize))
        }
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
