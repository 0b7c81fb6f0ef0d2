//! The paged data source contract and adapters for the two paging styles.

use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

use crate::error::SourceError;
use crate::merge::Keyed;

/// One page returned by a source.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    /// Token for the following page. `None` means the source cannot continue.
    pub next_cursor: Option<C>,
    /// Explicit continuation flag, when the source reports one.
    pub has_more: Option<bool>,
    /// Total number of records on the server, when reported.
    pub total: Option<usize>,
}

impl<T, C> Page<T, C> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
            has_more: None,
            total: None,
        }
    }

    pub fn with_cursor(mut self, cursor: C) -> Self {
        self.next_cursor = Some(cursor);
        self
    }

    pub fn with_has_more(mut self, has_more: bool) -> Self {
        self.has_more = Some(has_more);
        self
    }

    pub fn with_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }
}

/// The parts of a page that decide whether the feed continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHints {
    pub fetched: usize,
    pub has_cursor: bool,
    pub has_more: Option<bool>,
    pub total: Option<usize>,
}

impl<T, C> Page<T, C> {
    pub fn hints(&self) -> PageHints {
        PageHints {
            fetched: self.items.len(),
            has_cursor: self.next_cursor.is_some(),
            has_more: self.has_more,
            total: self.total,
        }
    }
}

/// Decide whether another page can be requested after this one.
///
/// Order: a page with no continuation cursor, or no items at all, ends the
/// feed. Otherwise an explicit flag wins, then a reported total compared with
/// the collected count, then a short page (`fetched < requested`).
pub fn resolve_has_more(hints: PageHints, collected: usize, requested: usize) -> bool {
    if !hints.has_cursor || hints.fetched == 0 {
        return false;
    }
    if let Some(flag) = hints.has_more {
        return flag;
    }
    if let Some(total) = hints.total {
        return collected < total;
    }
    hints.fetched >= requested
}

/// Something that serves a collection one page at a time.
pub trait PagedSource: Send + Sync {
    type Item: Keyed + Clone + Send + Sync;
    type Cursor: Clone + Debug + Send + Sync;

    /// `cursor == None` requests the first page.
    fn fetch_page(
        &self,
        cursor: Option<Self::Cursor>,
        page_size: usize,
    ) -> impl Future<Output = Result<Page<Self::Item, Self::Cursor>, SourceError>> + Send;

    fn name(&self) -> &str {
        "source"
    }
}

/// 1-based page number plus page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageNumber {
    pub number: u32,
    pub size: usize,
}

impl PageNumber {
    pub fn first(size: usize) -> Self {
        Self { number: 1, size }
    }

    pub fn next(self) -> Self {
        Self {
            number: self.number.saturating_add(1),
            size: self.size,
        }
    }

    /// Index of the first record on this page.
    pub fn offset(&self) -> usize {
        (self.number.saturating_sub(1) as usize).saturating_mul(self.size)
    }
}

/// Adapter for `?page=N&size=M` style endpoints.
///
/// The closure receives the page to fetch. Unless it sets `next_cursor`
/// itself, the adapter fills in the following page number, so exhaustion is
/// decided by the flag, the total or a short page.
pub struct PageNumberSource<F, T> {
    name: String,
    fetch: F,
    _item: PhantomData<fn() -> T>,
}

impl<F, T> PageNumberSource<F, T> {
    pub fn new(name: impl Into<String>, fetch: F) -> Self {
        Self {
            name: name.into(),
            fetch,
            _item: PhantomData,
        }
    }
}

impl<F, Fut, T> PagedSource for PageNumberSource<F, T>
where
    F: Fn(PageNumber) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Page<T, PageNumber>, SourceError>> + Send,
    T: Keyed + Clone + Send + Sync,
{
    type Item = T;
    type Cursor = PageNumber;

    fn fetch_page(
        &self,
        cursor: Option<PageNumber>,
        page_size: usize,
    ) -> impl Future<Output = Result<Page<T, PageNumber>, SourceError>> + Send {
        let page = cursor.unwrap_or(PageNumber::first(page_size));
        let fut = (self.fetch)(page);
        async move {
            let mut result = fut.await?;
            if result.next_cursor.is_none() {
                result.next_cursor = Some(page.next());
            }
            Ok(result)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Adapter for endpoints that hand back an opaque continuation token.
pub struct CursorSource<F, T, C> {
    name: String,
    fetch: F,
    _marker: PhantomData<fn() -> (T, C)>,
}

impl<F, T, C> CursorSource<F, T, C> {
    pub fn new(name: impl Into<String>, fetch: F) -> Self {
        Self {
            name: name.into(),
            fetch,
            _marker: PhantomData,
        }
    }
}

impl<F, Fut, T, C> PagedSource for CursorSource<F, T, C>
where
    F: Fn(Option<C>, usize) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Page<T, C>, SourceError>> + Send,
    T: Keyed + Clone + Send + Sync,
    C: Clone + Debug + Send + Sync,
{
    type Item = T;
    type Cursor = C;

    fn fetch_page(
        &self,
        cursor: Option<C>,
        page_size: usize,
    ) -> impl Future<Output = Result<Page<T, C>, SourceError>> + Send {
        (self.fetch)(cursor, page_size)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
