//! Numbered pages over the loaded collection, for grid display.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPager {
    page_size: usize,
    /// 1-based.
    page: usize,
}

impl GridPager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            page: 1,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// `ceil(total / page_size)`; zero for an empty collection.
    pub fn total_pages(&self, total: usize) -> usize {
        total.div_ceil(self.page_size)
    }

    /// Select a page. Page numbers below 1 select the first page.
    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    /// Indices of the current page within a collection of `len` items.
    pub fn range(&self, len: usize) -> Range<usize> {
        let start = (self.page - 1).saturating_mul(self.page_size).min(len);
        let end = start.saturating_add(self.page_size).min(len);
        start..end
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[self.range(items.len())]
    }

    /// The current page reaches past the loaded items.
    pub fn needs_more(&self, loaded: usize) -> bool {
        self.page.saturating_mul(self.page_size) > loaded
    }
}
