//! Collection results as returned by the data layer.

use serde::{Deserialize, Serialize};

/// One page of a collection, with the totals pagination links need.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Slice<T> {
    pub items: Vec<T>,
    pub page_number: u64,
    pub page_size: u64,
    pub total_items: u64,
}

impl<T> Slice<T> {
    pub fn new(items: Vec<T>, page_number: u64, page_size: u64, total_items: u64) -> Self {
        Self {
            items,
            page_number,
            page_size,
            total_items,
        }
    }

    pub fn empty(page_number: u64, page_size: u64) -> Self {
        Self {
            items: Vec::new(),
            page_number,
            page_size,
            total_items: 0,
        }
    }

    /// Map items while preserving paging facts.
    pub fn map_items<U>(self, mut f: impl FnMut(T) -> U) -> Slice<U> {
        Slice {
            items: self.items.into_iter().map(&mut f).collect(),
            page_number: self.page_number,
            page_size: self.page_size,
            total_items: self.total_items,
        }
    }

    /// Total pages for this slice's page size (at least 1).
    pub fn last_page(&self) -> u64 {
        if self.page_size == 0 {
            return 1;
        }
        self.total_items.div_ceil(self.page_size).max(1)
    }

    pub fn has_next(&self) -> bool {
        self.page_number < self.last_page()
    }

    pub fn has_prev(&self) -> bool {
        self.page_number > 1
    }
}

/// One page of related ids from the relationship reader.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SliceIds {
    pub ids: Vec<String>,
    pub total_items: u64,
}

impl SliceIds {
    pub fn new(ids: Vec<String>, total_items: u64) -> Self {
        Self { ids, total_items }
    }
}
