//! Element-position cursors and logical-to-physical page mapping.

use std::sync::Arc;

use crate::types::PageId;

/// Position of one element as (logical page, offset within the page).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageElementCursor {
    /// Logical page index within the list's page sequence.
    pub page_idx: usize,
    /// Element offset within that page.
    pub elem_pos_in_page: usize,
}

impl PageElementCursor {
    /// Derives the cursor for a linear element position.
    pub fn for_pos(linear_pos: u64, elements_per_page: usize) -> Self {
        debug_assert!(elements_per_page > 0);
        Self {
            page_idx: (linear_pos / elements_per_page as u64) as usize,
            elem_pos_in_page: (linear_pos % elements_per_page as u64) as usize,
        }
    }

    /// Moves to the first element of the next page.
    pub fn advance_to_next_page(&mut self) {
        self.page_idx += 1;
        self.elem_pos_in_page = 0;
    }
}

/// Immutable logical-to-physical page mapping for one list, built once per
/// handle initialization from the metadata snapshot.
#[derive(Clone, Debug)]
pub struct PageMapper {
    pages: Arc<[PageId]>,
}

impl PageMapper {
    /// Wraps a page sequence from the metadata snapshot.
    pub fn new(pages: Arc<[PageId]>) -> Self {
        Self { pages }
    }

    /// Physical page backing the given logical page index.
    ///
    /// The mapper is always sized to the list's known element count before
    /// use, so an out-of-range index is a programming error, not a
    /// recoverable condition.
    pub fn resolve(&self, logical_page_idx: usize) -> PageId {
        assert!(
            logical_page_idx < self.pages.len(),
            "logical page index {logical_page_idx} out of range for {}-page list",
            self.pages.len()
        );
        self.pages[logical_page_idx]
    }

    /// Number of logical pages in the mapping.
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }
}
