//! Per-list-file page indirection metadata.
//!
//! A snapshot maps logical page indices to physical pages: one shared
//! mapping for the small-list region and one per large list, keyed by the
//! header's list index. Snapshots are immutable; a writer builds a new one
//! and publishes it atomically, so hot-path readers never take a lock beyond
//! cloning the `Arc` at handle initialization.

use std::sync::Arc;

use crate::lists::cursor::PageMapper;
use crate::types::PageId;

/// Metadata for one large list: its element count and page sequence.
#[derive(Clone, Debug)]
pub struct LargeListMeta {
    /// Total elements in the list.
    pub num_elements: u64,
    /// Logical-to-physical page sequence, contiguous from logical index 0.
    pub pages: Arc<[PageId]>,
}

/// Immutable metadata snapshot for one list file.
#[derive(Clone, Debug)]
pub struct ListsMetadata {
    small_region_pages: Arc<[PageId]>,
    small_region_len: u64,
    large_lists: Vec<LargeListMeta>,
}

impl Default for ListsMetadata {
    fn default() -> Self {
        Self {
            small_region_pages: Arc::from(Vec::new()),
            small_region_len: 0,
            large_lists: Vec::new(),
        }
    }
}

impl ListsMetadata {
    /// Empty snapshot for a freshly created list file.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a snapshot from its parts. Builder-side only.
    pub fn new(
        small_region_pages: Vec<PageId>,
        small_region_len: u64,
        large_lists: Vec<LargeListMeta>,
    ) -> Self {
        Self {
            small_region_pages: Arc::from(small_region_pages),
            small_region_len,
            large_lists,
        }
    }

    /// Mapper over the shared small-list region.
    pub fn small_region_mapper(&self) -> PageMapper {
        PageMapper::new(Arc::clone(&self.small_region_pages))
    }

    /// Mapper over one large list's page chain.
    pub fn large_list_mapper(&self, list_index: u32) -> PageMapper {
        PageMapper::new(Arc::clone(&self.large_list(list_index).pages))
    }

    /// Element count of one large list.
    pub fn num_elements_in_large_list(&self, list_index: u32) -> u64 {
        self.large_list(list_index).num_elements
    }

    /// Total elements laid out in the shared small-list region.
    pub fn small_region_len(&self) -> u64 {
        self.small_region_len
    }

    /// Physical pages backing the small region. Builder-side only.
    pub fn small_region_pages(&self) -> &[PageId] {
        &self.small_region_pages
    }

    /// Number of large lists tracked by this snapshot.
    pub fn num_large_lists(&self) -> u32 {
        self.large_lists.len() as u32
    }

    /// Metadata entries for every large list. Builder-side only.
    pub fn large_lists(&self) -> &[LargeListMeta] {
        &self.large_lists
    }

    fn large_list(&self, list_index: u32) -> &LargeListMeta {
        // Headers and metadata are published together, so a dangling list
        // index is a programming error.
        self.large_lists
            .get(list_index as usize)
            .unwrap_or_else(|| panic!("large list index {list_index} out of range"))
    }
}
