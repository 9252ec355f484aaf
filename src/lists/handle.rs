//! Per-scan cursor state.
//!
//! A [`ListHandle`] is private to one scan on one thread. It records which
//! source store the scan is currently draining, the element range already
//! materialized, and the page mapper for the current list. It is reset and
//! re-initialized when the caller moves to another node; nothing here is
//! ever persisted.

use crate::lists::cursor::PageMapper;
use crate::lists::header::ListHeader;
use crate::types::NodeOffset;

/// Which store a scan batch is served from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ListSourceStore {
    /// Durable, page-based committed list data.
    Persistent,
    /// In-memory overlay of this transaction's pending insertions.
    Update,
}

/// Mutable per-scan state, one per logical scan.
pub struct ListHandle {
    node_offset: NodeOffset,
    header: ListHeader,
    source: ListSourceStore,
    start_elem_offset: u64,
    end_elem_offset: u64,
    has_range: bool,
    num_persistent: u64,
    num_update: u64,
    mapper: Option<PageMapper>,
}

impl Default for ListHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ListHandle {
    /// Fresh handle with no scan in progress.
    pub fn new() -> Self {
        Self {
            node_offset: NodeOffset(0),
            header: ListHeader::Uninitialized,
            source: ListSourceStore::Persistent,
            start_elem_offset: 0,
            end_elem_offset: 0,
            has_range: false,
            num_persistent: 0,
            num_update: 0,
            mapper: None,
        }
    }

    /// Clears all scan state so the handle can be reused for another node.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub(crate) fn init(
        &mut self,
        node_offset: NodeOffset,
        header: ListHeader,
        num_update: u64,
        num_persistent: u64,
        source: ListSourceStore,
    ) {
        self.reset();
        self.node_offset = node_offset;
        self.header = header;
        self.num_update = num_update;
        self.num_persistent = num_persistent;
        self.source = source;
    }

    /// Node this scan is bound to.
    pub fn node_offset(&self) -> NodeOffset {
        self.node_offset
    }

    /// Header resolved at initialization; immutable for the handle's life.
    pub fn header(&self) -> ListHeader {
        self.header
    }

    /// Store the next batch will be served from.
    pub fn source(&self) -> ListSourceStore {
        self.source
    }

    /// Elements in the persistent store for this node (transaction-aware).
    pub fn num_persistent(&self) -> u64 {
        self.num_persistent
    }

    /// Pending overlay insertions for this node.
    pub fn num_update(&self) -> u64 {
        self.num_update
    }

    /// Total logical elements the scan will return.
    pub fn total_num_elements(&self) -> u64 {
        self.num_persistent + self.num_update
    }

    /// Elements in the source store the handle currently points at.
    pub fn num_in_current_source(&self) -> u64 {
        match self.source {
            ListSourceStore::Persistent => self.num_persistent,
            ListSourceStore::Update => self.num_update,
        }
    }

    /// Whether a batch has been materialized since (re)initialization.
    pub fn has_valid_range(&self) -> bool {
        self.has_range
    }

    /// Start of the last materialized range within the current source.
    pub fn start_elem_offset(&self) -> u64 {
        self.start_elem_offset
    }

    /// Exclusive end of the last materialized range.
    pub fn end_elem_offset(&self) -> u64 {
        self.end_elem_offset
    }

    /// Records the range just materialized. Only called after a batch copy
    /// succeeds, so a failed batch never advances the scan.
    pub fn set_range(&mut self, start: u64, count: u64) {
        debug_assert!(
            start + count <= self.num_in_current_source(),
            "range beyond current source"
        );
        self.start_elem_offset = start;
        self.end_elem_offset = start + count;
        self.has_range = true;
    }

    /// Switches the handle from the persistent store to the update overlay,
    /// clearing the range so the overlay starts at element zero.
    pub(crate) fn switch_to_update_store(&mut self) {
        debug_assert_eq!(self.source, ListSourceStore::Persistent);
        self.source = ListSourceStore::Update;
        self.start_elem_offset = 0;
        self.end_elem_offset = 0;
        self.has_range = false;
        self.mapper = None;
    }

    pub(crate) fn set_mapper(&mut self, mapper: PageMapper) {
        self.mapper = Some(mapper);
    }

    /// Page mapper for the current persistent list.
    pub fn mapper(&self) -> &PageMapper {
        self.mapper
            .as_ref()
            .expect("mapper not initialized; first persistent read missing")
    }
}
