//! Core list engine: transaction-aware scans and versioned rewrites.
//!
//! One [`Lists`] instance owns a single list file. Reads resolve the node's
//! header once per scan against immutable snapshots, then stream batches
//! through a caller-owned [`ListHandle`]; the persistent store is always
//! drained before the transaction's update overlay. Writes never touch pages
//! a published snapshot references: a [`ListFileWriter`] stages new pages and
//! swaps in a fresh header/metadata snapshot atomically on publish.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::lists::cursor::{PageElementCursor, PageMapper};
use crate::lists::handle::{ListHandle, ListSourceStore};
use crate::lists::header::{ListHeader, ListHeaders, SMALL_CSR_MASK, SMALL_LIST_CAPACITY};
use crate::lists::in_mem::InMemList;
use crate::lists::layout::ListLayout;
use crate::lists::metadata::{LargeListMeta, ListsMetadata};
use crate::lists::update_store::ListsUpdateStore;
use crate::overflow::DiskOverflowFile;
use crate::pager::BufferManager;
use crate::transaction::Transaction;
use crate::types::{ListFileId, NodeOffset, PageId, Result, VesperError};
use crate::vector::ValueVector;

/// Interrupt poll granularity for per-element rewrite loops, in elements.
const INTERRUPT_POLL_STRIDE: u64 = 1024;

/// One list file: per-node variable-length lists over a shared page cache.
pub struct Lists {
    file_id: ListFileId,
    layout: ListLayout,
    buffers: Arc<BufferManager>,
    update_store: Arc<ListsUpdateStore>,
    // Lock order: headers before metadata. Both are swapped together on
    // publish and cloned together at scan initialization.
    headers: RwLock<Arc<ListHeaders>>,
    metadata: RwLock<Arc<ListsMetadata>>,
}

impl Lists {
    /// Creates the engine for one list file with elements of `element_size`
    /// bytes, starting from empty snapshots.
    pub fn new(
        file_id: ListFileId,
        buffers: Arc<BufferManager>,
        element_size: usize,
        has_nulls: bool,
        update_store: Arc<ListsUpdateStore>,
    ) -> Result<Self> {
        let layout = ListLayout::new(buffers.page_size(), element_size, has_nulls)?;
        Ok(Self {
            file_id,
            layout,
            buffers,
            update_store,
            headers: RwLock::new(Arc::new(ListHeaders::new())),
            metadata: RwLock::new(Arc::new(ListsMetadata::empty())),
        })
    }

    /// Identifier of this list file.
    pub fn file_id(&self) -> ListFileId {
        self.file_id
    }

    /// Page layout of this list file.
    pub fn layout(&self) -> &ListLayout {
        &self.layout
    }

    /// Fixed element width in bytes.
    pub fn element_size(&self) -> usize {
        self.layout.element_size()
    }

    /// Shared page cache backing this file.
    pub fn buffers(&self) -> &Arc<BufferManager> {
        &self.buffers
    }

    /// Update overlay shared by the list files of this table.
    pub fn update_store(&self) -> &Arc<ListsUpdateStore> {
        &self.update_store
    }

    fn snapshots(&self) -> (Arc<ListHeaders>, Arc<ListsMetadata>) {
        let headers = self.headers.read();
        let metadata = self.metadata.read();
        (Arc::clone(&headers), Arc::clone(&metadata))
    }

    fn resolve_header(&self, tx: &Transaction, node: NodeOffset, headers: &ListHeaders) -> ListHeader {
        if !tx.is_read_only() && self.update_store.is_newly_added_node(self.file_id, node) {
            ListHeader::Uninitialized
        } else {
            headers.header(node)
        }
    }

    /// Elements of `node`'s list in the persistent store, as visible to `tx`.
    pub fn num_persistent_elements(&self, tx: &Transaction, node: NodeOffset) -> u64 {
        let (headers, metadata) = self.snapshots();
        let header = self.resolve_header(tx, node, &headers);
        Self::persistent_len(header, &metadata)
    }

    /// Total elements `tx` will observe for `node`, overlay included.
    pub fn total_num_elements(&self, tx: &Transaction, node: NodeOffset) -> u64 {
        self.num_persistent_elements(tx, node) + self.num_update_elements(tx, node)
    }

    fn num_update_elements(&self, tx: &Transaction, node: NodeOffset) -> u64 {
        if tx.is_read_only() {
            0
        } else {
            self.update_store.num_inserted(self.file_id, node)
        }
    }

    fn persistent_len(header: ListHeader, metadata: &ListsMetadata) -> u64 {
        match header {
            ListHeader::Small { len, .. } => u64::from(len),
            ListHeader::Large { list_index } => metadata.num_elements_in_large_list(list_index),
            ListHeader::Uninitialized => 0,
        }
    }

    /// Binds `handle` to `node` for a fresh scan. The header, element
    /// counts, and page mapping are resolved once here and stay fixed for
    /// the handle's lifetime, so a concurrent publish never tears a scan.
    pub fn init_scan(&self, tx: &Transaction, node: NodeOffset, handle: &mut ListHandle) {
        let (headers, metadata) = self.snapshots();
        let header = self.resolve_header(tx, node, &headers);
        let num_persistent = Self::persistent_len(header, &metadata);
        let num_update = self.num_update_elements(tx, node);
        let source = if num_persistent > 0 {
            ListSourceStore::Persistent
        } else {
            ListSourceStore::Update
        };
        handle.init(node, header, num_update, num_persistent, source);
        match header {
            ListHeader::Small { .. } => handle.set_mapper(metadata.small_region_mapper()),
            ListHeader::Large { list_index } => {
                handle.set_mapper(metadata.large_list_mapper(list_index))
            }
            ListHeader::Uninitialized => {}
        }
        trace!(
            file = self.file_id.0,
            node = node.0,
            persistent = num_persistent,
            update = num_update,
            "lists.scan.init"
        );
    }

    /// Materializes the next batch of `node`'s list into `vector`.
    ///
    /// Batches never overlap and always advance; the persistent store is
    /// exhausted before the overlay is served. Small lists arrive as one
    /// batch; large-list batches stop at page boundaries. Returns `false`
    /// once the scan is exhausted, leaving `vector` untouched.
    pub fn read_next(
        &self,
        tx: &Transaction,
        handle: &mut ListHandle,
        vector: &mut ValueVector,
    ) -> Result<bool> {
        tx.check_interrupted()?;
        let mut start = if handle.has_valid_range() {
            handle.end_elem_offset()
        } else {
            0
        };
        if start >= handle.num_in_current_source() {
            if handle.source() == ListSourceStore::Persistent && handle.num_update() > 0 {
                handle.switch_to_update_store();
                start = 0;
            } else {
                return Ok(false);
            }
        }
        let remaining = handle.num_in_current_source() - start;
        let capacity = vector.capacity() as u64;
        let count = match handle.source() {
            ListSourceStore::Update => remaining.min(capacity),
            ListSourceStore::Persistent => match handle.header() {
                ListHeader::Small { .. } => remaining.min(capacity),
                ListHeader::Large { .. } => {
                    let epp = self.layout.elements_per_page() as u64;
                    remaining.min(capacity).min(epp - start % epp)
                }
                ListHeader::Uninitialized => unreachable!("persistent scan without header"),
            },
        };
        vector.reset();
        match handle.source() {
            ListSourceStore::Persistent => {
                let base = match handle.header() {
                    ListHeader::Small { csr_offset, .. } => u64::from(csr_offset),
                    _ => 0,
                };
                let mapper = handle.mapper().clone();
                self.read_by_sequential_copy(&mapper, base + start, count, vector)?;
            }
            ListSourceStore::Update => self.update_store.read_range(
                self.file_id,
                handle.node_offset(),
                start,
                count,
                vector,
            )?,
        }
        vector.set_original_size(count as usize);
        handle.set_range(start, count);
        trace!(
            file = self.file_id.0,
            node = handle.node_offset().0,
            start,
            count,
            source = ?handle.source(),
            "lists.scan.batch"
        );
        Ok(true)
    }

    fn read_by_sequential_copy(
        &self,
        mapper: &PageMapper,
        linear_start: u64,
        count: u64,
        vector: &mut ValueVector,
    ) -> Result<()> {
        let epp = self.layout.elements_per_page();
        let element_size = self.layout.element_size();
        let mut cursor = PageElementCursor::for_pos(linear_start, epp);
        let mut copied = 0usize;
        while (copied as u64) < count {
            let in_page = (epp - cursor.elem_pos_in_page).min(count as usize - copied);
            let frame = self.buffers.pin(mapper.resolve(cursor.page_idx))?;
            frame.with(|data| {
                let src = self.layout.elem_byte_offset(cursor.elem_pos_in_page);
                let bytes = in_page * element_size;
                vector
                    .slots_mut(copied, in_page)
                    .copy_from_slice(&data[src..src + bytes]);
                if self.layout.has_nulls() {
                    vector.nulls_mut().copy_from_packed(
                        &data[..self.layout.bitmap_bytes()],
                        cursor.elem_pos_in_page,
                        copied,
                        in_page,
                    );
                }
            });
            copied += in_page;
            cursor.advance_to_next_page();
        }
        Ok(())
    }

    fn copy_range_to_in_mem(
        &self,
        tx: &Transaction,
        mapper: &PageMapper,
        linear_start: u64,
        count: u64,
        dest: &mut InMemList,
        dest_start: u64,
    ) -> Result<()> {
        let epp = self.layout.elements_per_page();
        let element_size = self.layout.element_size();
        let mut cursor = PageElementCursor::for_pos(linear_start, epp);
        let mut copied = 0u64;
        while copied < count {
            tx.check_interrupted()?;
            let in_page = ((epp - cursor.elem_pos_in_page) as u64).min(count - copied);
            let frame = self.buffers.pin(mapper.resolve(cursor.page_idx))?;
            frame.with(|data| {
                let src = self.layout.elem_byte_offset(cursor.elem_pos_in_page);
                let dst = (dest_start + copied) as usize * element_size;
                let bytes = in_page as usize * element_size;
                dest.data_mut()[dst..dst + bytes].copy_from_slice(&data[src..src + bytes]);
                if self.layout.has_nulls() {
                    for i in 0..in_page as usize {
                        let null = self.layout.is_null_in_page(data, cursor.elem_pos_in_page + i);
                        if let Some(nulls) = dest.nulls_mut() {
                            nulls.set_null((dest_start + copied) as usize + i, null);
                        }
                    }
                }
            });
            copied += in_page;
            cursor.advance_to_next_page();
        }
        Ok(())
    }

    /// Builds the next version of `node`'s list: persistent elements minus
    /// `deleted_offsets` (list-local positions), followed by this
    /// transaction's insertions. With no deletions the persistent prefix is
    /// bulk-copied page by page; otherwise surviving elements are gathered
    /// one at a time. Var-len insertion payloads are written through
    /// `overflow` so the staged list holds real overflow handles.
    pub fn rebuild_list_for_write(
        &self,
        tx: &Transaction,
        node: NodeOffset,
        deleted_offsets: &[u64],
        overflow: Option<&DiskOverflowFile>,
    ) -> Result<InMemList> {
        let mut handle = ListHandle::new();
        self.init_scan(tx, node, &mut handle);
        let num_persistent = handle.num_persistent();
        let deleted: FxHashSet<u64> = deleted_offsets.iter().copied().collect();
        if deleted.iter().any(|&off| off >= num_persistent) {
            return Err(VesperError::Invalid(
                "deleted offset beyond the persistent list",
            ));
        }
        let inserted = self.update_store.inserted_row_refs(self.file_id, node);
        let kept = num_persistent - deleted.len() as u64;
        let total = kept + inserted.len() as u64;
        let mut list = InMemList::new(total, self.element_size(), self.layout.has_nulls());
        let mut write_pos = 0u64;
        if num_persistent > 0 {
            let base = match handle.header() {
                ListHeader::Small { csr_offset, .. } => u64::from(csr_offset),
                _ => 0,
            };
            let mapper = handle.mapper().clone();
            if deleted.is_empty() {
                self.copy_range_to_in_mem(tx, &mapper, base, num_persistent, &mut list, 0)?;
                write_pos = num_persistent;
            } else {
                for off in 0..num_persistent {
                    if off % INTERRUPT_POLL_STRIDE == 0 {
                        tx.check_interrupted()?;
                    }
                    if deleted.contains(&off) {
                        continue;
                    }
                    self.copy_range_to_in_mem(tx, &mapper, base + off, 1, &mut list, write_pos)?;
                    write_pos += 1;
                }
            }
        }
        self.update_store
            .read_insertions(self.file_id, &inserted, &mut list, write_pos, overflow)?;
        trace!(
            file = self.file_id.0,
            node = node.0,
            kept,
            inserted = inserted.len(),
            "lists.rebuild"
        );
        Ok(list)
    }

    /// Folds this transaction's pending changes into the persistent store:
    /// every updated node's list is rebuilt (minus the caller-supplied
    /// deleted offsets, typically from
    /// [`RelIdList::deleted_offsets_for_node`]) and the resulting versions
    /// are published as one snapshot. The overlay is left intact; the
    /// table-level commit drains it once every sibling list file has
    /// committed.
    ///
    /// [`RelIdList::deleted_offsets_for_node`]: crate::lists::rel_id::RelIdList::deleted_offsets_for_node
    pub fn commit(
        &self,
        tx: &Transaction,
        deleted_offsets_by_node: &FxHashMap<NodeOffset, Vec<u64>>,
        overflow: Option<&DiskOverflowFile>,
    ) -> Result<()> {
        let nodes = self.update_store.updated_nodes(self.file_id);
        if nodes.is_empty() {
            return Ok(());
        }
        let mut writer = ListFileWriter::begin(self);
        let no_deletions = Vec::new();
        for node in nodes {
            let deleted = deleted_offsets_by_node.get(&node).unwrap_or(&no_deletions);
            let rebuilt = self.rebuild_list_for_write(tx, node, deleted, overflow)?;
            writer.write_list(node, &rebuilt)?;
        }
        writer.publish()
    }

    /// Builds a list version containing only this transaction's insertions,
    /// for nodes with no persistent list.
    pub fn rebuild_from_update_store_only(
        &self,
        node: NodeOffset,
        overflow: Option<&DiskOverflowFile>,
    ) -> Result<InMemList> {
        let inserted = self.update_store.inserted_row_refs(self.file_id, node);
        let mut list = InMemList::new(
            inserted.len() as u64,
            self.element_size(),
            self.layout.has_nulls(),
        );
        self.update_store
            .read_insertions(self.file_id, &inserted, &mut list, 0, overflow)?;
        Ok(list)
    }
}

/// Stages the next snapshot of one list file.
///
/// The writer clones the current headers and metadata, appends new element
/// data into freshly allocated pages (the small region grows at its tail;
/// each rewritten large list gets a new page chain), and publishes the
/// result atomically. Pages referenced by the previous snapshot are never
/// modified, so in-flight scans keep reading consistent data.
pub struct ListFileWriter<'a> {
    lists: &'a Lists,
    headers: ListHeaders,
    small_pages: Vec<PageId>,
    small_len: u64,
    large_lists: Vec<LargeListMeta>,
}

impl<'a> ListFileWriter<'a> {
    /// Starts a staged rewrite from the currently published snapshot.
    pub fn begin(lists: &'a Lists) -> Self {
        let (headers, metadata) = lists.snapshots();
        Self {
            lists,
            headers: (*headers).clone(),
            small_pages: metadata.small_region_pages().to_vec(),
            small_len: metadata.small_region_len(),
            large_lists: metadata.large_lists().to_vec(),
        }
    }

    /// Installs `list` as the staged version of `node`'s list, classifying
    /// it as small or large by element count. A list that would start past
    /// the header's addressable CSR range is stored as large regardless of
    /// its length; the shared region only ever grows, so a long-lived file
    /// can exhaust it through normal rewrites.
    pub fn write_list(&mut self, node: NodeOffset, list: &InMemList) -> Result<()> {
        let csr = self.small_len;
        if list.num_elements() <= u64::from(SMALL_LIST_CAPACITY)
            && csr <= u64::from(SMALL_CSR_MASK)
        {
            let mut pages = std::mem::take(&mut self.small_pages);
            self.write_elements(&mut pages, csr, list)?;
            self.small_pages = pages;
            self.small_len = csr + list.num_elements();
            self.headers.set_header(
                node,
                ListHeader::Small {
                    csr_offset: csr as u32,
                    len: list.num_elements() as u16,
                },
            );
        } else {
            let mut pages = Vec::new();
            self.write_elements(&mut pages, 0, list)?;
            let list_index = self.large_lists.len() as u32;
            self.large_lists.push(LargeListMeta {
                num_elements: list.num_elements(),
                pages: Arc::from(pages),
            });
            self.headers
                .set_header(node, ListHeader::Large { list_index });
        }
        Ok(())
    }

    fn write_elements(
        &self,
        pages: &mut Vec<PageId>,
        linear_start: u64,
        list: &InMemList,
    ) -> Result<()> {
        let layout = self.lists.layout();
        let epp = layout.elements_per_page();
        let element_size = layout.element_size();
        let mut cursor = PageElementCursor::for_pos(linear_start, epp);
        let mut written = 0u64;
        while written < list.num_elements() {
            while cursor.page_idx >= pages.len() {
                pages.push(self.lists.buffers().allocate_page()?);
            }
            let in_page =
                ((epp - cursor.elem_pos_in_page) as u64).min(list.num_elements() - written);
            self.lists.buffers().write_page(pages[cursor.page_idx], |data| {
                let dst = layout.elem_byte_offset(cursor.elem_pos_in_page);
                let src = written as usize * element_size;
                let bytes = in_page as usize * element_size;
                data[dst..dst + bytes].copy_from_slice(&list.data()[src..src + bytes]);
                if layout.has_nulls() {
                    for i in 0..in_page as usize {
                        let null = list
                            .nulls()
                            .map(|nulls| nulls.is_null(written as usize + i))
                            .unwrap_or(false);
                        layout.set_null_in_page(data, cursor.elem_pos_in_page + i, null);
                    }
                }
            })?;
            written += in_page;
            cursor.advance_to_next_page();
        }
        Ok(())
    }

    /// Flushes staged pages and swaps the new headers and metadata snapshot
    /// in as one publication.
    pub fn publish(self) -> Result<()> {
        self.lists.buffers().flush()?;
        let metadata = ListsMetadata::new(self.small_pages, self.small_len, self.large_lists);
        let mut headers = self.lists.headers.write();
        let mut meta = self.lists.metadata.write();
        *headers = Arc::new(self.headers);
        *meta = Arc::new(metadata);
        trace!(file = self.lists.file_id().0, "lists.writer.publish");
        Ok(())
    }
}
