//! Transaction-scoped overlay of uncommitted list mutations.
//!
//! One store instance is shared by every list file of a relationship table
//! within one write transaction. Entries are keyed by `(list file, node
//! offset)` and answer per-node questions in O(1) amortized, because every
//! scanned node consults the overlay once. A single mutex guards the store
//! and is held only across the lookup or mutation itself — never across a
//! page read.
//!
//! Deletion is asymmetric by design: elements already in the persistent
//! store are remembered by their relationship identifier (and later mapped
//! to positional offsets when a new list version is built), while deleting
//! an element inserted by this same transaction simply removes its row
//! reference from the insertion sequence. Persisted element offsets are
//! never affected by overlay-only deletions.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::trace;

use crate::lists::handle::ListHandle;
use crate::lists::in_mem::InMemList;
use crate::overflow::DiskOverflowFile;
use crate::types::{ListFileId, NodeOffset, RelId, Result, VesperError};
use crate::vector::ValueVector;

/// One pending inserted element, encoded exactly as the list file's on-disk
/// element format so reads cannot distinguish source by format. Var-len
/// element types carry their payload transaction-locally until commit writes
/// it to the overflow store.
#[derive(Clone, Debug)]
pub struct UpdateElement {
    /// Fixed-width element bytes in the file's element format.
    pub bytes: Vec<u8>,
    /// Whether the element is null.
    pub is_null: bool,
    /// Materialized variable-length payload, for string/nested elements.
    pub payload: Option<Vec<u8>>,
}

/// Result of deleting an element through the overlay.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeletionOutcome {
    /// The element was inserted by this transaction; its row reference was
    /// removed from the insertion sequence at the given ordinal.
    RemovedPendingInsertion(usize),
    /// The element lives in the persistent store; its identifier was
    /// recorded for exclusion at scan/commit time.
    MarkedDeletedInPersistentStore,
}

#[derive(Default)]
struct NodeUpdates {
    inserted_rows: SmallVec<[u64; 4]>,
    deleted_rel_ids: FxHashSet<i64>,
    newly_added: bool,
}

#[derive(Default)]
struct Inner {
    rows: Vec<UpdateElement>,
    per_node: FxHashMap<(ListFileId, NodeOffset), NodeUpdates>,
}

/// In-memory overlay of pending list insertions and deletions.
#[derive(Default)]
pub struct ListsUpdateStore {
    inner: Mutex<Inner>,
}

impl ListsUpdateStore {
    /// Empty overlay for a new write transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `node` was created by this transaction (it has no persisted
    /// header, so its persistent element count is zero by definition).
    pub fn is_newly_added_node(&self, file: ListFileId, node: NodeOffset) -> bool {
        self.inner
            .lock()
            .per_node
            .get(&(file, node))
            .is_some_and(|u| u.newly_added)
    }

    /// Records that `node` was created by this transaction.
    pub fn mark_newly_added_node(&self, file: ListFileId, node: NodeOffset) {
        self.inner
            .lock()
            .per_node
            .entry((file, node))
            .or_default()
            .newly_added = true;
    }

    /// Number of pending insertions for `node`.
    pub fn num_inserted(&self, file: ListFileId, node: NodeOffset) -> u64 {
        self.inner
            .lock()
            .per_node
            .get(&(file, node))
            .map_or(0, |u| u.inserted_rows.len() as u64)
    }

    /// Number of persistent-store elements marked deleted for `node`.
    pub fn num_deleted(&self, file: ListFileId, node: NodeOffset) -> u64 {
        self.inner
            .lock()
            .per_node
            .get(&(file, node))
            .map_or(0, |u| u.deleted_rel_ids.len() as u64)
    }

    /// Appends a pending insertion for `node` and returns its row index.
    pub fn insert_element(
        &self,
        file: ListFileId,
        node: NodeOffset,
        element: UpdateElement,
    ) -> u64 {
        let mut inner = self.inner.lock();
        let row = inner.rows.len() as u64;
        inner.rows.push(element);
        inner
            .per_node
            .entry((file, node))
            .or_default()
            .inserted_rows
            .push(row);
        trace!(file = file.0, node = node.0, row, "lists.update.insert");
        row
    }

    /// Deletes the element identified by `rel_id` from `node`'s list.
    ///
    /// If the element was inserted by this transaction (matched against the
    /// identifier encoded in the first eight bytes of the row, which is the
    /// element value itself for rel-id list files), its row reference is
    /// removed; otherwise the identifier is recorded as deleted in the
    /// persistent store.
    pub fn delete_element(
        &self,
        file: ListFileId,
        node: NodeOffset,
        rel_id: RelId,
    ) -> DeletionOutcome {
        let mut inner = self.inner.lock();
        let Inner { rows, per_node } = &mut *inner;
        let updates = per_node.entry((file, node)).or_default();
        let found = updates.inserted_rows.iter().position(|&row| {
            let bytes = &rows[row as usize].bytes;
            bytes.len() >= 8
                && i64::from_le_bytes(bytes[0..8].try_into().expect("8-byte slice")) == rel_id.0
        });
        match found {
            Some(ordinal) => {
                updates.inserted_rows.remove(ordinal);
                trace!(
                    file = file.0,
                    node = node.0,
                    rel = rel_id.0,
                    "lists.update.delete_pending"
                );
                DeletionOutcome::RemovedPendingInsertion(ordinal)
            }
            None => {
                updates.deleted_rel_ids.insert(rel_id.0);
                trace!(
                    file = file.0,
                    node = node.0,
                    rel = rel_id.0,
                    "lists.update.delete_persistent"
                );
                DeletionOutcome::MarkedDeletedInPersistentStore
            }
        }
    }

    /// Removes the pending insertion at `ordinal` within `node`'s insertion
    /// sequence. Used to keep sibling list files of the same relationship
    /// table aligned after [`ListsUpdateStore::delete_element`] removed the
    /// matching row from the identifier-carrying file.
    pub fn remove_insertion_at(&self, file: ListFileId, node: NodeOffset, ordinal: usize) {
        let mut inner = self.inner.lock();
        if let Some(updates) = inner.per_node.get_mut(&(file, node)) {
            if ordinal < updates.inserted_rows.len() {
                updates.inserted_rows.remove(ordinal);
            }
        }
    }

    /// Whether `rel_id` has been deleted from `node`'s persistent list.
    pub fn is_rel_deleted(&self, file: ListFileId, node: NodeOffset, rel_id: RelId) -> bool {
        self.inner
            .lock()
            .per_node
            .get(&(file, node))
            .is_some_and(|u| u.deleted_rel_ids.contains(&rel_id.0))
    }

    /// Whether `node` has any persistent-store deletions pending.
    pub fn has_deletions(&self, file: ListFileId, node: NodeOffset) -> bool {
        self.num_deleted(file, node) > 0
    }

    /// Pending insertion row references for `node`, in insertion order.
    pub fn inserted_row_refs(&self, file: ListFileId, node: NodeOffset) -> Vec<u64> {
        self.inner
            .lock()
            .per_node
            .get(&(file, node))
            .map_or_else(Vec::new, |u| u.inserted_rows.to_vec())
    }

    /// Nodes of `file` with any pending change, in ascending offset order.
    pub fn updated_nodes(&self, file: ListFileId) -> Vec<NodeOffset> {
        let inner = self.inner.lock();
        let mut nodes: Vec<NodeOffset> = inner
            .per_node
            .iter()
            .filter(|((f, _), u)| {
                *f == file
                    && (u.newly_added || !u.inserted_rows.is_empty() || !u.deleted_rel_ids.is_empty())
            })
            .map(|((_, node), _)| *node)
            .collect();
        nodes.sort_unstable();
        nodes
    }

    /// Whether the overlay holds any pending change at all.
    pub fn has_updates(&self) -> bool {
        let inner = self.inner.lock();
        inner.per_node.values().any(|u| {
            u.newly_added || !u.inserted_rows.is_empty() || !u.deleted_rel_ids.is_empty()
        })
    }

    /// Decodes the referenced rows into `dest` starting at
    /// `start_write_offset`. When `overflow` is provided, var-len payloads
    /// are written through it and the destination receives the resulting
    /// handle, so the staged list is indistinguishable from a persistent
    /// read.
    pub fn read_insertions(
        &self,
        _file: ListFileId,
        row_refs: &[u64],
        dest: &mut InMemList,
        start_write_offset: u64,
        overflow: Option<&DiskOverflowFile>,
    ) -> Result<()> {
        let element_size = dest.element_size();
        for (i, &row) in row_refs.iter().enumerate() {
            let (bytes, is_null, payload) = {
                let inner = self.inner.lock();
                let element = inner
                    .rows
                    .get(row as usize)
                    .ok_or(VesperError::Corruption("dangling update row reference"))?;
                (
                    element.bytes.clone(),
                    element.is_null,
                    element.payload.clone(),
                )
            };
            if bytes.len() != element_size {
                return Err(VesperError::Corruption("update row width mismatch"));
            }
            let pos = start_write_offset + i as u64;
            match (payload, overflow) {
                (Some(payload), Some(overflow)) => {
                    let vref = overflow.write(&payload)?;
                    vref.encode(dest.slot_mut(pos));
                }
                _ => dest.slot_mut(pos).copy_from_slice(&bytes),
            }
            if let Some(nulls) = dest.nulls_mut() {
                nulls.set_null(pos as usize, is_null);
            }
        }
        Ok(())
    }

    /// Copies the overlay elements covered by `handle`'s valid range into
    /// `vector`, materializing var-len payloads directly into the vector's
    /// auxiliary slots.
    pub fn read_values(
        &self,
        file: ListFileId,
        handle: &ListHandle,
        vector: &mut ValueVector,
    ) -> Result<()> {
        let begin = handle.start_elem_offset();
        let count = handle.end_elem_offset() - begin;
        self.read_range(file, handle.node_offset(), begin, count, vector)
    }

    /// Copies overlay elements `[begin, begin + count)` for `node` into the
    /// first `count` slots of `vector`.
    pub fn read_range(
        &self,
        file: ListFileId,
        node: NodeOffset,
        begin: u64,
        count: u64,
        vector: &mut ValueVector,
    ) -> Result<()> {
        let element_size = vector.element_size();
        let rows: Vec<u64> = {
            let inner = self.inner.lock();
            let Some(updates) = inner.per_node.get(&(file, node)) else {
                return if count == 0 {
                    Ok(())
                } else {
                    Err(VesperError::Corruption("overlay read on node without updates"))
                };
            };
            let end = (begin + count) as usize;
            if end > updates.inserted_rows.len() {
                return Err(VesperError::Corruption("overlay read beyond insertions"));
            }
            updates.inserted_rows[begin as usize..end].to_vec()
        };
        for (pos, &row) in rows.iter().enumerate() {
            let (bytes, is_null, payload) = {
                let inner = self.inner.lock();
                let element = inner
                    .rows
                    .get(row as usize)
                    .ok_or(VesperError::Corruption("dangling update row reference"))?;
                (
                    element.bytes.clone(),
                    element.is_null,
                    element.payload.clone(),
                )
            };
            if bytes.len() != element_size {
                return Err(VesperError::Corruption("update row width mismatch"));
            }
            vector.slot_mut(pos).copy_from_slice(&bytes);
            vector.set_null(pos, is_null);
            if let Some(payload) = payload {
                vector.set_aux(pos, payload);
            }
        }
        Ok(())
    }

    /// Discards every pending change. Called after commit folds the overlay
    /// into the persistent store, or on rollback.
    pub fn drain(&self) {
        let mut inner = self.inner.lock();
        inner.rows.clear();
        inner.per_node.clear();
        trace!("lists.update.drain");
    }
}
