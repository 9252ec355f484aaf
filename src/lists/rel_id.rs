//! Relationship-identifier lists and transaction-aware deletion filtering.
//!
//! Each direction of a relationship table keeps a list of relationship
//! identifiers aligned element-for-element with its adjacency and property
//! lists. Deletions of persisted relationships are tracked by identifier in
//! the update overlay; this module maps them back to positional offsets, both
//! to narrow scan batches through the selection vector and to tell a commit
//! rewrite which elements to drop.

use std::sync::Arc;

use crate::lists::engine::Lists;
use crate::lists::handle::{ListHandle, ListSourceStore};
use crate::lists::update_store::{DeletionOutcome, ListsUpdateStore, UpdateElement};
use crate::pager::BufferManager;
use crate::transaction::Transaction;
use crate::types::{ListFileId, NodeOffset, RelId, Result};
use crate::vector::ValueVector;

/// List file holding each node's relationship identifiers.
pub struct RelIdList {
    lists: Lists,
}

impl RelIdList {
    /// Opens the relationship-identifier list file. Identifiers are 8-byte
    /// values and never null.
    pub fn new(
        file_id: ListFileId,
        buffers: Arc<BufferManager>,
        update_store: Arc<ListsUpdateStore>,
    ) -> Result<Self> {
        Ok(Self {
            lists: Lists::new(file_id, buffers, 8, false, update_store)?,
        })
    }

    /// Underlying list engine.
    pub fn lists(&self) -> &Lists {
        &self.lists
    }

    /// Binds `handle` for a batched identifier scan of `node`.
    pub fn init_scan(&self, tx: &Transaction, node: NodeOffset, handle: &mut ListHandle) {
        self.lists.init_scan(tx, node, handle)
    }

    /// Materializes the next identifier batch and, in a write transaction,
    /// filters out identifiers this transaction has deleted by rewriting the
    /// vector's selection. The data buffer and element count are untouched,
    /// keeping positions aligned with sibling list files.
    pub fn read_next(
        &self,
        tx: &Transaction,
        handle: &mut ListHandle,
        vector: &mut ValueVector,
    ) -> Result<bool> {
        if !self.lists.read_next(tx, handle, vector)? {
            return Ok(false);
        }
        self.prune_deleted(tx, handle, vector)?;
        Ok(true)
    }

    fn prune_deleted(
        &self,
        tx: &Transaction,
        handle: &ListHandle,
        vector: &mut ValueVector,
    ) -> Result<()> {
        // Overlay batches never contain deleted rows; deleting a pending
        // insertion removes it from the overlay outright.
        if tx.is_read_only() || handle.source() != ListSourceStore::Persistent {
            return Ok(());
        }
        let store = self.lists.update_store();
        let (file, node) = (self.lists.file_id(), handle.node_offset());
        if !store.has_deletions(file, node) {
            return Ok(());
        }
        let mut kept: Vec<u32> = Vec::with_capacity(vector.original_size());
        for pos in 0..vector.original_size() {
            let rel = RelId(vector.get_i64(pos)?);
            if !store.is_rel_deleted(file, node, rel) {
                kept.push(pos as u32);
            }
        }
        if kept.len() < vector.original_size() {
            vector.sel.set_filtered(&kept);
        }
        Ok(())
    }

    /// Positional offsets, ascending, of the persisted elements this
    /// transaction has deleted from `node`'s list. Commit rewrites feed
    /// these to every sibling list file so they all drop the same rows.
    pub fn deleted_offsets_for_node(
        &self,
        tx: &Transaction,
        node: NodeOffset,
    ) -> Result<Vec<u64>> {
        let store = self.lists.update_store();
        if !store.has_deletions(self.lists.file_id(), node) {
            return Ok(Vec::new());
        }
        let mut handle = ListHandle::new();
        self.lists.init_scan(tx, node, &mut handle);
        let mut vector = ValueVector::new(8);
        let mut offsets = Vec::new();
        while self.lists.read_next(tx, &mut handle, &mut vector)? {
            if handle.source() != ListSourceStore::Persistent {
                break;
            }
            let base = handle.start_elem_offset();
            for pos in 0..vector.original_size() {
                let rel = RelId(vector.get_i64(pos)?);
                if store.is_rel_deleted(self.lists.file_id(), node, rel) {
                    offsets.push(base + pos as u64);
                }
            }
        }
        Ok(offsets)
    }

    /// Stages an inserted relationship identifier in the update overlay.
    pub fn stage_insertion(&self, node: NodeOffset, rel_id: RelId) {
        self.lists.update_store().insert_element(
            self.lists.file_id(),
            node,
            UpdateElement {
                bytes: rel_id.0.to_le_bytes().to_vec(),
                is_null: false,
                payload: None,
            },
        );
    }

    /// Deletes `rel_id` from `node`'s list through the overlay and reports
    /// whether a pending insertion was removed or a persisted element was
    /// marked deleted.
    pub fn stage_deletion(&self, node: NodeOffset, rel_id: RelId) -> DeletionOutcome {
        self.lists
            .update_store()
            .delete_element(self.lists.file_id(), node, rel_id)
    }
}
