//! Property lists: one value per relationship, aligned with the adjacency
//! list of the same direction.
//!
//! Fixed-width property values live directly in the list pages. String and
//! nested-list values store a fixed-width overflow handle instead; after a
//! batch is materialized, the handles are resolved against the overflow
//! store in a second pass. All property lists carry null bitmaps.

use std::sync::Arc;

use crate::lists::engine::Lists;
use crate::lists::handle::ListHandle;
use crate::lists::update_store::{ListsUpdateStore, UpdateElement};
use crate::overflow::{DiskOverflowFile, OVF_REF_LEN};
use crate::pager::BufferManager;
use crate::transaction::Transaction;
use crate::types::{ListFileId, NodeOffset, Result};
use crate::vector::ValueVector;

/// List file holding fixed-width property values.
pub struct PropertyLists {
    lists: Lists,
}

impl PropertyLists {
    /// Opens a property list file with elements of `element_size` bytes.
    pub fn new(
        file_id: ListFileId,
        buffers: Arc<BufferManager>,
        element_size: usize,
        update_store: Arc<ListsUpdateStore>,
    ) -> Result<Self> {
        Ok(Self {
            lists: Lists::new(file_id, buffers, element_size, true, update_store)?,
        })
    }

    /// Underlying list engine.
    pub fn lists(&self) -> &Lists {
        &self.lists
    }

    /// Binds `handle` for a batched scan of `node`'s property list.
    pub fn init_scan(&self, tx: &Transaction, node: NodeOffset, handle: &mut ListHandle) {
        self.lists.init_scan(tx, node, handle)
    }

    /// Materializes the next batch of property values into `vector`.
    pub fn read_next(
        &self,
        tx: &Transaction,
        handle: &mut ListHandle,
        vector: &mut ValueVector,
    ) -> Result<bool> {
        self.lists.read_next(tx, handle, vector)
    }

    /// Stages an inserted property value in the update overlay.
    pub fn stage_insertion(&self, node: NodeOffset, bytes: Vec<u8>, is_null: bool) {
        self.lists.update_store().insert_element(
            self.lists.file_id(),
            node,
            UpdateElement {
                bytes,
                is_null,
                payload: None,
            },
        );
    }
}

/// List file holding string property values behind overflow handles.
pub struct StringPropertyLists {
    inner: PropertyLists,
    overflow: Arc<DiskOverflowFile>,
}

impl StringPropertyLists {
    /// Opens a string property list file backed by `overflow`.
    pub fn new(
        file_id: ListFileId,
        buffers: Arc<BufferManager>,
        overflow: Arc<DiskOverflowFile>,
        update_store: Arc<ListsUpdateStore>,
    ) -> Result<Self> {
        Ok(Self {
            inner: PropertyLists::new(file_id, buffers, OVF_REF_LEN, update_store)?,
            overflow,
        })
    }

    /// Underlying list engine.
    pub fn lists(&self) -> &Lists {
        self.inner.lists()
    }

    /// Overflow store holding the string payloads.
    pub fn overflow(&self) -> &Arc<DiskOverflowFile> {
        &self.overflow
    }

    /// Binds `handle` for a batched scan of `node`'s string list.
    pub fn init_scan(&self, tx: &Transaction, node: NodeOffset, handle: &mut ListHandle) {
        self.inner.init_scan(tx, node, handle)
    }

    /// Materializes the next batch and resolves every non-null string into
    /// the vector's auxiliary slots. Overlay-sourced values arrive already
    /// materialized and are left as they are.
    pub fn read_next(
        &self,
        tx: &Transaction,
        handle: &mut ListHandle,
        vector: &mut ValueVector,
    ) -> Result<bool> {
        if !self.inner.read_next(tx, handle, vector)? {
            return Ok(false);
        }
        self.overflow.read_strings_to_vector(tx, vector)?;
        Ok(true)
    }

    /// Stages an inserted string value. The payload stays transaction-local
    /// until commit writes it through the overflow store.
    pub fn stage_insertion(&self, node: NodeOffset, value: &str) {
        self.lists().update_store().insert_element(
            self.lists().file_id(),
            node,
            UpdateElement {
                bytes: vec![0u8; OVF_REF_LEN],
                is_null: false,
                payload: Some(value.as_bytes().to_vec()),
            },
        );
    }

    /// Stages an inserted null.
    pub fn stage_null(&self, node: NodeOffset) {
        self.lists().update_store().insert_element(
            self.lists().file_id(),
            node,
            UpdateElement {
                bytes: vec![0u8; OVF_REF_LEN],
                is_null: true,
                payload: None,
            },
        );
    }
}

/// List file holding nested-list property values behind overflow handles.
/// The payload bytes are the packed child list.
pub struct ListPropertyLists {
    inner: PropertyLists,
    overflow: Arc<DiskOverflowFile>,
}

impl ListPropertyLists {
    /// Opens a nested-list property file backed by `overflow`.
    pub fn new(
        file_id: ListFileId,
        buffers: Arc<BufferManager>,
        overflow: Arc<DiskOverflowFile>,
        update_store: Arc<ListsUpdateStore>,
    ) -> Result<Self> {
        Ok(Self {
            inner: PropertyLists::new(file_id, buffers, OVF_REF_LEN, update_store)?,
            overflow,
        })
    }

    /// Underlying list engine.
    pub fn lists(&self) -> &Lists {
        self.inner.lists()
    }

    /// Overflow store holding the child-list payloads.
    pub fn overflow(&self) -> &Arc<DiskOverflowFile> {
        &self.overflow
    }

    /// Binds `handle` for a batched scan of `node`'s list-valued list.
    pub fn init_scan(&self, tx: &Transaction, node: NodeOffset, handle: &mut ListHandle) {
        self.inner.init_scan(tx, node, handle)
    }

    /// Materializes the next batch and resolves every non-null child list.
    pub fn read_next(
        &self,
        tx: &Transaction,
        handle: &mut ListHandle,
        vector: &mut ValueVector,
    ) -> Result<bool> {
        if !self.inner.read_next(tx, handle, vector)? {
            return Ok(false);
        }
        self.overflow.read_lists_to_vector(tx, vector)?;
        Ok(true)
    }

    /// Stages an inserted child list as its packed payload bytes.
    pub fn stage_insertion(&self, node: NodeOffset, packed_child: Vec<u8>) {
        self.lists().update_store().insert_element(
            self.lists().file_id(),
            node,
            UpdateElement {
                bytes: vec![0u8; OVF_REF_LEN],
                is_null: false,
                payload: Some(packed_child),
            },
        );
    }
}
