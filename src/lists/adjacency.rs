//! Adjacency lists: neighbor node identifiers per node.
//!
//! Neighbor identifiers are stored compressed to a fixed width derived from
//! the relationship's schema. When every neighbor lives in one node table
//! the table component is elided entirely and only offsets are persisted.
//! Adjacency elements are never null, so adjacency pages carry no bitmap.

use std::sync::Arc;

use crate::lists::engine::Lists;
use crate::lists::handle::ListHandle;
use crate::lists::update_store::{ListsUpdateStore, UpdateElement};
use crate::pager::BufferManager;
use crate::transaction::Transaction;
use crate::types::{ListFileId, NodeId, NodeOffset, Result, TableId, VesperError};
use crate::vector::ValueVector;

fn bytes_for(max_value: u64) -> usize {
    let bits = 64 - max_value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

/// Fixed-width packed encoding of neighbor `(table, offset)` pairs.
#[derive(Clone, Debug)]
pub struct NodeIdCompression {
    common_table: TableId,
    table_bytes: usize,
    offset_bytes: usize,
}

impl NodeIdCompression {
    /// Derives the encoding from the neighbor tables a relationship may
    /// reach and the largest node offset any of them holds.
    pub fn new(neighbor_tables: &[TableId], max_offset: u64) -> Self {
        assert!(!neighbor_tables.is_empty(), "relationship reaches no tables");
        let common_table = neighbor_tables[0];
        let table_bytes = if neighbor_tables.len() == 1 {
            0
        } else {
            bytes_for(neighbor_tables.iter().map(|t| t.0).max().unwrap_or(0))
        };
        Self {
            common_table,
            table_bytes,
            offset_bytes: bytes_for(max_offset),
        }
    }

    /// Width of one encoded neighbor in bytes.
    pub fn element_size(&self) -> usize {
        self.table_bytes + self.offset_bytes
    }

    /// Encodes `id` into `out`, which must be exactly
    /// [`NodeIdCompression::element_size`] bytes. Identifiers wider than
    /// the widths fixed at construction are rejected; truncating them would
    /// persist a different node id.
    pub fn encode(&self, id: NodeId, out: &mut [u8]) -> Result<()> {
        debug_assert_eq!(out.len(), self.element_size());
        let table = id.table.0.to_le_bytes();
        let offset = id.offset.0.to_le_bytes();
        let table_fits = if self.table_bytes == 0 {
            id.table == self.common_table
        } else {
            table[self.table_bytes..].iter().all(|&b| b == 0)
        };
        if !table_fits || offset[self.offset_bytes..].iter().any(|&b| b != 0) {
            return Err(VesperError::Invalid(
                "neighbor id exceeds the file's encoded width",
            ));
        }
        out[..self.table_bytes].copy_from_slice(&table[..self.table_bytes]);
        out[self.table_bytes..].copy_from_slice(&offset[..self.offset_bytes]);
        Ok(())
    }

    /// Decodes one neighbor from its packed form.
    pub fn decode(&self, bytes: &[u8]) -> Result<NodeId> {
        if bytes.len() != self.element_size() {
            return Err(VesperError::Corruption("packed neighbor width mismatch"));
        }
        let mut table = [0u8; 8];
        table[..self.table_bytes].copy_from_slice(&bytes[..self.table_bytes]);
        let mut offset = [0u8; 8];
        offset[..self.offset_bytes].copy_from_slice(&bytes[self.table_bytes..]);
        let table = if self.table_bytes == 0 {
            self.common_table
        } else {
            TableId(u64::from_le_bytes(table))
        };
        Ok(NodeId {
            table,
            offset: NodeOffset(u64::from_le_bytes(offset)),
        })
    }
}

/// List file holding, for each node, its neighbors in one direction.
pub struct AdjLists {
    lists: Lists,
    compression: NodeIdCompression,
}

impl AdjLists {
    /// Opens the adjacency list file with the given neighbor encoding.
    pub fn new(
        file_id: ListFileId,
        buffers: Arc<BufferManager>,
        compression: NodeIdCompression,
        update_store: Arc<ListsUpdateStore>,
    ) -> Result<Self> {
        let lists = Lists::new(
            file_id,
            buffers,
            compression.element_size(),
            false,
            update_store,
        )?;
        Ok(Self { lists, compression })
    }

    /// Underlying list engine, for scans and rewrites.
    pub fn lists(&self) -> &Lists {
        &self.lists
    }

    /// Neighbor encoding in effect for this file.
    pub fn compression(&self) -> &NodeIdCompression {
        &self.compression
    }

    /// Neighbors `tx` observes for `node`, overlay included.
    pub fn num_neighbors(&self, tx: &Transaction, node: NodeOffset) -> u64 {
        self.lists.total_num_elements(tx, node)
    }

    /// Binds `handle` for a batched neighbor scan of `node`.
    pub fn init_scan(&self, tx: &Transaction, node: NodeOffset, handle: &mut ListHandle) {
        self.lists.init_scan(tx, node, handle)
    }

    /// Materializes the next batch of packed neighbors into `vector`.
    pub fn read_next(
        &self,
        tx: &Transaction,
        handle: &mut ListHandle,
        vector: &mut ValueVector,
    ) -> Result<bool> {
        self.lists.read_next(tx, handle, vector)
    }

    /// Reads and decodes `node`'s whole adjacency list, batch by batch.
    /// Interrupt status is polled between batches, so aborting a traversal
    /// over a long list never waits for the list to finish.
    pub fn read_full_adjacency_list(
        &self,
        tx: &Transaction,
        node: NodeOffset,
    ) -> Result<Vec<NodeId>> {
        let mut handle = ListHandle::new();
        self.init_scan(tx, node, &mut handle);
        let mut vector = ValueVector::new(self.compression.element_size());
        let mut neighbors = Vec::with_capacity(handle.total_num_elements() as usize);
        while self.read_next(tx, &mut handle, &mut vector)? {
            for pos in 0..vector.original_size() {
                neighbors.push(self.compression.decode(vector.slot(pos))?);
            }
        }
        Ok(neighbors)
    }

    /// Stages an insertion of `neighbor` into `node`'s list in the update
    /// overlay; nothing is persisted until commit rewrites the list. A
    /// neighbor the file's encoding cannot represent is rejected before it
    /// reaches the overlay.
    pub fn stage_insertion(&self, node: NodeOffset, neighbor: NodeId) -> Result<()> {
        let mut bytes = vec![0u8; self.compression.element_size()];
        self.compression.encode(neighbor, &mut bytes)?;
        self.lists.update_store().insert_element(
            self.lists.file_id(),
            node,
            UpdateElement {
                bytes,
                is_null: false,
                payload: None,
            },
        );
        Ok(())
    }
}
