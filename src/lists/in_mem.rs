//! Whole-list materialization buffer for the write path.

use crate::vector::NullMask;

/// A node's full list staged in memory (persistent elements minus deletions,
/// then pending insertions) before it is flushed back as a new persisted
/// version. Owned exclusively by the caller that requested it.
pub struct InMemList {
    element_size: usize,
    num_elements: u64,
    data: Vec<u8>,
    nulls: Option<NullMask>,
}

impl InMemList {
    /// Allocates a buffer for `num_elements` elements of `element_size`
    /// bytes, with a null mask when the list may contain nulls.
    pub fn new(num_elements: u64, element_size: usize, may_contain_nulls: bool) -> Self {
        Self {
            element_size,
            num_elements,
            data: vec![0u8; num_elements as usize * element_size],
            nulls: may_contain_nulls.then(|| NullMask::new(num_elements as usize)),
        }
    }

    /// Fixed element width in bytes.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Number of element slots.
    pub fn num_elements(&self) -> u64 {
        self.num_elements
    }

    /// Whether the buffer tracks nulls.
    pub fn has_null_mask(&self) -> bool {
        self.nulls.is_some()
    }

    /// Raw element bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw element bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Element bytes at `pos`.
    pub fn slot(&self, pos: u64) -> &[u8] {
        let start = pos as usize * self.element_size;
        &self.data[start..start + self.element_size]
    }

    /// Mutable element bytes at `pos`.
    pub fn slot_mut(&mut self, pos: u64) -> &mut [u8] {
        let start = pos as usize * self.element_size;
        &mut self.data[start..start + self.element_size]
    }

    /// Null mask, when present.
    pub fn nulls(&self) -> Option<&NullMask> {
        self.nulls.as_ref()
    }

    /// Mutable null mask, when present.
    pub fn nulls_mut(&mut self) -> Option<&mut NullMask> {
        self.nulls.as_mut()
    }
}
