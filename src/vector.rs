//! Vectorized output batches handed to the list engine by the caller.
//!
//! A [`ValueVector`] holds up to [`DEFAULT_VECTOR_CAPACITY`] fixed-width
//! element slots, a null mask, and auxiliary slots for materialized
//! variable-length payloads. A [`SelectionVector`] narrows which positions of
//! a batch are visible without touching the underlying buffer.

use crate::types::{Result, VesperError};

/// Maximum number of elements a batch returned by `read_next` may hold.
pub const DEFAULT_VECTOR_CAPACITY: usize = 2048;

/// Bitset tracking which element positions are null.
#[derive(Clone, Debug)]
pub struct NullMask {
    words: Vec<u64>,
    num_bits: usize,
}

impl NullMask {
    /// Creates a mask of `num_bits` positions, all non-null.
    pub fn new(num_bits: usize) -> Self {
        Self {
            words: vec![0u64; num_bits.div_ceil(64)],
            num_bits,
        }
    }

    /// Number of positions tracked.
    pub fn len(&self) -> usize {
        self.num_bits
    }

    /// Returns `true` when no positions are tracked.
    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// Whether the element at `pos` is null.
    pub fn is_null(&self, pos: usize) -> bool {
        debug_assert!(pos < self.num_bits);
        (self.words[pos / 64] >> (pos % 64)) & 1 == 1
    }

    /// Marks the element at `pos` null or non-null.
    pub fn set_null(&mut self, pos: usize, null: bool) {
        debug_assert!(pos < self.num_bits);
        let word = &mut self.words[pos / 64];
        if null {
            *word |= 1 << (pos % 64);
        } else {
            *word &= !(1 << (pos % 64));
        }
    }

    /// Clears every bit back to non-null.
    pub fn reset(&mut self) {
        self.words.fill(0);
    }

    /// Copies `count` bits out of a packed little-endian bitmap region, such
    /// as the one leading each list page.
    pub fn copy_from_packed(
        &mut self,
        packed: &[u8],
        src_start: usize,
        dst_start: usize,
        count: usize,
    ) {
        for i in 0..count {
            let src = src_start + i;
            let bit = (packed[src / 8] >> (src % 8)) & 1 == 1;
            self.set_null(dst_start + i, bit);
        }
    }
}

/// Selection over the positions of one batch. Starts unfiltered (identity);
/// filtering specializations rewrite it to a subset of positions, never the
/// data buffer itself.
#[derive(Clone, Debug)]
pub struct SelectionVector {
    positions: Vec<u32>,
    selected: usize,
    filtered: bool,
}

impl SelectionVector {
    /// Creates an unfiltered selection.
    pub fn new(capacity: usize) -> Self {
        Self {
            positions: vec![0u32; capacity],
            selected: 0,
            filtered: false,
        }
    }

    /// Restores the identity selection.
    pub fn reset_to_unfiltered(&mut self) {
        self.filtered = false;
        self.selected = 0;
    }

    /// Whether an explicit position subset is active.
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    /// Replaces the selection with an explicit subset of positions.
    pub fn set_filtered(&mut self, positions: &[u32]) {
        debug_assert!(positions.len() <= self.positions.len());
        self.positions[..positions.len()].copy_from_slice(positions);
        self.selected = positions.len();
        self.filtered = true;
    }

    /// Number of selected positions when filtered.
    pub fn selected_len(&self) -> usize {
        self.selected
    }

    /// The selected positions when filtered.
    pub fn selected_positions(&self) -> &[u32] {
        &self.positions[..self.selected]
    }
}

/// Caller-supplied output buffer for one scan batch.
pub struct ValueVector {
    element_size: usize,
    capacity: usize,
    data: Vec<u8>,
    nulls: NullMask,
    aux: Vec<Option<Vec<u8>>>,
    original_size: usize,
    /// Selection over this batch's positions.
    pub sel: SelectionVector,
}

impl ValueVector {
    /// Creates a vector with the default batch capacity.
    pub fn new(element_size: usize) -> Self {
        Self::with_capacity(element_size, DEFAULT_VECTOR_CAPACITY)
    }

    /// Creates a vector holding up to `capacity` elements of `element_size`
    /// bytes each.
    pub fn with_capacity(element_size: usize, capacity: usize) -> Self {
        assert!(element_size > 0, "element size must be non-zero");
        Self {
            element_size,
            capacity,
            data: vec![0u8; element_size * capacity],
            nulls: NullMask::new(capacity),
            aux: vec![None; capacity],
            original_size: 0,
            sel: SelectionVector::new(capacity),
        }
    }

    /// Fixed element width in bytes.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Maximum number of elements per batch.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clears batch state: size zero, unfiltered selection, no nulls, no
    /// materialized payloads.
    pub fn reset(&mut self) {
        self.original_size = 0;
        self.sel.reset_to_unfiltered();
        self.nulls.reset();
        for slot in &mut self.aux {
            *slot = None;
        }
    }

    /// Sets how many element slots this batch holds.
    pub fn set_original_size(&mut self, size: usize) {
        assert!(size <= self.capacity, "batch larger than vector capacity");
        self.original_size = size;
    }

    /// Number of element slots in the current batch.
    pub fn original_size(&self) -> usize {
        self.original_size
    }

    /// Number of positions visible after selection.
    pub fn selected_size(&self) -> usize {
        if self.sel.is_filtered() {
            self.sel.selected_len()
        } else {
            self.original_size
        }
    }

    /// Raw bytes of the element at `pos`.
    pub fn slot(&self, pos: usize) -> &[u8] {
        let start = pos * self.element_size;
        &self.data[start..start + self.element_size]
    }

    /// Mutable raw bytes of the element at `pos`.
    pub fn slot_mut(&mut self, pos: usize) -> &mut [u8] {
        let start = pos * self.element_size;
        &mut self.data[start..start + self.element_size]
    }

    /// Mutable view over a contiguous run of element slots.
    pub fn slots_mut(&mut self, start_pos: usize, count: usize) -> &mut [u8] {
        let start = start_pos * self.element_size;
        &mut self.data[start..start + count * self.element_size]
    }

    /// Whether the element at `pos` is null.
    pub fn is_null(&self, pos: usize) -> bool {
        self.nulls.is_null(pos)
    }

    /// Marks the element at `pos` null or non-null.
    pub fn set_null(&mut self, pos: usize, null: bool) {
        self.nulls.set_null(pos, null);
    }

    /// The null mask for direct bit copies from page bitmap regions.
    pub fn nulls_mut(&mut self) -> &mut NullMask {
        &mut self.nulls
    }

    /// Materialized variable-length payload at `pos`, if resolved.
    pub fn aux(&self, pos: usize) -> Option<&[u8]> {
        self.aux[pos].as_deref()
    }

    /// Stores the materialized payload for `pos`.
    pub fn set_aux(&mut self, pos: usize, payload: Vec<u8>) {
        self.aux[pos] = Some(payload);
    }

    /// Reads the element at `pos` as a little-endian `i64`.
    pub fn get_i64(&self, pos: usize) -> Result<i64> {
        let slot = self.slot(pos);
        let bytes: [u8; 8] = slot
            .try_into()
            .map_err(|_| VesperError::Corruption("element is not 8 bytes wide"))?;
        Ok(i64::from_le_bytes(bytes))
    }

    /// Writes the element at `pos` as a little-endian `i64`.
    pub fn set_i64(&mut self, pos: usize, value: i64) {
        self.slot_mut(pos).copy_from_slice(&value.to_le_bytes());
    }

    /// Positions of the current batch after selection, in order.
    pub fn selected(&self) -> Vec<usize> {
        if self.sel.is_filtered() {
            self.sel
                .selected_positions()
                .iter()
                .map(|&p| p as usize)
                .collect()
        } else {
            (0..self.original_size).collect()
        }
    }
}
