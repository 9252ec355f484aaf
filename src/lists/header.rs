//! Per-node list headers: small/large classification.
//!
//! A header is persisted as one `u32`. Bit 31 distinguishes large lists
//! (which own an independent page chain, addressed by list index) from small
//! lists (inlined into the shared region, addressed by CSR offset). Small
//! headers also carry the list length, so the scan path never consults the
//! region's CSR bookkeeping. `u32::MAX` is the sentinel for a node that has
//! no persisted header yet; it only exists inside the codec — everywhere
//! else the header is the explicit [`ListHeader`] variant.

use crate::types::NodeOffset;

/// Largest element count a list may have and still be stored inline in the
/// shared small-list region.
pub const SMALL_LIST_CAPACITY: u16 = 511;

const LARGE_FLAG: u32 = 1 << 31;
const LARGE_INDEX_MASK: u32 = LARGE_FLAG - 1;
const SMALL_CSR_BITS: u32 = 22;
pub(crate) const SMALL_CSR_MASK: u32 = (1 << SMALL_CSR_BITS) - 1;
const SMALL_LEN_MASK: u32 = 0x1FF;
const UNINITIALIZED: u32 = u32::MAX;

/// Classification of one node's list, fixed at handle initialization.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ListHeader {
    /// List is inlined in the shared small-list region.
    Small {
        /// Element position of the list's start within the shared region.
        csr_offset: u32,
        /// Number of elements in the list.
        len: u16,
    },
    /// List owns an independent page chain.
    Large {
        /// Identifier of the per-list metadata entry.
        list_index: u32,
    },
    /// Node has no persisted header (newly added, nothing flushed yet).
    Uninitialized,
}

impl ListHeader {
    /// Whether this is a large list.
    pub fn is_large(&self) -> bool {
        matches!(self, ListHeader::Large { .. })
    }

    /// Encodes the header into its persisted `u32` form.
    pub fn encode(&self) -> u32 {
        match *self {
            ListHeader::Small { csr_offset, len } => {
                assert!(csr_offset <= SMALL_CSR_MASK, "CSR offset out of range");
                assert!(len <= SMALL_LIST_CAPACITY, "small list too long");
                (u32::from(len) << SMALL_CSR_BITS) | csr_offset
            }
            ListHeader::Large { list_index } => {
                assert!(list_index < LARGE_INDEX_MASK, "large list index reserved");
                LARGE_FLAG | list_index
            }
            ListHeader::Uninitialized => UNINITIALIZED,
        }
    }

    /// Decodes a persisted header value.
    pub fn decode(raw: u32) -> Self {
        if raw == UNINITIALIZED {
            ListHeader::Uninitialized
        } else if raw & LARGE_FLAG != 0 {
            ListHeader::Large {
                list_index: raw & LARGE_INDEX_MASK,
            }
        } else {
            ListHeader::Small {
                csr_offset: raw & SMALL_CSR_MASK,
                len: ((raw >> SMALL_CSR_BITS) & SMALL_LEN_MASK) as u16,
            }
        }
    }
}

/// Immutable snapshot of every node's header for one list file. Writers
/// publish a whole new snapshot; readers resolve their header once at handle
/// initialization.
#[derive(Clone, Debug, Default)]
pub struct ListHeaders {
    headers: Vec<u32>,
}

impl ListHeaders {
    /// Empty header table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Header for `node`; nodes beyond the table are uninitialized.
    pub fn header(&self, node: NodeOffset) -> ListHeader {
        match self.headers.get(node.0 as usize) {
            Some(&raw) => ListHeader::decode(raw),
            None => ListHeader::Uninitialized,
        }
    }

    /// Number of nodes with a header slot.
    pub fn num_nodes(&self) -> u64 {
        self.headers.len() as u64
    }

    /// Installs the header for `node`, growing the table with uninitialized
    /// slots as needed. Builder-side only.
    pub fn set_header(&mut self, node: NodeOffset, header: ListHeader) {
        let idx = node.0 as usize;
        if idx >= self.headers.len() {
            self.headers.resize(idx + 1, UNINITIALIZED);
        }
        self.headers[idx] = header.encode();
    }
}
