//! Overflow store for variable-length content.
//!
//! String and nested-list elements embed a fixed-width [`OvfRef`] handle in
//! the list pages; the actual payload lives here. Payloads are checksummed
//! and may span contiguous pages; the store is append-only.

use parking_lot::Mutex;
use std::sync::Arc;

use tracing::trace;

use crate::pager::BufferManager;
use crate::transaction::Transaction;
use crate::types::{PageId, Result, VesperError};
use crate::vector::ValueVector;

/// Encoded width of an [`OvfRef`] handle.
pub const OVF_REF_LEN: usize = 20;

/// Fixed-width handle to an overflow payload.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct OvfRef {
    /// First page of the payload.
    pub page: PageId,
    /// Byte offset of the payload within its first page.
    pub offset: u32,
    /// Payload length in bytes.
    pub len: u32,
    /// CRC32 of the payload, verified on read.
    pub checksum: u32,
}

impl OvfRef {
    /// Encodes the handle into its fixed 20-byte layout.
    pub fn encode(&self, dst: &mut [u8]) {
        debug_assert!(dst.len() >= OVF_REF_LEN);
        dst[0..8].copy_from_slice(&self.page.0.to_le_bytes());
        dst[8..12].copy_from_slice(&self.offset.to_le_bytes());
        dst[12..16].copy_from_slice(&self.len.to_le_bytes());
        dst[16..20].copy_from_slice(&self.checksum.to_le_bytes());
    }

    /// Decodes a handle from element bytes.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < OVF_REF_LEN {
            return Err(VesperError::Corruption("overflow handle truncated"));
        }
        Ok(Self {
            page: PageId(u64::from_le_bytes(src[0..8].try_into().unwrap())),
            offset: u32::from_le_bytes(src[8..12].try_into().unwrap()),
            len: u32::from_le_bytes(src[12..16].try_into().unwrap()),
            checksum: u32::from_le_bytes(src[16..20].try_into().unwrap()),
        })
    }
}

struct Tail {
    page: Option<PageId>,
    used: usize,
}

/// Append-only paged store for variable-length payloads.
pub struct DiskOverflowFile {
    buffers: Arc<BufferManager>,
    tail: Mutex<Tail>,
}

impl DiskOverflowFile {
    /// Wraps the overflow store around its own paged file.
    pub fn new(buffers: Arc<BufferManager>) -> Self {
        Self {
            buffers,
            tail: Mutex::new(Tail {
                page: None,
                used: 0,
            }),
        }
    }

    /// Appends `payload` and returns its handle. Payloads longer than one
    /// page continue onto contiguous pages.
    pub fn write(&self, payload: &[u8]) -> Result<OvfRef> {
        let page_size = self.buffers.page_size();
        let mut tail = self.tail.lock();
        let (start_page, start_offset) = match tail.page {
            Some(page) if tail.used < page_size => (page, tail.used),
            _ => {
                let page = self.buffers.allocate_page()?;
                tail.page = Some(page);
                tail.used = 0;
                (page, 0)
            }
        };

        let mut written = 0usize;
        let mut page = start_page;
        let mut offset = start_offset;
        while written < payload.len() {
            let room = page_size - offset;
            let chunk = room.min(payload.len() - written);
            self.buffers.write_page(page, |data| {
                data[offset..offset + chunk].copy_from_slice(&payload[written..written + chunk]);
            })?;
            written += chunk;
            offset += chunk;
            if written < payload.len() {
                // Contiguity holds because allocation happens under the tail
                // lock and the file is append-only.
                page = self.buffers.allocate_page()?;
                offset = 0;
            }
        }
        tail.page = Some(page);
        tail.used = offset;

        let vref = OvfRef {
            page: start_page,
            offset: start_offset as u32,
            len: payload.len() as u32,
            checksum: crc32fast::hash(payload),
        };
        trace!(
            page = vref.page.0,
            offset = vref.offset,
            len = vref.len,
            "overflow.write"
        );
        Ok(vref)
    }

    /// Reads the payload behind `vref`, verifying its checksum.
    pub fn read(&self, vref: &OvfRef) -> Result<Vec<u8>> {
        let page_size = self.buffers.page_size();
        let mut payload = Vec::with_capacity(vref.len as usize);
        let mut page = vref.page;
        let mut offset = vref.offset as usize;
        if offset >= page_size {
            return Err(VesperError::Corruption("overflow offset beyond page"));
        }
        while payload.len() < vref.len as usize {
            let chunk = (page_size - offset).min(vref.len as usize - payload.len());
            let frame = self.buffers.pin(page)?;
            frame.with(|data| payload.extend_from_slice(&data[offset..offset + chunk]));
            page = PageId(page.0 + 1);
            offset = 0;
        }
        if crc32fast::hash(&payload) != vref.checksum {
            return Err(VesperError::Corruption("overflow payload checksum mismatch"));
        }
        Ok(payload)
    }

    /// Resolves every unresolved non-null string handle in `vector` into its
    /// materialized payload. Never changes element count or ordering.
    pub fn read_strings_to_vector(&self, tx: &Transaction, vector: &mut ValueVector) -> Result<()> {
        self.resolve_handles(tx, vector)
    }

    /// Resolves every unresolved non-null nested-list handle in `vector`.
    /// Same mechanics as strings; the payload is the packed child list.
    pub fn read_lists_to_vector(&self, tx: &Transaction, vector: &mut ValueVector) -> Result<()> {
        self.resolve_handles(tx, vector)
    }

    fn resolve_handles(&self, _tx: &Transaction, vector: &mut ValueVector) -> Result<()> {
        for pos in 0..vector.original_size() {
            if vector.is_null(pos) || vector.aux(pos).is_some() {
                // Overlay-sourced slots arrive already materialized.
                continue;
            }
            let vref = OvfRef::decode(vector.slot(pos))?;
            let payload = self.read(&vref)?;
            vector.set_aux(pos, payload);
        }
        Ok(())
    }
}
