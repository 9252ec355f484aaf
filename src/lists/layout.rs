//! Page layout math for list files.
//!
//! Each page optionally leads with a null bitmap sized to the page's element
//! capacity in bits, rounded up to a 64-bit word boundary, followed by packed
//! fixed-width elements.

use crate::types::{Result, VesperError};

/// Derived layout constants for one list file.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ListLayout {
    element_size: usize,
    has_nulls: bool,
    elements_per_page: usize,
    bitmap_bytes: usize,
}

impl ListLayout {
    /// Computes the layout for pages of `page_size` bytes holding elements of
    /// `element_size` bytes. Unsupported combinations are rejected up front,
    /// never mid-scan.
    pub fn new(page_size: usize, element_size: usize, has_nulls: bool) -> Result<Self> {
        if element_size == 0 {
            return Err(VesperError::Invalid("element size must be non-zero"));
        }
        if element_size > page_size {
            return Err(VesperError::Invalid("element larger than a page"));
        }
        let (elements_per_page, bitmap_bytes) = if has_nulls {
            // One extra bit per element; shrink until the word-aligned bitmap
            // plus the packed elements fit.
            let mut count = (page_size * 8) / (element_size * 8 + 1);
            loop {
                let bitmap = count.div_ceil(64) * 8;
                if bitmap + count * element_size <= page_size {
                    break (count, bitmap);
                }
                count -= 1;
            }
        } else {
            (page_size / element_size, 0)
        };
        if elements_per_page == 0 {
            return Err(VesperError::Invalid("page holds no elements"));
        }
        Ok(Self {
            element_size,
            has_nulls,
            elements_per_page,
            bitmap_bytes,
        })
    }

    /// Fixed element width in bytes.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Whether pages carry a leading null bitmap.
    pub fn has_nulls(&self) -> bool {
        self.has_nulls
    }

    /// Elements each page can hold.
    pub fn elements_per_page(&self) -> usize {
        self.elements_per_page
    }

    /// Bytes reserved for the leading bitmap region.
    pub fn bitmap_bytes(&self) -> usize {
        self.bitmap_bytes
    }

    /// Byte offset of the element at `pos` within its page.
    pub fn elem_byte_offset(&self, pos: usize) -> usize {
        debug_assert!(pos < self.elements_per_page);
        self.bitmap_bytes + pos * self.element_size
    }

    /// Reads the null bit for the element at `pos` from a page image.
    pub fn is_null_in_page(&self, page: &[u8], pos: usize) -> bool {
        debug_assert!(self.has_nulls);
        (page[pos / 8] >> (pos % 8)) & 1 == 1
    }

    /// Writes the null bit for the element at `pos` into a page image.
    pub fn set_null_in_page(&self, page: &mut [u8], pos: usize, null: bool) {
        debug_assert!(self.has_nulls);
        if null {
            page[pos / 8] |= 1 << (pos % 8);
        } else {
            page[pos / 8] &= !(1 << (pos % 8));
        }
    }
}
