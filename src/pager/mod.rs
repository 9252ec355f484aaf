//! Fixed-size page cache with pin/unpin semantics.
//!
//! The list engine reads persistent pages exclusively through pinned frames
//! and never writes through a pinned frame on the read path; writes flow
//! through [`BufferManager::write_page`], which operates on whole pages.
//! Pins are scoped: dropping a [`PinnedFrame`] releases the pin, so every
//! code path including error exits keeps pin and unpin paired.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::types::{PageId, Result, VesperError};

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 8192;
/// Default number of cached frames.
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Configuration for a [`BufferManager`].
#[derive(Clone, Debug)]
pub struct PagerOptions {
    /// Size of each page in bytes.
    pub page_size: usize,
    /// Number of frames to keep cached in memory.
    pub cache_pages: usize,
}

impl Default for PagerOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_pages: DEFAULT_CACHE_PAGES,
        }
    }
}

struct Frame {
    buf: Arc<RwLock<Box<[u8]>>>,
    pin_count: u32,
    dirty: bool,
}

impl Frame {
    fn new(page_size: usize) -> Self {
        Self {
            buf: Arc::new(RwLock::new(vec![0u8; page_size].into_boxed_slice())),
            pin_count: 0,
            dirty: false,
        }
    }
}

/// File-backed page cache shared by concurrent scans of one list file.
///
/// Lock order is always frame table before file; frames with a non-zero pin
/// count are exempt from eviction.
pub struct BufferManager {
    file: Mutex<File>,
    page_size: usize,
    cache_pages: usize,
    frames: Mutex<LruCache<u64, Frame>>,
    num_pages: AtomicU64,
}

impl BufferManager {
    /// Opens (creating if necessary) the paged file at `path`.
    pub fn open(path: &Path, options: PagerOptions) -> Result<Self> {
        if options.page_size == 0 {
            return Err(VesperError::Invalid("page size must be non-zero"));
        }
        // Capacity is enforced by `make_room` rather than the cache itself:
        // `LruCache::put` at capacity would silently drop a frame that may
        // still be pinned or dirty.
        let cache_pages = NonZeroUsize::new(options.cache_pages)
            .ok_or(VesperError::Invalid("cache size must be non-zero"))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let file_len = file.metadata()?.len();
        let num_pages = file_len.div_ceil(options.page_size as u64);
        Ok(Self {
            file: Mutex::new(file),
            page_size: options.page_size,
            cache_pages: cache_pages.get(),
            frames: Mutex::new(LruCache::unbounded()),
            num_pages: AtomicU64::new(num_pages),
        })
    }

    /// Size of each page in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages allocated in the file.
    pub fn num_pages(&self) -> u64 {
        self.num_pages.load(Ordering::Acquire)
    }

    /// Appends a zeroed page to the file and returns its id.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page = PageId(self.num_pages.fetch_add(1, Ordering::AcqRel));
        let mut frames = self.frames.lock();
        self.make_room(&mut frames)?;
        let mut frame = Frame::new(self.page_size);
        frame.dirty = true;
        frames.put(page.0, frame);
        trace!(page = page.0, "pager.allocate");
        Ok(page)
    }

    /// Pins the frame for `page`, loading it from disk on a cache miss.
    /// The returned guard keeps the frame resident until dropped.
    pub fn pin(&self, page: PageId) -> Result<PinnedFrame<'_>> {
        let buf = {
            let mut frames = self.frames.lock();
            if frames.get(&page.0).is_none() {
                self.make_room(&mut frames)?;
                let frame = Frame::new(self.page_size);
                self.read_from_disk(page, &mut frame.buf.write())?;
                frames.put(page.0, frame);
            }
            let frame = frames
                .get_mut(&page.0)
                .expect("frame resident after insert");
            frame.pin_count += 1;
            Arc::clone(&frame.buf)
        };
        Ok(PinnedFrame {
            manager: self,
            page,
            buf,
        })
    }

    /// Mutates a whole page through the cache and marks it dirty. This is the
    /// flush-side write path; it is never invoked through a pinned read frame.
    pub fn write_page<F>(&self, page: PageId, f: F) -> Result<()>
    where
        F: FnOnce(&mut [u8]),
    {
        let mut frames = self.frames.lock();
        if frames.get(&page.0).is_none() {
            self.make_room(&mut frames)?;
            let frame = Frame::new(self.page_size);
            self.read_from_disk(page, &mut frame.buf.write())?;
            frames.put(page.0, frame);
        }
        let frame = frames
            .get_mut(&page.0)
            .expect("frame resident after insert");
        f(&mut frame.buf.write());
        frame.dirty = true;
        Ok(())
    }

    /// Writes all dirty frames back to the file and syncs it.
    pub fn flush(&self) -> Result<()> {
        let mut frames = self.frames.lock();
        let ids: Vec<u64> = frames.iter().map(|(&id, _)| id).collect();
        let mut flushed = 0u64;
        for id in ids {
            if let Some(frame) = frames.peek_mut(&id) {
                if frame.dirty {
                    let buf = Arc::clone(&frame.buf);
                    self.write_to_disk(PageId(id), &buf.read())?;
                    frame.dirty = false;
                    flushed += 1;
                }
            }
        }
        if flushed > 0 {
            self.file.lock().sync_data()?;
        }
        trace!(pages = flushed, "pager.flush");
        Ok(())
    }

    fn unpin(&self, page: PageId) {
        let mut frames = self.frames.lock();
        if let Some(frame) = frames.peek_mut(&page.0) {
            debug_assert!(frame.pin_count > 0, "unpin without matching pin");
            frame.pin_count = frame.pin_count.saturating_sub(1);
        }
    }

    fn make_room(&self, frames: &mut LruCache<u64, Frame>) -> Result<()> {
        let mut attempts = frames.len();
        while frames.len() >= self.cache_pages && attempts > 0 {
            attempts -= 1;
            let Some((id, frame)) = frames.pop_lru() else {
                break;
            };
            if frame.pin_count > 0 {
                // Pinned frames go back in; they become most recently used,
                // which is close enough for a cache this size.
                frames.put(id, frame);
                continue;
            }
            if frame.dirty {
                self.write_to_disk(PageId(id), &frame.buf.read())?;
            }
        }
        Ok(())
    }

    fn read_from_disk(&self, page: PageId, buf: &mut [u8]) -> Result<()> {
        let offset = self.page_offset(page)?;
        let mut file = self.file.lock();
        let file_len = file.metadata()?.len();
        buf.fill(0);
        if offset < file_len {
            file.seek(SeekFrom::Start(offset))?;
            let mut read_total = 0;
            while read_total < buf.len() {
                let n = file.read(&mut buf[read_total..])?;
                if n == 0 {
                    break;
                }
                read_total += n;
            }
        }
        Ok(())
    }

    fn write_to_disk(&self, page: PageId, buf: &[u8]) -> Result<()> {
        let offset = self.page_offset(page)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn page_offset(&self, page: PageId) -> Result<u64> {
        page.0
            .checked_mul(self.page_size as u64)
            .ok_or(VesperError::Invalid("page offset overflow"))
    }
}

/// RAII pin on one buffer frame; dropping it releases the pin.
pub struct PinnedFrame<'a> {
    manager: &'a BufferManager,
    page: PageId,
    buf: Arc<RwLock<Box<[u8]>>>,
}

impl PinnedFrame<'_> {
    /// Page this frame holds.
    pub fn page(&self) -> PageId {
        self.page
    }

    /// Runs `f` over the frame's bytes.
    pub fn with<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&[u8]) -> T,
    {
        f(&self.buf.read())
    }
}

impl Drop for PinnedFrame<'_> {
    fn drop(&mut self) {
        self.manager.unpin(self.page);
    }
}
