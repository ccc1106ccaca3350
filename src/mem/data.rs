//! The payload arena: a growable byte-page pool for scalar payloads.
//!
//! Scalar bytes arrive already escaped; the arena only hands out space and
//! copies. Claiming is a two-tier bump allocation: a lock-free fast path
//! when capacity is already reserved, and a locked slow path that rents
//! pages and publishes the new capacity. A claimed range may straddle a
//! page boundary; writes split the copy, and single-slice reads are only
//! offered for ranges inside one page.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::pool::{PagePool, RawPage};
use crate::cursor::PAGE_BYTES;
use crate::error::{Result, ResultDocError};

/// Maximum payload arena size; locations are 27-bit row fields.
pub const DATA_MAX_BYTES: u32 = 1 << 27;

/// Growable byte arena addressed by 27-bit locations.
pub struct DataStore {
    pool: Arc<PagePool>,
    pages: RwLock<Vec<RawPage>>,
    write: AtomicU32,
    capacity: AtomicU32,
    grow: Arc<Mutex<()>>,
    disposed: AtomicBool,
}

impl DataStore {
    /// Creates an empty arena.
    ///
    /// `grow` is the document's structural mutex: capacity growth and shape
    /// construction serialize on the same lock.
    pub fn new(pool: Arc<PagePool>, grow: Arc<Mutex<()>>) -> Self {
        DataStore {
            pool,
            pages: RwLock::new(Vec::new()),
            write: AtomicU32::new(0),
            capacity: AtomicU32::new(0),
            grow,
            disposed: AtomicBool::new(false),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ResultDocError::Disposed);
        }
        Ok(())
    }

    /// Claims `len` bytes, returning the location of the claimed range.
    ///
    /// Fast path: one atomic bump when capacity already covers the claim.
    /// Slow path: rents pages under the shared mutex, double-checking
    /// capacity before growing, then publishes it with a release store.
    /// A rejected claim leaves the write cursor untouched.
    pub fn claim(&self, len: usize) -> Result<u32> {
        self.ensure_live()?;
        let len = u32::try_from(len)
            .ok()
            .filter(|&len| len <= DATA_MAX_BYTES)
            .ok_or(ResultDocError::Invalid("payload too large"))?;
        let mut start = self.write.load(Ordering::Relaxed);
        let end = loop {
            let end = start
                .checked_add(len)
                .filter(|&end| end <= DATA_MAX_BYTES)
                .ok_or(ResultDocError::Invalid("payload arena full"))?;
            match self.write.compare_exchange_weak(
                start,
                end,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break end,
                Err(current) => start = current,
            }
        };
        if end <= self.capacity.load(Ordering::Acquire) {
            return Ok(start);
        }
        let _guard = self.grow.lock();
        while self.capacity.load(Ordering::Acquire) < end {
            self.pages.write().push(self.pool.rent_byte_page());
            let grown = self
                .capacity
                .fetch_add(PAGE_BYTES as u32, Ordering::Release)
                + PAGE_BYTES as u32;
            debug!(capacity = grown, "data.capacity.grow");
        }
        Ok(start)
    }

    /// Copies `src` into a previously claimed range at `location`,
    /// splitting the copy across a page boundary when needed.
    pub fn write(&self, location: u32, src: &[u8]) -> Result<()> {
        self.ensure_live()?;
        debug_assert!(
            location + src.len() as u32 <= self.capacity.load(Ordering::Acquire),
            "write outside claimed capacity"
        );
        let pages = self.pages.read();
        let mut offset = location as usize;
        let mut remaining = src;
        while !remaining.is_empty() {
            let page_idx = offset / PAGE_BYTES;
            let in_page = offset % PAGE_BYTES;
            let take = remaining.len().min(PAGE_BYTES - in_page);
            pages[page_idx].write(in_page, &remaining[..take]);
            remaining = &remaining[take..];
            offset += take;
        }
        Ok(())
    }

    /// Claims and writes a quote-wrapped payload, returning its location.
    /// The stored size includes both quote bytes.
    pub fn write_quoted(&self, payload: &[u8]) -> Result<u32> {
        let location = self.claim(payload.len() + 2)?;
        self.write(location, b"\"")?;
        self.write(location + 1, payload)?;
        self.write(location + 1 + payload.len() as u32, b"\"")?;
        Ok(location)
    }

    /// True when the range lies within a single page, making the direct
    /// slice read path available.
    pub fn in_one_page(&self, location: u32, len: usize) -> bool {
        let start = location as usize;
        len == 0 || start / PAGE_BYTES == (start + len - 1) / PAGE_BYTES
    }

    /// Streams the range to `f` in page-contiguous chunks (one chunk when
    /// the range does not cross a page boundary, two otherwise).
    pub fn read_chunks(&self, location: u32, len: usize, f: &mut dyn FnMut(&[u8])) -> Result<()> {
        self.ensure_live()?;
        if location as usize + len > self.capacity.load(Ordering::Acquire) as usize {
            return Err(ResultDocError::Invalid("payload location out of range"));
        }
        let pages = self.pages.read();
        let mut offset = location as usize;
        let mut remaining = len;
        while remaining > 0 {
            let page_idx = offset / PAGE_BYTES;
            let in_page = offset % PAGE_BYTES;
            let take = remaining.min(PAGE_BYTES - in_page);
            f(pages[page_idx].slice(in_page, take));
            remaining -= take;
            offset += take;
        }
        Ok(())
    }

    /// Appends the range to `out`.
    pub fn copy_to(&self, location: u32, len: usize, out: &mut Vec<u8>) -> Result<()> {
        out.reserve(len);
        self.read_chunks(location, len, &mut |chunk| out.extend_from_slice(chunk))
    }

    /// Bytes claimed so far.
    pub fn claimed(&self) -> u32 {
        self.write.load(Ordering::Relaxed)
    }

    /// Returns every rented page to the pool. Double-dispose is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut pages = self.pages.write();
        let returned = pages.len();
        for page in pages.drain(..) {
            self.pool.give_back_byte_page(page);
        }
        debug!(pages = returned, "data.dispose");
    }
}

impl Drop for DataStore {
    fn drop(&mut self) {
        self.dispose();
    }
}
