//! Shared page pool for row and payload pages.
//!
//! Documents are single-use; their pages are rented here at growth time and
//! handed back at disposal so the next execution reuses warm allocations.

use std::cell::UnsafeCell;
use std::sync::atomic::AtomicU32;

use parking_lot::Mutex;
use tracing::debug;

use crate::cursor::{PAGE_BYTES, ROWS_PER_PAGE};
use crate::row::ROW_WORDS;

/// A row page: one atomic word per packed row field.
pub(crate) type RowPage = Box<[AtomicU32]>;

pub(crate) const ROW_PAGE_WORDS: usize = ROWS_PER_PAGE as usize * ROW_WORDS;

/// A fixed-size byte page written concurrently at disjoint ranges.
///
/// Interior mutability is deliberate: payload writers copy into ranges they
/// claimed from the bump allocator, and readers only touch ranges whose
/// writing row was published first. Overlapping access is a caller contract
/// violation, not something this type detects.
pub struct RawPage {
    bytes: UnsafeCell<Box<[u8]>>,
}

// SAFETY: concurrent access is restricted to disjoint claimed ranges by the
// payload arena's allocation protocol; the page itself carries no state
// beyond the raw bytes.
unsafe impl Send for RawPage {}
unsafe impl Sync for RawPage {}

impl RawPage {
    pub(crate) fn new(len: usize) -> Self {
        RawPage {
            bytes: UnsafeCell::new(vec![0u8; len].into_boxed_slice()),
        }
    }

    /// Copies `src` into the page at `offset`.
    ///
    /// The range must lie inside the page and inside a claim owned by the
    /// calling writer.
    pub(crate) fn write(&self, offset: usize, src: &[u8]) {
        // SAFETY: the claim protocol guarantees no other thread touches
        // this range while the write is in flight.
        unsafe {
            let dst = &mut *self.bytes.get();
            debug_assert!(offset + src.len() <= dst.len(), "page write out of bounds");
            dst[offset..offset + src.len()].copy_from_slice(src);
        }
    }

    /// Borrows `len` bytes at `offset`.
    ///
    /// Only valid for ranges whose owning row was published before this
    /// read began.
    pub(crate) fn slice(&self, offset: usize, len: usize) -> &[u8] {
        // SAFETY: published ranges are never rewritten; see `write`.
        unsafe {
            let buf = &*self.bytes.get();
            debug_assert!(offset + len <= buf.len(), "page read out of bounds");
            &buf[offset..offset + len]
        }
    }
}

/// Recycles row and payload pages across document lifecycles.
pub struct PagePool {
    row_pages: Mutex<Vec<RowPage>>,
    byte_pages: Mutex<Vec<RawPage>>,
    max_retained: usize,
}

impl Default for PagePool {
    fn default() -> Self {
        PagePool::with_max_retained(32)
    }
}

impl PagePool {
    /// Creates a pool retaining at most `max_retained` pages of each kind.
    pub fn with_max_retained(max_retained: usize) -> Self {
        PagePool {
            row_pages: Mutex::new(Vec::new()),
            byte_pages: Mutex::new(Vec::new()),
            max_retained,
        }
    }

    pub(crate) fn rent_row_page(&self) -> RowPage {
        if let Some(page) = self.row_pages.lock().pop() {
            return page;
        }
        debug!(words = ROW_PAGE_WORDS, "pool.row_page.alloc");
        (0..ROW_PAGE_WORDS).map(|_| AtomicU32::new(0)).collect()
    }

    pub(crate) fn give_back_row_page(&self, page: RowPage) {
        let mut pages = self.row_pages.lock();
        if pages.len() < self.max_retained {
            pages.push(page);
        }
    }

    pub(crate) fn rent_byte_page(&self) -> RawPage {
        if let Some(page) = self.byte_pages.lock().pop() {
            return page;
        }
        debug!(bytes = PAGE_BYTES, "pool.byte_page.alloc");
        RawPage::new(PAGE_BYTES)
    }

    pub(crate) fn give_back_byte_page(&self, page: RawPage) {
        let mut pages = self.byte_pages.lock();
        if pages.len() < self.max_retained {
            pages.push(page);
        }
    }

    /// Number of currently retained (row, byte) pages, for tests and stats.
    pub fn retained(&self) -> (usize, usize) {
        (self.row_pages.lock().len(), self.byte_pages.lock().len())
    }
}
