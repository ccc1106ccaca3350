//! The row arena: an append-only, growable collection of row-record pages.
//!
//! Rows live in pages of atomic words. Appends are serialized by the
//! document's structural mutex; in-place `replace` calls are safe across
//! disjoint cursors because each targets its own five words. Multi-word
//! rows are not read torn in practice because the engine establishes shape
//! before issuing assignments and synchronizes before serialization; the
//! only concurrent read-modify-write is the flag word, which uses atomic
//! bit operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::pool::{PagePool, RowPage};
use crate::cursor::{Cursor, MAX_ROW_INDEX, ROWS_PER_PAGE};
use crate::error::{Result, ResultDocError};
use crate::row::{Row, TokenKind, ROW_WORDS};

/// Minimum number of slots in the page-index table.
const MIN_PAGE_TABLE: usize = 4;

/// Growable arena of fixed-size packed row records.
pub struct RowDb {
    pool: Arc<PagePool>,
    pages: RwLock<Vec<Option<RowPage>>>,
    // Flat index of the next row; may equal MAX_ROW_INDEX when full.
    head: Mutex<u32>,
    disposed: AtomicBool,
}

impl RowDb {
    /// Creates an arena with a page-index table sized for `estimated_rows`.
    ///
    /// Page 0 is rented eagerly; later pages are rented on first touch.
    pub fn create_for_estimated_rows(pool: Arc<PagePool>, estimated_rows: usize) -> Self {
        let table_len = estimated_rows
            .div_ceil(ROWS_PER_PAGE as usize)
            .max(MIN_PAGE_TABLE);
        let mut pages: Vec<Option<RowPage>> = Vec::with_capacity(table_len);
        pages.push(Some(pool.rent_row_page()));
        pages.resize_with(table_len, || None);
        RowDb {
            pool,
            pages: RwLock::new(pages),
            head: Mutex::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// Number of rows appended so far.
    pub fn len(&self) -> u32 {
        *self.head.lock()
    }

    /// True when no rows have been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ResultDocError::Disposed);
        }
        Ok(())
    }

    /// Writes a new row at the write head and returns its cursor.
    ///
    /// Rolls to the next page when the current one is full, doubling the
    /// page-index table and renting backing pages as needed. Callers
    /// serialize appends through the document's structural mutex.
    pub fn append(&self, row: Row) -> Result<Cursor> {
        self.ensure_live()?;
        let mut head = self.head.lock();
        if *head >= MAX_ROW_INDEX {
            return Err(ResultDocError::Invalid("row arena full"));
        }
        let cursor = Cursor::from_index(*head);
        self.ensure_page(cursor.page() as usize);
        self.store(cursor, row)?;
        *head += 1;
        Ok(cursor)
    }

    fn ensure_page(&self, page_idx: usize) {
        {
            let pages = self.pages.read();
            if pages.get(page_idx).is_some_and(Option::is_some) {
                return;
            }
        }
        let mut pages = self.pages.write();
        if pages.len() <= page_idx {
            let mut target = pages.len().max(MIN_PAGE_TABLE);
            while target <= page_idx {
                target *= 2;
            }
            debug!(from = pages.len(), to = target, "rows.page_table.grow");
            pages.resize_with(target, || None);
        }
        if pages[page_idx].is_none() {
            debug!(page = page_idx, "rows.page.rent");
            pages[page_idx] = Some(self.pool.rent_row_page());
        }
    }

    /// Overwrites an existing row in place, resolving a reserved placeholder.
    ///
    /// Safe to call concurrently across disjoint cursors.
    pub fn replace(&self, cursor: Cursor, row: Row) -> Result<()> {
        self.ensure_live()?;
        self.store(cursor, row)
    }

    fn store(&self, cursor: Cursor, row: Row) -> Result<()> {
        let pages = self.pages.read();
        let page = resolve_page(&pages, cursor)?;
        let base = cursor.slot() as usize * ROW_WORDS;
        for (i, &word) in row.words().iter().enumerate() {
            page[base + i].store(word, Ordering::Release);
        }
        Ok(())
    }

    /// Reads a snapshot of the row at `cursor`.
    pub fn get(&self, cursor: Cursor) -> Result<Row> {
        self.ensure_live()?;
        let pages = self.pages.read();
        let page = resolve_page(&pages, cursor)?;
        let base = cursor.slot() as usize * ROW_WORDS;
        let mut words = [0u32; ROW_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            *word = page[base + i].load(Ordering::Acquire);
        }
        Ok(Row::from_words(words))
    }

    /// Reads the row at a flat row index.
    pub fn get_at_index(&self, index: u32) -> Result<Row> {
        self.get(Cursor::from_index(index))
    }

    /// Resolves exactly one level of `Reference` indirection.
    ///
    /// Returns the true structural start cursor and its row. All navigation
    /// and lookup operations route through this before interpreting a row
    /// as an object or array start.
    pub fn start_cursor(&self, cursor: Cursor) -> Result<(Cursor, Row)> {
        let row = self.get(cursor)?;
        if row.token() == TokenKind::Reference {
            let target = Cursor::from_index(row.location());
            let resolved = self.get(target)?;
            debug_assert_ne!(
                resolved.token(),
                TokenKind::Reference,
                "reference rows must not chain"
            );
            return Ok((target, resolved));
        }
        Ok((cursor, row))
    }

    /// Sets flag bits on a row with an atomic OR.
    ///
    /// Concurrent invalidation of a shared ancestor must not lose bits, so
    /// this is the one field mutated without external serialization.
    pub fn set_flags(&self, cursor: Cursor, flag_bits: u8) -> Result<()> {
        self.ensure_live()?;
        let pages = self.pages.read();
        let page = resolve_page(&pages, cursor)?;
        let base = cursor.slot() as usize * ROW_WORDS;
        page[base + 4].fetch_or(u32::from(flag_bits), Ordering::AcqRel);
        Ok(())
    }

    /// Clears flag bits on a row with an atomic AND.
    pub fn clear_flags(&self, cursor: Cursor, flag_bits: u8) -> Result<()> {
        self.ensure_live()?;
        let pages = self.pages.read();
        let page = resolve_page(&pages, cursor)?;
        let base = cursor.slot() as usize * ROW_WORDS;
        page[base + 4].fetch_and(!u32::from(flag_bits), Ordering::AcqRel);
        Ok(())
    }

    /// Rewrites the size/length word, preserving nothing else in the row.
    pub fn set_size_or_length(
        &self,
        cursor: Cursor,
        size_or_length: Option<u32>,
        has_complex_children: bool,
    ) -> Result<()> {
        self.ensure_live()?;
        let pages = self.pages.read();
        let page = resolve_page(&pages, cursor)?;
        let base = cursor.slot() as usize * ROW_WORDS;
        page[base + 1].store(
            Row::encode_size_word(size_or_length, has_complex_children),
            Ordering::Release,
        );
        Ok(())
    }

    /// Updates the row-span count, preserving the co-located token bits.
    pub fn set_number_of_rows(&self, cursor: Cursor, number_of_rows: u32) -> Result<()> {
        self.ensure_live()?;
        let pages = self.pages.read();
        let page = resolve_page(&pages, cursor)?;
        let base = cursor.slot() as usize * ROW_WORDS;
        let word2 = page[base + 2].load(Ordering::Acquire);
        page[base + 2].store(
            Row::merge_number_of_rows(word2, number_of_rows),
            Ordering::Release,
        );
        Ok(())
    }

    /// Returns every rented page to the pool. Double-dispose is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut pages = self.pages.write();
        let mut returned = 0usize;
        for slot in pages.drain(..) {
            if let Some(page) = slot {
                self.pool.give_back_row_page(page);
                returned += 1;
            }
        }
        debug!(pages = returned, "rows.dispose");
    }
}

impl Drop for RowDb {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn resolve_page<'a>(pages: &'a [Option<RowPage>], cursor: Cursor) -> Result<&'a RowPage> {
    pages
        .get(cursor.page() as usize)
        .and_then(Option::as_ref)
        .ok_or(ResultDocError::Invalid("cursor addresses an unallocated page"))
}
