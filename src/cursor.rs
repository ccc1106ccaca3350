//! Packed (page, slot) addresses into the row arena.
//!
//! A [`Cursor`] stands in for a pointer: it names a row by arena page and
//! slot within that page, packed into a single `u32`. Cursors stay valid
//! across arena growth because they address pages, not memory.

use crate::row::ROW_BYTES;

/// Size of one arena page in bytes.
pub const PAGE_BYTES: usize = 128 * 1024;

/// Number of row records that fit in one page.
pub const ROWS_PER_PAGE: u32 = (PAGE_BYTES / ROW_BYTES) as u32;

/// Maximum number of row pages addressable by a cursor (12-bit page index).
pub const MAX_PAGES: u32 = 1 << PAGE_BITS;

/// Maximum flat row index representable by any valid cursor.
pub const MAX_ROW_INDEX: u32 = MAX_PAGES * ROWS_PER_PAGE;

const PAGE_BITS: u32 = 12;
const SLOT_BITS: u32 = 14;
const SLOT_MASK: u32 = (1 << SLOT_BITS) - 1;

// A slot index must fit the 14-bit field.
const _: () = assert!(ROWS_PER_PAGE <= 1 << SLOT_BITS);

/// A packed row address: page index in the high 12 bits, slot in the low 14.
///
/// Ordering by packed value equals ordering by flat row index because the
/// page is the major component in both.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Cursor(u32);

impl Cursor {
    /// The first addressable row.
    pub const ZERO: Cursor = Cursor(0);

    /// Creates a cursor from a page and slot index.
    pub fn new(page: u32, slot: u32) -> Self {
        debug_assert!(page < MAX_PAGES, "page {page} out of range");
        debug_assert!(slot < ROWS_PER_PAGE, "slot {slot} out of range");
        Cursor((page << SLOT_BITS) | slot)
    }

    /// Page index component.
    pub fn page(self) -> u32 {
        self.0 >> SLOT_BITS
    }

    /// Slot index component.
    pub fn slot(self) -> u32 {
        self.0 & SLOT_MASK
    }

    /// Byte offset of this row inside its page.
    pub fn byte_offset(self) -> usize {
        self.slot() as usize * ROW_BYTES
    }

    /// Flat row index; bijective with `(page, slot)` over the valid domain.
    pub fn to_index(self) -> u32 {
        self.page() * ROWS_PER_PAGE + self.slot()
    }

    /// Rebuilds a cursor from a flat row index.
    pub fn from_index(index: u32) -> Self {
        debug_assert!(index < MAX_ROW_INDEX, "row index {index} out of range");
        Cursor::new(index / ROWS_PER_PAGE, index % ROWS_PER_PAGE)
    }

    /// Advances by `n` rows, carrying across page boundaries.
    ///
    /// Returns `None` past the maximum page count instead of wrapping.
    pub fn checked_add(self, n: u32) -> Option<Cursor> {
        let index = self.to_index().checked_add(n)?;
        if index >= MAX_ROW_INDEX {
            return None;
        }
        Some(Cursor::from_index(index))
    }

    /// Steps back by `n` rows, borrowing across page boundaries.
    pub fn checked_sub(self, n: u32) -> Option<Cursor> {
        let index = self.to_index().checked_sub(n)?;
        Some(Cursor::from_index(index))
    }

    /// The next row address. Asserts rather than wrapping on overflow.
    pub fn next(self) -> Cursor {
        self.checked_add(1).expect("cursor overflow past maximum page count")
    }

    /// The previous row address. Asserts at the arena start.
    pub fn prev(self) -> Cursor {
        self.checked_sub(1).expect("cursor underflow before arena start")
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cursor({}:{})", self.page(), self.slot())
    }
}
