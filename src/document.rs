//! The result document: shape construction, value assignment,
//! invalidation, and graph navigation over the two arenas.
//!
//! One document accumulates the output of one operation execution. Shape
//! is pre-built from selection metadata under a single structural mutex;
//! leaf values are then assigned concurrently by independent resolvers,
//! each touching exactly one pre-reserved row. A document is serialized
//! once and disposed once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::cursor::Cursor;
use crate::element::Element;
use crate::error::{Result, ResultDocError};
use crate::mem::{DataStore, PagePool, RowDb};
use crate::operation::{Operation, Selection, SelectionId, SelectionSet, SelectionSetId};
use crate::path::{Path, PathSegment};
use crate::row::{flags, OpRefKind, Row, TokenKind};
use crate::text::{unescape_into, NameBuf};

/// Maximum depth of a parent-chain walk before it is treated as a
/// structural-contract violation.
pub const MAX_PATH_DEPTH: usize = 64;

/// Construction-time tuning for one document.
#[derive(Clone, Debug)]
pub struct DocumentOptions {
    /// Expected total row count; sizes the initial page-index table.
    pub estimated_rows: usize,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        DocumentOptions {
            estimated_rows: 256,
        }
    }
}

/// In-memory result tree for one query/mutation execution.
pub struct ResultDocument {
    rows: RowDb,
    data: DataStore,
    operation: Arc<Operation>,
    include_flags: u64,
    sync: Arc<Mutex<()>>,
    root: Cursor,
    disposed: AtomicBool,
}

impl ResultDocument {
    /// Creates a document with its own page pool and pre-shapes the root
    /// object from the operation's root selection set.
    pub fn new(operation: Arc<Operation>, include_flags: u64, options: DocumentOptions) -> Result<Self> {
        Self::with_pool(operation, include_flags, options, Arc::new(PagePool::default()))
    }

    /// Creates a document renting pages from a shared pool.
    pub fn with_pool(
        operation: Arc<Operation>,
        include_flags: u64,
        options: DocumentOptions,
        pool: Arc<PagePool>,
    ) -> Result<Self> {
        let sync = Arc::new(Mutex::new(()));
        let doc = ResultDocument {
            rows: RowDb::create_for_estimated_rows(Arc::clone(&pool), options.estimated_rows),
            data: DataStore::new(pool, Arc::clone(&sync)),
            operation,
            include_flags,
            sync,
            root: Cursor::ZERO,
            disposed: AtomicBool::new(false),
        };
        let root_set = doc.operation.root_selection_set().clone();
        {
            let _guard = doc.sync.lock();
            let root = doc.shape_object_locked(None, Some(&root_set), root_set.selections().len(), true)?;
            debug_assert_eq!(root, Cursor::ZERO);
        }
        Ok(doc)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ResultDocError::Disposed);
        }
        Ok(())
    }

    fn ensure_owned(&self, element: Element<'_>) -> Result<Cursor> {
        if !std::ptr::eq(self, element.document()) {
            return Err(ResultDocError::Invalid("element belongs to another document"));
        }
        Ok(element.cursor())
    }

    /// The compiled operation this document was shaped from.
    pub fn operation(&self) -> &Arc<Operation> {
        &self.operation
    }

    /// The inclusion bitmask evaluated at shaping time.
    pub fn include_flags(&self) -> u64 {
        self.include_flags
    }

    /// Root element handle.
    pub fn data(&self) -> Element<'_> {
        Element::new(self, self.root)
    }

    pub(crate) fn rows(&self) -> &RowDb {
        &self.rows
    }

    pub(crate) fn payload(&self) -> &DataStore {
        &self.data
    }

    // ---- shape construction -------------------------------------------

    /// Appends a selection-shaped object run under the structural mutex and
    /// returns its element. The whole run becomes visible atomically.
    pub fn create_object(&self, parent: Element<'_>, set_id: SelectionSetId) -> Result<Element<'_>> {
        self.ensure_live()?;
        let parent = self.ensure_owned(parent)?;
        let set = self.operation.selection_set(set_id)?.clone();
        let _guard = self.sync.lock();
        let start =
            self.shape_object_locked(Some(parent), Some(&set), set.selections().len(), false)?;
        Ok(Element::new(self, start))
    }

    /// Appends an object run without selection metadata; property names
    /// must later be assigned through [`ResultDocument::assign_property_name`].
    pub fn create_untyped_object(
        &self,
        parent: Element<'_>,
        property_count: usize,
    ) -> Result<Element<'_>> {
        self.ensure_live()?;
        let parent = self.ensure_owned(parent)?;
        let _guard = self.sync.lock();
        let start = self.shape_object_locked(Some(parent), None, property_count, false)?;
        Ok(Element::new(self, start))
    }

    /// Appends an array run of `len` placeholder slots.
    pub fn create_array(&self, parent: Element<'_>, len: usize) -> Result<Element<'_>> {
        self.ensure_live()?;
        let parent = self.ensure_owned(parent)?;
        let _guard = self.sync.lock();
        let len_u32 = u32::try_from(len).map_err(|_| ResultDocError::Invalid("array too long"))?;
        let start = self.rows.append(Row::new(
            TokenKind::StartArray,
            0,
            Some(len_u32),
            false,
            Some(parent.to_index()),
            0,
            OpRefKind::None,
            len_u32 + 1,
            flags::IS_LIST,
        ))?;
        let parent_idx = start.to_index();
        for _ in 0..len {
            self.rows.append(Row::placeholder(parent_idx, 0))?;
        }
        self.rows.append(Row::new(
            TokenKind::EndArray,
            0,
            None,
            false,
            Some(parent_idx),
            0,
            OpRefKind::None,
            0,
            0,
        ))?;
        Ok(Element::new(self, start))
    }

    fn shape_object_locked(
        &self,
        parent: Option<Cursor>,
        set: Option<&SelectionSet>,
        property_count: usize,
        is_root: bool,
    ) -> Result<Cursor> {
        let count = u32::try_from(property_count)
            .map_err(|_| ResultDocError::Invalid("too many properties"))?;
        let mut start_flags = flags::IS_OBJECT;
        if is_root {
            start_flags |= flags::IS_ROOT;
        }
        let (set_id, set_kind) = match set {
            Some(set) => (set.id().0, OpRefKind::SelectionSet),
            None => (0, OpRefKind::None),
        };
        let start = self.rows.append(Row::new(
            TokenKind::StartObject,
            0,
            Some(count),
            false,
            parent.map(Cursor::to_index),
            set_id,
            set_kind,
            2 * count + 1,
            start_flags,
        ))?;
        let parent_idx = start.to_index();
        for i in 0..property_count {
            let (sel_id, sel_kind, name_flags) = match set {
                Some(set) => {
                    let sel = &set.selections()[i];
                    (sel.id().0, OpRefKind::Selection, self.selection_flags(sel))
                }
                None => (0, OpRefKind::None, 0),
            };
            self.rows.append(Row::new(
                TokenKind::PropertyName,
                0,
                None,
                false,
                Some(parent_idx),
                sel_id,
                sel_kind,
                0,
                name_flags,
            ))?;
            self.rows.append(Row::placeholder(parent_idx, 0))?;
        }
        self.rows.append(Row::new(
            TokenKind::EndObject,
            0,
            None,
            false,
            Some(parent_idx),
            0,
            OpRefKind::None,
            0,
            0,
        ))?;
        Ok(start)
    }

    fn selection_flags(&self, selection: &Selection) -> u8 {
        let mut bits = 0u8;
        if selection.is_internal() {
            bits |= flags::IS_INTERNAL;
        }
        if !selection.is_included(self.include_flags) {
            bits |= flags::IS_EXCLUDED;
        }
        if selection.is_nullable() {
            bits |= flags::IS_NULLABLE;
        }
        if selection.is_list() {
            bits |= flags::IS_LIST;
        }
        if selection.is_composite() {
            bits |= flags::IS_OBJECT;
        }
        bits
    }

    // ---- value assignment ---------------------------------------------

    fn replace_scalar(
        &self,
        target: Cursor,
        token: TokenKind,
        location: u32,
        size: Option<u32>,
        complex: bool,
        encoded: bool,
    ) -> Result<()> {
        let old = self.rows.get(target)?;
        let mut bits = old.flag_bits();
        if encoded {
            bits |= flags::IS_ENCODED;
        }
        self.rows.replace(
            target,
            Row::new(
                token,
                location,
                size,
                complex,
                old.parent_row(),
                old.op_ref_id(),
                old.op_ref_kind(),
                0,
                bits,
            ),
        )
    }

    /// Assigns a quote-wrapped string payload to a reserved value slot.
    ///
    /// `escaped` must already be JSON-escaped; `is_encoded` records whether
    /// it actually contains escape sequences (and so needs unescaping on
    /// read). Safe to call concurrently across disjoint targets.
    pub fn assign_string_value(&self, target: Cursor, escaped: &[u8], is_encoded: bool) -> Result<()> {
        self.ensure_live()?;
        let location = self.data.write_quoted(escaped)?;
        self.replace_scalar(
            target,
            TokenKind::String,
            location,
            Some(escaped.len() as u32 + 2),
            is_encoded,
            is_encoded,
        )
    }

    /// Assigns raw numeric payload bytes to a reserved value slot.
    pub fn assign_number_value(&self, target: Cursor, raw: &[u8]) -> Result<()> {
        self.ensure_live()?;
        let location = self.data.claim(raw.len())?;
        self.data.write(location, raw)?;
        self.replace_scalar(
            target,
            TokenKind::Number,
            location,
            Some(raw.len() as u32),
            false,
            false,
        )
    }

    /// Assigns a boolean to a reserved value slot.
    pub fn assign_boolean_value(&self, target: Cursor, value: bool) -> Result<()> {
        self.ensure_live()?;
        let token = if value { TokenKind::True } else { TokenKind::False };
        self.replace_scalar(target, token, 0, Some(0), false, false)
    }

    /// Assigns an explicit null to a reserved value slot.
    pub fn assign_null_value(&self, target: Cursor) -> Result<()> {
        self.ensure_live()?;
        self.replace_scalar(target, TokenKind::Null, 0, Some(0), false, false)
    }

    /// Assigns a property name payload to a reserved name row of an
    /// untyped object.
    pub fn assign_property_name(&self, target: Cursor, escaped: &[u8], is_encoded: bool) -> Result<()> {
        self.ensure_live()?;
        let old = self.rows.get(target)?;
        if old.token() != TokenKind::PropertyName {
            return Err(ResultDocError::WrongTokenKind {
                expected: TokenKind::PropertyName.name(),
                found: old.token().name(),
            });
        }
        let location = self.data.write_quoted(escaped)?;
        self.replace_scalar(
            target,
            TokenKind::PropertyName,
            location,
            Some(escaped.len() as u32 + 2),
            is_encoded,
            is_encoded,
        )
    }

    /// Turns a reserved value slot into a reference to a separately
    /// created object or array run.
    pub fn assign_object_or_array(&self, target: Cursor, value: Element<'_>) -> Result<()> {
        self.ensure_live()?;
        let value = self.ensure_owned(value)?;
        self.replace_scalar(target, TokenKind::Reference, value.to_index(), None, false, false)
    }

    // ---- invalidation --------------------------------------------------

    /// Marks the object at `cursor` as nulled by non-null error
    /// propagation. Arrays and scalars are not invalidatable (no-op).
    pub fn invalidate(&self, cursor: Cursor) -> Result<()> {
        self.ensure_live()?;
        let (start, row) = self.rows.start_cursor(cursor)?;
        if row.token() == TokenKind::StartObject {
            self.rows.set_flags(start, flags::IS_INVALIDATED)?;
        }
        Ok(())
    }

    /// True when the row is null, still unset, or an invalidated object.
    pub fn is_null_or_invalidated(&self, cursor: Cursor) -> Result<bool> {
        self.ensure_live()?;
        let row = self.rows.get(cursor)?;
        match row.token() {
            TokenKind::Null | TokenKind::None => Ok(true),
            TokenKind::StartObject => Ok(row.has_flag(flags::IS_INVALIDATED)),
            TokenKind::Reference => {
                let (_, resolved) = self.rows.start_cursor(cursor)?;
                Ok(resolved.token() == TokenKind::StartObject
                    && resolved.has_flag(flags::IS_INVALIDATED))
            }
            _ => Ok(false),
        }
    }

    // ---- navigation ----------------------------------------------------

    /// Logical parent element: skips the property-name row, and steps
    /// through a reference-reached container to the true logical
    /// container. Returns `None` at the document root.
    pub fn parent(&self, cursor: Cursor) -> Result<Option<Element<'_>>> {
        self.ensure_live()?;
        let mut cursor = cursor;
        let mut row = self.rows.get(cursor)?;
        if row.token() == TokenKind::PropertyName {
            // Name and value share one logical element.
            cursor = cursor.next();
            row = self.rows.get(cursor)?;
        }
        let Some(parent_idx) = row.parent_row() else {
            return Ok(None);
        };
        let parent_cursor = Cursor::from_index(parent_idx);
        let parent_row = self.rows.get(parent_cursor)?;
        if parent_row.token() == TokenKind::Reference {
            return match parent_row.parent_row() {
                Some(container) => Ok(Some(Element::new(self, Cursor::from_index(container)))),
                None => Ok(None),
            };
        }
        Ok(Some(Element::new(self, parent_cursor)))
    }

    /// Builds the root-to-leaf path of the element at `cursor`.
    ///
    /// The parent chain is bounded to [`MAX_PATH_DEPTH`] hops; exceeding it
    /// is a fatal structural-contract violation.
    pub fn path(&self, cursor: Cursor) -> Result<Path> {
        self.ensure_live()?;
        let mut segments: SmallVec<[PathSegment; 8]> = SmallVec::new();
        let mut cursor = cursor;
        let mut row = self.rows.get(cursor)?;
        if row.token() == TokenKind::PropertyName {
            cursor = cursor.next();
            row = self.rows.get(cursor)?;
        }
        let mut hops = 0usize;
        while !row.has_flag(flags::IS_ROOT) {
            hops += 1;
            if hops > MAX_PATH_DEPTH {
                return Err(ResultDocError::PathTooDeep(MAX_PATH_DEPTH));
            }
            let Some(parent_idx) = row.parent_row() else {
                break;
            };
            let parent_cursor = Cursor::from_index(parent_idx);
            let parent_row = self.rows.get(parent_cursor)?;
            match parent_row.token() {
                TokenKind::StartObject => {
                    let name_cursor = cursor.prev();
                    let name_row = self.rows.get(name_cursor)?;
                    segments.push(PathSegment::Key(self.response_key_of(&name_row)?));
                }
                TokenKind::StartArray => {
                    segments.push(PathSegment::Index(
                        (cursor.to_index() - parent_idx - 1) as usize,
                    ));
                }
                // A reference slot links a detached container; the slot
                // itself contributes the segment on the next hop.
                _ => {}
            }
            cursor = parent_cursor;
            row = parent_row;
        }
        segments.reverse();
        Ok(Path::from_segments(segments))
    }

    /// Response key recorded on a property-name row, either through its
    /// linked selection or its assigned payload.
    pub(crate) fn response_key_of(&self, name_row: &Row) -> Result<Arc<str>> {
        if name_row.op_ref_kind() == OpRefKind::Selection {
            let selection = self.operation.selection(SelectionId(name_row.op_ref_id()))?;
            return Ok(Arc::clone(selection.response_key()));
        }
        let Some(size) = name_row.size_or_length() else {
            return Err(ResultDocError::Invalid("property name not assigned"));
        };
        if size < 2 {
            return Err(ResultDocError::Format("property name"));
        }
        let mut raw = NameBuf::new();
        self.payload_to_buf(name_row.location() + 1, size as usize - 2, &mut raw)?;
        if name_row.has_complex_children() {
            let mut decoded = NameBuf::new();
            unescape_into(&raw, &mut decoded)?;
            raw = decoded;
        }
        std::str::from_utf8(&raw)
            .map(Arc::from)
            .map_err(|_| ResultDocError::Format("property name"))
    }

    fn payload_to_buf(&self, location: u32, len: usize, out: &mut NameBuf) -> Result<()> {
        self.data
            .read_chunks(location, len, &mut |chunk| out.extend_from_slice(chunk))
    }

    // ---- property lookup ----------------------------------------------

    /// Looks up a property by response key, returning `None` on miss.
    ///
    /// Selection-shaped objects are addressed arithmetically from the
    /// compiled selection order; otherwise (or on a metadata miss) falls
    /// back to a backward scan over the property rows.
    pub fn try_get_property(&self, object: Cursor, name: &str) -> Result<Option<Element<'_>>> {
        self.ensure_live()?;
        let (start, row) = self.rows.start_cursor(object)?;
        if row.token() != TokenKind::StartObject {
            return Err(ResultDocError::WrongTokenKind {
                expected: TokenKind::StartObject.name(),
                found: row.token().name(),
            });
        }
        if row.op_ref_kind() == OpRefKind::SelectionSet {
            let set = self.operation.selection_set(SelectionSetId(row.op_ref_id()))?;
            if let Some(selection) = set.find(name) {
                // Rows were written in selection order; address directly.
                let name_offset = u32::from(selection.id().0 - set.id().0 - 1) * 2 + 1;
                let value = start
                    .checked_add(name_offset + 1)
                    .ok_or(ResultDocError::Invalid("cursor overflow"))?;
                return Ok(Some(Element::new(self, value)));
            }
        }
        let count = row.size_or_length().unwrap_or(0);
        let expect = name.as_bytes();
        for i in (0..count).rev() {
            let name_cursor = start
                .checked_add(2 * i + 1)
                .ok_or(ResultDocError::Invalid("cursor overflow"))?;
            let name_row = self.rows.get(name_cursor)?;
            if name_row.token() != TokenKind::PropertyName {
                continue;
            }
            if self.name_row_matches(&name_row, name, expect)? {
                return Ok(Some(Element::new(self, name_cursor.next())));
            }
        }
        Ok(None)
    }

    /// Like [`ResultDocument::try_get_property`] but errors on a miss.
    pub fn get_property(&self, object: Cursor, name: &str) -> Result<Element<'_>> {
        self.try_get_property(object, name)?
            .ok_or_else(|| ResultDocError::KeyNotFound(name.to_string()))
    }

    fn name_row_matches(&self, name_row: &Row, name: &str, expect: &[u8]) -> Result<bool> {
        if name_row.op_ref_kind() == OpRefKind::Selection {
            let selection = self.operation.selection(SelectionId(name_row.op_ref_id()))?;
            return Ok(&**selection.response_key() == name);
        }
        let Some(size) = name_row.size_or_length() else {
            return Ok(false);
        };
        if size < 2 {
            return Ok(false);
        }
        let raw_len = size as usize - 2;
        if !name_row.has_complex_children() {
            if raw_len != expect.len() {
                return Ok(false);
            }
            return self.payload_eq(name_row.location() + 1, raw_len, expect);
        }
        // Escapes only expand the encoded form; shorter payloads cannot
        // decode to this key.
        if raw_len < expect.len() {
            return Ok(false);
        }
        let mut raw = NameBuf::new();
        self.payload_to_buf(name_row.location() + 1, raw_len, &mut raw)?;
        let mut decoded = NameBuf::new();
        unescape_into(&raw, &mut decoded)?;
        Ok(&decoded[..] == expect)
    }

    fn payload_eq(&self, location: u32, len: usize, expect: &[u8]) -> Result<bool> {
        debug_assert_eq!(len, expect.len());
        let mut matches = true;
        let mut offset = 0usize;
        self.data.read_chunks(location, len, &mut |chunk| {
            if matches {
                matches = chunk == &expect[offset..offset + chunk.len()];
                offset += chunk.len();
            }
        })?;
        Ok(matches)
    }

    // ---- lifecycle -----------------------------------------------------

    /// Returns all arena pages to the pool. Double-dispose is a no-op;
    /// any later public operation fails with [`ResultDocError::Disposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.rows.dispose();
        self.data.dispose();
    }
}

impl Drop for ResultDocument {
    fn drop(&mut self) {
        self.dispose();
    }
}
