//! Lightweight element handles over document rows.
//!
//! An [`Element`] is a copyable `(document, cursor)` pair. It resolves
//! reference indirection on demand and exposes typed accessors, mutation
//! wrappers, and container iteration without owning any data itself.

use std::sync::Arc;

use crate::cursor::Cursor;
use crate::document::ResultDocument;
use crate::error::{Result, ResultDocError};
use crate::operation::{Selection, SelectionId, SelectionSetId};
use crate::path::Path;
use crate::row::{flags, OpRefKind, Row, TokenKind};
use crate::text::{unescape, NameBuf};

/// A borrowed handle to one document element.
#[derive(Copy, Clone)]
pub struct Element<'a> {
    doc: &'a ResultDocument,
    cursor: Cursor,
}

impl<'a> Element<'a> {
    pub(crate) fn new(doc: &'a ResultDocument, cursor: Cursor) -> Self {
        Element { doc, cursor }
    }

    pub(crate) fn document(&self) -> &'a ResultDocument {
        self.doc
    }

    /// The row address this handle points at.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// The raw row, with a property-name cursor normalized to its value slot.
    fn value_row(&self) -> Result<(Cursor, Row)> {
        let mut cursor = self.cursor;
        let mut row = self.doc.rows().get(cursor)?;
        if row.token() == TokenKind::PropertyName {
            cursor = cursor.next();
            row = self.doc.rows().get(cursor)?;
        }
        Ok((cursor, row))
    }

    /// The resolved row: value slot, then one level of reference indirection.
    fn resolved(&self) -> Result<(Cursor, Row)> {
        let (cursor, row) = self.value_row()?;
        if row.token() == TokenKind::Reference {
            return self.doc.rows().start_cursor(cursor);
        }
        Ok((cursor, row))
    }

    /// Token kind after resolving indirection.
    pub fn kind(&self) -> Result<TokenKind> {
        Ok(self.resolved()?.1.token())
    }

    /// The row carrying this element's shaping metadata.
    ///
    /// Selection-derived flags are written onto the PropertyName row, so a
    /// value slot defers to its preceding name row; elements without one
    /// answer from their own row.
    fn metadata_row(&self) -> Result<Row> {
        let row = self.doc.rows().get(self.cursor)?;
        if row.token() == TokenKind::PropertyName || self.cursor == Cursor::ZERO {
            return Ok(row);
        }
        let prev = self.doc.rows().get(self.cursor.prev())?;
        if prev.token() == TokenKind::PropertyName && prev.parent_row() == row.parent_row() {
            return Ok(prev);
        }
        Ok(row)
    }

    /// The selection this element was shaped from, if any.
    ///
    /// Value slots inherit the selection of their preceding name row.
    pub fn selection(&self) -> Result<Option<&'a Selection>> {
        let name_row = self.metadata_row()?;
        if name_row.token() != TokenKind::PropertyName
            || name_row.op_ref_kind() != OpRefKind::Selection
        {
            return Ok(None);
        }
        Ok(Some(
            self.doc
                .operation()
                .selection(SelectionId(name_row.op_ref_id()))?,
        ))
    }

    /// Whether the shaping selection permits null.
    pub fn is_nullable(&self) -> Result<bool> {
        Ok(self.metadata_row()?.has_flag(flags::IS_NULLABLE))
    }

    /// Whether this is an internal-only field.
    pub fn is_internal(&self) -> Result<bool> {
        Ok(self.metadata_row()?.has_flag(flags::IS_INTERNAL))
    }

    /// True when the element is null, unassigned, or an invalidated object.
    pub fn is_null_or_invalidated(&self) -> Result<bool> {
        let (cursor, _) = self.value_row()?;
        self.doc.is_null_or_invalidated(cursor)
    }

    /// True when the resolved object carries the invalidation flag.
    pub fn is_invalidated(&self) -> Result<bool> {
        let (_, row) = self.resolved()?;
        Ok(row.token() == TokenKind::StartObject && row.has_flag(flags::IS_INVALIDATED))
    }

    // ---- navigation ----------------------------------------------------

    /// The logical parent element, `None` at the root.
    pub fn parent(&self) -> Result<Option<Element<'a>>> {
        self.doc.parent(self.cursor)
    }

    /// The root-to-here path.
    pub fn path(&self) -> Result<Path> {
        self.doc.path(self.cursor)
    }

    // ---- typed getters -------------------------------------------------

    fn wrong_kind(expected: TokenKind, found: TokenKind) -> ResultDocError {
        ResultDocError::WrongTokenKind {
            expected: expected.name(),
            found: found.name(),
        }
    }

    /// Boolean value; `Ok(None)` while null or unassigned.
    pub fn try_bool(&self) -> Result<Option<bool>> {
        let (_, row) = self.resolved()?;
        match row.token() {
            TokenKind::True => Ok(Some(true)),
            TokenKind::False => Ok(Some(false)),
            TokenKind::Null | TokenKind::None => Ok(None),
            other => Err(Self::wrong_kind(TokenKind::True, other)),
        }
    }

    /// Boolean value; errors when the slot holds anything else.
    pub fn bool_value(&self) -> Result<bool> {
        self.try_bool()?
            .ok_or(ResultDocError::Invalid("boolean value is null"))
    }

    /// Decoded string value; `Ok(None)` while null or unassigned.
    pub fn try_string(&self) -> Result<Option<String>> {
        let (_, row) = self.resolved()?;
        match row.token() {
            TokenKind::String => {}
            TokenKind::Null | TokenKind::None => return Ok(None),
            other => return Err(Self::wrong_kind(TokenKind::String, other)),
        }
        let size = row
            .size_or_length()
            .filter(|&s| s >= 2)
            .ok_or(ResultDocError::Format("string"))?;
        let mut raw = NameBuf::new();
        self.doc
            .payload()
            .read_chunks(row.location() + 1, size as usize - 2, &mut |chunk| {
                raw.extend_from_slice(chunk)
            })?;
        if row.has_flag(flags::IS_ENCODED) || row.has_complex_children() {
            return unescape(&raw).map(Some);
        }
        String::from_utf8(raw.into_vec())
            .map(Some)
            .map_err(|_| ResultDocError::Format("string"))
    }

    /// Decoded string value; errors when the slot holds anything else.
    pub fn string_value(&self) -> Result<String> {
        self.try_string()?
            .ok_or(ResultDocError::Invalid("string value is null"))
    }

    fn number_payload(&self) -> Result<Option<NameBuf>> {
        let (_, row) = self.resolved()?;
        match row.token() {
            TokenKind::Number => {}
            TokenKind::Null | TokenKind::None => return Ok(None),
            other => return Err(Self::wrong_kind(TokenKind::Number, other)),
        }
        let size = row
            .size_or_length()
            .ok_or(ResultDocError::Format("number"))?;
        let mut raw = NameBuf::new();
        self.doc
            .payload()
            .read_chunks(row.location(), size as usize, &mut |chunk| {
                raw.extend_from_slice(chunk)
            })?;
        Ok(Some(raw))
    }

    fn parse_number<T: std::str::FromStr>(&self, what: &'static str) -> Result<Option<T>> {
        let Some(raw) = self.number_payload()? else {
            return Ok(None);
        };
        // `parse` requires the whole payload to be consumed, so trailing
        // garbage is rejected here rather than truncated.
        std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Some)
            .ok_or(ResultDocError::Format(what))
    }

    /// Numeric value as `i32`; `Ok(None)` while null or unassigned.
    pub fn try_i32(&self) -> Result<Option<i32>> {
        self.parse_number("i32")
    }

    /// Numeric value as `i32`; errors on null or mismatch.
    pub fn i32_value(&self) -> Result<i32> {
        self.try_i32()?
            .ok_or(ResultDocError::Invalid("number value is null"))
    }

    /// Numeric value as `i64`; `Ok(None)` while null or unassigned.
    pub fn try_i64(&self) -> Result<Option<i64>> {
        self.parse_number("i64")
    }

    /// Numeric value as `i64`; errors on null or mismatch.
    pub fn i64_value(&self) -> Result<i64> {
        self.try_i64()?
            .ok_or(ResultDocError::Invalid("number value is null"))
    }

    /// Numeric value as `f64`; `Ok(None)` while null or unassigned.
    pub fn try_f64(&self) -> Result<Option<f64>> {
        self.parse_number("f64")
    }

    /// Numeric value as `f64`; errors on null or mismatch.
    pub fn f64_value(&self) -> Result<f64> {
        self.try_f64()?
            .ok_or(ResultDocError::Invalid("number value is null"))
    }

    // ---- containers ----------------------------------------------------

    /// Element count of an array, or property count of an object.
    pub fn len(&self) -> Result<usize> {
        let (_, row) = self.resolved()?;
        match row.token() {
            TokenKind::StartArray | TokenKind::StartObject => Ok(row
                .size_or_length()
                .ok_or(ResultDocError::Format("container length"))?
                as usize),
            other => Err(Self::wrong_kind(TokenKind::StartArray, other)),
        }
    }

    /// True for an empty container.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The `index`-th slot of an array.
    pub fn item(&self, index: usize) -> Result<Element<'a>> {
        let (start, row) = self.resolved()?;
        if row.token() != TokenKind::StartArray {
            return Err(Self::wrong_kind(TokenKind::StartArray, row.token()));
        }
        let len = row.size_or_length().unwrap_or(0) as usize;
        if index >= len {
            return Err(ResultDocError::IndexOutOfRange { index, len });
        }
        let cursor = start
            .checked_add(index as u32 + 1)
            .ok_or(ResultDocError::Invalid("cursor overflow"))?;
        Ok(Element::new(self.doc, cursor))
    }

    /// Looks up an object property by response key; `None` on miss.
    pub fn try_get_property(&self, name: &str) -> Result<Option<Element<'a>>> {
        let (cursor, _) = self.value_row()?;
        self.doc.try_get_property(cursor, name)
    }

    /// Looks up an object property by response key; errors on miss.
    pub fn get_property(&self, name: &str) -> Result<Element<'a>> {
        let (cursor, _) = self.value_row()?;
        self.doc.get_property(cursor, name)
    }

    /// Iterates the value slots of an array.
    pub fn items(&self) -> Result<ArrayIter<'a>> {
        let (start, row) = self.resolved()?;
        if row.token() != TokenKind::StartArray {
            return Err(Self::wrong_kind(TokenKind::StartArray, row.token()));
        }
        Ok(ArrayIter {
            doc: self.doc,
            start,
            len: row.size_or_length().unwrap_or(0),
            next: 0,
        })
    }

    /// Iterates `(response_key, value)` pairs of an object, skipping
    /// properties excluded by the inclusion bitmask.
    pub fn properties(&self) -> Result<ObjectIter<'a>> {
        let (start, row) = self.resolved()?;
        if row.token() != TokenKind::StartObject {
            return Err(Self::wrong_kind(TokenKind::StartObject, row.token()));
        }
        Ok(ObjectIter {
            doc: self.doc,
            start,
            count: row.size_or_length().unwrap_or(0),
            next: 0,
        })
    }

    // ---- mutation wrappers ---------------------------------------------

    /// Assigns a pre-escaped string payload to this slot.
    pub fn set_string(&self, escaped: &[u8], is_encoded: bool) -> Result<()> {
        let (cursor, _) = self.value_row()?;
        self.doc.assign_string_value(cursor, escaped, is_encoded)
    }

    /// Assigns raw numeric payload bytes to this slot.
    pub fn set_number(&self, raw: &[u8]) -> Result<()> {
        let (cursor, _) = self.value_row()?;
        self.doc.assign_number_value(cursor, raw)
    }

    /// Assigns a boolean to this slot.
    pub fn set_bool(&self, value: bool) -> Result<()> {
        let (cursor, _) = self.value_row()?;
        self.doc.assign_boolean_value(cursor, value)
    }

    /// Assigns an explicit null to this slot.
    pub fn set_null(&self) -> Result<()> {
        let (cursor, _) = self.value_row()?;
        self.doc.assign_null_value(cursor)
    }

    /// Links a separately created object or array into this slot.
    pub fn set_object_or_array(&self, value: Element<'_>) -> Result<()> {
        let (cursor, _) = self.value_row()?;
        self.doc.assign_object_or_array(cursor, value)
    }

    /// Creates a selection-shaped child object linked into this slot.
    pub fn set_new_object(&self, set_id: SelectionSetId) -> Result<Element<'a>> {
        let child = self.doc.create_object(*self, set_id)?;
        self.set_object_or_array(child)?;
        Ok(child)
    }

    /// Creates a child array of `len` slots linked into this slot.
    pub fn set_new_array(&self, len: usize) -> Result<Element<'a>> {
        let child = self.doc.create_array(*self, len)?;
        self.set_object_or_array(child)?;
        Ok(child)
    }

    /// Marks the resolved object as nulled by error propagation.
    pub fn invalidate(&self) -> Result<()> {
        let (cursor, _) = self.value_row()?;
        self.doc.invalidate(cursor)
    }
}

impl std::fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Element({:?})", self.cursor)
    }
}

/// Iterator over the value slots of an array element.
pub struct ArrayIter<'a> {
    doc: &'a ResultDocument,
    start: Cursor,
    len: u32,
    next: u32,
}

impl<'a> Iterator for ArrayIter<'a> {
    type Item = Element<'a>;

    fn next(&mut self) -> Option<Element<'a>> {
        if self.next >= self.len {
            return None;
        }
        let cursor = self.start.checked_add(self.next + 1)?;
        self.next += 1;
        Some(Element::new(self.doc, cursor))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.len - self.next) as usize;
        (left, Some(left))
    }
}

/// Iterator over the included `(response_key, value)` pairs of an object.
pub struct ObjectIter<'a> {
    doc: &'a ResultDocument,
    start: Cursor,
    count: u32,
    next: u32,
}

impl<'a> Iterator for ObjectIter<'a> {
    type Item = Result<(Arc<str>, Element<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.count {
            let i = self.next;
            self.next += 1;
            let Some(name_cursor) = self.start.checked_add(2 * i + 1) else {
                return Some(Err(ResultDocError::Invalid("cursor overflow")));
            };
            let name_row = match self.doc.rows().get(name_cursor) {
                Ok(row) => row,
                Err(err) => return Some(Err(err)),
            };
            if name_row.has_flag(flags::IS_EXCLUDED) {
                continue;
            }
            // Untyped objects may still have unnamed properties.
            if name_row.op_ref_kind() != OpRefKind::Selection
                && name_row.size_or_length().is_none()
            {
                continue;
            }
            let key = match self.doc.response_key_of(&name_row) {
                Ok(key) => key,
                Err(err) => return Some(Err(err)),
            };
            return Some(Ok((key, Element::new(self.doc, name_cursor.next()))));
        }
        None
    }
}
