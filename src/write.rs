//! Single-pass serialization of a document through a value-writer sink.
//!
//! The writer walks the row arena depth-first and emits each scalar with
//! exactly one `raw` call; payloads that straddle a page boundary are
//! materialized into a scratch buffer first. Internal-only and excluded
//! properties are skipped, invalidated objects and unassigned slots come
//! out as `null`.

use crate::cursor::Cursor;
use crate::document::{ResultDocument, MAX_PATH_DEPTH};
use crate::element::Element;
use crate::error::{Result, ResultDocError};
use crate::row::{flags, OpRefKind, Row, TokenKind};
use crate::text::escape_into;

/// Sink for one serialization pass over a document.
///
/// `raw` receives bytes that are already valid JSON fragments, including
/// the surrounding quotes for strings.
pub trait ValueWriter {
    /// Opens an object value.
    fn begin_object(&mut self);
    /// Closes the current object.
    fn end_object(&mut self);
    /// Opens an array value.
    fn begin_array(&mut self);
    /// Closes the current array.
    fn end_array(&mut self);
    /// Emits a property name from an unescaped key.
    fn property_name(&mut self, key: &str);
    /// Emits a property name from pre-quoted, pre-escaped payload bytes.
    fn raw_property_name(&mut self, quoted: &[u8]);
    /// Emits a string value from an unescaped `&str`.
    fn string_value(&mut self, value: &str);
    /// Emits a boolean value.
    fn bool_value(&mut self, value: bool);
    /// Emits a null value.
    fn null_value(&mut self);
    /// Emits one complete raw JSON fragment.
    fn raw(&mut self, fragment: &[u8]);
}

impl ResultDocument {
    /// Serializes the whole document into `writer`.
    ///
    /// Callers must have synchronized with all writers; the pass reads the
    /// arenas without taking the structural lock.
    pub fn write_to(&self, writer: &mut dyn ValueWriter) -> Result<()> {
        let mut scratch = Vec::new();
        self.write_value(writer, Cursor::ZERO, 0, &mut scratch)
    }

    /// Serializes the document to a JSON byte vector.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = JsonWriter::new();
        self.write_to(&mut writer)?;
        Ok(writer.into_bytes())
    }
}

impl Element<'_> {
    /// Serializes the subtree rooted at this element into `writer`.
    ///
    /// Same synchronization contract as [`ResultDocument::write_to`];
    /// partial-payload encoders use this to emit one branch at a time.
    pub fn write_to(&self, writer: &mut dyn ValueWriter) -> Result<()> {
        let doc = self.document();
        let mut cursor = self.cursor();
        let row = doc.rows().get(cursor)?;
        if row.token() == TokenKind::PropertyName {
            cursor = cursor.next();
        }
        let mut scratch = Vec::new();
        doc.write_value(writer, cursor, 0, &mut scratch)
    }

    /// Serializes the subtree to a JSON byte vector.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = JsonWriter::new();
        self.write_to(&mut writer)?;
        Ok(writer.into_bytes())
    }
}

impl ResultDocument {
    fn write_value(
        &self,
        writer: &mut dyn ValueWriter,
        cursor: Cursor,
        depth: usize,
        scratch: &mut Vec<u8>,
    ) -> Result<()> {
        if depth > MAX_PATH_DEPTH {
            return Err(ResultDocError::PathTooDeep(MAX_PATH_DEPTH));
        }
        let row = self.rows().get(cursor)?;
        match row.token() {
            TokenKind::None | TokenKind::Null => writer.null_value(),
            TokenKind::True => writer.bool_value(true),
            TokenKind::False => writer.bool_value(false),
            TokenKind::Number | TokenKind::String => {
                self.emit_payload(writer, &row, scratch)?;
            }
            TokenKind::Reference => {
                let target = Cursor::from_index(row.location());
                self.write_value(writer, target, depth + 1, scratch)?;
            }
            TokenKind::StartObject => {
                if row.has_flag(flags::IS_INVALIDATED) {
                    writer.null_value();
                    return Ok(());
                }
                self.write_object(writer, cursor, &row, depth, scratch)?;
            }
            TokenKind::StartArray => {
                writer.begin_array();
                let len = row.size_or_length().unwrap_or(0);
                for i in 0..len {
                    let slot = cursor
                        .checked_add(i + 1)
                        .ok_or(ResultDocError::Invalid("cursor overflow"))?;
                    self.write_value(writer, slot, depth + 1, scratch)?;
                }
                writer.end_array();
            }
            TokenKind::PropertyName | TokenKind::EndObject | TokenKind::EndArray => {
                return Err(ResultDocError::Invalid(
                    "structural row where a value was expected",
                ));
            }
        }
        Ok(())
    }

    fn write_object(
        &self,
        writer: &mut dyn ValueWriter,
        start: Cursor,
        row: &Row,
        depth: usize,
        scratch: &mut Vec<u8>,
    ) -> Result<()> {
        writer.begin_object();
        let count = row.size_or_length().unwrap_or(0);
        for i in 0..count {
            let name_cursor = start
                .checked_add(2 * i + 1)
                .ok_or(ResultDocError::Invalid("cursor overflow"))?;
            let name_row = self.rows().get(name_cursor)?;
            if name_row.has_flag(flags::IS_INTERNAL) || name_row.has_flag(flags::IS_EXCLUDED) {
                continue;
            }
            if name_row.op_ref_kind() == OpRefKind::Selection {
                let key = self.response_key_of(&name_row)?;
                writer.property_name(&key);
            } else if name_row.size_or_length().is_some() {
                self.emit_name_payload(writer, &name_row, scratch)?;
            } else {
                // Unnamed property of an untyped object; nothing to emit.
                continue;
            }
            self.write_value(writer, name_cursor.next(), depth + 1, scratch)?;
        }
        writer.end_object();
        Ok(())
    }

    fn emit_payload(
        &self,
        writer: &mut dyn ValueWriter,
        row: &Row,
        scratch: &mut Vec<u8>,
    ) -> Result<()> {
        let len = row
            .size_or_length()
            .ok_or(ResultDocError::Format("scalar payload"))? as usize;
        let location = row.location();
        if self.payload().in_one_page(location, len) {
            self.payload()
                .read_chunks(location, len, &mut |chunk| writer.raw(chunk))?;
            return Ok(());
        }
        scratch.clear();
        self.payload().copy_to(location, len, scratch)?;
        writer.raw(scratch);
        Ok(())
    }

    fn emit_name_payload(
        &self,
        writer: &mut dyn ValueWriter,
        name_row: &Row,
        scratch: &mut Vec<u8>,
    ) -> Result<()> {
        let len = name_row
            .size_or_length()
            .ok_or(ResultDocError::Format("property name"))? as usize;
        let location = name_row.location();
        if self.payload().in_one_page(location, len) {
            self.payload()
                .read_chunks(location, len, &mut |chunk| writer.raw_property_name(chunk))?;
            return Ok(());
        }
        scratch.clear();
        self.payload().copy_to(location, len, scratch)?;
        writer.raw_property_name(scratch);
        Ok(())
    }
}

/// Buffered JSON sink producing compact output.
#[derive(Default)]
pub struct JsonWriter {
    buf: Vec<u8>,
    needs_comma: bool,
}

impl JsonWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        JsonWriter::default()
    }

    /// Creates a writer with pre-reserved output capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        JsonWriter {
            buf: Vec::with_capacity(capacity),
            needs_comma: false,
        }
    }

    /// The serialized bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Borrowed view of the serialized bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn before_value(&mut self) {
        if self.needs_comma {
            self.buf.push(b',');
        }
    }

    fn before_name(&mut self) {
        if self.needs_comma {
            self.buf.push(b',');
        }
        self.buf.push(b'"');
    }

    fn after_name(&mut self) {
        self.buf.extend_from_slice(b"\":");
        self.needs_comma = false;
    }
}

impl ValueWriter for JsonWriter {
    fn begin_object(&mut self) {
        self.before_value();
        self.buf.push(b'{');
        self.needs_comma = false;
    }

    fn end_object(&mut self) {
        self.buf.push(b'}');
        self.needs_comma = true;
    }

    fn begin_array(&mut self) {
        self.before_value();
        self.buf.push(b'[');
        self.needs_comma = false;
    }

    fn end_array(&mut self) {
        self.buf.push(b']');
        self.needs_comma = true;
    }

    fn property_name(&mut self, key: &str) {
        self.before_name();
        escape_into(key, &mut self.buf);
        self.after_name();
    }

    fn raw_property_name(&mut self, quoted: &[u8]) {
        if self.needs_comma {
            self.buf.push(b',');
        }
        self.buf.extend_from_slice(quoted);
        self.buf.push(b':');
        self.needs_comma = false;
    }

    fn string_value(&mut self, value: &str) {
        self.before_value();
        self.buf.push(b'"');
        escape_into(value, &mut self.buf);
        self.buf.push(b'"');
        self.needs_comma = true;
    }

    fn bool_value(&mut self, value: bool) {
        self.before_value();
        self.buf
            .extend_from_slice(if value { b"true" } else { b"false" });
        self.needs_comma = true;
    }

    fn null_value(&mut self) {
        self.before_value();
        self.buf.extend_from_slice(b"null");
        self.needs_comma = true;
    }

    fn raw(&mut self, fragment: &[u8]) {
        self.before_value();
        self.buf.extend_from_slice(fragment);
        self.needs_comma = true;
    }
}
