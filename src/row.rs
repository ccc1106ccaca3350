//! Fixed-size packed row records.
//!
//! Every arena slot holds one 20-byte [`Row`]: five 32-bit words describing
//! a document element or structural marker. All mask-and-shift logic lives
//! in this module so a field-width change is a single-point edit.
//!
//! Word layout:
//!
//! | word | bits          | field                                   |
//! |------|---------------|-----------------------------------------|
//! | 0    | 0..27         | location (payload offset, or row index for references) |
//! | 0    | 27..29        | operation reference kind                |
//! | 1    | 0..27         | size or length                          |
//! | 1    | 27            | "unsized" validity bit                  |
//! | 1    | 31            | has-complex-children (needs unescaping) |
//! | 2    | 0..4          | token kind                              |
//! | 2    | 4..31         | number of rows spanned                  |
//! | 3    | 0..27         | parent row index                        |
//! | 4    | 0..8          | flags                                   |
//! | 4    | 8..23         | operation reference id                  |

use crate::error::{ResultDocError, Result};

/// Size of one packed row record in bytes.
pub const ROW_BYTES: usize = 20;

/// Number of 32-bit words per row record.
pub const ROW_WORDS: usize = 5;

const _: () = assert!(ROW_WORDS * 4 == ROW_BYTES);

const FIELD_BITS: u32 = 27;
const FIELD_MASK: u32 = (1 << FIELD_BITS) - 1;
const OP_REF_KIND_SHIFT: u32 = 27;
const TOKEN_BITS: u32 = 4;
const TOKEN_MASK: u32 = (1 << TOKEN_BITS) - 1;
const UNSIZED_BIT: u32 = 1 << 27;
const COMPLEX_BIT: u32 = 1 << 31;
const FLAGS_MASK: u32 = 0xFF;
const OP_REF_ID_SHIFT: u32 = 8;
const OP_REF_ID_MASK: u32 = (1 << 15) - 1;

/// Sentinel parent index meaning "no structural parent".
pub const PARENT_NONE: u32 = FIELD_MASK;

/// Token kind of a row record (4-bit field, at most 16 values).
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TokenKind {
    /// Reserved placeholder; a still-unassigned value slot.
    None = 0,
    /// Opens an object run.
    StartObject = 1,
    /// Closes an object run.
    EndObject = 2,
    /// Opens an array run.
    StartArray = 3,
    /// Closes an array run.
    EndArray = 4,
    /// A property name inside an object run.
    PropertyName = 5,
    /// A quote-wrapped, pre-escaped string payload.
    String = 6,
    /// A raw numeric payload.
    Number = 7,
    /// Boolean `true`.
    True = 8,
    /// Boolean `false`.
    False = 9,
    /// Explicit JSON `null`.
    Null = 10,
    /// A redirect to a row elsewhere in the arena.
    Reference = 11,
}

impl TokenKind {
    /// Returns the 4-bit wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a 4-bit field value.
    pub fn from_u4(value: u32) -> Result<Self> {
        match value {
            0 => Ok(TokenKind::None),
            1 => Ok(TokenKind::StartObject),
            2 => Ok(TokenKind::EndObject),
            3 => Ok(TokenKind::StartArray),
            4 => Ok(TokenKind::EndArray),
            5 => Ok(TokenKind::PropertyName),
            6 => Ok(TokenKind::String),
            7 => Ok(TokenKind::Number),
            8 => Ok(TokenKind::True),
            9 => Ok(TokenKind::False),
            10 => Ok(TokenKind::Null),
            11 => Ok(TokenKind::Reference),
            _ => Err(ResultDocError::Invalid("unknown token kind")),
        }
    }

    /// Short name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::None => "none",
            TokenKind::StartObject => "object",
            TokenKind::EndObject => "end-object",
            TokenKind::StartArray => "array",
            TokenKind::EndArray => "end-array",
            TokenKind::PropertyName => "property-name",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::Reference => "reference",
        }
    }
}

/// Which compiled-query node a row links to (2-bit field).
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpRefKind {
    /// No metadata link.
    None = 0,
    /// Links a selection set (object rows).
    SelectionSet = 1,
    /// Links a single selection (property rows).
    Selection = 2,
}

impl OpRefKind {
    fn from_u2(value: u32) -> Self {
        match value {
            1 => OpRefKind::SelectionSet,
            2 => OpRefKind::Selection,
            _ => OpRefKind::None,
        }
    }
}

/// Row flag bits (8 independent flags).
pub mod flags {
    /// The document root row.
    pub const IS_ROOT: u8 = 1 << 0;
    /// The row describes (or its selection produces) an object value.
    pub const IS_OBJECT: u8 = 1 << 1;
    /// The row describes (or its selection produces) a list value.
    pub const IS_LIST: u8 = 1 << 2;
    /// Internal-only field, never serialized.
    pub const IS_INTERNAL: u8 = 1 << 3;
    /// Excluded by the operation's inclusion bitmask.
    pub const IS_EXCLUDED: u8 = 1 << 4;
    /// The field's type permits null.
    pub const IS_NULLABLE: u8 = 1 << 5;
    /// Object nulled by non-null error propagation.
    pub const IS_INVALIDATED: u8 = 1 << 6;
    /// Payload bytes contain escape sequences.
    pub const IS_ENCODED: u8 = 1 << 7;
}

/// One fixed-size packed row record.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Row {
    words: [u32; ROW_WORDS],
}

const _: () = assert!(std::mem::size_of::<Row>() == ROW_BYTES);

impl Row {
    /// Builds a fully specified row.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        token: TokenKind,
        location: u32,
        size_or_length: Option<u32>,
        has_complex_children: bool,
        parent_row: Option<u32>,
        op_ref_id: u16,
        op_ref_kind: OpRefKind,
        number_of_rows: u32,
        flag_bits: u8,
    ) -> Self {
        debug_assert!(location <= FIELD_MASK);
        debug_assert!(number_of_rows <= FIELD_MASK);
        debug_assert!(u32::from(op_ref_id) <= OP_REF_ID_MASK);
        let parent = parent_row.unwrap_or(PARENT_NONE);
        debug_assert!(parent <= FIELD_MASK);
        let mut word1 = match size_or_length {
            Some(len) => {
                debug_assert!(len <= FIELD_MASK);
                len & FIELD_MASK
            }
            None => UNSIZED_BIT,
        };
        if has_complex_children {
            word1 |= COMPLEX_BIT;
        }
        Row {
            words: [
                (location & FIELD_MASK) | ((op_ref_kind as u32) << OP_REF_KIND_SHIFT),
                word1,
                (u32::from(token.as_u8()) & TOKEN_MASK)
                    | ((number_of_rows & FIELD_MASK) << TOKEN_BITS),
                parent & FIELD_MASK,
                u32::from(flag_bits) | ((u32::from(op_ref_id) & OP_REF_ID_MASK) << OP_REF_ID_SHIFT),
            ],
        }
    }

    /// A plain placeholder row (`None` token) under the given parent.
    pub fn placeholder(parent_row: u32, flag_bits: u8) -> Self {
        Row::new(
            TokenKind::None,
            0,
            None,
            false,
            Some(parent_row),
            0,
            OpRefKind::None,
            0,
            flag_bits,
        )
    }

    /// Reconstructs a row from its raw words.
    pub fn from_words(words: [u32; ROW_WORDS]) -> Self {
        Row { words }
    }

    /// Raw word view, used by the arena to store the row.
    pub fn words(&self) -> &[u32; ROW_WORDS] {
        &self.words
    }

    /// Payload arena byte offset, or target row index for references.
    pub fn location(&self) -> u32 {
        self.words[0] & FIELD_MASK
    }

    /// Which metadata node kind this row links to.
    pub fn op_ref_kind(&self) -> OpRefKind {
        OpRefKind::from_u2(self.words[0] >> OP_REF_KIND_SHIFT)
    }

    /// Payload length or element/property count; `None` while unsized.
    pub fn size_or_length(&self) -> Option<u32> {
        if self.words[1] & UNSIZED_BIT != 0 {
            None
        } else {
            Some(self.words[1] & FIELD_MASK)
        }
    }

    /// Whether string/name payload bytes contain escape sequences.
    pub fn has_complex_children(&self) -> bool {
        self.words[1] & COMPLEX_BIT != 0
    }

    /// The token kind stored in this row.
    pub fn token(&self) -> TokenKind {
        TokenKind::from_u4(self.words[2] & TOKEN_MASK).expect("row holds a valid token kind")
    }

    /// Rows spanned by this element past its start row.
    pub fn number_of_rows(&self) -> u32 {
        (self.words[2] >> TOKEN_BITS) & FIELD_MASK
    }

    /// Flat index of the structural parent row, if any.
    pub fn parent_row(&self) -> Option<u32> {
        let parent = self.words[3] & FIELD_MASK;
        if parent == PARENT_NONE {
            None
        } else {
            Some(parent)
        }
    }

    /// Id of the linked selection or selection set.
    pub fn op_ref_id(&self) -> u16 {
        ((self.words[4] >> OP_REF_ID_SHIFT) & OP_REF_ID_MASK) as u16
    }

    /// The 8-bit flag set.
    pub fn flag_bits(&self) -> u8 {
        (self.words[4] & FLAGS_MASK) as u8
    }

    /// Tests a flag bit.
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flag_bits() & flag != 0
    }

    /// Word 1 encoding for a size/complex update, preserving no other state.
    pub(crate) fn encode_size_word(size_or_length: Option<u32>, complex: bool) -> u32 {
        let mut word = match size_or_length {
            Some(len) => len & FIELD_MASK,
            None => UNSIZED_BIT,
        };
        if complex {
            word |= COMPLEX_BIT;
        }
        word
    }

    /// Merges a new row-span count into word 2, preserving the token bits.
    pub(crate) fn merge_number_of_rows(word2: u32, number_of_rows: u32) -> u32 {
        (word2 & TOKEN_MASK) | ((number_of_rows & FIELD_MASK) << TOKEN_BITS)
    }
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Row")
            .field("token", &self.token())
            .field("location", &self.location())
            .field("size_or_length", &self.size_or_length())
            .field("number_of_rows", &self.number_of_rows())
            .field("parent_row", &self.parent_row())
            .field("op_ref_kind", &self.op_ref_kind())
            .field("op_ref_id", &self.op_ref_id())
            .field("flags", &format_args!("{:#04x}", self.flag_bits()))
            .finish()
    }
}
