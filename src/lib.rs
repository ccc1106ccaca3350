//! In-memory packed-row store for GraphQL execution results.
//!
//! A [`ResultDocument`] accumulates the output of one operation execution
//! as fixed-size row records in a growable page arena, with scalar payload
//! bytes in a parallel byte arena. Shape is pre-built from compiled
//! selection metadata, leaf values are assigned concurrently by
//! independent resolvers, and the finished tree is serialized in a single
//! pass through a [`ValueWriter`].
//!
//! Rows are addressed by [`Cursor`], a packed `(page, slot)` pair that
//! stays valid across arena growth. [`Element`] wraps a cursor into a
//! typed handle for navigation, reads, and writes.

#![warn(missing_docs)]

pub mod cursor;
pub mod document;
pub mod element;
pub mod error;
pub mod mem;
pub mod operation;
pub mod path;
pub mod row;
pub mod text;
pub mod write;

pub use cursor::Cursor;
pub use document::{DocumentOptions, ResultDocument, MAX_PATH_DEPTH};
pub use element::{ArrayIter, Element, ObjectIter};
pub use error::{Result, ResultDocError};
pub use mem::PagePool;
pub use operation::{
    FieldDef, Operation, OperationBuilder, Selection, SelectionId, SelectionSet, SelectionSetId,
};
pub use path::{Path, PathSegment};
pub use row::{flags, Row, TokenKind};
pub use write::{JsonWriter, ValueWriter};
