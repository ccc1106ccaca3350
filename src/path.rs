//! Immutable result paths built from parent-chain walks.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

/// One hop of a result path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathSegment {
    /// A property response key.
    Key(Arc<str>),
    /// An index into a list value.
    Index(usize),
}

/// An immutable root-to-leaf path through the result document.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Path {
    segments: SmallVec<[PathSegment; 8]>,
}

impl Path {
    /// Builds a path from root-to-leaf segments.
    pub fn from_segments(segments: SmallVec<[PathSegment; 8]>) -> Self {
        Path { segments }
    }

    /// Segments in root-to-leaf order.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of hops.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for the root path.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => write!(f, "/{key}")?,
                PathSegment::Index(index) => write!(f, "/{index}")?,
            }
        }
        Ok(())
    }
}
