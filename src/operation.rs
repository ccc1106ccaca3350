//! Read-only compiled-query metadata consumed at shaping time.
//!
//! The query compiler owns this data; the store only reads it. Ids for
//! selection sets and selections share one 15-bit numbering space, and a
//! set's selections are numbered consecutively after the set itself. That
//! ordering is what makes arithmetic property addressing possible: the
//! property row for selection `s` inside an object shaped from set `t`
//! sits at row offset `(s.id - t.id - 1) * 2 + 1`.

use std::sync::Arc;

use crate::error::{Result, ResultDocError};

/// Upper bound of the shared id space (15-bit row field).
pub const MAX_OPERATION_IDS: u16 = 1 << 15;

/// Identifies a selection set within one operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SelectionSetId(pub u16);

/// Identifies a single selection within one operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SelectionId(pub u16);

/// One requested field of a selection set.
#[derive(Clone, Debug)]
pub struct Selection {
    id: SelectionId,
    response_key: Arc<str>,
    is_internal: bool,
    is_nullable: bool,
    is_list: bool,
    is_composite: bool,
    include_flags: u64,
}

impl Selection {
    /// Id of this selection.
    pub fn id(&self) -> SelectionId {
        self.id
    }

    /// The name under which the field appears in the output.
    pub fn response_key(&self) -> &Arc<str> {
        &self.response_key
    }

    /// Internal-only fields are never serialized.
    pub fn is_internal(&self) -> bool {
        self.is_internal
    }

    /// Whether the field's type permits null.
    pub fn is_nullable(&self) -> bool {
        self.is_nullable
    }

    /// Whether the field produces a list value.
    pub fn is_list(&self) -> bool {
        self.is_list
    }

    /// Whether the field produces an object value.
    pub fn is_composite(&self) -> bool {
        self.is_composite
    }

    /// Evaluates the include/skip conditions against the operation's
    /// inclusion bitmask. A selection with no conditions is always included.
    pub fn is_included(&self, include_flags: u64) -> bool {
        self.include_flags & include_flags == self.include_flags
    }
}

/// An ordered set of selections shaped into one object run.
#[derive(Clone, Debug)]
pub struct SelectionSet {
    id: SelectionSetId,
    selections: Vec<Selection>,
}

impl SelectionSet {
    /// Id of this selection set.
    pub fn id(&self) -> SelectionSetId {
        self.id
    }

    /// Selections in declared order.
    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    /// Finds a selection by response key.
    pub fn find(&self, response_key: &str) -> Option<&Selection> {
        self.selections
            .iter()
            .find(|s| &*s.response_key == response_key)
    }
}

#[derive(Copy, Clone, Debug)]
enum NodeRef {
    Vacant,
    Set(usize),
    Selection(usize, usize),
}

/// One compiled operation: the root selection set plus id lookups.
#[derive(Debug)]
pub struct Operation {
    sets: Vec<SelectionSet>,
    index: Vec<NodeRef>,
    root: SelectionSetId,
}

impl Operation {
    /// The selection set shaping the root object.
    pub fn root_selection_set(&self) -> &SelectionSet {
        self.selection_set(self.root)
            .expect("root selection set exists")
    }

    /// Looks up a selection set by id.
    pub fn selection_set(&self, id: SelectionSetId) -> Result<&SelectionSet> {
        match self.index.get(id.0 as usize) {
            Some(NodeRef::Set(set_idx)) => Ok(&self.sets[*set_idx]),
            _ => Err(ResultDocError::Invalid("unknown selection set id")),
        }
    }

    /// Looks up a selection by id.
    pub fn selection(&self, id: SelectionId) -> Result<&Selection> {
        match self.index.get(id.0 as usize) {
            Some(NodeRef::Selection(set_idx, sel_idx)) => {
                Ok(&self.sets[*set_idx].selections[*sel_idx])
            }
            _ => Err(ResultDocError::Invalid("unknown selection id")),
        }
    }
}

/// Declares one field while assembling an operation.
#[derive(Clone, Debug)]
pub struct FieldDef {
    response_key: Arc<str>,
    is_internal: bool,
    is_nullable: bool,
    is_list: bool,
    is_composite: bool,
    include_flags: u64,
}

impl FieldDef {
    /// A plain, always-included scalar field.
    pub fn new(response_key: impl Into<Arc<str>>) -> Self {
        FieldDef {
            response_key: response_key.into(),
            is_internal: false,
            is_nullable: false,
            is_list: false,
            is_composite: false,
            include_flags: 0,
        }
    }

    /// Marks the field internal-only.
    pub fn internal(mut self) -> Self {
        self.is_internal = true;
        self
    }

    /// Marks the field's type nullable.
    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    /// Marks the field as producing a list.
    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    /// Marks the field as producing an object.
    pub fn composite(mut self) -> Self {
        self.is_composite = true;
        self
    }

    /// Conditions inclusion on the given bitmask bits.
    pub fn included_when(mut self, include_flags: u64) -> Self {
        self.include_flags = include_flags;
        self
    }
}

/// Assembles an [`Operation`]; used by query compilation and by tests.
#[derive(Default, Debug)]
pub struct OperationBuilder {
    sets: Vec<SelectionSet>,
    index: Vec<NodeRef>,
}

impl OperationBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        OperationBuilder::default()
    }

    fn next_id(&self) -> Result<u16> {
        let next = self.index.len();
        if next >= MAX_OPERATION_IDS as usize {
            return Err(ResultDocError::Invalid("operation id space exhausted"));
        }
        Ok(next as u16)
    }

    /// Adds a selection set, allocating its id and consecutive selection
    /// ids in declared order.
    pub fn selection_set(&mut self, fields: Vec<FieldDef>) -> Result<SelectionSetId> {
        let set_id = SelectionSetId(self.next_id()?);
        let set_idx = self.sets.len();
        self.index.push(NodeRef::Set(set_idx));
        let mut selections = Vec::with_capacity(fields.len());
        for (sel_idx, field) in fields.into_iter().enumerate() {
            let id = SelectionId(self.next_id()?);
            self.index.push(NodeRef::Selection(set_idx, sel_idx));
            selections.push(Selection {
                id,
                response_key: field.response_key,
                is_internal: field.is_internal,
                is_nullable: field.is_nullable,
                is_list: field.is_list,
                is_composite: field.is_composite,
                include_flags: field.include_flags,
            });
        }
        self.sets.push(SelectionSet {
            id: set_id,
            selections,
        });
        Ok(set_id)
    }

    /// Finishes the operation with the given root selection set.
    pub fn build(self, root: SelectionSetId) -> Result<Operation> {
        if !matches!(self.index.get(root.0 as usize), Some(NodeRef::Set(_))) {
            return Err(ResultDocError::Invalid("root selection set id unknown"));
        }
        let mut index = self.index;
        // Ids never shrink, so pad lookups stay in bounds.
        if index.is_empty() {
            index.push(NodeRef::Vacant);
        }
        Ok(Operation {
            sets: self.sets,
            index,
            root,
        })
    }
}
