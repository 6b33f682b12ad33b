//! Structure model: one logical tree, one physical tree and the views between them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::arena::DivisionTree;
use crate::domain::division::{Division, Logical, Physical};
use crate::domain::view::{LogicalId, PhysicalId, View, ViewIndex};

/// Default type of a fresh physical root.
pub const PHYSICAL_ROOT_TYPE: &str = "physSequence";

/// Free-text audit entry of the edit history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessingNote {
    pub name: String,
    pub note: String,
    pub role: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ProcessingNote {
    /// Note written on behalf of this software (`CUSTODIAN` / `SOFTWARE`).
    pub fn software(note: impl Into<String>) -> Self {
        Self {
            name: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            note: note.into(),
            role: "CUSTODIAN".to_string(),
            kind: "SOFTWARE".to_string(),
        }
    }
}

/// Structural metadata of one digitized object.
///
/// The trees are public for reading; structural changes and all view edits go
/// through [`crate::domain::editor`], which keeps the back-references in step.
/// Division content (type, labels, metadata, media files) may be edited freely
/// through [`Workpiece::logical_division_mut`] and
/// [`Workpiece::physical_division_mut`].
#[derive(Debug, Clone)]
pub struct Workpiece {
    id: String,
    creation_date: DateTime<Utc>,
    edit_history: Vec<ProcessingNote>,
    logical: DivisionTree<Logical>,
    physical: DivisionTree<Physical>,
    views: ViewIndex,
}

impl Workpiece {
    /// Fresh model with a logical root of `root_type` and an empty physical root.
    pub fn new(id: impl Into<String>, root_type: impl Into<String>) -> Self {
        Self::from_roots(
            id,
            Utc::now(),
            Division::new(root_type),
            Division::new(PHYSICAL_ROOT_TYPE),
        )
    }

    pub fn from_roots(
        id: impl Into<String>,
        creation_date: DateTime<Utc>,
        logical_root: Division<Logical>,
        physical_root: Division<Physical>,
    ) -> Self {
        Self {
            id: id.into(),
            creation_date,
            edit_history: Vec::new(),
            logical: DivisionTree::new(logical_root),
            physical: DivisionTree::new(physical_root),
            views: ViewIndex::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    pub fn edit_history(&self) -> &[ProcessingNote] {
        &self.edit_history
    }

    /// Appends to the edit history; entries are never removed.
    pub fn add_note(&mut self, note: ProcessingNote) {
        self.edit_history.push(note);
    }

    pub(crate) fn extend_history(&mut self, notes: impl IntoIterator<Item = ProcessingNote>) {
        self.edit_history.extend(notes);
    }

    pub fn logical(&self) -> &DivisionTree<Logical> {
        &self.logical
    }

    pub fn physical(&self) -> &DivisionTree<Physical> {
        &self.physical
    }

    pub fn logical_root(&self) -> LogicalId {
        self.logical.root()
    }

    pub fn physical_root(&self) -> PhysicalId {
        self.physical.root()
    }

    pub fn logical_division(&self, id: LogicalId) -> Option<&Division<Logical>> {
        self.logical.get(id)
    }

    pub fn physical_division(&self, id: PhysicalId) -> Option<&Division<Physical>> {
        self.physical.get(id)
    }

    pub fn logical_division_mut(&mut self, id: LogicalId) -> Option<&mut Division<Logical>> {
        self.logical.get_mut(id)
    }

    pub fn physical_division_mut(&mut self, id: PhysicalId) -> Option<&mut Division<Physical>> {
        self.physical.get_mut(id)
    }

    /// Ordered views of a logical division.
    pub fn views(&self, logical: LogicalId) -> &[View] {
        self.views.views(logical)
    }

    /// Logical divisions currently owning a view onto `physical`.
    pub fn back_references(&self, physical: PhysicalId) -> BTreeSet<LogicalId> {
        self.views.holders(physical).collect()
    }

    /// Recomputes all back-references and compares them with the stored ones.
    pub fn back_references_consistent(&self) -> bool {
        self.views.is_consistent()
            && self.views.physicals().all(|p| self.physical.contains(p))
    }

    pub(crate) fn logical_tree_mut(&mut self) -> &mut DivisionTree<Logical> {
        &mut self.logical
    }

    pub(crate) fn physical_tree_mut(&mut self) -> &mut DivisionTree<Physical> {
        &mut self.physical
    }

    pub(crate) fn view_index_mut(&mut self) -> &mut ViewIndex {
        &mut self.views
    }
}

impl PartialEq for Workpiece {
    /// Content equality: two independently loaded copies of the same document
    /// compare equal.
    fn eq(&self, other: &Self) -> bool {
        self.to_snapshot() == other.to_snapshot()
    }
}

impl Eq for Workpiece {}
