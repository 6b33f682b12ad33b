//! Structural editor: stateless operations over a [`Workpiece`].
//!
//! Every operation validates all of its inputs before the first mutation, so
//! a returned error always leaves the model exactly as it was.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use tracing::{debug, instrument};

use crate::domain::arena::{DivisionId, DivisionTree};
use crate::domain::division::{Division, LinkedResource, Logical, MetadataEntry, Physical, Variant};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::pagination::Paginator;
use crate::domain::view::{LogicalId, PhysicalId, View};
use crate::domain::workpiece::Workpiece;

/// Where a new division goes relative to the reference division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertionPosition {
    BeforeCurrent,
    AfterCurrent,
    FirstChildOfCurrent,
    LastChildOfCurrent,
    ParentOfCurrent,
}

impl InsertionPosition {
    pub const ALL: [InsertionPosition; 5] = [
        InsertionPosition::BeforeCurrent,
        InsertionPosition::AfterCurrent,
        InsertionPosition::FirstChildOfCurrent,
        InsertionPosition::LastChildOfCurrent,
        InsertionPosition::ParentOfCurrent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InsertionPosition::BeforeCurrent => "before",
            InsertionPosition::AfterCurrent => "after",
            InsertionPosition::FirstChildOfCurrent => "first-child",
            InsertionPosition::LastChildOfCurrent => "last-child",
            InsertionPosition::ParentOfCurrent => "parent",
        }
    }

    fn is_sibling(&self) -> bool {
        matches!(
            self,
            InsertionPosition::BeforeCurrent | InsertionPosition::AfterCurrent
        )
    }
}

impl fmt::Display for InsertionPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsertionPosition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|position| position.as_str() == normalized)
            .ok_or_else(|| {
                DomainError::InvalidPosition(format!(
                    "'{}' (expected one of: {})",
                    s,
                    Self::ALL.iter().map(|p| p.as_str()).join(", ")
                ))
            })
    }
}

/// Root-first ancestors of `node`, exclusive of `node` itself.
///
/// Returns `Ok(vec![])` for the root and [`DomainError::ReferenceNotInTree`]
/// for a division that is not reachable from the root.
pub fn ancestor_path(workpiece: &Workpiece, node: LogicalId) -> DomainResult<Vec<LogicalId>> {
    workpiece.logical().ancestors(node)
}

/// Physical counterpart of [`ancestor_path`].
pub fn ancestors_of_physical(
    workpiece: &Workpiece,
    node: PhysicalId,
) -> DomainResult<Vec<PhysicalId>> {
    workpiece.physical().ancestors(node)
}

fn ensure_views_resolve(workpiece: &Workpiece, views: &[View]) -> DomainResult<()> {
    match views
        .iter()
        .find(|view| !workpiece.physical().contains(view.physical()))
    {
        Some(view) => Err(DomainError::DanglingView(view.physical().to_string())),
        None => Ok(()),
    }
}

/// Inserts a new logical division of `kind` relative to `reference`.
///
/// `views_to_attach` are added to the new division and to every division that
/// contains it: the ancestors of the insertion point, plus the reference for
/// child insertions. Other holders of those physical divisions lose their
/// views onto them, so the pages move into the new structure.
#[instrument(level = "debug", skip(workpiece, views_to_attach), fields(views = views_to_attach.len()))]
pub fn insert_structure(
    kind: &str,
    workpiece: &mut Workpiece,
    reference: LogicalId,
    position: InsertionPosition,
    views_to_attach: &[View],
) -> DomainResult<LogicalId> {
    let mut containing = ancestor_path(workpiece, reference)?;
    if position.is_sibling() && containing.is_empty() {
        return Err(DomainError::NoParentForSibling);
    }
    ensure_views_resolve(workpiece, views_to_attach)?;

    let sibling_index = workpiece.logical().index_of(reference).unwrap_or(0);
    let division = Division::<Logical>::new(kind);
    let tree = workpiece.logical_tree_mut();
    let created = match position {
        InsertionPosition::BeforeCurrent | InsertionPosition::AfterCurrent => {
            let parent = *containing.last().ok_or(DomainError::NoParentForSibling)?;
            let index = if position == InsertionPosition::AfterCurrent {
                sibling_index + 1
            } else {
                sibling_index
            };
            tree.insert_child(parent, Some(index), division)?
        }
        InsertionPosition::FirstChildOfCurrent => {
            containing.push(reference);
            tree.insert_child(reference, Some(0), division)?
        }
        InsertionPosition::LastChildOfCurrent => {
            containing.push(reference);
            tree.insert_child(reference, None, division)?
        }
        InsertionPosition::ParentOfCurrent => tree.wrap(reference, division)?,
    };

    for view in views_to_attach {
        let physical = view.physical();
        let outside: Vec<LogicalId> = workpiece
            .back_references(physical)
            .into_iter()
            .filter(|holder| !containing.contains(holder))
            .collect();
        let index = workpiece.view_index_mut();
        for holder in outside {
            index.remove_all_onto(holder, physical);
        }
        index.insert(created, None, *view);
        for &ancestor in &containing {
            if !index.views(ancestor).contains(view) {
                index.insert(ancestor, None, *view);
            }
        }
    }
    debug!(%created, %position, "inserted {}", kind);
    Ok(created)
}

/// Inserts `count` divisions and records a counting metadata value on each.
///
/// Values start at `first_value` and count up the way order labels do
/// (`"1"`, `"ii"`, or constant free text). The new divisions appear in
/// ascending value order for every position except `ParentOfCurrent`, which
/// nests each wrapper around the previous one.
#[instrument(level = "debug", skip(workpiece))]
pub fn add_multiple_structures(
    count: usize,
    kind: &str,
    workpiece: &mut Workpiece,
    reference: LogicalId,
    position: InsertionPosition,
    metadata_key: &str,
    first_value: &str,
) -> DomainResult<Vec<LogicalId>> {
    let ancestors = ancestor_path(workpiece, reference)?;
    if position.is_sibling() && ancestors.is_empty() {
        return Err(DomainError::NoParentForSibling);
    }
    let values = Paginator::infer(first_value);
    let mut created = Vec::with_capacity(count);
    let mut anchor = reference;
    let mut step = position;
    for value in values.take(count) {
        let id = insert_structure(kind, workpiece, anchor, step, &[])?;
        if let Some(division) = workpiece.logical_division_mut(id) {
            write_metadata(division, metadata_key, &value);
        }
        // later divisions follow the one just inserted
        if matches!(
            position,
            InsertionPosition::AfterCurrent | InsertionPosition::FirstChildOfCurrent
        ) {
            anchor = id;
            step = InsertionPosition::AfterCurrent;
        }
        created.push(id);
    }
    Ok(created)
}

/// Inserts a new physical division of `kind` relative to `reference`.
///
/// Wrapping (`ParentOfCurrent`) is not supported for physical divisions.
#[instrument(level = "debug", skip(workpiece))]
pub fn insert_physical(
    kind: &str,
    workpiece: &mut Workpiece,
    reference: PhysicalId,
    position: InsertionPosition,
) -> DomainResult<PhysicalId> {
    insert_physical_division(Division::new(kind), workpiece, reference, position)
}

pub fn insert_physical_division(
    division: Division<Physical>,
    workpiece: &mut Workpiece,
    reference: PhysicalId,
    position: InsertionPosition,
) -> DomainResult<PhysicalId> {
    let ancestors = ancestors_of_physical(workpiece, reference)?;
    let tree = workpiece.physical_tree_mut();
    match position {
        InsertionPosition::BeforeCurrent | InsertionPosition::AfterCurrent => {
            let parent = *ancestors.last().ok_or(DomainError::NoParentForSibling)?;
            let index = tree.index_of(reference).unwrap_or(0);
            let index = if position == InsertionPosition::AfterCurrent {
                index + 1
            } else {
                index
            };
            tree.insert_child(parent, Some(index), division)
        }
        InsertionPosition::FirstChildOfCurrent => tree.insert_child(reference, Some(0), division),
        InsertionPosition::LastChildOfCurrent => tree.insert_child(reference, None, division),
        InsertionPosition::ParentOfCurrent => Err(DomainError::InvalidPosition(
            "physical divisions cannot be wrapped".to_string(),
        )),
    }
}

/// Removes a logical subtree together with all of its views.
#[instrument(level = "debug", skip(workpiece))]
pub fn remove_structure(workpiece: &mut Workpiece, node: LogicalId) -> DomainResult<Division<Logical>> {
    ancestor_path(workpiece, node)?;
    if node == workpiece.logical_root() {
        return Err(DomainError::CannotRemoveRoot);
    }
    let removed = workpiece.logical_tree_mut().remove_subtree(node)?;
    let index = workpiece.view_index_mut();
    for (id, _) in &removed {
        index.drop_logical(*id);
    }
    removed
        .into_iter()
        .next()
        .map(|(_, division)| division)
        .ok_or_else(|| DomainError::ReferenceNotInTree(node.to_string()))
}

/// Removes a physical subtree and every view onto it.
///
/// Returns the logical divisions that lost views.
#[instrument(level = "debug", skip(workpiece))]
pub fn remove_physical(workpiece: &mut Workpiece, node: PhysicalId) -> DomainResult<Vec<LogicalId>> {
    ancestors_of_physical(workpiece, node)?;
    if node == workpiece.physical_root() {
        return Err(DomainError::CannotRemoveRoot);
    }
    let removed = workpiece.physical_tree_mut().remove_subtree(node)?;
    let index = workpiece.view_index_mut();
    let mut affected = Vec::new();
    for (id, _) in &removed {
        affected.extend(index.drop_physical(*id));
    }
    Ok(affected.into_iter().sorted().dedup().collect())
}

/// Moves a logical subtree next to or below `target`.
///
/// The subtree keeps its views. `ParentOfCurrent` is not a valid move.
#[instrument(level = "debug", skip(workpiece))]
pub fn move_structure(
    workpiece: &mut Workpiece,
    node: LogicalId,
    target: LogicalId,
    position: InsertionPosition,
) -> DomainResult<()> {
    ancestor_path(workpiece, node)?;
    let target_ancestors = ancestor_path(workpiece, target)?;
    if node == workpiece.logical_root() {
        return Err(DomainError::CannotRemoveRoot);
    }
    if workpiece.logical().is_within(target, node) {
        return Err(DomainError::CycleDetected(format!(
            "{} lies within {}",
            target, node
        )));
    }
    let parent = match position {
        InsertionPosition::BeforeCurrent | InsertionPosition::AfterCurrent => {
            *target_ancestors.last().ok_or(DomainError::NoParentForSibling)?
        }
        InsertionPosition::FirstChildOfCurrent | InsertionPosition::LastChildOfCurrent => target,
        InsertionPosition::ParentOfCurrent => {
            return Err(DomainError::InvalidPosition(
                "a division cannot be moved to become a parent".to_string(),
            ))
        }
    };

    let tree = workpiece.logical_tree_mut();
    tree.detach(node)?;
    let index = match position {
        InsertionPosition::BeforeCurrent => tree.index_of(target),
        InsertionPosition::AfterCurrent => tree.index_of(target).map(|i| i + 1),
        InsertionPosition::FirstChildOfCurrent => Some(0),
        _ => None,
    };
    tree.attach(node, parent, index)?;
    debug!(%node, %target, %position, "moved structure");
    Ok(())
}

/// Adds `view` to the view list of `logical`.
///
/// Inserts at `index` when it addresses an existing slot, otherwise appends.
#[instrument(level = "trace", skip(workpiece))]
pub fn assign_view(
    workpiece: &mut Workpiece,
    logical: LogicalId,
    view: View,
    index: Option<usize>,
) -> DomainResult<()> {
    if !workpiece.logical().contains(logical) {
        return Err(DomainError::ReferenceNotInTree(logical.to_string()));
    }
    ensure_views_resolve(workpiece, &[view])?;
    workpiece.view_index_mut().insert(logical, index, view);
    Ok(())
}

/// Removes one occurrence of `view` from `logical`; `Ok(false)` when absent.
#[instrument(level = "trace", skip(workpiece))]
pub fn unassign_view(
    workpiece: &mut Workpiece,
    logical: LogicalId,
    view: View,
    remove_last_occurrence: bool,
) -> DomainResult<bool> {
    if !workpiece.logical().contains(logical) {
        return Err(DomainError::ReferenceNotInTree(logical.to_string()));
    }
    Ok(workpiece
        .view_index_mut()
        .remove(logical, view, remove_last_occurrence))
}

/// Copies the views of all descendants of `node` that `node` lacks.
pub fn assign_views_from_children(workpiece: &mut Workpiece, node: LogicalId) -> DomainResult<usize> {
    ancestor_path(workpiece, node)?;
    let mut present: HashSet<View> = workpiece.views(node).iter().copied().collect();
    let missing: Vec<View> = workpiece
        .logical()
        .traverse(node, false)
        .flat_map(|descendant| workpiece.views(descendant).to_vec())
        .filter(|view| present.insert(*view))
        .collect();
    let added = missing.len();
    for view in missing {
        workpiece.view_index_mut().insert(node, None, view);
    }
    Ok(added)
}

/// View onto `physical` that is not yet attached to any logical division.
pub fn create_unrestricted_view(workpiece: &Workpiece, physical: PhysicalId) -> DomainResult<View> {
    let view = View::on(physical);
    ensure_views_resolve(workpiece, &[view])?;
    Ok(view)
}

/// First logical division in document order that views `physical`.
pub fn first_view_for_physical(
    workpiece: &Workpiece,
    physical: PhysicalId,
) -> Option<(LogicalId, View)> {
    let holders = workpiece.back_references(physical);
    if holders.is_empty() {
        return None;
    }
    workpiece
        .logical()
        .iter()
        .find(|logical| holders.contains(logical))
        .map(|logical| (logical, View::on(physical)))
}

/// Inserts a link division pointing at workpiece `external_id` below `parent`.
///
/// `index` of `None` appends.
#[instrument(level = "debug", skip(workpiece))]
pub fn add_link(
    workpiece: &mut Workpiece,
    parent: LogicalId,
    index: Option<usize>,
    external_id: &str,
) -> DomainResult<LogicalId> {
    ancestor_path(workpiece, parent)?;
    let mut division = Division::<Logical>::new("");
    division.payload.link = Some(LinkedResource::internal(external_id));
    workpiece
        .logical_tree_mut()
        .insert_child(parent, index, division)
}

/// First link division in document order pointing at `external_id`.
pub fn find_link(workpiece: &Workpiece, external_id: &str) -> Option<LogicalId> {
    let tree = workpiece.logical();
    tree.iter().find(|&id| {
        tree.get(id)
            .and_then(|division| division.link())
            .is_some_and(|link| link.points_at(external_id))
    })
}

/// Removes the link division pointing at `external_id`.
#[instrument(level = "debug", skip(workpiece))]
pub fn remove_link(workpiece: &mut Workpiece, external_id: &str) -> DomainResult<()> {
    let link = find_link(workpiece, external_id)
        .ok_or_else(|| DomainError::LinkNotFound(external_id.to_string()))?;
    remove_structure(workpiece, link)?;
    Ok(())
}

/// Root-to-link path of the link division pointing at `external_id`.
pub fn path_to_linked_child(workpiece: &Workpiece, external_id: &str) -> DomainResult<Vec<LogicalId>> {
    let link = find_link(workpiece, external_id)
        .ok_or_else(|| DomainError::LinkNotFound(external_id.to_string()))?;
    let mut path = ancestor_path(workpiece, link)?;
    path.push(link);
    Ok(path)
}

/// All divisions of `tree` in pre-order, root first.
pub fn collect_all<V: Variant>(tree: &DivisionTree<V>) -> Vec<DivisionId<V>> {
    tree.iter().collect()
}

/// Physical divisions of `kind` sorted by `order`; ties keep document order.
pub fn collect_all_physical_sorted_by_order(workpiece: &Workpiece, kind: &str) -> Vec<PhysicalId> {
    let tree = workpiece.physical();
    tree.traverse(tree.root(), false)
        .filter_map(|id| tree.get(id).map(|division| (id, division)))
        .filter(|(_, division)| division.kind == kind)
        .sorted_by_key(|(_, division)| division.order())
        .map(|(id, _)| id)
        .collect()
}

pub fn metadata_value<'a, V: Variant>(division: &'a Division<V>, key: &str) -> Option<&'a str> {
    division.metadata_value(key)
}

/// Removes every entry stored under `key`; returns how many were removed.
pub fn remove_all_metadata<V: Variant>(division: &mut Division<V>, key: &str) -> usize {
    let before = division.metadata.len();
    division.metadata.retain(|entry| entry.key != key);
    before - division.metadata.len()
}

/// Replaces the entries under `key` with a single `value`.
pub fn write_metadata<V: Variant>(division: &mut Division<V>, key: &str, value: &str) {
    remove_all_metadata(division, key);
    division.metadata.push(MetadataEntry::new(key, value));
}
