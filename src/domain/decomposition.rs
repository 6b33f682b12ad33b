//! Splitting one workpiece into a parent and one child per top-level division.
//!
//! Pure: the caller checks the lock, persists the results and copies media.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use itertools::Itertools;
use tracing::{debug, instrument, warn};

use crate::domain::division::Division;
use crate::domain::editor;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::view::{LogicalId, PhysicalId, View};
use crate::domain::workpiece::{ProcessingNote, Workpiece};

/// Result of splitting a workpiece.
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// Flat logical root with one link per child plus the unclaimed physical remainder.
    pub parent: Workpiece,
    /// One model per top-level logical division, in original order.
    pub children: Vec<Workpiece>,
    /// Views that pointed at physical divisions already owned by an earlier child.
    pub dropped_views: usize,
}

/// Suffix of the id under which the undivided source is kept.
pub const ORIGINAL_SUFFIX: &str = "_orig";

/// Id under which the undivided source of `id` is kept.
pub fn original_id(id: &str) -> String {
    format!("{}{}", id, ORIGINAL_SUFFIX)
}

/// Ids of the child workpieces: `<origin>_<type>`, numbered `-1`, `-2`, ...
/// when several top-level divisions share a type.
///
/// The ids are pairwise distinct and never equal the origin or its
/// [`original_id`]; a candidate already taken gets a further `-<n>`.
pub fn child_ids(source: &Workpiece) -> Vec<String> {
    let tree = source.logical();
    let kinds: Vec<String> = tree
        .children(tree.root())
        .map(|child| {
            let kind = tree.get(child).map(|d| d.kind.as_str()).unwrap_or_default();
            if kind.trim().is_empty() {
                "part".to_string()
            } else {
                kind.split_whitespace().join("_")
            }
        })
        .collect();
    let totals = kinds.iter().counts();
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut used: HashSet<String> = [source.id().to_string(), original_id(source.id())].into();
    kinds
        .iter()
        .map(|kind| {
            let count = seen.entry(kind.as_str()).or_insert(0);
            *count += 1;
            let candidate = if totals.get(kind).copied().unwrap_or(0) > 1 {
                format!("{}_{}-{}", source.id(), kind, count)
            } else {
                format!("{}_{}", source.id(), kind)
            };
            let mut id = candidate.clone();
            let mut bump = 1;
            while used.contains(&id) {
                bump += 1;
                id = format!("{}-{}", candidate, bump);
            }
            if id != candidate {
                debug!(%candidate, %id, "child id already taken, renumbered");
            }
            used.insert(id.clone());
            id
        })
        .collect()
}

/// A physical division whose subtree moves as a whole: it carries media or
/// has no children.
fn is_media_carrier(source: &Workpiece, id: PhysicalId) -> bool {
    source
        .physical_division(id)
        .is_some_and(|division| division.has_media())
        || source.physical().is_leaf(id)
}

/// Media carriers in document order for which `wants` holds.
fn select_carriers(source: &Workpiece, wants: impl Fn(PhysicalId) -> bool) -> Vec<PhysicalId> {
    let tree = source.physical();
    let mut selected = Vec::new();
    let mut pending: Vec<PhysicalId> = tree.children(tree.root()).collect();
    pending.reverse();
    while let Some(id) = pending.pop() {
        if is_media_carrier(source, id) {
            if wants(id) {
                selected.push(id);
            }
        } else {
            pending.extend(tree.children(id).collect::<Vec<_>>().into_iter().rev());
        }
    }
    selected
}

/// Copies `carriers` with their subtrees and the containers leading to them.
///
/// Containers without a selected carrier below are never created. Returns the
/// mapping from source ids to ids in `target`; copies keep their `div_id`.
fn copy_physical(
    source: &Workpiece,
    target: &mut Workpiece,
    carriers: &[PhysicalId],
) -> DomainResult<HashMap<PhysicalId, PhysicalId>> {
    let mut mapping = HashMap::new();
    mapping.insert(source.physical_root(), target.physical_root());
    for &carrier in carriers {
        let mut parent = target.physical_root();
        for ancestor in source.physical().ancestors(carrier)?.into_iter().skip(1) {
            parent = match mapping.get(&ancestor) {
                Some(&copied) => copied,
                None => {
                    let division = source
                        .physical_division(ancestor)
                        .cloned()
                        .ok_or_else(|| DomainError::ReferenceNotInTree(ancestor.to_string()))?;
                    let copied = target
                        .physical_tree_mut()
                        .insert_child(parent, None, division)?;
                    mapping.insert(ancestor, copied);
                    copied
                }
            };
        }
        let mut pending = vec![(carrier, parent)];
        while let Some((original, target_parent)) = pending.pop() {
            let division = source
                .physical_division(original)
                .cloned()
                .ok_or_else(|| DomainError::ReferenceNotInTree(original.to_string()))?;
            let copied = target
                .physical_tree_mut()
                .insert_child(target_parent, None, division)?;
            mapping.insert(original, copied);
            let children: Vec<PhysicalId> = source.physical().children(original).collect();
            pending.extend(children.into_iter().rev().map(|child| (child, copied)));
        }
    }
    Ok(mapping)
}

/// Deep-copies the logical subtree below `start` into `target`, whose root
/// already holds the content of `start`. Returns the number of views dropped
/// because their physical division is not part of `target`.
fn copy_logical(
    source: &Workpiece,
    start: LogicalId,
    target: &mut Workpiece,
    mapping: &HashMap<PhysicalId, PhysicalId>,
) -> DomainResult<usize> {
    let mut dropped = 0;
    let mut pending = vec![(start, target.logical_root())];
    while let Some((original, copy)) = pending.pop() {
        for view in source.views(original) {
            match mapping.get(&view.physical()) {
                Some(&physical) => editor::assign_view(target, copy, View::on(physical), None)?,
                None => {
                    dropped += 1;
                    warn!(
                        child = target.id(),
                        physical = %view.physical(),
                        "dropping view onto a physical division owned elsewhere"
                    );
                }
            }
        }
        for child in source.logical().children(original) {
            let division = source
                .logical_division(child)
                .cloned()
                .ok_or_else(|| DomainError::ReferenceNotInTree(child.to_string()))?;
            let copied = target
                .logical_tree_mut()
                .insert_child(copy, None, division)?;
            pending.push((child, copied));
        }
    }
    Ok(dropped)
}

fn fresh_model(
    source: &Workpiece,
    id: &str,
    logical_root: LogicalId,
    note: &ProcessingNote,
) -> DomainResult<Workpiece> {
    let logical = source
        .logical_division(logical_root)
        .cloned()
        .ok_or_else(|| DomainError::ReferenceNotInTree(logical_root.to_string()))?;
    let physical = source
        .physical_division(source.physical_root())
        .cloned()
        .unwrap_or_else(|| Division::new(""));
    let mut model = Workpiece::from_roots(id, Utc::now(), logical, physical);
    model.extend_history(source.edit_history().iter().cloned());
    model.add_note(note.clone());
    Ok(model)
}

/// Splits `source` into a parent and one child per top-level logical division.
///
/// Children are processed in order. A physical division reachable from the
/// views of several children goes to the first of them; later children lose
/// their views onto it. Media carriers reachable from no child stay with the
/// parent. The parent gets one link division per child, in the same order.
#[instrument(level = "debug", skip(source, note), fields(id = source.id()))]
pub fn explode(source: &Workpiece, note: &ProcessingNote) -> DomainResult<Decomposition> {
    let logical = source.logical();
    let top_level: Vec<LogicalId> = logical.children(logical.root()).collect();
    if top_level.is_empty() {
        return Err(DomainError::NothingToExplode(source.id().to_string()));
    }
    if logical
        .iter()
        .any(|id| logical.get(id).is_some_and(|division| division.is_link()))
    {
        return Err(DomainError::AlreadyParent(source.id().to_string()));
    }

    let mut claimed: HashSet<PhysicalId> = HashSet::new();
    let mut children = Vec::with_capacity(top_level.len());
    let mut dropped_views = 0;
    for (&child_root, child_id) in top_level.iter().zip(child_ids(source)) {
        let reachable: HashSet<PhysicalId> = logical
            .traverse(child_root, true)
            .flat_map(|id| source.views(id).iter().map(View::physical))
            .filter(|physical| !claimed.contains(physical))
            .collect();
        let carriers = select_carriers(source, |carrier| {
            !claimed.contains(&carrier)
                && source
                    .physical()
                    .traverse(carrier, true)
                    .any(|id| reachable.contains(&id))
        });

        let mut child = fresh_model(source, &child_id, child_root, note)?;
        let mapping = copy_physical(source, &mut child, &carriers)?;
        dropped_views += copy_logical(source, child_root, &mut child, &mapping)?;
        claimed.extend(
            mapping
                .keys()
                .filter(|&&original| original != source.physical_root())
                .copied(),
        );
        debug!(child = %child_id, carriers = carriers.len(), "copied child");
        children.push(child);
    }

    let mut parent = fresh_model(source, source.id(), logical.root(), note)?;
    let remainder = select_carriers(source, |carrier| !claimed.contains(&carrier));
    copy_physical(source, &mut parent, &remainder)?;
    let parent_root = parent.logical_root();
    for (child, &child_root) in children.iter().zip(&top_level) {
        let link = editor::add_link(&mut parent, parent_root, None, child.id())?;
        if let (Some(original), Some(division)) = (
            source.logical_division(child_root),
            parent.logical_division_mut(link),
        ) {
            division.kind = original.kind.clone();
            division.label = original.label.clone();
        }
    }
    debug!(
        children = children.len(),
        remainder = remainder.len(),
        dropped_views,
        "exploded"
    );
    Ok(Decomposition {
        parent,
        children,
        dropped_views,
    })
}
