//! Arena-backed ordered tree used for both division hierarchies.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use generational_arena::{Arena, Index};
use tracing::instrument;

use crate::domain::division::{Division, Variant};
use crate::domain::error::{DomainError, DomainResult};

/// Handle of a division inside the tree of variant `V`.
///
/// Ids stay valid while the division is in the tree; after removal the
/// generation check makes them resolve to nothing instead of a reused slot.
pub struct DivisionId<V> {
    index: Index,
    _variant: PhantomData<fn() -> V>,
}

impl<V> DivisionId<V> {
    fn new(index: Index) -> Self {
        Self {
            index,
            _variant: PhantomData,
        }
    }

    fn raw(&self) -> (usize, u64) {
        self.index.into_raw_parts()
    }
}

impl<V> Clone for DivisionId<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for DivisionId<V> {}

impl<V> PartialEq for DivisionId<V> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<V> Eq for DivisionId<V> {}

impl<V> Hash for DivisionId<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<V> PartialOrd for DivisionId<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V> Ord for DivisionId<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw().cmp(&other.raw())
    }
}

impl<V: Variant> fmt::Debug for DivisionId<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, generation) = self.raw();
        write!(f, "{}#{}.{}", V::NAME, slot, generation)
    }
}

impl<V: Variant> fmt::Display for DivisionId<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
struct TreeNode<V: Variant> {
    division: Division<V>,
    parent: Option<Index>,
    children: Vec<Index>,
}

/// Ordered tree of divisions with a root that always exists.
#[derive(Debug, Clone)]
pub struct DivisionTree<V: Variant> {
    arena: Arena<TreeNode<V>>,
    root: Index,
}

impl<V: Variant> DivisionTree<V> {
    pub fn new(root: Division<V>) -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(TreeNode {
            division: root,
            parent: None,
            children: Vec::new(),
        });
        Self { arena, root }
    }

    pub fn root(&self) -> DivisionId<V> {
        DivisionId::new(self.root)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Never true: the root cannot be removed.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn contains(&self, id: DivisionId<V>) -> bool {
        self.arena.contains(id.index)
    }

    pub fn get(&self, id: DivisionId<V>) -> Option<&Division<V>> {
        self.arena.get(id.index).map(|node| &node.division)
    }

    pub fn get_mut(&mut self, id: DivisionId<V>) -> Option<&mut Division<V>> {
        self.arena.get_mut(id.index).map(|node| &mut node.division)
    }

    pub fn parent(&self, id: DivisionId<V>) -> Option<DivisionId<V>> {
        self.arena
            .get(id.index)
            .and_then(|node| node.parent)
            .map(DivisionId::new)
    }

    /// Children of `id` in order; empty for unknown ids.
    pub fn children(&self, id: DivisionId<V>) -> impl Iterator<Item = DivisionId<V>> + '_ {
        self.arena
            .get(id.index)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|&index| DivisionId::new(index))
    }

    pub fn child_count(&self, id: DivisionId<V>) -> usize {
        self.arena
            .get(id.index)
            .map_or(0, |node| node.children.len())
    }

    pub fn child_at(&self, id: DivisionId<V>, position: usize) -> Option<DivisionId<V>> {
        self.arena
            .get(id.index)
            .and_then(|node| node.children.get(position))
            .map(|&index| DivisionId::new(index))
    }

    /// Position of `id` among its siblings; `None` for the root and unknown ids.
    pub fn index_of(&self, id: DivisionId<V>) -> Option<usize> {
        let parent = self.arena.get(id.index)?.parent?;
        self.arena
            .get(parent)?
            .children
            .iter()
            .position(|&child| child == id.index)
    }

    pub fn is_leaf(&self, id: DivisionId<V>) -> bool {
        self.child_count(id) == 0
    }

    /// Inserts `division` below `parent` at `position` (appends when `None`).
    #[instrument(level = "trace", skip(self, division))]
    pub fn insert_child(
        &mut self,
        parent: DivisionId<V>,
        position: Option<usize>,
        division: Division<V>,
    ) -> DomainResult<DivisionId<V>> {
        let child_count = self
            .arena
            .get(parent.index)
            .map(|node| node.children.len())
            .ok_or_else(|| DomainError::ReferenceNotInTree(parent.to_string()))?;
        let position = position.unwrap_or(child_count);
        if position > child_count {
            return Err(DomainError::InvalidPosition(format!(
                "index {} exceeds {} children of {}",
                position, child_count, parent
            )));
        }
        let index = self.arena.insert(TreeNode {
            division,
            parent: Some(parent.index),
            children: Vec::new(),
        });
        if let Some(node) = self.arena.get_mut(parent.index) {
            node.children.insert(position, index);
        }
        Ok(DivisionId::new(index))
    }

    /// Inserts `division` in the place of `id` and makes `id` its only child.
    ///
    /// When `id` is the root the new division becomes the root.
    #[instrument(level = "trace", skip(self, division))]
    pub fn wrap(&mut self, id: DivisionId<V>, division: Division<V>) -> DomainResult<DivisionId<V>> {
        let parent = self
            .arena
            .get(id.index)
            .ok_or_else(|| DomainError::ReferenceNotInTree(id.to_string()))?
            .parent;
        let wrapper = self.arena.insert(TreeNode {
            division,
            parent,
            children: vec![id.index],
        });
        match parent {
            Some(parent) => {
                if let Some(node) = self.arena.get_mut(parent) {
                    for child in node.children.iter_mut() {
                        if *child == id.index {
                            *child = wrapper;
                        }
                    }
                }
            }
            None => self.root = wrapper,
        }
        if let Some(node) = self.arena.get_mut(id.index) {
            node.parent = Some(wrapper);
        }
        Ok(DivisionId::new(wrapper))
    }

    /// Unhooks the subtree at `id` from its parent, keeping it in the arena.
    pub(crate) fn detach(&mut self, id: DivisionId<V>) -> DomainResult<()> {
        if id.index == self.root {
            return Err(DomainError::CannotRemoveRoot);
        }
        let parent = self
            .arena
            .get(id.index)
            .ok_or_else(|| DomainError::ReferenceNotInTree(id.to_string()))?
            .parent;
        if let Some(parent) = parent.and_then(|p| self.arena.get_mut(p)) {
            parent.children.retain(|&child| child != id.index);
        }
        if let Some(node) = self.arena.get_mut(id.index) {
            node.parent = None;
        }
        Ok(())
    }

    /// Hooks a detached subtree below `parent` at `position` (appends when `None`).
    pub(crate) fn attach(
        &mut self,
        id: DivisionId<V>,
        parent: DivisionId<V>,
        position: Option<usize>,
    ) -> DomainResult<()> {
        let child_count = self.child_count(parent);
        if !self.contains(parent) || !self.contains(id) {
            return Err(DomainError::ReferenceNotInTree(parent.to_string()));
        }
        let position = position.unwrap_or(child_count).min(child_count);
        if let Some(node) = self.arena.get_mut(parent.index) {
            node.children.insert(position, id.index);
        }
        if let Some(node) = self.arena.get_mut(id.index) {
            node.parent = Some(parent.index);
        }
        Ok(())
    }

    /// Removes the subtree rooted at `id` and returns its divisions in pre-order.
    #[instrument(level = "trace", skip(self))]
    pub fn remove_subtree(&mut self, id: DivisionId<V>) -> DomainResult<Vec<(DivisionId<V>, Division<V>)>> {
        let doomed: Vec<DivisionId<V>> = self.traverse(id, true).collect();
        if doomed.is_empty() {
            return Err(DomainError::ReferenceNotInTree(id.to_string()));
        }
        self.detach(id)?;
        Ok(doomed
            .into_iter()
            .filter_map(|doomed| {
                self.arena
                    .remove(doomed.index)
                    .map(|node| (doomed, node.division))
            })
            .collect())
    }

    /// Pre-order walk of the subtree at `start`; `include_start` controls
    /// whether `start` itself is yielded.
    pub fn traverse(&self, start: DivisionId<V>, include_start: bool) -> PreOrder<'_, V> {
        let mut stack = Vec::new();
        if let Some(node) = self.arena.get(start.index) {
            if include_start {
                stack.push(start.index);
            } else {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        PreOrder { tree: self, stack }
    }

    /// Pre-order walk of the whole tree, root included.
    pub fn iter(&self) -> PreOrder<'_, V> {
        self.traverse(self.root(), true)
    }

    /// Post-order walk of the subtree at `start`, `start` last.
    pub fn post_order(&self, start: DivisionId<V>) -> PostOrder<'_, V> {
        let mut stack = Vec::new();
        if self.arena.contains(start.index) {
            stack.push((start.index, false));
        }
        PostOrder { tree: self, stack }
    }

    /// Root-first chain of proper ancestors of `id`; empty for the root.
    ///
    /// Fails when `id` is not connected to the root of this tree.
    #[instrument(level = "trace", skip(self))]
    pub fn ancestors(&self, id: DivisionId<V>) -> DomainResult<Vec<DivisionId<V>>> {
        let not_in_tree = || DomainError::ReferenceNotInTree(id.to_string());
        let mut chain = Vec::new();
        let mut current = self.arena.get(id.index).ok_or_else(not_in_tree)?;
        let mut current_index = id.index;
        while let Some(parent) = current.parent {
            if chain.len() > self.arena.len() {
                return Err(not_in_tree());
            }
            chain.push(DivisionId::new(parent));
            current_index = parent;
            current = self.arena.get(parent).ok_or_else(not_in_tree)?;
        }
        if current_index != self.root {
            return Err(not_in_tree());
        }
        chain.reverse();
        Ok(chain)
    }

    /// Whether `id` lies in the subtree rooted at `ancestor` (inclusive).
    pub fn is_within(&self, id: DivisionId<V>, ancestor: DivisionId<V>) -> bool {
        let mut current = Some(id.index);
        while let Some(index) = current {
            if index == ancestor.index {
                return true;
            }
            current = self.arena.get(index).and_then(|node| node.parent);
        }
        false
    }

    /// Number of levels; a lone root has depth 1.
    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.calculate_depth(self.root)
    }

    fn calculate_depth(&self, index: Index) -> usize {
        self.arena.get(index).map_or(0, |node| {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        })
    }

    /// Leaves of the subtree at `start` in document order.
    pub fn leaves(&self, start: DivisionId<V>) -> Vec<DivisionId<V>> {
        self.traverse(start, true)
            .filter(|&id| self.is_leaf(id))
            .collect()
    }

    /// Follows child positions from the root, e.g. `[0, 2, 1]`.
    pub fn resolve_path(&self, path: &[usize]) -> Option<DivisionId<V>> {
        path.iter()
            .try_fold(self.root(), |node, &position| self.child_at(node, position))
    }

    /// Child positions leading from the root to `id`.
    pub fn path_of(&self, id: DivisionId<V>) -> DomainResult<Vec<usize>> {
        let mut chain = self.ancestors(id)?;
        chain.push(id);
        Ok(chain
            .iter()
            .skip(1)
            .filter_map(|&node| self.index_of(node))
            .collect())
    }

    /// Compares content and shape of two subtrees, ignoring node identity.
    ///
    /// Type, labels, metadata and children take part; variant payloads do not.
    pub fn structurally_eq(&self, id: DivisionId<V>, other: &Self, other_id: DivisionId<V>) -> bool {
        let (Some(left), Some(right)) = (self.arena.get(id.index), other.arena.get(other_id.index))
        else {
            return false;
        };
        left.division.same_content(&right.division)
            && left.children.len() == right.children.len()
            && left
                .children
                .iter()
                .zip(right.children.iter())
                .all(|(&l, &r)| self.structurally_eq(DivisionId::new(l), other, DivisionId::new(r)))
    }

    /// Hash consistent with [`DivisionTree::structurally_eq`].
    pub fn structural_hash<H: Hasher>(&self, id: DivisionId<V>, state: &mut H) {
        let Some(node) = self.arena.get(id.index) else {
            return;
        };
        node.division.hash_content(state);
        node.children.len().hash(state);
        for &child in &node.children {
            self.structural_hash(DivisionId::new(child), state);
        }
    }
}

/// Pre-order iterator over division ids.
#[derive(Clone)]
pub struct PreOrder<'a, V: Variant> {
    tree: &'a DivisionTree<V>,
    stack: Vec<Index>,
}

impl<V: Variant> Iterator for PreOrder<'_, V> {
    type Item = DivisionId<V>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.stack.pop()?;
        if let Some(node) = self.tree.arena.get(current) {
            // Push children in reverse order for left-to-right traversal
            self.stack.extend(node.children.iter().rev().copied());
        }
        Some(DivisionId::new(current))
    }
}

/// Post-order iterator over division ids.
pub struct PostOrder<'a, V: Variant> {
    tree: &'a DivisionTree<V>,
    stack: Vec<(Index, bool)>,
}

impl<V: Variant> Iterator for PostOrder<'_, V> {
    type Item = DivisionId<V>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current, visited)) = self.stack.pop() {
            if visited {
                return Some(DivisionId::new(current));
            }
            if let Some(node) = self.tree.arena.get(current) {
                self.stack.push((current, true));
                for &child in node.children.iter().rev() {
                    self.stack.push((child, false));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::division::Logical;

    fn sample() -> (DivisionTree<Logical>, Vec<DivisionId<Logical>>) {
        let mut tree = DivisionTree::new(Division::new("monograph"));
        let root = tree.root();
        let a = tree.insert_child(root, None, Division::new("chapter")).unwrap();
        let b = tree.insert_child(root, None, Division::new("chapter")).unwrap();
        let a1 = tree.insert_child(a, None, Division::new("section")).unwrap();
        (tree, vec![root, a, b, a1])
    }

    #[test]
    fn pre_and_post_order_follow_document_order() {
        let (tree, ids) = sample();
        let pre: Vec<_> = tree.iter().collect();
        assert_eq!(pre, vec![ids[0], ids[1], ids[3], ids[2]]);
        let post: Vec<_> = tree.post_order(tree.root()).collect();
        assert_eq!(post, vec![ids[3], ids[1], ids[2], ids[0]]);
    }

    #[test]
    fn traverse_can_exclude_start() {
        let (tree, ids) = sample();
        let below: Vec<_> = tree.traverse(ids[1], false).collect();
        assert_eq!(below, vec![ids[3]]);
    }

    #[test]
    fn removed_ids_no_longer_resolve() {
        let (mut tree, ids) = sample();
        let removed = tree.remove_subtree(ids[1]).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!tree.contains(ids[3]));
        assert!(tree.ancestors(ids[3]).is_err());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn wrap_at_root_replaces_root() {
        let (mut tree, ids) = sample();
        let wrapper = tree.wrap(ids[0], Division::new("multivolume")).unwrap();
        assert_eq!(tree.root(), wrapper);
        assert_eq!(tree.parent(ids[0]), Some(wrapper));
        assert_eq!(tree.depth(), 4);
    }

    #[test]
    fn structural_equality_ignores_identity() {
        let (left, _) = sample();
        let (mut right, ids) = sample();
        assert!(left.structurally_eq(left.root(), &right, right.root()));

        right.get_mut(ids[2]).unwrap().label = Some("Epilogue".into());
        assert!(!left.structurally_eq(left.root(), &right, right.root()));
    }

    #[test]
    fn path_of_inverts_resolve_path() {
        let (tree, ids) = sample();
        let path = tree.path_of(ids[3]).unwrap();
        assert_eq!(path, vec![0, 0]);
        assert_eq!(tree.resolve_path(&path), Some(ids[3]));
    }
}
