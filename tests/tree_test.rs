//! Tests for the arena-backed division tree

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use structmeta::domain::{Division, DivisionId, DivisionTree, Logical};

fn sample() -> (DivisionTree<Logical>, Vec<DivisionId<Logical>>) {
    // monograph
    // ├── chapter A
    // │   ├── section A1
    // │   └── section A2
    // └── chapter B
    let mut tree = DivisionTree::new(Division::<Logical>::new("monograph"));
    let root = tree.root();
    let a = tree
        .insert_child(root, None, Division::new("chapter").with_label("A"))
        .unwrap();
    let b = tree
        .insert_child(root, None, Division::new("chapter").with_label("B"))
        .unwrap();
    let a1 = tree
        .insert_child(a, None, Division::new("section").with_label("A1"))
        .unwrap();
    let a2 = tree
        .insert_child(a, None, Division::new("section").with_label("A2"))
        .unwrap();
    (tree, vec![root, a, b, a1, a2])
}

fn hash_of(tree: &DivisionTree<Logical>, id: DivisionId<Logical>) -> u64 {
    let mut hasher = DefaultHasher::new();
    tree.structural_hash(id, &mut hasher);
    hasher.finish()
}

#[test]
fn given_tree_when_traversing_then_yields_pre_order() {
    // Arrange
    let (tree, ids) = sample();
    let (root, a, b, a1, a2) = (ids[0], ids[1], ids[2], ids[3], ids[4]);

    // Act
    let order: Vec<_> = tree.iter().collect();
    let below_a: Vec<_> = tree.traverse(a, false).collect();

    // Assert
    assert_eq!(order, vec![root, a, a1, a2, b]);
    assert_eq!(below_a, vec![a1, a2]);
}

#[test]
fn given_traversal_when_cloned_then_restarts_independently() {
    let (tree, _) = sample();
    let mut walk = tree.iter();
    walk.next();
    let restarted = walk.clone();

    assert_eq!(walk.count(), 4);
    assert_eq!(restarted.count(), 4);
}

#[test]
fn given_tree_when_post_order_then_children_precede_parents() {
    let (tree, ids) = sample();
    let (root, a, b, a1, a2) = (ids[0], ids[1], ids[2], ids[3], ids[4]);

    let order: Vec<_> = tree.post_order(root).collect();

    assert_eq!(order, vec![a1, a2, a, b, root]);
}

#[test]
fn given_nested_division_when_resolving_ancestors_then_root_comes_first() {
    let (tree, ids) = sample();
    let (root, a, a1) = (ids[0], ids[1], ids[3]);

    assert_eq!(tree.ancestors(a1).unwrap(), vec![root, a]);
    assert_eq!(tree.ancestors(a).unwrap(), vec![root]);
    assert!(tree.ancestors(root).unwrap().is_empty());
}

#[test]
fn given_removed_subtree_when_resolving_ancestors_then_fails() {
    let (mut tree, ids) = sample();
    let a1 = ids[3];

    let removed = tree.remove_subtree(ids[1]).unwrap();

    assert_eq!(removed.len(), 3);
    assert!(tree.ancestors(a1).is_err());
    assert!(!tree.contains(a1));
    assert_eq!(tree.len(), 2);
}

#[test]
fn given_root_when_removing_then_refuses() {
    let (mut tree, ids) = sample();

    assert!(tree.remove_subtree(ids[0]).is_err());
    assert_eq!(tree.len(), 5);
}

#[test]
fn given_index_path_when_resolving_then_follows_child_positions() {
    let (tree, ids) = sample();

    assert_eq!(tree.resolve_path(&[]), Some(ids[0]));
    assert_eq!(tree.resolve_path(&[0, 1]), Some(ids[4]));
    assert_eq!(tree.resolve_path(&[1]), Some(ids[2]));
    assert_eq!(tree.resolve_path(&[1, 0]), None);
    assert_eq!(tree.path_of(ids[4]).unwrap(), vec![0, 1]);
}

#[test]
fn given_tree_when_measuring_then_reports_depth_and_leaves() {
    let (tree, ids) = sample();

    assert_eq!(tree.depth(), 3);
    assert_eq!(tree.leaves(ids[0]), vec![ids[3], ids[4], ids[2]]);
    assert_eq!(tree.index_of(ids[2]), Some(1));
    assert_eq!(tree.child_count(ids[1]), 2);
}

#[test]
fn given_position_beyond_children_when_inserting_then_fails() {
    let (mut tree, ids) = sample();

    let result = tree.insert_child(ids[1], Some(3), Division::new("section"));

    assert!(result.is_err());
    assert_eq!(tree.child_count(ids[1]), 2);
}

#[test]
fn given_root_when_wrapping_then_wrapper_becomes_root() {
    let (mut tree, ids) = sample();

    let wrapper = tree.wrap(ids[0], Division::new("multivolume")).unwrap();

    assert_eq!(tree.root(), wrapper);
    assert_eq!(tree.parent(ids[0]), Some(wrapper));
    assert_eq!(tree.ancestors(ids[3]).unwrap(), vec![wrapper, ids[0], ids[1]]);
}

#[test]
fn given_two_equal_trees_when_compared_then_structurally_equal_with_equal_hash() {
    let (left, left_ids) = sample();
    let (right, right_ids) = sample();

    assert!(left.structurally_eq(left_ids[0], &right, right_ids[0]));
    assert_eq!(hash_of(&left, left_ids[0]), hash_of(&right, right_ids[0]));
}

#[test]
fn given_changed_label_when_compared_then_not_structurally_equal() {
    let (left, left_ids) = sample();
    let (mut right, right_ids) = sample();
    right.get_mut(right_ids[4]).unwrap().label = Some("A3".into());

    assert!(!left.structurally_eq(left_ids[0], &right, right_ids[0]));
    assert_ne!(hash_of(&left, left_ids[0]), hash_of(&right, right_ids[0]));
}
