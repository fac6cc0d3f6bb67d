//! # Fixture Scenarios
//!
//! Small hand-built trees whose exact shape is known, so that splits, merges
//! and root growth can be checked step by step. All fixtures use four pairs
//! per node.

use cbtree::{CbTree, Tree64, TreeConfig};
use std::num::NonZeroUsize;
use std::ptr::NonNull;

fn v(n: usize) -> NonZeroUsize {
	NonZeroUsize::new(n).unwrap()
}

fn four_pairs<V: cbtree::Value>() -> CbTree<u64, V> {
	CbTree::with_config(TreeConfig::default().with_pairs_per_node(4)).unwrap()
}

fn keys<V: cbtree::Value>(tree: &CbTree<u64, V>) -> Vec<u64> {
	tree.iter().map(|(k, _)| k).collect()
}

// ===========================================================================
// Split and Merge
// ===========================================================================

#[test]
fn fifth_insert_splits_root_leaf() {
	let mut tree: Tree64 = four_pairs();
	for k in [10, 20, 30, 40] {
		tree.insert(k, v(k as usize)).unwrap();
	}
	assert_eq!(tree.height(), 1);
	assert_eq!(tree.node_count(), 1);

	tree.insert(50, v(50)).unwrap();
	tree.assert_invariants();

	// a new root over two leaves
	assert_eq!(tree.height(), 2);
	assert_eq!(tree.node_count(), 3);
	assert_eq!(tree.lookup(&30), Some(v(30)));
	assert_eq!(keys(&tree), vec![50, 40, 30, 20, 10]);
}

#[test]
fn removals_merge_back_to_one_leaf() {
	let mut tree: Tree64 = four_pairs();
	for k in [10, 20, 30, 40, 50] {
		tree.insert(k, v(k as usize)).unwrap();
	}

	assert_eq!(tree.remove(&10), Some(v(10)));
	tree.assert_invariants();
	assert_eq!(tree.remove(&20), Some(v(20)));
	tree.assert_invariants();

	assert_eq!(tree.height(), 1);
	assert_eq!(tree.node_count(), 1);
	assert_eq!(keys(&tree), vec![50, 40, 30]);
	assert_eq!(tree.pool_stats().outstanding, 1);
}

#[test]
fn three_leaves_under_one_root() {
	let mut tree: Tree64 = four_pairs();
	for k in [10, 20, 30, 40, 50, 60, 70] {
		tree.insert(k, v(k as usize)).unwrap();
	}
	tree.assert_invariants();

	assert_eq!(tree.height(), 2);
	assert_eq!(tree.node_count(), 4);
	assert_eq!(tree.last(), Some((70, v(70))));
	assert_eq!(tree.get_prev(&50), Some((40, v(40))));
	assert_eq!(tree.get_prev(&30), Some((20, v(20))));
}

#[test]
fn sequential_inserts_grow_height() {
	let mut tree: Tree64 = four_pairs();
	let pairs = tree.geo().pairs_per_node as u64;
	for k in 0..pairs * pairs + 1 {
		tree.insert(k, v(k as usize + 1)).unwrap();
	}
	tree.assert_invariants();
	assert!(tree.height() >= 2);
}

#[test]
fn smaller_key_lowers_separators() {
	let mut tree: Tree64 = four_pairs();
	for k in [100, 200, 300, 400, 500, 600, 700] {
		tree.insert(k, v(k as usize)).unwrap();
	}
	// below every key in the tree
	tree.insert(1, v(1)).unwrap();
	tree.assert_invariants();

	assert_eq!(tree.lookup(&1), Some(v(1)));
	assert_eq!(tree.get_prev(&100), Some((1, v(1))));
	assert_eq!(keys(&tree).last(), Some(&1));
}

// ===========================================================================
// Tree Merge
// ===========================================================================

static LETTERS: [&str; 4] = ["a", "b", "c", "d"];

fn letter(i: usize) -> NonNull<&'static str> {
	NonNull::from(&LETTERS[i])
}

fn read(ptr: NonNull<&'static str>) -> &'static str {
	// SAFETY: every stored pointer points into the static LETTERS array
	unsafe { *ptr.as_ref() }
}

#[test]
fn merge_interleaved_trees() {
	let mut a: Tree64<NonNull<&'static str>> = four_pairs();
	let mut b: Tree64<NonNull<&'static str>> = four_pairs();
	a.insert(1, letter(0)).unwrap();
	a.insert(3, letter(2)).unwrap();
	b.insert(2, letter(1)).unwrap();
	b.insert(4, letter(3)).unwrap();

	a.merge(&mut b).unwrap();
	a.assert_invariants();

	let merged: Vec<(u64, &str)> = a.iter().map(|(k, p)| (k, read(p))).collect();
	assert_eq!(merged, vec![(4, "d"), (3, "c"), (2, "b"), (1, "a")]);
	assert!(b.is_empty());
	assert_eq!(b.height(), 0);
	assert_eq!(b.pool_stats().outstanding, 0);
}
