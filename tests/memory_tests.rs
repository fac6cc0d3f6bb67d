//! Block accounting tests.
//!
//! Every node comes from the tree's block pool, so leaks and double frees
//! show up directly in [`PoolStats`]: after a full drain the outstanding
//! count must be back at zero, and `released` must never exceed `allocated`.
//!
//! The interesting case is deferred reclamation. A node merged out of the
//! tree while its parent's cache ring still names it stays allocated until
//! the last such slot is dropped, then goes back exactly once.

use cbtree::{CbTree, Order, PoolStats, Tree32, Tree64, TreeConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::num::NonZeroUsize;

// ===========================================================================
// Helper Functions
// ===========================================================================

fn v(n: usize) -> NonZeroUsize {
	NonZeroUsize::new(n).unwrap()
}

fn four_pairs() -> Tree64 {
	CbTree::with_config(TreeConfig::default().with_pairs_per_node(4)).unwrap()
}

/// Unlinked nodes still held alive by cache slots.
fn deferred(tree: &Tree64) -> usize {
	tree.pool_stats().outstanding - tree.node_count()
}

fn assert_balanced(stats: PoolStats) {
	assert_eq!(stats.outstanding, 0, "{stats:?}");
	assert_eq!(stats.allocated, stats.released, "{stats:?}");
}

// ===========================================================================
// Basic Accounting
// ===========================================================================

#[test]
fn no_leak_after_insert_remove_all() {
	let mut tree = four_pairs();
	for k in 0..1000u64 {
		tree.insert(k, v(k as usize + 1)).unwrap();
	}
	for k in 0..1000u64 {
		assert_eq!(tree.remove(&k), Some(v(k as usize + 1)));
	}
	assert!(tree.is_empty());
	assert_balanced(tree.pool_stats());
}

#[test]
fn no_leak_after_drain() {
	let mut tree = four_pairs();
	for k in 0..1000u64 {
		tree.insert(k * 3, v(k as usize + 1)).unwrap();
	}
	assert!(tree.pool_stats().outstanding > 0);

	assert_eq!(tree.drain_visit(Order::Descending, |_, _, _| {}), 1000);
	assert_balanced(tree.pool_stats());
}

#[test]
fn blocks_are_recycled() {
	let mut tree: Tree32 = CbTree::with_config(TreeConfig::default().with_pairs_per_node(4)).unwrap();
	for round in 0..5u32 {
		for k in 0..200u32 {
			tree.insert(k, v((round * 1000 + k) as usize + 1)).unwrap();
		}
		tree.drain_visit(Order::Ascending, |_, _, _| {});
	}

	let stats = tree.pool_stats();
	assert_eq!(stats.outstanding, 0);
	// later rounds reuse the first round's blocks
	assert_eq!(stats.capacity, stats.peak);
}

// ===========================================================================
// Deferred Reclamation
// ===========================================================================

/// Root over three leaves:
///
/// ```text
/// [50 → N, 30 → A, 10 → B]
/// N = [70, 60, 50]   A = [40, 30]   B = [20, 10]
/// ```
fn three_leaf_tree() -> Tree64 {
	let mut tree = four_pairs();
	for k in [10, 20, 30, 40, 50, 60, 70] {
		tree.insert(k, v(k as usize)).unwrap();
	}
	assert_eq!(tree.node_count(), 4);
	tree
}

#[test]
fn merged_node_waits_for_last_cache_slot() {
	let mut tree = three_leaf_tree();

	// two root slots now name leaf B, one names A
	tree.lookup(&20);
	tree.lookup(&10);
	tree.lookup(&40);

	// B underflows and is merged into A, but the root's ring still names it
	assert_eq!(tree.remove(&10), Some(v(10)));
	tree.assert_invariants();
	assert_eq!(tree.node_count(), 3);
	assert_eq!(deferred(&tree), 1);
	let released = tree.pool_stats().released;

	// stale slots are skipped, never served; each miss stores a fresh slot
	assert_eq!(tree.lookup(&20), Some(v(20)));
	// this store wraps around and overwrites one of B's two slots
	assert_eq!(tree.lookup(&10), None);
	assert_eq!(deferred(&tree), 1);
	assert_eq!(tree.pool_stats().released, released);

	// overwriting the other one sends B back to the pool
	tree.lookup(&30);
	assert_eq!(deferred(&tree), 0);
	assert_eq!(tree.pool_stats().released, released + 1);

	tree.assert_invariants();
	tree.drain_visit(Order::Descending, |_, _, _| {});
	assert_balanced(tree.pool_stats());
}

#[test]
fn drain_releases_nodes_still_cached() {
	let mut tree = three_leaf_tree();
	tree.lookup(&20);
	tree.lookup(&10);
	tree.remove(&10);
	assert_eq!(deferred(&tree), 1);

	// the root's teardown drops the last slots naming the merged leaf
	assert_eq!(tree.drain_visit(Order::Descending, |_, _, _| {}), 6);
	assert_balanced(tree.pool_stats());
}

#[test]
fn uncached_merge_releases_immediately() {
	let mut tree: Tree64 =
		CbTree::with_config(TreeConfig::default().with_pairs_per_node(4).with_cache(false)).unwrap();
	for k in [10, 20, 30, 40, 50, 60, 70] {
		tree.insert(k, v(k as usize)).unwrap();
	}
	tree.lookup(&20);
	tree.lookup(&10);

	tree.remove(&10);
	assert_eq!(deferred(&tree), 0);
}

#[test]
fn random_workload_returns_to_baseline() {
	let mut rng = StdRng::seed_from_u64(0x5eed);
	let mut tree = four_pairs();
	let mut keys: Vec<u64> = (0..2000).collect();
	keys.shuffle(&mut rng);

	for &k in &keys {
		tree.insert(k, v(k as usize + 1)).unwrap();
	}
	for &k in keys.iter().step_by(3) {
		assert_eq!(tree.lookup(&k), Some(v(k as usize + 1)));
	}
	keys.shuffle(&mut rng);
	for &k in &keys[..1500] {
		tree.remove(&k);
		tree.lookup(&(k + 1));
	}
	tree.assert_invariants();

	let stats = tree.pool_stats();
	assert!(stats.released <= stats.allocated);
	assert!(stats.outstanding >= tree.node_count());

	assert_eq!(tree.destroy(), 500);
}

#[test]
fn destroy_after_random_workload_is_balanced() {
	let mut rng = StdRng::seed_from_u64(7);
	let mut tree = four_pairs();
	let mut keys: Vec<u64> = (0..500).map(|k| k * 17).collect();
	keys.shuffle(&mut rng);
	for &k in &keys {
		tree.insert(k, v(1)).unwrap();
		tree.lookup(&k);
	}
	for &k in &keys[..250] {
		tree.remove(&k);
	}

	tree.drain_visit(Order::Ascending, |_, _, _| {});
	assert_balanced(tree.pool_stats());
}
