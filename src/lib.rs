//! # cbtree: an in-memory B+ tree with per-node child caches
//!
//! This crate provides an ordered map from fixed-width unsigned integer keys
//! to pointer-sized, never-zero values. Nodes are fixed-size blocks drawn from
//! a pool, and every internal node remembers the last few children that
//! searches through it resolved to, so a repeated lookup can skip the linear
//! scan at each level.
//!
//! ## Design Overview
//!
//! **Descending nodes**: every node holds up to `pairs_per_node` key/value
//! slots packed to the left in *descending* key order. Unused slots are all
//! zero, and a slot is empty iff its value word is zero. At internal levels a
//! value is a child handle and its key is a lower bound of that child's
//! subtree (the separator).
//!
//! **Lazy separators**: inserting a key smaller than every separator on the
//! path lowers the last separator of each node on the way down, so searches
//! for that key and anything above it keep finding the right child.
//!
//! **Cache rings**: each internal node carries a ring of
//! [`CACHE_SLOTS`](cache::CACHE_SLOTS) `(search key, child)` memos. Because a
//! memo aliases a node, nodes count the memos pointing at them and are only
//! returned to the pool once they are both unlinked from the tree and
//! unreferenced. See [`cache`] for the protocol.
//!
//! ### Tree Structure
//!
//! ```text
//!              height 2          ┌──────────────────────────┐
//!              (root)            │ 30 → A │ 10 → B │  ·  │ · │  ring: [key→child ×4]
//!                                └────┬─────────┬───────────┘
//!                                     │         │
//!                    ┌────────────────┘         └───────┐
//!                    ▼                                  ▼
//!              ┌────────────────────┐            ┌────────────────────┐
//!  height 1    │ 50 │ 40 │ 30 │  ·  │            │ 20 │ 10 │  ·  │  · │
//!  (leaves)    └────────────────────┘            └────────────────────┘
//! ```
//!
//! ## Basic Usage
//!
//! ```
//! use cbtree::Tree64;
//! use std::num::NonZeroUsize;
//!
//! let mut tree: Tree64 = Tree64::new();
//! let one = NonZeroUsize::new(1).unwrap();
//!
//! tree.insert(10, one).unwrap();
//! assert_eq!(tree.lookup(&10), Some(one));
//!
//! assert_eq!(tree.remove(&10), Some(one));
//! assert!(tree.is_empty());
//! ```
//!
//! ## Thread Safety
//!
//! Mutation takes `&mut self`, so there is exactly one writer. Lookups take
//! `&self` and may run from many threads at once through an `Arc<CbTree>`;
//! the only state they touch is the cache ring of each internal node, which
//! is guarded by a per-node lock.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroUsize;

pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod hooks;
pub mod iter;
pub mod key;
mod node;
pub mod pool;
pub mod value;

use cache::{cache_invalidate, cache_lookup, cache_store, free_node};
use key::KeyBuf;
use node::NodeBlock;
use pool::{BlockPool, NodeId};

pub use config::TreeConfig;
pub use error::{Error, Result};
pub use geo::{Geo, DEFAULT_NODE_BYTES, GEO128, GEO32, GEO64, GEO_LONG};
pub use hooks::{AccessMonitor, Hooks, OpTimer, Operation};
pub use iter::{Iter, Order};
pub use key::Key;
pub use pool::PoolStats;
pub use value::Value;

// ---------------------------------------------------------------------------
// Public Type Aliases
// ---------------------------------------------------------------------------

/// Tree keyed by native machine words.
pub type TreeL<V = NonZeroUsize> = CbTree<usize, V>;

/// Tree keyed by 32-bit integers.
pub type Tree32<V = NonZeroUsize> = CbTree<u32, V>;

/// Tree keyed by 64-bit integers.
pub type Tree64<V = NonZeroUsize> = CbTree<u64, V>;

/// Tree keyed by 128-bit integers.
pub type Tree128<V = NonZeroUsize> = CbTree<u128, V>;

// ---------------------------------------------------------------------------
// Core Tree Structure
// ---------------------------------------------------------------------------

/// A B+ tree over fixed-width integer keys.
///
/// # Type Parameters
///
/// - `K`: the key type, one of `usize`, `u32`, `u64` or `u128`.
/// - `V`: the value type. Values are stored as raw words and never
///   dereferenced; see [`Value`].
///
/// # Height
///
/// Height 0 is the empty tree. Height 1 means the root is a leaf; each level
/// above adds one internal node layer. All leaves sit at the same depth.
pub struct CbTree<K: Key, V: Value = NonZeroUsize> {
	/// Node storage. Nodes are addressed by handle, never by reference.
	pool: BlockPool<NodeBlock>,
	/// Root node, `None` iff the tree is empty.
	root: Option<NodeId>,
	height: usize,
	/// Number of leaf entries.
	len: usize,
	geo: Geo,
	cache_enabled: bool,
	hooks: Hooks,
	_marker: PhantomData<fn() -> (K, V)>,
}

impl<K: Key, V: Value> Default for CbTree<K, V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<K: Key, V: Value> fmt::Debug for CbTree<K, V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CbTree")
			.field("height", &self.height)
			.field("len", &self.len)
			.field("geo", &self.geo)
			.field("cache_enabled", &self.cache_enabled)
			.field("pool", &self.pool.stats())
			.finish()
	}
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl<K: Key, V: Value> CbTree<K, V> {
	/// Creates an empty tree with the standard geometry for `K`.
	pub fn new() -> Self {
		Self::from_parts(TreeConfig::default(), Geo::for_key::<K>(DEFAULT_NODE_BYTES))
	}

	/// Creates an empty tree from `config`.
	///
	/// Fails with [`Error::InvariantViolation`] if the configured node size
	/// cannot hold at least two pairs.
	pub fn with_config(config: TreeConfig) -> Result<Self> {
		let geo = config.geometry::<K>()?;
		Ok(Self::from_parts(config, geo))
	}

	fn from_parts(config: TreeConfig, geo: Geo) -> Self {
		CbTree {
			pool: BlockPool::new(geo.block_words(), config.pool_capacity_hint, config.max_blocks),
			root: None,
			height: 0,
			len: 0,
			geo,
			cache_enabled: config.cache_enabled,
			hooks: Hooks::default(),
			_marker: PhantomData,
		}
	}

	/// Installs instrumentation hooks, replacing any previous ones.
	pub fn set_hooks(&mut self, hooks: Hooks) {
		self.hooks = hooks;
	}

	/// Currently installed hooks.
	pub fn hooks(&self) -> &Hooks {
		&self.hooks
	}

	/// Number of levels; 0 for the empty tree.
	pub fn height(&self) -> usize {
		self.height
	}

	/// Number of stored entries.
	pub fn len(&self) -> usize {
		self.len
	}

	/// Whether the tree holds no entries.
	pub fn is_empty(&self) -> bool {
		self.root.is_none()
	}

	/// Node geometry this tree was built with.
	pub fn geo(&self) -> Geo {
		self.geo
	}

	/// Whether lookups consult the per-node cache rings.
	pub fn cache_enabled(&self) -> bool {
		self.cache_enabled
	}

	/// Allocation statistics of the node pool.
	pub fn pool_stats(&self) -> PoolStats {
		self.pool.stats()
	}

	/// Number of nodes reachable from the root.
	///
	/// The difference to `pool_stats().outstanding` is the number of unlinked
	/// nodes still held alive by cache slots.
	pub fn node_count(&self) -> usize {
		match self.root {
			Some(root) => self.count_nodes(root, self.height),
			None => 0,
		}
	}

	/// Inserts `key → value`.
	///
	/// Fails with [`Error::DuplicateKey`] if `key` is already present, and
	/// with [`Error::OutOfMemory`] if a node split or root growth could not
	/// allocate; in both cases the tree does not contain the new entry.
	pub fn insert(&mut self, key: K, value: V) -> Result<()> {
		let started = self.hooks.start();
		let result = self.insert_level(&key.to_words(), value.into_word().get(), 1);
		self.hooks.finish(Operation::Insert, started);
		if result.is_ok() {
			self.len += 1;
		}
		result
	}

	/// Looks up the value stored under `key`.
	///
	/// Safe to call from many threads at once. Each internal level is first
	/// probed through its cache ring and then, on a miss, scanned.
	pub fn lookup(&self, key: &K) -> Option<V> {
		let started = self.hooks.start();
		let found = self.find_entry(&key.to_words()).map(|(leaf, slot)| self.pool.get(leaf).value(&self.geo, slot));
		self.hooks.finish(Operation::Lookup, started);

		let word = NonZeroUsize::new(found?)?;
		self.hooks.visited(word);
		Some(V::from_word(word))
	}

	/// Replaces the value of an existing key.
	pub fn update(&mut self, key: &K, value: V) -> Result<()> {
		let (leaf, slot) = self.find_entry(&key.to_words()).ok_or(Error::NotFound)?;
		let geo = self.geo;
		self.pool.get_mut(leaf).set_value(&geo, slot, value.into_word().get());
		Ok(())
	}

	/// Removes `key`, returning its value if it was present.
	pub fn remove(&mut self, key: &K) -> Option<V> {
		if self.root.is_none() {
			return None;
		}
		let word = self.remove_level(&key.to_words(), 1)?;
		self.len -= 1;
		NonZeroUsize::new(word).map(V::from_word)
	}

	/// Returns the entry with the largest key.
	pub fn last(&self) -> Option<(K, V)> {
		let mut node = self.root?;
		for _ in 1..self.height {
			node = self.pool.get(node).child(&self.geo, 0)?;
		}
		self.entry_at(node, 0)
	}

	/// Returns the entry with the largest key strictly smaller than `key`.
	///
	/// The search key is decremented and looked up as a "first key at or
	/// below". If the leaf it lands in holds nothing that small, the search
	/// restarts just below the last separator seen on the way down, which is
	/// the lower bound of that leaf.
	pub fn get_prev(&self, key: &K) -> Option<(K, V)> {
		let mut target = key.to_words();
		let root = self.root?;
		let geo = &self.geo;

		loop {
			if key::is_zero(&target) {
				return None;
			}
			key::dec_key(&mut target);

			let mut node = root;
			let mut retry: Option<KeyBuf> = None;
			let mut descended = true;
			for _ in 1..self.height {
				let block = self.pool.get(node);
				let i = block.getpos(geo, &target);
				match (i < geo.pairs_per_node).then(|| block.child(geo, i)).flatten() {
					Some(child) => {
						retry = Some(KeyBuf::from_slice(block.key(geo, i)));
						node = child;
					}
					None => {
						descended = false;
						break;
					}
				}
			}

			if descended {
				let block = self.pool.get(node);
				let slot = block.getpos(geo, &target);
				if slot < geo.pairs_per_node && block.value(geo, slot) != 0 {
					return self.entry_at(node, slot);
				}
			}

			target = retry?;
		}
	}

	/// Iterates over all entries from the largest key down.
	pub fn iter(&self) -> Iter<'_, K, V> {
		Iter::new(self)
	}

	/// Moves every entry of `victim` into `self`, leaving `victim` empty.
	///
	/// An empty target adopts the victim's nodes outright. Otherwise entries
	/// are moved one at a time from the victim's largest key down. A key
	/// present in both trees stops the merge with
	/// [`Error::InvariantViolation`]; entries moved before it stay moved.
	pub fn merge(&mut self, victim: &mut Self) -> Result<()> {
		if self.root.is_none() {
			std::mem::swap(&mut self.pool, &mut victim.pool);
			std::mem::swap(&mut self.root, &mut victim.root);
			std::mem::swap(&mut self.height, &mut victim.height);
			std::mem::swap(&mut self.len, &mut victim.len);
			std::mem::swap(&mut self.geo, &mut victim.geo);
			tracing::debug!(len = self.len, "merge adopted victim tree");
			return Ok(());
		}

		let mut moved = 0usize;
		while let Some((key, value)) = victim.last() {
			match self.insert(key, value) {
				Ok(()) => {}
				Err(Error::DuplicateKey) => {
					return Err(Error::InvariantViolation(format!("key {key:?} present in both merged trees")));
				}
				Err(err) => return Err(err),
			}
			victim.remove(&key);
			moved += 1;
		}
		tracing::debug!(moved, "merged trees");
		Ok(())
	}

	/// Calls `callback(value, key, index)` for every entry in `order`,
	/// returning the number of entries visited.
	pub fn visit<F>(&self, order: Order, mut callback: F) -> usize
	where
		F: FnMut(V, K, usize),
	{
		match self.root {
			Some(root) => self.walk(root, self.height, order, false, &mut callback, 0),
			None => 0,
		}
	}

	/// Like [`visit`](Self::visit), but releases every node once its entries
	/// have been visited. The tree is empty afterwards.
	///
	/// Nodes are released children first, each through the counted path, so
	/// a child still referenced by its parent's ring goes back to the pool
	/// when that parent is released.
	pub fn drain_visit<F>(&mut self, order: Order, mut callback: F) -> usize
	where
		F: FnMut(V, K, usize),
	{
		let count = match self.root {
			Some(root) => self.walk(root, self.height, order, true, &mut callback, 0),
			None => 0,
		};
		self.root = None;
		self.height = 0;
		self.len = 0;
		tracing::debug!(count, outstanding = self.pool.outstanding(), "tree drained");
		count
	}

	/// Releases every node, returning the number of entries that were held.
	pub fn destroy(mut self) -> usize {
		self.drain_visit(Order::Descending, |_, _, _| {})
	}
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

impl<K: Key, V: Value> CbTree<K, V> {
	/// Descends to the leaf slot holding exactly `key`.
	fn find_entry(&self, key: &[usize]) -> Option<(NodeId, usize)> {
		let geo = &self.geo;
		let mut node = self.root?;
		for _ in 1..self.height {
			node = match self.cached_child(node, key) {
				Some(child) => child,
				None => {
					let block = self.pool.get(node);
					let i = block.getpos(geo, key);
					if i == geo.pairs_per_node {
						return None;
					}
					let child = block.child(geo, i)?;
					if self.cache_enabled {
						cache_store(&self.pool, node, key, child);
					}
					child
				}
			};
		}

		let leaf = self.pool.get(node);
		(0..geo.pairs_per_node)
			.take_while(|&i| leaf.value(geo, i) != 0)
			.find(|&i| leaf.key_cmp(geo, i, key) == Ordering::Equal)
			.map(|slot| (node, slot))
	}

	#[inline]
	fn cached_child(&self, node: NodeId, key: &[usize]) -> Option<NodeId> {
		if self.cache_enabled {
			cache_lookup(&self.pool, node, key)
		} else {
			None
		}
	}

	/// Descends to the node at `level` on the path of `key`, lowering the
	/// last separator of any node whose separators are all above `key`.
	///
	/// Only called by the mutator, and never through the cache: a lowered
	/// separator changes which child a scan picks.
	fn find_level(&mut self, key: &[usize], level: usize) -> NodeId {
		let geo = self.geo;
		let mut node = self.root.expect("find_level on an empty tree");
		for _ in level..self.height {
			let block = self.pool.get_mut(node);
			let mut i = block.getpos(&geo, key);
			if i == geo.pairs_per_node || block.value(&geo, i) == 0 {
				i = i.checked_sub(1).expect("internal node without children");
				block.set_key(&geo, i, key);
			}
			node = block.child(&geo, i).expect("separator slot without a child");
		}
		node
	}

	fn entry_at(&self, node: NodeId, slot: usize) -> Option<(K, V)> {
		let block = self.pool.get(node);
		let value = NonZeroUsize::new(block.value(&self.geo, slot))?;
		Some((K::read_words(block.key(&self.geo, slot)), V::from_word(value)))
	}

	/// Copies out the pairs in `slots` of `node`.
	fn read_pairs(&self, node: NodeId, slots: std::ops::Range<usize>) -> Vec<(KeyBuf, usize)> {
		let block = self.pool.get(node);
		slots.map(|i| (KeyBuf::from_slice(block.key(&self.geo, i)), block.value(&self.geo, i))).collect()
	}
}

// ---------------------------------------------------------------------------
// Insertion
// ---------------------------------------------------------------------------

impl<K: Key, V: Value> CbTree<K, V> {
	/// Inserts `key → value` into the node at `level` on the path of `key`.
	///
	/// Level 1 is the leaf level; higher levels insert separators for split
	/// nodes. A full node is split and the insert retried.
	fn insert_level(&mut self, key: &[usize], value: usize, level: usize) -> Result<()> {
		if self.height < level {
			self.grow()?;
		}

		let geo = self.geo;
		loop {
			let node = self.find_level(key, level);
			let (pos, fill, exists) = {
				let block = self.pool.get(node);
				let pos = block.getpos(&geo, key);
				let fill = block.getfill(&geo, pos);
				(pos, fill, pos < fill && block.key_cmp(&geo, pos, key) == Ordering::Equal)
			};
			if exists {
				debug_assert_eq!(level, 1, "separator already present at level {level}");
				return Err(Error::DuplicateKey);
			}

			if fill == geo.pairs_per_node {
				self.split(node, fill, level)?;
				continue;
			}

			let block = self.pool.get_mut(node);
			for i in (pos..fill).rev() {
				block.copy_pair(&geo, i, i + 1);
			}
			block.set_pair(&geo, pos, key, value);
			if level > 1 {
				cache_invalidate(&self.pool, node);
			}
			return Ok(());
		}
	}

	/// Splits the full `node`: its `fill / 2` largest entries move to a new
	/// sibling, whose separator is linked one level up first.
	fn split(&mut self, node: NodeId, fill: usize, level: usize) -> Result<()> {
		let geo = self.geo;
		let half = fill / 2;
		let sibling = self.pool.allocate()?;
		let separator = KeyBuf::from_slice(self.pool.get(node).key(&geo, half - 1));

		if let Err(err) = self.insert_level(&separator, sibling.to_word(), level + 1) {
			self.pool.release(sibling);
			return Err(err);
		}

		let moved = self.read_pairs(node, 0..half);
		let target = self.pool.get_mut(sibling);
		for (i, (key, value)) in moved.iter().enumerate() {
			target.set_pair(&geo, i, key, *value);
		}

		let block = self.pool.get_mut(node);
		for i in 0..fill - half {
			block.copy_pair(&geo, i + half, i);
		}
		for i in fill - half..fill {
			block.clear_pair(&geo, i);
		}
		if level > 1 {
			cache_invalidate(&self.pool, node);
		}

		tracing::debug!(level, node = ?node, sibling = ?sibling, moved = half, "node split");
		Ok(())
	}

	/// Adds a level: the new root's only entry is the old root, keyed by its
	/// smallest key.
	fn grow(&mut self) -> Result<()> {
		let geo = self.geo;
		let root = self.pool.allocate()?;
		if let Some(old) = self.root {
			let fill = self.pool.get(old).getfill(&geo, 0);
			let smallest = KeyBuf::from_slice(self.pool.get(old).key(&geo, fill - 1));
			self.pool.get_mut(root).set_pair(&geo, 0, &smallest, old.to_word());
		}
		self.root = Some(root);
		self.height += 1;
		tracing::debug!(height = self.height, "tree grew");
		Ok(())
	}
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

impl<K: Key, V: Value> CbTree<K, V> {
	/// Removes `key` from the node at `level` on its path and returns the
	/// removed value word. At level 1 the key must match exactly.
	fn remove_level(&mut self, key: &[usize], level: usize) -> Option<usize> {
		let geo = self.geo;
		let node = self.find_level(key, level);
		let block = self.pool.get_mut(node);
		let pos = block.getpos(&geo, key);
		let fill = block.getfill(&geo, pos);
		if pos >= fill || (level == 1 && block.key_cmp(&geo, pos, key) != Ordering::Equal) {
			return None;
		}

		let removed = block.value(&geo, pos);
		for i in pos..fill - 1 {
			block.copy_pair(&geo, i + 1, i);
		}
		block.clear_pair(&geo, fill - 1);
		let fill = fill - 1;

		if level == self.height {
			match fill {
				0 => self.clear_root(),
				1 if level > 1 => self.shrink(),
				_ => {}
			}
		} else if fill < geo.min_fill() {
			self.rebalance(key, level, node, fill);
		}
		Some(removed)
	}

	/// Fixes an underfull non-root `child` at `level` by merging it with a
	/// sibling, left (larger keys) first. `key` is any key on its path.
	fn rebalance(&mut self, key: &[usize], level: usize, child: NodeId, fill: usize) {
		let geo = self.geo;
		if fill == 0 {
			self.remove_level(key, level + 1);
			free_node(&self.pool, child);
			return;
		}

		let parent = self.find_level(key, level + 1);
		let (i, left, right) = {
			let block = self.pool.get(parent);
			let i = block.getpos(&geo, key);
			assert_eq!(block.child(&geo, i), Some(child), "rebalance: child not found under its parent");
			let left = i.checked_sub(1).and_then(|l| block.child(&geo, l));
			let right = (i + 1 < geo.pairs_per_node).then(|| block.child(&geo, i + 1)).flatten();
			(i, left, right)
		};

		if let Some(left) = left {
			let left_fill = self.pool.get(left).getfill(&geo, 0);
			if fill + left_fill <= geo.pairs_per_node {
				self.merge_siblings(level, left, left_fill, child, fill, parent, i - 1);
				return;
			}
		}
		if let Some(right) = right {
			let right_fill = self.pool.get(right).getfill(&geo, 0);
			if fill + right_fill <= geo.pairs_per_node {
				self.merge_siblings(level, child, fill, right, right_fill, parent, i);
			}
		}
	}

	/// Appends `right`'s entries to `left` (its larger-key neighbour at
	/// `lpos` in `parent`) and unlinks `right`.
	///
	/// The parent's two child words are exchanged first, so that removing
	/// the separator at `lpos` drops the slot now naming `right` and `left`
	/// inherits `right`'s smaller separator.
	#[allow(clippy::too_many_arguments)]
	fn merge_siblings(
		&mut self,
		level: usize,
		left: NodeId,
		left_fill: usize,
		right: NodeId,
		right_fill: usize,
		parent: NodeId,
		lpos: usize,
	) {
		let geo = self.geo;
		let moved = self.read_pairs(right, 0..right_fill);
		let block = self.pool.get_mut(left);
		for (i, (key, value)) in moved.iter().enumerate() {
			block.set_pair(&geo, left_fill + i, key, *value);
		}
		if level > 1 {
			cache_invalidate(&self.pool, left);
		}

		let block = self.pool.get_mut(parent);
		block.set_value(&geo, lpos, right.to_word());
		block.set_value(&geo, lpos + 1, left.to_word());
		let separator = KeyBuf::from_slice(block.key(&geo, lpos));

		let unlinked = self.remove_level(&separator, level + 1);
		debug_assert_eq!(unlinked, Some(right.to_word()));
		let released = free_node(&self.pool, right);

		tracing::debug!(level, left = ?left, right = ?right, released, "merged siblings");
	}

	/// Drops a level: the root's only child becomes the root.
	fn shrink(&mut self) {
		let Some(old) = self.root else {
			return;
		};
		self.root = self.pool.get(old).child(&self.geo, 0);
		self.height -= 1;
		free_node(&self.pool, old);
		tracing::debug!(height = self.height, "tree shrank");
	}

	fn clear_root(&mut self) {
		if let Some(root) = self.root.take() {
			free_node(&self.pool, root);
		}
		self.height = 0;
		tracing::debug!("tree emptied");
	}
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

impl<K: Key, V: Value> CbTree<K, V> {
	/// Visits the subtree under `node` (at `height`), numbering leaf entries
	/// from `count`. With `reap`, each node is released after its subtree.
	fn walk<F>(&self, node: NodeId, height: usize, order: Order, reap: bool, callback: &mut F, mut count: usize) -> usize
	where
		F: FnMut(V, K, usize),
	{
		let geo = &self.geo;
		let fill = self.pool.get(node).getfill(geo, 0);
		for n in 0..fill {
			let i = order.slot(n, fill);
			let block = self.pool.get(node);
			if height > 1 {
				if let Some(child) = block.child(geo, i) {
					count = self.walk(child, height - 1, order, reap, callback, count);
				}
			} else if let Some(value) = NonZeroUsize::new(block.value(geo, i)) {
				callback(V::from_word(value), K::read_words(block.key(geo, i)), count);
				count += 1;
			}
		}
		if reap {
			free_node(&self.pool, node);
		}
		count
	}

	fn count_nodes(&self, node: NodeId, height: usize) -> usize {
		if height <= 1 {
			return 1;
		}
		let block = self.pool.get(node);
		let fill = block.getfill(&self.geo, 0);
		1 + (0..fill).filter_map(|i| block.child(&self.geo, i)).map(|c| self.count_nodes(c, height - 1)).sum::<usize>()
	}
}

// ===========================================================================
// Invariant Validation
// ===========================================================================

impl<K: Key, V: Value> CbTree<K, V> {
	/// Checks every structural invariant, reporting the first violation.
	///
	/// # Invariants Checked
	///
	/// 1. The tree is empty iff its height is 0.
	/// 2. Every reachable node is live (not marked deleted) and non-empty.
	/// 3. Used slots are packed left; unused slots are all zero.
	/// 4. Keys strictly descend within a node.
	/// 5. Every key in a subtree is at least its separator and below the
	///    separator of its larger-key neighbour.
	/// 6. All leaves are at the same depth, and `len` matches the entries.
	/// 7. Reachable nodes never exceed the pool's outstanding blocks.
	pub fn validate(&self) -> Result<()> {
		let Some(root) = self.root else {
			if self.height != 0 || self.len != 0 {
				return Err(violation(format!("empty tree with height {} and len {}", self.height, self.len)));
			}
			return Ok(());
		};
		if self.height == 0 {
			return Err(violation("non-empty tree with height 0".into()));
		}

		let mut entries = 0;
		let mut nodes = 0;
		self.validate_node(root, self.height, None, None, &mut entries, &mut nodes)?;

		if entries != self.len {
			return Err(violation(format!("len {} but {entries} entries reachable", self.len)));
		}
		let outstanding = self.pool.outstanding();
		if nodes > outstanding {
			return Err(violation(format!("{nodes} nodes reachable but only {outstanding} blocks outstanding")));
		}
		Ok(())
	}

	/// Panicking form of [`validate`](Self::validate) for tests.
	pub fn assert_invariants(&self) {
		if let Err(err) = self.validate() {
			panic!("{err}");
		}
	}

	fn validate_node(
		&self,
		node: NodeId,
		height: usize,
		lower: Option<&[usize]>,
		upper: Option<&[usize]>,
		entries: &mut usize,
		nodes: &mut usize,
	) -> Result<()> {
		let geo = &self.geo;
		let block = self.pool.get(node);
		*nodes += 1;

		if block.is_deleted() {
			return Err(violation(format!("{node:?} is reachable but marked deleted")));
		}
		let fill = block.getfill(geo, 0);
		if fill == 0 {
			return Err(violation(format!("{node:?} at height {height} is empty")));
		}
		for i in fill..geo.pairs_per_node {
			if !key::is_zero(block.key(geo, i)) || block.value(geo, i) != 0 {
				return Err(violation(format!("{node:?} slot {i} is past the fill of {fill} but not zero")));
			}
		}

		for i in 0..fill {
			let key = block.key(geo, i);
			if i > 0 && block.key_cmp(geo, i - 1, key) != Ordering::Greater {
				return Err(violation(format!("{node:?} keys not strictly descending at slot {i}")));
			}
			if lower.is_some_and(|lo| key::compare(key, lo) == Ordering::Less) {
				return Err(violation(format!("{node:?} slot {i} is below its separator")));
			}
			if upper.is_some_and(|hi| key::compare(key, hi) != Ordering::Less) {
				return Err(violation(format!("{node:?} slot {i} reaches its neighbour's separator")));
			}
		}

		if height == 1 {
			*entries += fill;
			return Ok(());
		}

		for i in 0..fill {
			let Some(child) = block.child(geo, i) else {
				return Err(violation(format!("{node:?} slot {i} holds no child")));
			};
			let child_upper = if i == 0 {
				upper
			} else {
				Some(block.key(geo, i - 1))
			};
			self.validate_node(child, height - 1, Some(block.key(geo, i)), child_upper, entries, nodes)?;
		}
		Ok(())
	}
}

fn violation(message: String) -> Error {
	Error::InvariantViolation(message)
}

// ===========================================================================
// Tests
// ===========================================================================
