//! Ordered traversal.
//!
//! [`Iter`] walks the tree from its largest key downwards using
//! [`CbTree::last`] and [`CbTree::get_prev`]. Each step is a fresh descent,
//! so the iterator holds no node handles and needs no latching; it is the
//! safe way to walk a tree while looking keys up through the cache.

use crate::key::Key;
use crate::value::Value;
use crate::CbTree;

/// Traversal order for [`CbTree::visit`] and [`CbTree::drain_visit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
	/// Largest key first; the natural slot order of every node.
	#[default]
	Descending,
	/// Smallest key first.
	Ascending,
}

impl Order {
	/// Maps the `n`-th visited slot to a slot index in a node of `fill` slots.
	#[inline]
	pub(crate) fn slot(self, n: usize, fill: usize) -> usize {
		match self {
			Order::Descending => n,
			Order::Ascending => fill - 1 - n,
		}
	}
}

enum Cursor<K> {
	Start,
	After(K),
	Done,
}

/// Iterator over `(key, value)` pairs in descending key order.
pub struct Iter<'t, K: Key, V: Value> {
	tree: &'t CbTree<K, V>,
	cursor: Cursor<K>,
}

impl<'t, K: Key, V: Value> Iter<'t, K, V> {
	pub(crate) fn new(tree: &'t CbTree<K, V>) -> Self {
		Iter {
			tree,
			cursor: Cursor::Start,
		}
	}
}

impl<K: Key, V: Value> Iterator for Iter<'_, K, V> {
	type Item = (K, V);

	fn next(&mut self) -> Option<(K, V)> {
		let item = match &self.cursor {
			Cursor::Start => self.tree.last(),
			Cursor::After(key) => self.tree.get_prev(key),
			Cursor::Done => None,
		};
		self.cursor = match item {
			Some((key, _)) => Cursor::After(key),
			None => Cursor::Done,
		};
		item
	}
}
