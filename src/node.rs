//! Node layout.
//!
//! A node is one pool block. Its word array holds `pairs_per_node` keys
//! followed by `pairs_per_node` values:
//!
//! ```text
//! words: [k0 .. kP-1][v0 .. vP-1]
//!         ^ key_length words each
//! header: refs | deleted | ring        (the cache region)
//! ```
//!
//! Used slots are packed to the left and sorted by descending key; unused
//! slots are all zero. A slot is empty iff its value word is zero, which is
//! why every scan can stop at the first zero value. At internal levels a value
//! is a child [`NodeId`] word, at the leaf level it is the caller's value.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};

use crate::cache::CacheRing;
use crate::geo::{Geo, CACHE_REGION_WORDS};
use crate::key;
use crate::pool::{Block, NodeId};

pub(crate) struct NodeBlock {
	words: Box<[usize]>,
	/// Live cache slots, anywhere in the tree, that point at this node.
	pub(crate) refs: AtomicU32,
	/// Set once the node has been unlinked from its parent.
	pub(crate) deleted: AtomicBool,
	/// Memo of recently resolved children. Only used on internal nodes.
	pub(crate) ring: Mutex<CacheRing>,
}

impl Block for NodeBlock {
	fn zeroed(words: usize) -> Self {
		NodeBlock {
			words: vec![0; words.saturating_sub(CACHE_REGION_WORDS)].into_boxed_slice(),
			refs: AtomicU32::new(0),
			deleted: AtomicBool::new(false),
			ring: Mutex::new(CacheRing::new()),
		}
	}

	fn reset(&mut self) {
		debug_assert_eq!(*self.refs.get_mut(), 0, "recycled node still referenced");
		self.words.fill(0);
		*self.refs.get_mut() = 0;
		*self.deleted.get_mut() = false;
		*self.ring.get_mut() = CacheRing::new();
	}
}

impl NodeBlock {
	#[inline]
	pub(crate) fn key(&self, geo: &Geo, n: usize) -> &[usize] {
		let start = n * geo.key_length;
		&self.words[start..start + geo.key_length]
	}

	#[inline]
	pub(crate) fn value(&self, geo: &Geo, n: usize) -> usize {
		self.words[geo.key_region_words + n]
	}

	#[inline]
	pub(crate) fn child(&self, geo: &Geo, n: usize) -> Option<NodeId> {
		NodeId::from_word(self.value(geo, n))
	}

	#[inline]
	pub(crate) fn set_key(&mut self, geo: &Geo, n: usize, key: &[usize]) {
		let start = n * geo.key_length;
		self.words[start..start + geo.key_length].copy_from_slice(key);
	}

	#[inline]
	pub(crate) fn set_value(&mut self, geo: &Geo, n: usize, value: usize) {
		self.words[geo.key_region_words + n] = value;
	}

	#[inline]
	pub(crate) fn set_pair(&mut self, geo: &Geo, n: usize, key: &[usize], value: usize) {
		self.set_key(geo, n, key);
		self.set_value(geo, n, value);
	}

	/// Copies slot `from` over slot `to` within this node.
	#[inline]
	pub(crate) fn copy_pair(&mut self, geo: &Geo, from: usize, to: usize) {
		let len = geo.key_length;
		self.words.copy_within(from * len..(from + 1) * len, to * len);
		self.words[geo.key_region_words + to] = self.words[geo.key_region_words + from];
	}

	#[inline]
	pub(crate) fn clear_pair(&mut self, geo: &Geo, n: usize) {
		let start = n * geo.key_length;
		self.words[start..start + geo.key_length].fill(0);
		self.words[geo.key_region_words + n] = 0;
	}

	#[inline]
	pub(crate) fn key_cmp(&self, geo: &Geo, n: usize, key: &[usize]) -> Ordering {
		key::compare(self.key(geo, n), key)
	}

	/// Index of the first slot whose key is `<= key`, or `pairs_per_node`.
	///
	/// Empty slots hold the zero key, so on a partially filled node this never
	/// exceeds the fill count.
	pub(crate) fn getpos(&self, geo: &Geo, key: &[usize]) -> usize {
		(0..geo.pairs_per_node)
			.find(|&i| self.key_cmp(geo, i, key) != Ordering::Greater)
			.unwrap_or(geo.pairs_per_node)
	}

	/// Index of the first empty slot at or after `start`.
	pub(crate) fn getfill(&self, geo: &Geo, start: usize) -> usize {
		(start..geo.pairs_per_node).find(|&i| self.value(geo, i) == 0).unwrap_or(geo.pairs_per_node)
	}

	#[inline]
	pub(crate) fn is_deleted(&self) -> bool {
		self.deleted.load(AtomicOrdering::Acquire)
	}
}
