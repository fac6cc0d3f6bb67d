//! Node geometry: how many key/value pairs fit in one block.
//!
//! A block is `node_bytes / size_of::<usize>()` words laid out as
//!
//! ```text
//! [key_0 .. key_{P-1}][value_0 .. value_{P-1}][cache region]
//!  ^ key_length words    ^ one word each        ^ CACHE_REGION_WORDS
//!    per key
//! ```
//!
//! so `P = (node_words - CACHE_REGION_WORDS) / (key_length + 1)`.

use crate::key::Key;
use std::mem::size_of;

/// Default block size in bytes: the larger of a typical L1 line and 128.
pub const DEFAULT_NODE_BYTES: usize = 128;

/// Words reserved at the tail of each block for the cache ring handle, the
/// reference count and the deleted flag.
pub const CACHE_REGION_WORDS: usize = 3;

const WORD_BYTES: usize = size_of::<usize>();

/// Layout parameters for one key width, fixed for the lifetime of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geo {
	/// Words per key.
	pub key_length: usize,
	/// Maximum key/value slots per node.
	pub pairs_per_node: usize,
	/// Offset (in words) where the value array begins.
	pub key_region_words: usize,
}

impl Geo {
	/// Geometry for keys of `key_length` words in blocks of `node_bytes`.
	pub const fn for_node_bytes(key_length: usize, node_bytes: usize) -> Geo {
		let words = node_bytes / WORD_BYTES;
		let usable = words.saturating_sub(CACHE_REGION_WORDS);
		Geo::with_pairs(key_length, usable / (key_length + 1))
	}

	/// Geometry with an explicit slot count.
	pub const fn with_pairs(key_length: usize, pairs_per_node: usize) -> Geo {
		Geo {
			key_length,
			pairs_per_node,
			key_region_words: key_length * pairs_per_node,
		}
	}

	/// Geometry for key type `K` in blocks of `node_bytes`.
	pub const fn for_key<K: Key>(node_bytes: usize) -> Geo {
		Geo::for_node_bytes(K::WORDS, node_bytes)
	}

	/// Words of key and value storage in one node (cache region excluded).
	#[inline]
	pub const fn slot_words(&self) -> usize {
		self.key_region_words + self.pairs_per_node
	}

	/// Total words of one block, cache region included.
	#[inline]
	pub const fn block_words(&self) -> usize {
		self.slot_words() + CACHE_REGION_WORDS
	}

	/// Underflow threshold: a non-root node below this fill is rebalanced.
	#[inline]
	pub const fn min_fill(&self) -> usize {
		self.pairs_per_node / 2
	}
}

/// Native-word keys.
pub const GEO_LONG: Geo = Geo::for_key::<usize>(DEFAULT_NODE_BYTES);
/// 32-bit keys, one word each.
pub const GEO32: Geo = Geo::for_key::<u32>(DEFAULT_NODE_BYTES);
/// 64-bit keys.
pub const GEO64: Geo = Geo::for_key::<u64>(DEFAULT_NODE_BYTES);
/// 128-bit keys as two (or four) words, most significant first.
pub const GEO128: Geo = Geo::for_key::<u128>(DEFAULT_NODE_BYTES);
