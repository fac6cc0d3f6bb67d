//! Tree configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::{Geo, DEFAULT_NODE_BYTES};
use crate::key::Key;

/// Construction-time settings for a [`crate::CbTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
	/// Size of one pool block in bytes.
	pub node_bytes: usize,
	/// Overrides the slot count derived from `node_bytes`.
	pub pairs_per_node: Option<usize>,
	/// Blocks reserved in the pool up front.
	pub pool_capacity_hint: usize,
	/// Hard cap on outstanding blocks; allocation past it fails with
	/// [`Error::OutOfMemory`].
	pub max_blocks: Option<usize>,
	/// Whether internal nodes memoize resolved children.
	pub cache_enabled: bool,
}

impl Default for TreeConfig {
	fn default() -> Self {
		Self {
			node_bytes: DEFAULT_NODE_BYTES,
			pairs_per_node: None,
			pool_capacity_hint: 0,
			max_blocks: None,
			cache_enabled: true,
		}
	}
}

impl TreeConfig {
	pub fn with_node_bytes(mut self, node_bytes: usize) -> Self {
		self.node_bytes = node_bytes;
		self
	}

	pub fn with_pairs_per_node(mut self, pairs: usize) -> Self {
		self.pairs_per_node = Some(pairs);
		self
	}

	pub fn with_pool_capacity_hint(mut self, blocks: usize) -> Self {
		self.pool_capacity_hint = blocks;
		self
	}

	pub fn with_max_blocks(mut self, blocks: usize) -> Self {
		self.max_blocks = Some(blocks);
		self
	}

	pub fn with_cache(mut self, enabled: bool) -> Self {
		self.cache_enabled = enabled;
		self
	}

	/// Resolves the geometry for key type `K`.
	///
	/// Fails if fewer than two pairs would fit, since such a node can never be
	/// split.
	pub fn geometry<K: Key>(&self) -> Result<Geo> {
		let geo = match self.pairs_per_node {
			Some(pairs) => Geo::with_pairs(K::WORDS, pairs),
			None => Geo::for_key::<K>(self.node_bytes),
		};
		if geo.pairs_per_node < 2 {
			return Err(Error::InvariantViolation(format!(
				"geometry {geo:?} holds fewer than two pairs per node"
			)));
		}
		Ok(geo)
	}
}
