//! Fixed-size block pool.
//!
//! Nodes live in an arena owned by the pool and are addressed by [`NodeId`]
//! handles rather than addresses. Releasing a block only returns its handle to
//! the free list; the block is zero-filled again when it is next handed out.
//!
//! The pool knows nothing about trees. Release goes through `&self` because
//! cache maintenance during concurrent lookups may drop the last reference to
//! a logically deleted node; the free list is therefore behind a lock, while
//! allocation needs `&mut self` and is only ever done by the single mutator.

use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};

/// A block type the pool can create and recycle.
pub trait Block {
	/// Creates a zero-filled block of `words` words.
	fn zeroed(words: usize) -> Self;

	/// Restores a recycled block to its freshly allocated state.
	fn reset(&mut self);
}

/// Opaque handle to a block in a [`BlockPool`].
///
/// Stored in parent value slots as `index + 1`, so a zero word always means
/// "no child".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(NonZeroU32);

impl NodeId {
	#[inline]
	fn from_index(index: usize) -> Option<NodeId> {
		u32::try_from(index + 1).ok().and_then(NonZeroU32::new).map(NodeId)
	}

	#[inline]
	pub(crate) fn index(self) -> usize {
		self.0.get() as usize - 1
	}

	/// Encodes the handle as a non-zero value word.
	#[inline]
	pub(crate) fn to_word(self) -> usize {
		self.0.get() as usize
	}

	/// Decodes a value word; zero means empty.
	#[inline]
	pub(crate) fn from_word(word: usize) -> Option<NodeId> {
		u32::try_from(word).ok().and_then(NonZeroU32::new).map(NodeId)
	}
}

/// Snapshot of pool accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
	/// Blocks handed out since the pool was created.
	pub allocated: usize,
	/// Blocks returned since the pool was created.
	pub released: usize,
	/// Blocks currently handed out.
	pub outstanding: usize,
	/// Highest `outstanding` ever observed.
	pub peak: usize,
	/// Blocks ever created (live or on the free list).
	pub capacity: usize,
}

/// Arena of equally sized blocks with a free list.
pub struct BlockPool<B> {
	blocks: Vec<B>,
	free: Mutex<Vec<NodeId>>,
	block_words: usize,
	max_blocks: Option<usize>,
	allocated: AtomicUsize,
	released: AtomicUsize,
	peak: AtomicUsize,
}

impl<B: Block> BlockPool<B> {
	/// Creates a pool of `block_words`-word blocks.
	///
	/// `capacity_hint` blocks are reserved up front. With `max_blocks` set,
	/// allocation fails once that many blocks are outstanding.
	pub fn new(block_words: usize, capacity_hint: usize, max_blocks: Option<usize>) -> Self {
		BlockPool {
			blocks: Vec::with_capacity(capacity_hint),
			free: Mutex::new(Vec::new()),
			block_words,
			max_blocks,
			allocated: AtomicUsize::new(0),
			released: AtomicUsize::new(0),
			peak: AtomicUsize::new(0),
		}
	}

	/// Hands out a zero-filled block.
	pub fn allocate(&mut self) -> Result<NodeId> {
		let outstanding = self.outstanding();
		if self.max_blocks.is_some_and(|limit| outstanding >= limit) {
			tracing::warn!(outstanding, "block pool exhausted");
			return Err(Error::OutOfMemory {
				limit: outstanding,
			});
		}

		let id = match self.free.get_mut().pop() {
			Some(id) => {
				self.blocks[id.index()].reset();
				id
			}
			None => {
				let Some(id) = NodeId::from_index(self.blocks.len()) else {
					return Err(Error::OutOfMemory {
						limit: outstanding,
					});
				};
				self.blocks.push(B::zeroed(self.block_words));
				id
			}
		};

		let allocated = self.allocated.fetch_add(1, Ordering::Relaxed) + 1;
		let live = allocated - self.released.load(Ordering::Relaxed);
		self.peak.fetch_max(live, Ordering::Relaxed);
		Ok(id)
	}

	/// Returns a block to the pool.
	///
	/// Releasing the same handle twice is a caller bug; debug builds catch it.
	pub fn release(&self, id: NodeId) {
		let mut free = self.free.lock();
		debug_assert!(!free.contains(&id), "block {id:?} released twice");
		free.push(id);
		self.released.fetch_add(1, Ordering::Relaxed);
	}

	#[inline]
	pub fn get(&self, id: NodeId) -> &B {
		&self.blocks[id.index()]
	}

	#[inline]
	pub fn get_mut(&mut self, id: NodeId) -> &mut B {
		&mut self.blocks[id.index()]
	}

	/// Number of blocks currently handed out.
	pub fn outstanding(&self) -> usize {
		self.allocated.load(Ordering::Relaxed) - self.released.load(Ordering::Relaxed)
	}

	pub fn stats(&self) -> PoolStats {
		let allocated = self.allocated.load(Ordering::Relaxed);
		let released = self.released.load(Ordering::Relaxed);
		PoolStats {
			allocated,
			released,
			outstanding: allocated - released,
			peak: self.peak.load(Ordering::Relaxed),
			capacity: self.blocks.len(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug)]
	struct Words(Vec<usize>);

	impl Block for Words {
		fn zeroed(words: usize) -> Self {
			Words(vec![0; words])
		}

		fn reset(&mut self) {
			self.0.fill(0);
		}
	}

	#[test]
	fn node_id_word_round_trip() {
		let id = NodeId::from_index(41).unwrap();
		assert_eq!(id.to_word(), 42);
		assert_eq!(NodeId::from_word(42), Some(id));
		assert_eq!(NodeId::from_word(0), None);
	}

	#[test]
	fn recycled_blocks_are_zeroed() {
		let mut pool: BlockPool<Words> = BlockPool::new(4, 0, None);
		let a = pool.allocate().unwrap();
		pool.get_mut(a).0[2] = 99;
		pool.release(a);

		let b = pool.allocate().unwrap();
		assert_eq!(a, b);
		assert_eq!(pool.get(b).0, vec![0; 4]);
		assert_eq!(pool.stats().capacity, 1);
	}

	#[test]
	fn limit_reports_out_of_memory() {
		let mut pool: BlockPool<Words> = BlockPool::new(4, 2, Some(2));
		let a = pool.allocate().unwrap();
		let _b = pool.allocate().unwrap();
		assert_eq!(
			pool.allocate(),
			Err(Error::OutOfMemory {
				limit: 2
			})
		);

		pool.release(a);
		assert!(pool.allocate().is_ok());
	}

	#[test]
	fn stats_track_outstanding_and_peak() {
		let mut pool: BlockPool<Words> = BlockPool::new(2, 0, None);
		let ids: Vec<_> = (0..5).map(|_| pool.allocate().unwrap()).collect();
		for id in &ids[..3] {
			pool.release(*id);
		}

		let stats = pool.stats();
		assert_eq!(stats.allocated, 5);
		assert_eq!(stats.released, 3);
		assert_eq!(stats.outstanding, 2);
		assert_eq!(stats.peak, 5);
	}
}
