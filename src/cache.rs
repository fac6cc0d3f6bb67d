//! Per-node child cache.
//!
//! Every internal node carries a ring of [`CACHE_SLOTS`] slots remembering
//! which child the last few searches through it resolved to. A hit skips the
//! linear key scan for that level.
//!
//! # Shared ownership
//!
//! Cache slots alias live nodes. Each node counts the slots pointing at it
//! (`refs`) and carries a `deleted` flag set when the engine unlinks it from
//! its parent. A block goes back to the pool if and only if it is deleted and
//! unreferenced; both conditions are checked wherever either can become true:
//!
//! ```text
//!             unlink (free_node)                last slot dropped
//!  live ──────────────────────────► deleted ───────────────────────► free
//!    │        refs == 0                                                ▲
//!    └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A slot is dropped when it is overwritten by [`cache_store`], when the
//! owning node's arrays change ([`cache_invalidate`]), or when the owning
//! node itself is destroyed ([`cache_teardown`]).

use std::sync::atomic::Ordering;

use crate::key::KeyBuf;
use crate::node::NodeBlock;
use crate::pool::{BlockPool, NodeId};

/// Number of slots in each node's ring.
pub const CACHE_SLOTS: usize = 4;

#[derive(Debug, Clone)]
pub(crate) struct CacheSlot {
	pub(crate) child: NodeId,
	pub(crate) key: KeyBuf,
}

/// Fixed-capacity round-robin memo of `(search key, child)` pairs.
///
/// `probe` is where the next lookup starts scanning and moves one slot on
/// every miss; `next` is the slot the next store overwrites.
#[derive(Debug, Default)]
pub(crate) struct CacheRing {
	slots: [Option<CacheSlot>; CACHE_SLOTS],
	probe: usize,
	next: usize,
}

impl CacheRing {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	fn replace_next(&mut self, slot: CacheSlot) -> Option<CacheSlot> {
		let old = self.slots[self.next].replace(slot);
		self.next = (self.next + 1) % CACHE_SLOTS;
		old
	}

	fn take_all(&mut self) -> impl Iterator<Item = CacheSlot> + '_ {
		self.probe = 0;
		self.next = 0;
		self.slots.iter_mut().filter_map(Option::take)
	}

	#[cfg(test)]
	fn occupied(&self) -> usize {
		self.slots.iter().filter(|s| s.is_some()).count()
	}
}

/// Remembers that searching `parent` for `key` led to `child`.
///
/// The overwritten slot's child loses a reference and is released if that
/// was its last one and it has already been unlinked.
pub(crate) fn cache_store(pool: &BlockPool<NodeBlock>, parent: NodeId, key: &[usize], child: NodeId) {
	let previous = {
		let mut ring = pool.get(parent).ring.lock();
		pool.get(child).refs.fetch_add(1, Ordering::AcqRel);
		ring.replace_next(CacheSlot {
			child,
			key: KeyBuf::from_slice(key),
		})
	};
	if let Some(old) = previous {
		drop_ref(pool, old.child);
	}
}

/// Probes `parent`'s ring for an exact match on `key`.
///
/// Never returns a child that has been unlinked. On a miss the probe start
/// moves one slot forward.
pub(crate) fn cache_lookup(pool: &BlockPool<NodeBlock>, parent: NodeId, key: &[usize]) -> Option<NodeId> {
	let mut ring = pool.get(parent).ring.lock();
	for offset in 0..CACHE_SLOTS {
		let idx = (ring.probe + offset) % CACHE_SLOTS;
		if let Some(slot) = &ring.slots[idx] {
			if slot.key.as_slice() == key && !pool.get(slot.child).is_deleted() {
				return Some(slot.child);
			}
		}
	}
	ring.probe = (ring.probe + 1) % CACHE_SLOTS;
	None
}

/// Drops every slot of `node`'s ring, keeping the ring usable.
///
/// Called whenever entries are added to or redistributed within the node,
/// since a slot may then name a child that no longer covers its key. Removing
/// an entry needs no invalidation: the removed child is marked deleted and
/// [`cache_lookup`] skips it.
pub(crate) fn cache_invalidate(pool: &BlockPool<NodeBlock>, node: NodeId) {
	let dropped = release_slots(pool, node);
	if dropped > 0 {
		tracing::trace!(node = ?node, dropped, "cache invalidated");
	}
}

/// Drops every slot of `node`'s ring because `node` itself is going away.
///
/// Every slot is visited even if releasing an earlier one returned a block
/// to the pool, so no reference is leaked.
pub(crate) fn cache_teardown(pool: &BlockPool<NodeBlock>, node: NodeId) {
	release_slots(pool, node);
}

fn release_slots(pool: &BlockPool<NodeBlock>, node: NodeId) -> usize {
	let slots: Vec<CacheSlot> = pool.get(node).ring.lock().take_all().collect();
	let dropped = slots.len();
	for slot in slots {
		drop_ref(pool, slot.child);
	}
	dropped
}

fn drop_ref(pool: &BlockPool<NodeBlock>, id: NodeId) {
	let block = pool.get(id);
	let previous = block.refs.fetch_sub(1, Ordering::AcqRel);
	debug_assert!(previous > 0, "cache reference count underflow on {id:?}");
	if previous == 1 && block.is_deleted() {
		tracing::trace!(node = ?id, "releasing deferred node");
		pool.release(id);
	}
}

/// Unlinks `id` from the tree: tears down its own ring, marks it deleted and
/// releases it now if no cache slot still points at it.
///
/// Returns `true` if the block went straight back to the pool.
pub(crate) fn free_node(pool: &BlockPool<NodeBlock>, id: NodeId) -> bool {
	cache_teardown(pool, id);
	let block = pool.get(id);
	block.deleted.store(true, Ordering::Release);
	if block.refs.load(Ordering::Acquire) == 0 {
		pool.release(id);
		true
	} else {
		tracing::trace!(node = ?id, refs = block.refs.load(Ordering::Relaxed), "node release deferred");
		false
	}
}
