//! # Error Types for the Cached B+ Tree
//!
//! This module defines the error taxonomy shared by every tree operation.
//!
//! ## Error Handling Strategy
//!
//! All operations run to completion or fail fast. Nothing blocks, nothing is
//! retried internally, and failures propagate synchronously to the caller:
//!
//! ```text
//! insert(key, value)
//!      │
//!      ▼
//! duplicate key? ───────────► Err(DuplicateKey)     tree unchanged
//!      │
//!      ▼
//! leaf full → split ────────► Err(OutOfMemory)      new sibling released,
//!      │                                            key not inserted
//!      ▼
//! Ok(())
//! ```
//!
//! `NotFound` is an expected outcome rather than a failure. `InvariantViolation`
//! means the structure can no longer be trusted and should be treated as a
//! defect by the caller.

use thiserror::Error;

/// Errors returned by tree operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
	/// The block pool could not supply another node.
	///
	/// Raised from insert, split and grow. The operation that hit it has no
	/// effect on the key being inserted; any block allocated along the way is
	/// returned to the pool.
	#[error("block pool exhausted ({limit} blocks in use)")]
	OutOfMemory {
		/// Number of blocks outstanding when the allocation failed.
		limit: usize,
	},

	/// The key being inserted is already present.
	///
	/// The tree is left exactly as it was before the call.
	#[error("key already present in tree")]
	DuplicateKey,

	/// The key targeted by an update is absent.
	#[error("key not found")]
	NotFound,

	/// A structural invariant was found broken.
	///
	/// Returned by [`crate::CbTree::validate`], by [`crate::CbTree::merge`]
	/// when both trees hold the same key, and when a configuration cannot
	/// produce a usable geometry.
	#[error("invariant violated: {0}")]
	InvariantViolation(String),
}

/// A Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_messages() {
		assert_eq!(
			Error::OutOfMemory {
				limit: 8
			}
			.to_string(),
			"block pool exhausted (8 blocks in use)"
		);
		assert_eq!(Error::DuplicateKey.to_string(), "key already present in tree");
		assert_eq!(
			Error::InvariantViolation("height mismatch".into()).to_string(),
			"invariant violated: height mismatch"
		);
	}
}
