//! Opaque pointer-sized values.
//!
//! Leaf slots store values as raw words and use zero to mark an empty slot,
//! so only types with no zero representation can be stored.

use std::num::NonZeroUsize;
use std::ptr::NonNull;

/// A pointer-sized value that is never zero.
pub trait Value: Copy {
	fn into_word(self) -> NonZeroUsize;
	fn from_word(word: NonZeroUsize) -> Self;
}

impl Value for NonZeroUsize {
	#[inline]
	fn into_word(self) -> NonZeroUsize {
		self
	}

	#[inline]
	fn from_word(word: NonZeroUsize) -> Self {
		word
	}
}

/// Pointers are stored by address; the tree never dereferences them.
impl<T> Value for NonNull<T> {
	#[inline]
	fn into_word(self) -> NonZeroUsize {
		// SAFETY: a NonNull pointer has a non-zero address
		unsafe { NonZeroUsize::new_unchecked(self.as_ptr() as usize) }
	}

	#[inline]
	fn from_word(word: NonZeroUsize) -> Self {
		// SAFETY: the word is non-zero, so the pointer is non-null
		unsafe { NonNull::new_unchecked(word.get() as *mut T) }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pointer_round_trip() {
		let mut slot = 17u64;
		let ptr = NonNull::from(&mut slot);
		let back: NonNull<u64> = Value::from_word(ptr.into_word());
		assert_eq!(back, ptr);
		// SAFETY: `slot` is still alive and uniquely borrowed here
		assert_eq!(unsafe { *back.as_ptr() }, 17);
	}
}
