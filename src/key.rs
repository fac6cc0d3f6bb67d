//! Fixed-width integer keys stored as machine words.
//!
//! Every key occupies `K::WORDS` consecutive native words inside a node,
//! most significant word first, so that comparing two keys is a plain
//! lexicographic comparison of their word slices. A 128-bit key on a 64-bit
//! target is therefore `[high, low]`.

use smallvec::{smallvec, SmallVec};
use std::cmp::Ordering;
use std::fmt;

/// Largest key width supported, in native words.
pub const MAX_KEY_WORDS: usize = (u128::BITS / usize::BITS) as usize;

/// Owned copy of a key in word form.
pub type KeyBuf = SmallVec<[usize; MAX_KEY_WORDS]>;

/// A fixed-width unsigned integer usable as a tree key.
///
/// Implemented for `usize`, `u32`, `u64` and `u128`, which correspond to the
/// native-word, 32-bit, 64-bit and 128-bit tree variants.
pub trait Key: Copy + Ord + fmt::Debug + Send + Sync + 'static {
	/// Number of native words one key occupies.
	const WORDS: usize;

	/// Writes the key into `out[..Self::WORDS]`, most significant word first.
	fn write_words(self, out: &mut [usize]);

	/// Reads a key back from `words[..Self::WORDS]`.
	fn read_words(words: &[usize]) -> Self;

	/// Returns the key as an owned word buffer.
	fn to_words(self) -> KeyBuf {
		let mut buf: KeyBuf = smallvec![0; Self::WORDS];
		self.write_words(&mut buf);
		buf
	}
}

const fn words_for(bits: u32) -> usize {
	bits.div_ceil(usize::BITS) as usize
}

macro_rules! impl_key {
	($($ty:ty),*) => {
		$(
			impl Key for $ty {
				const WORDS: usize = words_for(<$ty>::BITS);

				#[inline]
				fn write_words(self, out: &mut [usize]) {
					let wide = self as u128;
					for (i, word) in out[..Self::WORDS].iter_mut().enumerate() {
						let shift = usize::BITS * (Self::WORDS - 1 - i) as u32;
						*word = (wide >> shift) as usize;
					}
				}

				#[inline]
				fn read_words(words: &[usize]) -> Self {
					let mut wide: u128 = 0;
					for &word in &words[..Self::WORDS] {
						wide = (wide << usize::BITS) | word as u128;
					}
					wide as $ty
				}
			}
		)*
	};
}

impl_key!(usize, u32, u64, u128);

/// Compares two keys in word form, most significant word first.
#[inline]
pub(crate) fn compare(a: &[usize], b: &[usize]) -> Ordering {
	debug_assert_eq!(a.len(), b.len());
	for (x, y) in a.iter().zip(b) {
		match x.cmp(y) {
			Ordering::Equal => continue,
			other => return other,
		}
	}
	Ordering::Equal
}

/// Decrements a key in word form by one, borrowing across words.
///
/// Wraps around on zero; callers check [`is_zero`] first.
#[inline]
pub(crate) fn dec_key(key: &mut [usize]) {
	for word in key.iter_mut().rev() {
		let old = *word;
		*word = old.wrapping_sub(1);
		if old != 0 {
			break;
		}
	}
}

#[inline]
pub(crate) fn is_zero(key: &[usize]) -> bool {
	key.iter().all(|&w| w == 0)
}
