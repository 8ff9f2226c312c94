//! Const-generic ring with inline storage.

use std::fmt;
use std::mem::MaybeUninit;

use super::{Ring, next_index};

/// A ring buffer holding at most `N` elements.
///
/// Slots live inline; nothing is allocated after construction and the
/// capacity never changes. `N` may be any non-zero value (enforced at compile
/// time).
///
/// # Example
///
/// ```
/// use relay_queue::ring::{FixedRing, Ring};
///
/// let mut ring = FixedRing::<&str, 2>::new();
/// ring.push("a").unwrap();
/// ring.push("b").unwrap();
/// assert_eq!(ring.push("c"), Err("c"));
///
/// assert_eq!(ring.pop(), Some("a"));
/// ring.push("c").unwrap();
/// assert_eq!(ring.pop(), Some("b"));
/// assert_eq!(ring.pop(), Some("c"));
/// ```
///
/// A zero capacity fails to compile:
///
/// ```compile_fail
/// use relay_queue::ring::FixedRing;
/// let ring = FixedRing::<u64, 0>::new();
/// ```
pub struct FixedRing<T, const N: usize> {
    slots: [MaybeUninit<T>; N],
    head: usize,
    tail: usize,
    count: usize,
}

impl<T, const N: usize> FixedRing<T, N> {
    const NON_ZERO: () = assert!(N > 0, "FixedRing capacity must be non-zero");

    /// Creates an empty ring.
    pub const fn new() -> Self {
        let () = Self::NON_ZERO;
        Self {
            slots: [const { MaybeUninit::uninit() }; N],
            head: 0,
            tail: 0,
            count: 0,
        }
    }
}

impl<T, const N: usize> Ring<T> for FixedRing<T, N> {
    #[inline]
    fn push(&mut self, value: T) -> Result<(), T> {
        if self.count == N {
            return Err(value);
        }
        self.slots[self.tail].write(value);
        self.tail = next_index(self.tail, N);
        self.count += 1;
        Ok(())
    }

    #[inline]
    fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        // Safety: slots in [head, head + count) are initialized.
        let value = unsafe { self.slots[self.head].assume_init_read() };
        self.head = next_index(self.head, N);
        self.count -= 1;
        Some(value)
    }

    #[inline]
    fn len(&self) -> usize {
        self.count
    }

    #[inline]
    fn capacity(&self) -> usize {
        N
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.count == N
    }
}

impl<T, const N: usize> Default for FixedRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for FixedRing<T, N> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

impl<T, const N: usize> fmt::Debug for FixedRing<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedRing")
            .field("capacity", &N)
            .field("len", &self.count)
            .finish_non_exhaustive()
    }
}
