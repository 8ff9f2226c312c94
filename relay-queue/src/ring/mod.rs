//! Circular storage strategies.
//!
//! These rings are plain single-threaded data structures: `head`, `tail` and
//! `count` are ordinary integers. Engines that share a ring across threads
//! (see [`mpmc`](crate::mpmc)) guard it with a lock.
//!
//! - [`FixedRing`] - capacity is a const generic, slots are inline, never reallocates
//! - [`FlexibleRing`] - capacity grows when full and shrinks when underused

mod fixed;
mod flexible;

use std::alloc::{Layout, handle_alloc_error};

pub use fixed::FixedRing;
pub use flexible::FlexibleRing;

use crate::trace::error;

/// FIFO slot storage with a current capacity.
pub trait Ring<T> {
    /// Appends `value` at the tail.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` if the ring is full and cannot grow.
    fn push(&mut self, value: T) -> Result<(), T>;

    /// Removes the value at the head, if any.
    fn pop(&mut self) -> Option<T>;

    /// Number of occupied slots.
    fn len(&self) -> usize;

    /// Number of allocated slots.
    fn capacity(&self) -> usize;

    /// Returns `true` if no slot is occupied.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if a push would be rejected.
    fn is_full(&self) -> bool;
}

/// Advances a slot index by one, wrapping at `capacity`.
#[inline(always)]
pub(crate) const fn next_index(index: usize, capacity: usize) -> usize {
    if index + 1 == capacity { 0 } else { index + 1 }
}

/// Allocates `capacity` slots initialized by `init`.
///
/// Allocation failure is not recoverable: it is reported and then handed to
/// [`handle_alloc_error`], which aborts.
pub(crate) fn allocate_slots<S>(capacity: usize, init: impl FnMut() -> S) -> Box<[S]> {
    let mut slots = Vec::new();
    if slots.try_reserve_exact(capacity).is_err() {
        error!(capacity, "failed to allocate ring storage");
        match Layout::array::<S>(capacity) {
            Ok(layout) => handle_alloc_error(layout),
            Err(_) => panic!("ring capacity overflow: {capacity} slots"),
        }
    }
    slots.resize_with(capacity, init);
    slots.into_boxed_slice()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::MaybeUninit;

    #[test]
    fn next_index_wraps() {
        assert_eq!(next_index(0, 3), 1);
        assert_eq!(next_index(1, 3), 2);
        assert_eq!(next_index(2, 3), 0);
        assert_eq!(next_index(0, 1), 0);
    }

    #[test]
    fn allocate_exact_len() {
        let slots = allocate_slots::<MaybeUninit<u64>>(17, MaybeUninit::uninit);
        assert_eq!(slots.len(), 17);
    }
}
