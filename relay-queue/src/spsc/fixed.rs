//! Const-generic SPSC ring buffer.
//!
//! Capacity is a compile-time constant and the slots live inline in the
//! shared allocation. `N` does not have to be a power of two: the indices
//! run over `0..2N`, so a full queue (`tail - head == N`) and an empty one
//! (`tail == head`) stay distinguishable without a separate counter.
//!
//! # Example
//!
//! ```
//! use relay_queue::spsc::fixed;
//! use relay_queue::{PopError, PushError};
//!
//! let (mut tx, mut rx) = fixed::ring_buffer::<&str, 2>();
//!
//! tx.push("a").unwrap();
//! tx.push("b").unwrap();
//! assert_eq!(tx.push("c"), Err(PushError::Full("c")));
//!
//! assert_eq!(rx.pop(), Ok("a"));
//! tx.push("c").unwrap();
//! assert_eq!(rx.pop(), Ok("b"));
//! assert_eq!(rx.pop(), Ok("c"));
//! assert_eq!(rx.pop(), Err(PopError::Empty));
//! ```
//!
//! # Compile-Time Enforcement
//!
//! A zero capacity fails to compile:
//! ```compile_fail
//! use relay_queue::spsc::fixed;
//! let (tx, rx) = fixed::ring_buffer::<u64, 0>();
//! ```

use std::cell::{Cell, UnsafeCell};
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::error::{PopError, PushError};
use crate::trace::trace;

/// Creates a queue holding at most `N` elements.
///
/// Returns the `(Producer, Consumer)` pair.
pub fn ring_buffer<T, const N: usize>() -> (Producer<T, N>, Consumer<T, N>) {
    let () = Shared::<T, N>::NON_ZERO;

    let shared = Arc::new(Shared {
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
        producer_closed: AtomicBool::new(false),
        consumer_closed: AtomicBool::new(false),
        slots: [const { UnsafeCell::new(MaybeUninit::uninit()) }; N],
    });

    (
        Producer {
            shared: Arc::clone(&shared),
            tail: Cell::new(0),
            cached_head: Cell::new(0),
        },
        Consumer {
            shared,
            head: Cell::new(0),
            cached_tail: Cell::new(0),
        },
    )
}

#[repr(C)]
struct Shared<T, const N: usize> {
    /// Consumer's read position, in `0..2N`.
    head: CachePadded<AtomicUsize>,
    /// Producer's write position, in `0..2N`.
    tail: CachePadded<AtomicUsize>,
    producer_closed: AtomicBool,
    consumer_closed: AtomicBool,
    slots: [UnsafeCell<MaybeUninit<T>>; N],
}

impl<T, const N: usize> Shared<T, N> {
    const NON_ZERO: () = assert!(N > 0, "queue capacity must be non-zero");

    /// Index space is twice the capacity.
    const LAP: usize = 2 * N;

    #[inline(always)]
    const fn advance(index: usize) -> usize {
        if index + 1 == Self::LAP { 0 } else { index + 1 }
    }

    /// Number of elements between `head` and `tail`.
    #[inline(always)]
    const fn distance(tail: usize, head: usize) -> usize {
        if tail >= head {
            tail - head
        } else {
            tail + Self::LAP - head
        }
    }

    #[inline(always)]
    fn slot(&self, index: usize) -> *mut MaybeUninit<T> {
        let slot = if index < N { index } else { index - N };
        self.slots[slot].get()
    }
}

impl<T, const N: usize> Drop for Shared<T, N> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();

        let mut index = head;
        while index != tail {
            // Safety: every index in [head, tail) holds an initialized value
            // and both handles are gone.
            unsafe { (*self.slot(index)).assume_init_drop() };
            index = Self::advance(index);
        }
    }
}

// Safety: slot access is partitioned between the single producer and the
// single consumer by the head/tail protocol.
unsafe impl<T: Send, const N: usize> Send for Shared<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for Shared<T, N> {}

/// The producing half of a fixed SPSC queue.
pub struct Producer<T, const N: usize> {
    shared: Arc<Shared<T, N>>,
    /// Our write position.
    tail: Cell<usize>,
    /// Last observed consumer position.
    cached_head: Cell<usize>,
}

impl<T, const N: usize> Producer<T, N> {
    /// Pushes a value.
    ///
    /// # Errors
    ///
    /// - [`PushError::Full`] if `N` elements are queued
    /// - [`PushError::Closed`] if the consumer has been dropped
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), PushError<T>> {
        let shared = &*self.shared;
        if shared.consumer_closed.load(Ordering::Relaxed) {
            return Err(PushError::Closed(value));
        }

        let tail = self.tail.get();

        // Fast path: cached head says there is room.
        if Shared::<T, N>::distance(tail, self.cached_head.get()) < N {
            self.write(tail, value);
            return Ok(());
        }

        self.push_slow(tail, value)
    }

    #[cold]
    fn push_slow(&mut self, tail: usize, value: T) -> Result<(), PushError<T>> {
        let head = self.shared.head.load(Ordering::Acquire);
        self.cached_head.set(head);

        if Shared::<T, N>::distance(tail, head) < N {
            self.write(tail, value);
            return Ok(());
        }

        Err(PushError::Full(value))
    }

    #[inline(always)]
    fn write(&self, tail: usize, value: T) {
        let next = Shared::<T, N>::advance(tail);
        // Safety: the slot is outside [head, tail), so the consumer will not
        // touch it until the Release store below publishes it.
        unsafe { (*self.shared.slot(tail)).write(value) };
        self.shared.tail.store(next, Ordering::Release);
        self.tail.set(next);
    }

    /// Returns the capacity (compile-time constant).
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Returns current length (snapshot, may be stale).
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.shared.head.load(Ordering::Acquire);
        Shared::<T, N>::distance(self.tail.get(), head)
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the consumer has been dropped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.consumer_closed.load(Ordering::Acquire)
    }
}

impl<T, const N: usize> Drop for Producer<T, N> {
    fn drop(&mut self) {
        self.shared.producer_closed.store(true, Ordering::Release);
        trace!(capacity = N, "fixed spsc producer disconnected");
    }
}

impl<T, const N: usize> fmt::Debug for Producer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &N)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// The consuming half of a fixed SPSC queue.
pub struct Consumer<T, const N: usize> {
    shared: Arc<Shared<T, N>>,
    /// Our read position.
    head: Cell<usize>,
    /// Last observed producer position.
    cached_tail: Cell<usize>,
}

impl<T, const N: usize> Consumer<T, N> {
    /// Pops the oldest value.
    ///
    /// # Errors
    ///
    /// - [`PopError::Empty`] if nothing is queued
    /// - [`PopError::Closed`] if nothing is queued and the producer has been
    ///   dropped
    #[inline]
    pub fn pop(&mut self) -> Result<T, PopError> {
        let head = self.head.get();

        // Fast path: cached tail says there is data.
        if head != self.cached_tail.get() {
            return Ok(self.read(head));
        }

        self.pop_slow(head)
    }

    #[cold]
    fn pop_slow(&mut self, head: usize) -> Result<T, PopError> {
        let shared = &*self.shared;
        let tail = shared.tail.load(Ordering::Acquire);
        self.cached_tail.set(tail);

        if head != tail {
            return Ok(self.read(head));
        }

        if shared.producer_closed.load(Ordering::Acquire) {
            // The producer may have published right before closing.
            let tail = shared.tail.load(Ordering::Acquire);
            self.cached_tail.set(tail);
            if head != tail {
                return Ok(self.read(head));
            }
            return Err(PopError::Closed);
        }

        Err(PopError::Empty)
    }

    #[inline(always)]
    fn read(&self, head: usize) -> T {
        // Safety: head != tail, so the slot was published by the producer's
        // Release store and is not written again until we advance head.
        let value = unsafe { (*self.shared.slot(head)).assume_init_read() };
        let next = Shared::<T, N>::advance(head);
        self.shared.head.store(next, Ordering::Release);
        self.head.set(next);
        value
    }

    /// Returns the capacity (compile-time constant).
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Returns current length (snapshot, may be stale).
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.shared.tail.load(Ordering::Acquire);
        Shared::<T, N>::distance(tail, self.head.get())
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the producer has been dropped.
    ///
    /// Values pushed before the drop can still be popped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.producer_closed.load(Ordering::Acquire)
    }
}

impl<T, const N: usize> Drop for Consumer<T, N> {
    fn drop(&mut self) {
        self.shared.consumer_closed.store(true, Ordering::Release);
        trace!(capacity = N, "fixed spsc consumer disconnected");
    }
}

impl<T, const N: usize> fmt::Debug for Consumer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &N)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    // ============================================================================
    // Basic Operations
    // ============================================================================

    #[test]
    fn basic_push_pop() {
        let (mut tx, mut rx) = ring_buffer::<u64, 8>();

        tx.push(1).unwrap();
        tx.push(2).unwrap();
        tx.push(3).unwrap();

        assert_eq!(rx.pop(), Ok(1));
        assert_eq!(rx.pop(), Ok(2));
        assert_eq!(rx.pop(), Ok(3));
        assert_eq!(rx.pop(), Err(PopError::Empty));
    }

    #[test]
    fn full_buffer() {
        let (mut tx, mut rx) = ring_buffer::<u64, 4>();

        for i in 0..4 {
            tx.push(i).unwrap();
        }
        assert_eq!(tx.len(), 4);
        assert_eq!(tx.push(5), Err(PushError::Full(5)));

        assert_eq!(rx.pop(), Ok(0));
        tx.push(5).unwrap();
    }

    #[test]
    fn wraparound_non_power_of_two() {
        let (mut tx, mut rx) = ring_buffer::<u64, 3>();

        for lap in 0..100u64 {
            for i in 0..3 {
                tx.push(lap * 3 + i).unwrap();
            }
            assert_eq!(rx.len(), 3);
            for i in 0..3 {
                assert_eq!(rx.pop(), Ok(lap * 3 + i));
            }
        }
    }

    #[test]
    fn len_across_index_wrap() {
        let (mut tx, mut rx) = ring_buffer::<u64, 5>();

        for i in 0..23u64 {
            tx.push(i).unwrap();
            if i % 2 == 1 {
                rx.pop().unwrap();
            }
            assert!(tx.len() <= 5);
            assert_eq!(tx.len(), rx.len());
        }
    }

    // ============================================================================
    // Disconnection
    // ============================================================================

    #[test]
    fn producer_drop_drains_then_closes() {
        let (mut tx, mut rx) = ring_buffer::<u64, 4>();

        tx.push(1).unwrap();
        tx.push(2).unwrap();
        drop(tx);

        assert!(rx.is_closed());
        assert_eq!(rx.pop(), Ok(1));
        assert_eq!(rx.pop(), Ok(2));
        assert_eq!(rx.pop(), Err(PopError::Closed));
    }

    #[test]
    fn consumer_drop_rejects_push() {
        let (mut tx, rx) = ring_buffer::<u64, 4>();

        assert!(!tx.is_closed());
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.push(1), Err(PushError::Closed(1)));
    }

    // ============================================================================
    // Cross Thread
    // ============================================================================

    #[test]
    fn cross_thread_capacity_100() {
        const COUNT: u64 = 1_000_000;
        let (mut tx, mut rx) = ring_buffer::<u64, 100>();

        let h = thread::spawn(move || {
            for i in 0..COUNT {
                let mut value = i;
                while let Err(err) = tx.push(value) {
                    value = err.into_inner();
                    std::hint::spin_loop();
                }
            }
        });

        let mut expected = 0u64;
        while expected < COUNT {
            match rx.pop() {
                Ok(v) => {
                    assert_eq!(v, expected);
                    expected += 1;
                }
                Err(PopError::Empty) => std::hint::spin_loop(),
                Err(PopError::Closed) => break,
                Err(err) => panic!("unexpected {err}"),
            }
        }

        h.join().unwrap();
        assert_eq!(expected, COUNT);
        assert_eq!(rx.pop(), Err(PopError::Closed));
    }

    // ============================================================================
    // Drop Behavior
    // ============================================================================

    #[test]
    fn drop_remaining() {
        use std::sync::atomic::AtomicUsize;

        let drop_count = Arc::new(AtomicUsize::new(0));

        #[derive(Debug)]
        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (mut tx, mut rx) = ring_buffer::<DropCounter, 3>();

        // Wrap the indices before leaving values behind.
        for _ in 0..5 {
            tx.push(DropCounter(Arc::clone(&drop_count))).unwrap();
            drop(rx.pop().unwrap());
        }
        tx.push(DropCounter(Arc::clone(&drop_count))).unwrap();
        tx.push(DropCounter(Arc::clone(&drop_count))).unwrap();
        assert_eq!(drop_count.load(Ordering::SeqCst), 5);

        drop(tx);
        drop(rx);

        assert_eq!(drop_count.load(Ordering::SeqCst), 7);
    }
}
