//! Blocking SPSC handles with an adaptive wait strategy.
//!
//! [`Sender`] and [`Receiver`] wrap the lock-free producer/consumer pair of
//! [`relay_queue::spsc`] and add blocking `push`/`pop` plus timeout
//! variants. A waiting side escalates in three phases:
//!
//! ```text
//! Phase 1: Fast path
//! ├── Try the operation immediately
//! └── Succeeds when the queue is neither full (push) nor empty (pop)
//!
//! Phase 2: Backoff
//! ├── crossbeam's Backoff::snooze(), `snooze_iters` times
//! └── Catches a peer that is about to make progress
//!
//! Phase 3: Park
//! ├── Raise our parked flag, retry once, then park the thread
//! └── The peer unparks us only if it sees the flag set
//! ```
//!
//! The parked flags are cache-padded and accessed with `SeqCst`. The queue
//! indices are only Release/Acquire, so each side puts a `SeqCst` fence
//! between its own store and its load of the other side's location:
//!
//! ```text
//! Receiver:                        Sender:
//! ─────────────────────            ─────────────────────
//! store(receiver_parked, true)
//! [SeqCst barrier]                 push(data)
//! pop() -> empty                   [SeqCst barrier]
//! park()                           load(receiver_parked) -> true
//!                                  unpark()
//! ```
//!
//! Either the receiver's retry sees the data or the sender sees the flag, so
//! a wakeup is never lost and an unpark is only issued to a sleeping peer.
//!
//! Dropping a handle closes the queue first and then unparks the peer, so a
//! peer woken by the drop always observes the close.
//!
//! # Example
//!
//! ```
//! use relay_channel::spsc::{self, ChannelConfig};
//! use std::thread;
//!
//! let (mut tx, mut rx) = spsc::fixed::<u64, 100>(ChannelConfig::default());
//!
//! let handle = thread::spawn(move || {
//!     for i in 0..10_000 {
//!         tx.push(i).unwrap();
//!     }
//! });
//!
//! for i in 0..10_000 {
//!     assert_eq!(rx.pop().unwrap(), i);
//! }
//! assert!(rx.pop().is_err());
//! handle.join().unwrap();
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering, fence};
use std::time::{Duration, Instant};

use crossbeam_utils::sync::{Parker, Unparker};
use crossbeam_utils::{Backoff, CachePadded};
use relay_queue::spsc::{fixed as raw_fixed, flexible as raw_flexible};
use relay_queue::{ConfigError, FlexibleConfig, PopError, PushError};

use crate::trace::trace;
use crate::{Pop, Push};

/// Default number of backoff snooze iterations before parking.
///
/// Each snooze uses `crossbeam_utils::Backoff::snooze()` which starts with
/// spinning and eventually yields to the OS scheduler.
pub const DEFAULT_SNOOZE_ITERS: usize = 8;

/// Tuning for the blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Backoff iterations before a waiting side parks. Higher values burn
    /// more CPU but avoid park/unpark syscalls on bursty workloads.
    pub snooze_iters: usize,
}

impl ChannelConfig {
    /// Default tuning ([`DEFAULT_SNOOZE_ITERS`]).
    pub const fn new() -> Self {
        Self {
            snooze_iters: DEFAULT_SNOOZE_ITERS,
        }
    }

    /// Sets the number of snooze iterations before parking.
    #[must_use]
    pub const fn with_snooze_iters(mut self, snooze_iters: usize) -> Self {
        self.snooze_iters = snooze_iters;
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking producer half that a [`Sender`] can wrap.
pub trait RawProducer<T> {
    /// Pushes without waiting. Only `Full` and `Closed` are expected.
    ///
    /// # Errors
    ///
    /// Returns the value inside a [`PushError`] if it was not enqueued.
    fn try_push(&mut self, value: T) -> Result<(), PushError<T>>;
    /// Returns `true` if the consumer is gone.
    fn is_closed(&self) -> bool;
    /// Current capacity.
    fn capacity(&self) -> usize;
    /// Number of queued elements (snapshot).
    fn len(&self) -> usize;
}

/// Non-blocking consumer half that a [`Receiver`] can wrap.
pub trait RawConsumer<T> {
    /// Pops without waiting. Only `Empty` and `Closed` are expected.
    ///
    /// # Errors
    ///
    /// Returns a [`PopError`] if no value was available.
    fn try_pop(&mut self) -> Result<T, PopError>;
    /// Returns `true` if the producer is gone.
    fn is_closed(&self) -> bool;
    /// Current capacity.
    fn capacity(&self) -> usize;
    /// Number of queued elements (snapshot).
    fn len(&self) -> usize;
}

impl<T, const N: usize> RawProducer<T> for raw_fixed::Producer<T, N> {
    #[inline]
    fn try_push(&mut self, value: T) -> Result<(), PushError<T>> {
        raw_fixed::Producer::push(self, value)
    }

    #[inline]
    fn is_closed(&self) -> bool {
        raw_fixed::Producer::is_closed(self)
    }

    fn capacity(&self) -> usize {
        N
    }

    fn len(&self) -> usize {
        raw_fixed::Producer::len(self)
    }
}

impl<T, const N: usize> RawConsumer<T> for raw_fixed::Consumer<T, N> {
    #[inline]
    fn try_pop(&mut self) -> Result<T, PopError> {
        raw_fixed::Consumer::pop(self)
    }

    #[inline]
    fn is_closed(&self) -> bool {
        raw_fixed::Consumer::is_closed(self)
    }

    fn capacity(&self) -> usize {
        N
    }

    fn len(&self) -> usize {
        raw_fixed::Consumer::len(self)
    }
}

impl<T> RawProducer<T> for raw_flexible::Producer<T> {
    #[inline]
    fn try_push(&mut self, value: T) -> Result<(), PushError<T>> {
        raw_flexible::Producer::push(self, value)
    }

    #[inline]
    fn is_closed(&self) -> bool {
        raw_flexible::Producer::is_closed(self)
    }

    fn capacity(&self) -> usize {
        raw_flexible::Producer::capacity(self)
    }

    fn len(&self) -> usize {
        raw_flexible::Producer::len(self)
    }
}

impl<T> RawConsumer<T> for raw_flexible::Consumer<T> {
    #[inline]
    fn try_pop(&mut self) -> Result<T, PopError> {
        raw_flexible::Consumer::pop(self)
    }

    #[inline]
    fn is_closed(&self) -> bool {
        raw_flexible::Consumer::is_closed(self)
    }

    fn capacity(&self) -> usize {
        raw_flexible::Consumer::capacity(self)
    }

    fn len(&self) -> usize {
        raw_flexible::Consumer::len(self)
    }
}

/// Blocking sender over const-generic storage.
pub type FixedSender<T, const N: usize> = Sender<T, raw_fixed::Producer<T, N>>;
/// Blocking receiver over const-generic storage.
pub type FixedReceiver<T, const N: usize> = Receiver<T, raw_fixed::Consumer<T, N>>;
/// Blocking sender over segmented flexible storage.
pub type FlexibleSender<T> = Sender<T, raw_flexible::Producer<T>>;
/// Blocking receiver over segmented flexible storage.
pub type FlexibleReceiver<T> = Receiver<T, raw_flexible::Consumer<T>>;

/// Creates a blocking SPSC queue holding at most `N` elements.
pub fn fixed<T, const N: usize>(
    config: ChannelConfig,
) -> (FixedSender<T, N>, FixedReceiver<T, N>) {
    let (producer, consumer) = raw_fixed::ring_buffer::<T, N>();
    from_parts(producer, consumer, config)
}

/// Creates a blocking SPSC queue with flexible capacity.
///
/// # Errors
///
/// Returns the [`ConfigError`] reported by [`FlexibleConfig::validate`].
pub fn flexible<T>(
    queue: FlexibleConfig,
    config: ChannelConfig,
) -> Result<(FlexibleSender<T>, FlexibleReceiver<T>), ConfigError> {
    let (producer, consumer) = raw_flexible::with_config(queue)?;
    Ok(from_parts(producer, consumer, config))
}

/// Wraps an existing non-blocking pair.
///
/// `producer` and `consumer` must be the two halves of the same queue.
pub fn from_parts<T, P, C>(
    producer: P,
    consumer: C,
    config: ChannelConfig,
) -> (Sender<T, P>, Receiver<T, C>)
where
    P: RawProducer<T>,
    C: RawConsumer<T>,
{
    let shared = Arc::new(Shared {
        sender_parked: CachePadded::new(AtomicBool::new(false)),
        receiver_parked: CachePadded::new(AtomicBool::new(false)),
    });

    let sender_parker = Parker::new();
    let sender_unparker = sender_parker.unparker().clone();

    let receiver_parker = Parker::new();
    let receiver_unparker = receiver_parker.unparker().clone();

    (
        Sender {
            producer: ManuallyDrop::new(producer),
            shared: Arc::clone(&shared),
            parker: sender_parker,
            receiver_unparker,
            snooze_iters: config.snooze_iters,
            _marker: PhantomData,
        },
        Receiver {
            consumer: ManuallyDrop::new(consumer),
            shared,
            parker: receiver_parker,
            sender_unparker,
            snooze_iters: config.snooze_iters,
            _marker: PhantomData,
        },
    )
}

/// Parking flags, one cache line each.
struct Shared {
    sender_parked: CachePadded<AtomicBool>,
    receiver_parked: CachePadded<AtomicBool>,
}

#[inline]
fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// Parks until unparked, or until `deadline` if there is one.
#[inline]
fn park(parker: &Parker, deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => parker.park_deadline(deadline),
        None => parker.park(),
    }
}

/// The sending half of a blocking SPSC queue.
///
/// Takes `&mut self` everywhere and is neither `Clone` nor `Sync`.
pub struct Sender<T, P: RawProducer<T>> {
    producer: ManuallyDrop<P>,
    shared: Arc<Shared>,
    parker: Parker,
    receiver_unparker: Unparker,
    snooze_iters: usize,
    _marker: PhantomData<fn(T)>,
}

impl<T, P: RawProducer<T>> Sender<T, P> {
    /// Pushes a value, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the receiver has been dropped.
    pub fn push(&mut self, value: T) -> Result<(), PushError<T>> {
        self.push_until(value, None)
    }

    /// Pushes a value without blocking.
    ///
    /// # Errors
    ///
    /// - [`PushError::Full`] if the queue cannot take another element
    /// - [`PushError::Closed`] if the receiver has been dropped
    pub fn try_push(&mut self, value: T) -> Result<(), PushError<T>> {
        self.attempt(value)
    }

    /// Pushes a value, blocking at most `timeout` for space.
    ///
    /// # Errors
    ///
    /// - [`PushError::Timeout`] if no space appeared in time
    /// - [`PushError::Closed`] if the receiver has been dropped
    pub fn push_timeout(&mut self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        self.push_until(value, Instant::now().checked_add(timeout))
    }

    fn push_until(&mut self, value: T, deadline: Option<Instant>) -> Result<(), PushError<T>> {
        // Fast path
        let mut value = match self.attempt(value) {
            Err(PushError::Full(v)) => v,
            other => return other,
        };

        // Backoff phase
        let backoff = Backoff::new();
        for _ in 0..self.snooze_iters {
            if expired(deadline) {
                return Err(PushError::Timeout(value));
            }
            backoff.snooze();

            value = match self.attempt(value) {
                Err(PushError::Full(v)) => v,
                other => return other,
            };
        }

        // Park phase
        loop {
            self.shared.sender_parked.store(true, Ordering::SeqCst);
            // Orders the flag store before the index loads in the retry.
            fence(Ordering::SeqCst);

            // Retry after signaling - prevents missed wakeup race
            value = match self.attempt(value) {
                Err(PushError::Full(v)) => v,
                other => {
                    self.shared.sender_parked.store(false, Ordering::Relaxed);
                    return other;
                }
            };

            if expired(deadline) {
                self.shared.sender_parked.store(false, Ordering::Relaxed);
                return Err(PushError::Timeout(value));
            }

            park(&self.parker, deadline);
            self.shared.sender_parked.store(false, Ordering::Relaxed);

            value = match self.attempt(value) {
                Err(PushError::Full(v)) => v,
                other => return other,
            };
        }
    }

    #[inline]
    fn attempt(&mut self, value: T) -> Result<(), PushError<T>> {
        self.producer.try_push(value)?;
        // Orders the published tail before the parked-flag load.
        fence(Ordering::SeqCst);
        self.notify_receiver();
        Ok(())
    }

    /// Wakes the receiver if it's parked.
    ///
    /// Only issues the unpark syscall when the receiver has actually gone to
    /// sleep. If the receiver is spinning or processing, this is just an
    /// atomic load.
    #[inline]
    fn notify_receiver(&self) {
        if self.shared.receiver_parked.load(Ordering::SeqCst) {
            self.receiver_unparker.unpark();
        }
    }

    /// Returns `true` if the receiver has been dropped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.producer.is_closed()
    }

    /// Current capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.producer.capacity()
    }

    /// Number of queued elements (snapshot).
    #[inline]
    pub fn len(&self) -> usize {
        self.producer.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, P: RawProducer<T>> Push<T> for Sender<T, P> {
    fn push(&mut self, value: T) -> Result<(), PushError<T>> {
        Self::push(self, value)
    }

    fn try_push(&mut self, value: T) -> Result<(), PushError<T>> {
        Self::try_push(self, value)
    }

    fn push_timeout(&mut self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        Self::push_timeout(self, value, timeout)
    }

    fn is_closed(&self) -> bool {
        Self::is_closed(self)
    }

    fn capacity(&self) -> usize {
        Self::capacity(self)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }
}

impl<T, P: RawProducer<T>> Drop for Sender<T, P> {
    fn drop(&mut self) {
        // Close the queue before waking the receiver, so the wakeup always
        // observes the close instead of parking again.
        // Safety: `producer` is never touched again.
        unsafe { ManuallyDrop::drop(&mut self.producer) };
        self.receiver_unparker.unpark();
        trace!("spsc sender dropped");
    }
}

impl<T, P: RawProducer<T>> fmt::Debug for Sender<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// The receiving half of a blocking SPSC queue.
///
/// Takes `&mut self` everywhere and is neither `Clone` nor `Sync`.
pub struct Receiver<T, C: RawConsumer<T>> {
    consumer: ManuallyDrop<C>,
    shared: Arc<Shared>,
    parker: Parker,
    sender_unparker: Unparker,
    snooze_iters: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C: RawConsumer<T>> Receiver<T, C> {
    /// Pops the oldest value, blocking while the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`PopError::Closed`] once the sender has been dropped and the
    /// queue is drained.
    pub fn pop(&mut self) -> Result<T, PopError> {
        self.pop_until(None)
    }

    /// Pops the oldest value without blocking.
    ///
    /// # Errors
    ///
    /// - [`PopError::Empty`] if nothing is queued
    /// - [`PopError::Closed`] if the sender has been dropped and the queue is
    ///   drained
    pub fn try_pop(&mut self) -> Result<T, PopError> {
        self.attempt()
    }

    /// Pops the oldest value, blocking at most `timeout`.
    ///
    /// # Errors
    ///
    /// - [`PopError::Timeout`] if nothing arrived in time
    /// - [`PopError::Closed`] once the sender has been dropped and the queue
    ///   is drained
    pub fn pop_timeout(&mut self, timeout: Duration) -> Result<T, PopError> {
        self.pop_until(Instant::now().checked_add(timeout))
    }

    fn pop_until(&mut self, deadline: Option<Instant>) -> Result<T, PopError> {
        // Fast path
        match self.attempt() {
            Err(PopError::Empty) => {}
            other => return other,
        }

        // Backoff phase
        let backoff = Backoff::new();
        for _ in 0..self.snooze_iters {
            if expired(deadline) {
                return Err(PopError::Timeout);
            }
            backoff.snooze();

            match self.attempt() {
                Err(PopError::Empty) => {}
                other => return other,
            }
        }

        // Park phase
        loop {
            self.shared.receiver_parked.store(true, Ordering::SeqCst);
            // Orders the flag store before the index loads in the retry.
            fence(Ordering::SeqCst);

            // Retry after signaling - prevents missed wakeup race
            match self.attempt() {
                Err(PopError::Empty) => {}
                other => {
                    self.shared.receiver_parked.store(false, Ordering::Relaxed);
                    return other;
                }
            }

            if expired(deadline) {
                self.shared.receiver_parked.store(false, Ordering::Relaxed);
                return Err(PopError::Timeout);
            }

            park(&self.parker, deadline);
            self.shared.receiver_parked.store(false, Ordering::Relaxed);

            match self.attempt() {
                Err(PopError::Empty) => {}
                other => return other,
            }
        }
    }

    #[inline]
    fn attempt(&mut self) -> Result<T, PopError> {
        let value = self.consumer.try_pop()?;
        fence(Ordering::SeqCst);
        self.notify_sender();
        Ok(value)
    }

    /// Wakes the sender if it's parked.
    #[inline]
    fn notify_sender(&self) {
        if self.shared.sender_parked.load(Ordering::SeqCst) {
            self.sender_unparker.unpark();
        }
    }

    /// Returns `true` if the sender has been dropped.
    ///
    /// Even if closed, there may still be values left to pop.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.consumer.is_closed()
    }

    /// Current capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.consumer.capacity()
    }

    /// Number of queued elements (snapshot).
    #[inline]
    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, C: RawConsumer<T>> Pop<T> for Receiver<T, C> {
    fn pop(&mut self) -> Result<T, PopError> {
        Self::pop(self)
    }

    fn try_pop(&mut self) -> Result<T, PopError> {
        Self::try_pop(self)
    }

    fn pop_timeout(&mut self, timeout: Duration) -> Result<T, PopError> {
        Self::pop_timeout(self, timeout)
    }

    fn is_closed(&self) -> bool {
        Self::is_closed(self)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }
}

impl<T, C: RawConsumer<T>> Drop for Receiver<T, C> {
    fn drop(&mut self) {
        // Safety: `consumer` is never touched again.
        unsafe { ManuallyDrop::drop(&mut self.consumer) };
        self.sender_unparker.unpark();
        trace!("spsc receiver dropped");
    }
}

impl<T, C: RawConsumer<T>> fmt::Debug for Receiver<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn channel<T, const N: usize>() -> (FixedSender<T, N>, FixedReceiver<T, N>) {
        fixed(ChannelConfig::default())
    }

    // ============================================================================
    // Basic Operations
    // ============================================================================

    #[test]
    fn basic_push_pop() {
        let (mut tx, mut rx) = channel::<u64, 4>();

        tx.push(1).unwrap();
        tx.push(2).unwrap();
        tx.push(3).unwrap();

        assert_eq!(rx.pop(), Ok(1));
        assert_eq!(rx.pop(), Ok(2));
        assert_eq!(rx.pop(), Ok(3));
    }

    #[test]
    fn try_push_try_pop() {
        let (mut tx, mut rx) = channel::<u64, 2>();

        assert!(tx.try_push(1).is_ok());
        assert!(tx.try_push(2).is_ok());
        assert_eq!(tx.try_push(3), Err(PushError::Full(3)));

        assert_eq!(rx.try_pop(), Ok(1));
        assert_eq!(rx.try_pop(), Ok(2));
        assert_eq!(rx.try_pop(), Err(PopError::Empty));
    }

    #[test]
    fn flexible_blocking_push_grows() {
        let (mut tx, mut rx) =
            flexible::<u64>(FlexibleConfig::new(2), ChannelConfig::default()).unwrap();

        for i in 0..64 {
            tx.push(i).unwrap();
        }
        assert!(tx.capacity() >= 64);
        for i in 0..64 {
            assert_eq!(rx.pop(), Ok(i));
        }
    }

    // ============================================================================
    // Disconnection
    // ============================================================================

    #[test]
    fn pop_drains_before_closed() {
        let (mut tx, mut rx) = channel::<u64, 4>();

        tx.push(1).unwrap();
        tx.push(2).unwrap();
        drop(tx);

        assert!(rx.is_closed());
        assert_eq!(rx.pop(), Ok(1));
        assert_eq!(rx.pop(), Ok(2));
        assert_eq!(rx.pop(), Err(PopError::Closed));
    }

    #[test]
    fn push_returns_closed_when_receiver_dropped() {
        let (mut tx, rx) = channel::<u64, 4>();

        assert!(!tx.is_closed());
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.push(1), Err(PushError::Closed(1)));
        assert_eq!(tx.try_push(2), Err(PushError::Closed(2)));
    }

    // ============================================================================
    // Blocking Behavior
    // ============================================================================

    #[test]
    fn pop_blocks_until_push() {
        let (mut tx, mut rx) = channel::<u64, 4>();

        let start = Instant::now();
        let handle = thread::spawn(move || rx.pop().unwrap());

        thread::sleep(Duration::from_millis(50));
        tx.push(42).unwrap();

        assert_eq!(handle.join().unwrap(), 42);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn push_blocks_until_pop() {
        let (mut tx, mut rx) = channel::<u64, 2>();

        tx.try_push(1).unwrap();
        tx.try_push(2).unwrap();

        let start = Instant::now();
        let handle = thread::spawn(move || {
            tx.push(3).unwrap();
            tx
        });

        thread::sleep(Duration::from_millis(50));
        assert_eq!(rx.pop(), Ok(1));

        let _tx = handle.join().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(rx.pop(), Ok(2));
        assert_eq!(rx.pop(), Ok(3));
    }

    // ============================================================================
    // Timeouts
    // ============================================================================

    #[test]
    fn pop_timeout_on_idle_queue() {
        let (_tx, mut rx) = channel::<u64, 4>();

        let start = Instant::now();
        assert_eq!(
            rx.pop_timeout(Duration::from_millis(50)),
            Err(PopError::Timeout)
        );
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn push_timeout_on_full_queue() {
        let (mut tx, _rx) = channel::<u64, 1>();

        tx.push(1).unwrap();
        let start = Instant::now();
        assert_eq!(
            tx.push_timeout(2, Duration::from_millis(20)),
            Err(PushError::Timeout(2))
        );
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn pop_timeout_returns_value_that_arrives_in_time() {
        let (mut tx, mut rx) = channel::<u64, 4>();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            tx.push(7).unwrap();
            tx
        });

        assert_eq!(rx.pop_timeout(Duration::from_secs(5)), Ok(7));
        drop(handle.join().unwrap());
    }

    // ============================================================================
    // Wake on Disconnect
    // ============================================================================

    #[test]
    fn pop_wakes_on_sender_drop() {
        let (tx, mut rx) = channel::<u64, 4>();

        let handle = thread::spawn(move || rx.pop());

        thread::sleep(Duration::from_millis(50));
        drop(tx);

        assert_eq!(handle.join().unwrap(), Err(PopError::Closed));
    }

    #[test]
    fn push_wakes_on_receiver_drop() {
        let (mut tx, rx) = channel::<u64, 1>();
        tx.push(1).unwrap();

        let handle = thread::spawn(move || tx.push(2));

        thread::sleep(Duration::from_millis(50));
        drop(rx);

        assert_eq!(handle.join().unwrap(), Err(PushError::Closed(2)));
    }

    // ============================================================================
    // Stress Tests
    // ============================================================================

    #[test]
    fn stress_capacity_100() {
        const COUNT: u64 = 1_000_000;
        let (mut tx, mut rx) = channel::<u64, 100>();

        let handle = thread::spawn(move || {
            for i in 0..COUNT {
                tx.push(i).unwrap();
            }
        });

        for i in 0..COUNT {
            assert_eq!(rx.pop(), Ok(i));
        }
        handle.join().unwrap();
        assert_eq!(rx.pop(), Err(PopError::Closed));
        assert!(rx.is_empty());
    }

    #[test]
    fn stress_flexible_small_start() {
        const COUNT: u64 = 200_000;
        let config = FlexibleConfig::new(1)
            .with_shrink_interval(256)
            .with_shrink_patience(1);
        let (mut tx, mut rx) = flexible::<u64>(config, ChannelConfig::default()).unwrap();

        let handle = thread::spawn(move || {
            for i in 0..COUNT {
                tx.push(i).unwrap();
            }
        });

        for i in 0..COUNT {
            assert_eq!(rx.pop(), Ok(i));
        }
        handle.join().unwrap();
    }

    // ============================================================================
    // Ping-Pong (exercises park/unpark heavily)
    // ============================================================================

    #[test]
    fn ping_pong_capacity_one() {
        let (mut tx1, mut rx1) = channel::<u64, 1>();
        let (mut tx2, mut rx2) = channel::<u64, 1>();

        let handle = thread::spawn(move || {
            for _ in 0..5000 {
                let val = rx1.pop().unwrap();
                tx2.push(val + 1).unwrap();
            }
        });

        for i in 0..5000 {
            tx1.push(i).unwrap();
            assert_eq!(rx2.pop(), Ok(i + 1));
        }

        handle.join().unwrap();
    }

    #[test]
    fn ping_pong_with_varying_delays() {
        let config = ChannelConfig::new().with_snooze_iters(0);
        let (mut tx1, mut rx1) = fixed::<u64, 1>(config);
        let (mut tx2, mut rx2) = fixed::<u64, 1>(config);

        let handle = thread::spawn(move || {
            for i in 0..100 {
                let val = rx1.pop().unwrap();
                // Occasional delay to force the other side to park
                if i % 20 == 0 {
                    thread::sleep(Duration::from_micros(100));
                }
                tx2.push(val).unwrap();
            }
        });

        for i in 0..100 {
            if i % 17 == 0 {
                thread::sleep(Duration::from_micros(100));
            }
            tx1.push(i).unwrap();
            assert_eq!(rx2.pop(), Ok(i));
        }

        handle.join().unwrap();
    }

    #[test]
    fn ping_pong_parks_every_round() {
        // No snoozing: every wait goes straight to the park handshake.
        const ROUNDS: u64 = 20_000;
        let config = ChannelConfig::new().with_snooze_iters(0);
        let (mut tx1, mut rx1) = fixed::<u64, 1>(config);
        let (mut tx2, mut rx2) = fixed::<u64, 1>(config);

        let handle = thread::spawn(move || {
            for _ in 0..ROUNDS {
                let val = rx1.pop().unwrap();
                tx2.push(val * 2).unwrap();
            }
        });

        for i in 0..ROUNDS {
            tx1.push(i).unwrap();
            assert_eq!(rx2.pop(), Ok(i * 2));
        }

        handle.join().unwrap();
    }

    // ============================================================================
    // Drop Behavior
    // ============================================================================

    #[test]
    fn values_dropped_with_queue() {
        use std::sync::atomic::AtomicUsize;

        let drop_count = Arc::new(AtomicUsize::new(0));

        #[derive(Debug)]
        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (mut tx, rx) = channel::<DropCounter, 8>();
        for _ in 0..5 {
            tx.push(DropCounter(Arc::clone(&drop_count))).unwrap();
        }

        drop(tx);
        drop(rx);
        assert_eq!(drop_count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn failed_push_returns_value() {
        let (mut tx, rx) = channel::<String, 1>();
        drop(rx);

        let err = tx.push("hello".to_string()).unwrap_err();
        assert!(err.is_closed());
        assert_eq!(err.into_inner(), "hello");
    }

    #[test]
    fn zero_sized_type() {
        let (mut tx, mut rx) = channel::<(), 4>();

        for _ in 0..100 {
            tx.push(()).unwrap();
            assert_eq!(rx.pop(), Ok(()));
        }
    }
}
