//! Multi-producer multi-consumer (MPMC) queue.
//!
//! One mutex guards the ring together with the live handle counts; two
//! condition variables park producers waiting for space and consumers
//! waiting for data. The ring can be any [`Ring`] implementation, so the
//! same engine serves fixed and flexible storage. A flexible ring resizes
//! under the lock, so no reader ever observes a half-moved buffer.
//!
//! Waiters are woken in whatever order the OS chooses; there is no fairness
//! guarantee between producers or between consumers.
//!
//! # Example
//!
//! ```
//! use relay_queue::mpmc;
//! use std::thread;
//!
//! let (tx, rx) = mpmc::fixed::<u64, 64>();
//!
//! let producers: Vec<_> = (0..4)
//!     .map(|p| {
//!         let tx = tx.clone();
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 tx.push(p * 1000 + i).unwrap();
//!             }
//!         })
//!     })
//!     .collect();
//! drop(tx);
//!
//! let mut received = Vec::new();
//! while let Ok(v) = rx.pop() {
//!     received.push(v);
//! }
//! for p in producers {
//!     p.join().unwrap();
//! }
//! assert_eq!(received.len(), 400);
//! ```
//!
//! # Poisoning
//!
//! Ring operations never panic half-way through a mutation, so a poisoned
//! lock still guards a consistent ring and is simply reclaimed.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use crate::config::FlexibleConfig;
use crate::error::{ConfigError, PopError, PushError};
use crate::ring::{FixedRing, FlexibleRing, Ring};
use crate::trace::trace;

/// Sender over inline fixed storage.
pub type FixedSender<T, const N: usize> = Sender<T, FixedRing<T, N>>;
/// Receiver over inline fixed storage.
pub type FixedReceiver<T, const N: usize> = Receiver<T, FixedRing<T, N>>;
/// Sender over growable storage.
pub type FlexibleSender<T> = Sender<T, FlexibleRing<T>>;
/// Receiver over growable storage.
pub type FlexibleReceiver<T> = Receiver<T, FlexibleRing<T>>;

/// Creates an MPMC queue over `ring`.
pub fn channel<T, R: Ring<T>>(ring: R) -> (Sender<T, R>, Receiver<T, R>) {
    let queue = Arc::new(LockQueue {
        state: Mutex::new(State {
            ring,
            senders: 1,
            receivers: 1,
        }),
        data_available: Condvar::new(),
        space_available: Condvar::new(),
        _marker: PhantomData,
    });

    (
        Sender {
            queue: Arc::clone(&queue),
        },
        Receiver { queue },
    )
}

/// Creates an MPMC queue holding at most `N` elements.
pub fn fixed<T, const N: usize>() -> (FixedSender<T, N>, FixedReceiver<T, N>) {
    channel(FixedRing::new())
}

/// Creates an MPMC queue with flexible capacity.
///
/// # Errors
///
/// Returns the [`ConfigError`] reported by [`FlexibleConfig::validate`].
pub fn flexible<T>(
    config: FlexibleConfig,
) -> Result<(FlexibleSender<T>, FlexibleReceiver<T>), ConfigError> {
    Ok(channel(FlexibleRing::with_config(config)?))
}

struct State<R> {
    ring: R,
    senders: usize,
    receivers: usize,
}

/// Ring, handle counts and the two wait queues.
struct LockQueue<T, R> {
    state: Mutex<State<R>>,
    data_available: Condvar,
    space_available: Condvar,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T, R: Ring<T>> LockQueue<T, R> {
    #[inline]
    fn lock(&self) -> MutexGuard<'_, State<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn try_lock(&self) -> Option<MutexGuard<'_, State<R>>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn push(&self, value: T, deadline: Option<Instant>) -> Result<(), PushError<T>> {
        let mut value = value;
        let mut state = self.lock();

        loop {
            if state.receivers == 0 {
                return Err(PushError::Closed(value));
            }

            match state.ring.push(value) {
                Ok(()) => {
                    drop(state);
                    self.data_available.notify_one();
                    return Ok(());
                }
                Err(rejected) => value = rejected,
            }

            state = match deadline {
                None => self
                    .space_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(PushError::Timeout(value));
                    }
                    self.space_available
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        let Some(mut state) = self.try_lock() else {
            return Err(PushError::WouldBlock(value));
        };
        if state.receivers == 0 {
            return Err(PushError::Closed(value));
        }

        match state.ring.push(value) {
            Ok(()) => {
                drop(state);
                self.data_available.notify_one();
                Ok(())
            }
            Err(value) => Err(PushError::Full(value)),
        }
    }

    fn pop(&self, deadline: Option<Instant>) -> Result<T, PopError> {
        let mut state = self.lock();

        loop {
            if let Some(value) = state.ring.pop() {
                drop(state);
                self.space_available.notify_one();
                return Ok(value);
            }

            if state.senders == 0 {
                return Err(PopError::Closed);
            }

            state = match deadline {
                None => self
                    .data_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(PopError::Timeout);
                    }
                    self.data_available
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn try_pop(&self) -> Result<T, PopError> {
        let Some(mut state) = self.try_lock() else {
            return Err(PopError::WouldBlock);
        };

        match state.ring.pop() {
            Some(value) => {
                drop(state);
                self.space_available.notify_one();
                Ok(value)
            }
            None if state.senders == 0 => Err(PopError::Closed),
            None => Err(PopError::Empty),
        }
    }
}

/// `Instant::now() + timeout`, or `None` (wait forever) if that overflows.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// The producing side of an MPMC queue.
///
/// Cloning registers another producer. The queue closes for input once
/// every clone has been dropped.
pub struct Sender<T, R: Ring<T>> {
    queue: Arc<LockQueue<T, R>>,
}

impl<T, R: Ring<T>> Sender<T, R> {
    /// Pushes a value, waiting for space while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if every receiver has been dropped.
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        self.queue.push(value, None)
    }

    /// Pushes a value without waiting.
    ///
    /// # Errors
    ///
    /// - [`PushError::WouldBlock`] if another handle holds the lock
    /// - [`PushError::Full`] if the ring cannot take another element
    /// - [`PushError::Closed`] if every receiver has been dropped
    pub fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        self.queue.try_push(value)
    }

    /// Pushes a value, waiting at most `timeout` for space.
    ///
    /// # Errors
    ///
    /// - [`PushError::Timeout`] if no space appeared in time
    /// - [`PushError::Closed`] if every receiver has been dropped
    pub fn push_timeout(&self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        self.queue.push(value, deadline_after(timeout))
    }

    /// Returns `true` if every receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.queue.lock().receivers == 0
    }

    /// Current ring capacity.
    pub fn capacity(&self) -> usize {
        self.queue.lock().ring.capacity()
    }

    /// Number of queued elements (snapshot).
    pub fn len(&self) -> usize {
        self.queue.lock().ring.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, R: Ring<T>> Clone for Sender<T, R> {
    fn clone(&self) -> Self {
        self.queue.lock().senders += 1;
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T, R: Ring<T>> Drop for Sender<T, R> {
    fn drop(&mut self) {
        let mut state = self.queue.lock();
        state.senders -= 1;
        if state.senders == 0 {
            trace!(pending = state.ring.len(), "last mpmc sender disconnected");
            drop(state);
            self.queue.data_available.notify_all();
        }
    }
}

impl<T, R: Ring<T>> fmt::Debug for Sender<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.queue.lock();
        f.debug_struct("Sender")
            .field("capacity", &state.ring.capacity())
            .field("len", &state.ring.len())
            .field("senders", &state.senders)
            .field("receivers", &state.receivers)
            .finish_non_exhaustive()
    }
}

/// The consuming side of an MPMC queue.
///
/// Cloning registers another consumer. Producers see the queue as closed
/// once every clone has been dropped.
pub struct Receiver<T, R: Ring<T>> {
    queue: Arc<LockQueue<T, R>>,
}

impl<T, R: Ring<T>> Receiver<T, R> {
    /// Pops the oldest value, waiting while the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`PopError::Closed`] once the queue is empty and every sender
    /// has been dropped.
    pub fn pop(&self) -> Result<T, PopError> {
        self.queue.pop(None)
    }

    /// Pops the oldest value without waiting.
    ///
    /// # Errors
    ///
    /// - [`PopError::WouldBlock`] if another handle holds the lock
    /// - [`PopError::Empty`] if nothing is queued
    /// - [`PopError::Closed`] if nothing is queued and every sender has been
    ///   dropped
    pub fn try_pop(&self) -> Result<T, PopError> {
        self.queue.try_pop()
    }

    /// Pops the oldest value, waiting at most `timeout` for one to arrive.
    ///
    /// # Errors
    ///
    /// - [`PopError::Timeout`] if nothing arrived in time
    /// - [`PopError::Closed`] once the queue is empty and every sender has
    ///   been dropped
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        self.queue.pop(deadline_after(timeout))
    }

    /// Returns `true` if every sender has been dropped.
    ///
    /// Queued values can still be popped.
    pub fn is_closed(&self) -> bool {
        self.queue.lock().senders == 0
    }

    /// Current ring capacity.
    pub fn capacity(&self) -> usize {
        self.queue.lock().ring.capacity()
    }

    /// Number of queued elements (snapshot).
    pub fn len(&self) -> usize {
        self.queue.lock().ring.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, R: Ring<T>> Clone for Receiver<T, R> {
    fn clone(&self) -> Self {
        self.queue.lock().receivers += 1;
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T, R: Ring<T>> Drop for Receiver<T, R> {
    fn drop(&mut self) {
        let mut state = self.queue.lock();
        state.receivers -= 1;
        if state.receivers == 0 {
            trace!(pending = state.ring.len(), "last mpmc receiver disconnected");
            drop(state);
            self.queue.space_available.notify_all();
        }
    }
}

impl<T, R: Ring<T>> fmt::Debug for Receiver<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.queue.lock();
        f.debug_struct("Receiver")
            .field("capacity", &state.ring.capacity())
            .field("len", &state.ring.len())
            .field("senders", &state.senders)
            .field("receivers", &state.receivers)
            .finish_non_exhaustive()
    }
}
