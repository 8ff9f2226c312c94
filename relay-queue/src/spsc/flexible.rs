//! SPSC queue with producer-driven resizing.
//!
//! Storage is a singly linked chain of ring segments. The producer always
//! writes into the newest segment; the consumer always reads from the oldest.
//! Positions (`head`, `tail`) are global sequence numbers, and each segment
//! records `base`, the sequence number of the first element written into it.
//!
//! ```text
//!   consumer                                   producer
//!      │                                          │
//!      ▼                                          ▼
//!  ┌────────────┐  next  ┌────────────────────────────┐
//!  │ base = 0   │ ─────► │ base = 64                  │
//!  │ cap  = 64  │        │ cap  = 128                 │
//!  └────────────┘        └────────────────────────────┘
//!   drained, then freed    all writes from seq 64 on
//! ```
//!
//! Resizing never moves elements. When its segment is full the producer
//! allocates a larger one (`growth_factor`), and when occupancy has stayed
//! below `low_water_fraction` for `shrink_patience` windows of
//! `shrink_interval` pushes it allocates a smaller one. Either way the new
//! segment starts at the current `tail` and is linked with a Release store
//! before anything is written into it. Once linked, the old segment is never
//! written again. The consumer drains it, follows the link when `head`
//! reaches the next segment's `base`, and frees it.
//!
//! # Example
//!
//! ```
//! use relay_queue::spsc::flexible;
//!
//! let (mut tx, mut rx) = flexible::ring_buffer::<u64>(4);
//!
//! // No consumer activity: the producer grows instead of failing.
//! for i in 0..8 {
//!     tx.push(i).unwrap();
//! }
//! assert!(tx.capacity() >= 8);
//!
//! for i in 0..8 {
//!     assert_eq!(rx.pop(), Ok(i));
//! }
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::config::{FlexibleConfig, ShrinkMonitor};
use crate::error::{ConfigError, PopError, PushError};
use crate::ring::{allocate_slots, next_index};
use crate::trace::{debug, trace};

/// Creates a flexible queue starting at `capacity` slots with the default
/// resize policy.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn ring_buffer<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity > 0, "capacity must be non-zero");
    build(FlexibleConfig::new(capacity))
}

/// Creates a flexible queue sized and tuned by `config`.
///
/// # Errors
///
/// Returns the [`ConfigError`] reported by [`FlexibleConfig::validate`].
pub fn with_config<T>(config: FlexibleConfig) -> Result<(Producer<T>, Consumer<T>), ConfigError> {
    config.validate()?;
    Ok(build(config))
}

fn build<T>(config: FlexibleConfig) -> (Producer<T>, Consumer<T>) {
    let max_capacity = config.max_slots::<T>();
    let capacity = config.initial_capacity.min(max_capacity);
    let first = Segment::<T>::allocate(0, capacity);

    let shared = Arc::new(Shared {
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
        front: AtomicPtr::new(first.as_ptr()),
        capacity: AtomicUsize::new(capacity),
        producer_closed: AtomicBool::new(false),
        consumer_closed: AtomicBool::new(false),
    });

    (
        Producer {
            shared: Arc::clone(&shared),
            segment: first,
            base: 0,
            segment_capacity: capacity,
            slot: 0,
            tail: 0,
            cached_head: 0,
            max_capacity,
            low_water: config.low_water_mark(capacity),
            config,
            monitor: ShrinkMonitor::default(),
        },
        Consumer {
            shared,
            segment: first,
            segment_capacity: capacity,
            slot: 0,
            head: 0,
            cached_tail: 0,
            segment_end: None,
        },
    )
}

struct Segment<T> {
    /// Sequence number stored in `slots[0]`.
    base: usize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    next: AtomicPtr<Segment<T>>,
}

impl<T> Segment<T> {
    fn allocate(base: usize, capacity: usize) -> NonNull<Self> {
        let segment = Box::new(Self {
            base,
            slots: allocate_slots(capacity, || UnsafeCell::new(MaybeUninit::uninit())),
            next: AtomicPtr::new(ptr::null_mut()),
        });
        NonNull::from(Box::leak(segment))
    }

    #[inline(always)]
    fn slot(&self, index: usize) -> *mut MaybeUninit<T> {
        self.slots[index].get()
    }
}

struct Shared<T> {
    /// Sequence number of the next element to pop.
    head: CachePadded<AtomicUsize>,
    /// Sequence number of the next element to push.
    tail: CachePadded<AtomicUsize>,
    /// Oldest live segment, owned by the consumer.
    front: AtomicPtr<Segment<T>>,
    /// Total slots across live segments.
    capacity: AtomicUsize,
    producer_closed: AtomicBool,
    consumer_closed: AtomicBool,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let mut segment = *self.front.get_mut();
        // The front segment holds head; every later one starts at its base,
        // which equals the end of its predecessor.
        let mut seq = head;

        while !segment.is_null() {
            // Safety: both handles are gone; every segment reachable from
            // `front` is live and owned by this chain.
            let mut owned = unsafe { Box::from_raw(segment) };
            let next = *owned.next.get_mut();
            let end = if next.is_null() {
                tail
            } else {
                // Safety: linked segments stay valid until freed below.
                unsafe { (*next).base }
            };

            let capacity = owned.slots.len();
            while seq != end {
                let index = seq.wrapping_sub(owned.base) % capacity;
                // Safety: sequence numbers in [seq, end) are initialized in
                // this segment.
                unsafe { owned.slots[index].get_mut().assume_init_drop() };
                seq = seq.wrapping_add(1);
            }

            segment = next;
        }
    }
}

// Safety: each slot is accessed by exactly one side at a time, handed over
// through the Release/Acquire pairs on `head`, `tail` and `next`.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

/// The producing half of a flexible SPSC queue.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    /// Newest segment; the only one we write to.
    segment: NonNull<Segment<T>>,
    base: usize,
    segment_capacity: usize,
    /// Write index inside `segment`.
    slot: usize,
    tail: usize,
    cached_head: usize,
    max_capacity: usize,
    /// Occupancy at which a window stops counting as quiet.
    low_water: usize,
    config: FlexibleConfig,
    monitor: ShrinkMonitor,
}

// Safety: the producer may move to another thread; it cannot be shared
// (not Sync) because it owns the write side of the protocol.
unsafe impl<T: Send> Send for Producer<T> {}

impl<T> Producer<T> {
    /// Pushes a value, growing the queue if the current segment is full.
    ///
    /// # Errors
    ///
    /// - [`PushError::Full`] only if `max_capacity` elements are queued
    /// - [`PushError::Closed`] if the consumer has been dropped; no growth
    ///   is attempted in that case
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), PushError<T>> {
        if self.shared.consumer_closed.load(Ordering::Relaxed) {
            return Err(PushError::Closed(value));
        }

        // Fast path: cached head says the segment has room.
        if self.segment_len(self.cached_head) < self.segment_capacity {
            self.write(value);
            return Ok(());
        }

        self.push_slow(value)
    }

    #[cold]
    fn push_slow(&mut self, value: T) -> Result<(), PushError<T>> {
        let head = self.shared.head.load(Ordering::Acquire);
        self.cached_head = head;
        self.monitor.observe(self.tail.wrapping_sub(head));

        if self.segment_len(head) < self.segment_capacity {
            self.write(value);
            return Ok(());
        }

        let live = self.tail.wrapping_sub(head);
        if live >= self.max_capacity {
            return Err(PushError::Full(value));
        }

        match self.config.grow_target(self.segment_capacity, self.max_capacity) {
            Some(target) => {
                // Older segments still hold `live` elements.
                let target = target.min(self.max_capacity - live);
                debug!(
                    from = self.segment_capacity,
                    to = target,
                    len = live,
                    "growing spsc queue"
                );
                self.link(target);
                self.write(value);
                Ok(())
            }
            None => Err(PushError::Full(value)),
        }
    }

    /// Elements of the current segment not yet consumed, given a head.
    #[inline(always)]
    fn segment_len(&self, head: usize) -> usize {
        let since_head = self.tail.wrapping_sub(head);
        let since_base = self.tail.wrapping_sub(self.base);
        since_head.min(since_base)
    }

    #[inline(always)]
    fn write(&mut self, value: T) {
        // Safety: segment_len < capacity, so the slot is either untouched or
        // was consumed (head moved past it) before we loaded head.
        unsafe { (*self.segment.as_ref().slot(self.slot)).write(value) };
        self.slot = next_index(self.slot, self.segment_capacity);
        self.tail = self.tail.wrapping_add(1);
        self.shared.tail.store(self.tail, Ordering::Release);

        // `cached_head` lags, so this overestimates; reload once it would
        // mark the window busy.
        let mut occupancy = self.tail.wrapping_sub(self.cached_head);
        if occupancy >= self.low_water && self.monitor.peak() < self.low_water {
            self.cached_head = self.shared.head.load(Ordering::Acquire);
            occupancy = self.tail.wrapping_sub(self.cached_head);
        }
        self.monitor.observe(occupancy);

        if self.monitor.tick(self.config.shrink_interval) {
            self.close_window();
        }
    }

    #[cold]
    fn close_window(&mut self) {
        let head = self.shared.head.load(Ordering::Acquire);
        self.cached_head = head;
        let live = self.tail.wrapping_sub(head);

        if let Some(target) = self
            .monitor
            .close_window(&self.config, self.segment_capacity, live)
        {
            debug!(
                from = self.segment_capacity,
                to = target,
                len = live,
                "shrinking spsc queue"
            );
            self.link(target);
        }
    }

    /// Starts a new segment of `capacity` slots at the current tail.
    fn link(&mut self, capacity: usize) {
        let segment = Segment::allocate(self.tail, capacity);
        self.shared.capacity.fetch_add(capacity, Ordering::Relaxed);
        // Safety: `self.segment` is alive until the consumer follows this
        // link, which it cannot do before the store below.
        unsafe {
            self.segment
                .as_ref()
                .next
                .store(segment.as_ptr(), Ordering::Release);
        }

        self.segment = segment;
        self.base = self.tail;
        self.segment_capacity = capacity;
        self.low_water = self.config.low_water_mark(capacity);
        self.slot = 0;
        self.monitor.reset();
    }

    /// Total slots allocated across live segments (snapshot).
    ///
    /// Always at least [`len`](Self::len) when observed from a quiescent
    /// queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity.load(Ordering::Relaxed)
    }

    /// Returns current length (snapshot, may be stale).
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.shared.head.load(Ordering::Acquire);
        self.tail.wrapping_sub(head)
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

    /// The resize policy this queue was built with.
    pub const fn config(&self) -> &FlexibleConfig {
        &self.config
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.shared.producer_closed.store(true, Ordering::Release);
        trace!(tail = self.tail, "flexible spsc producer disconnected");
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// The consuming half of a flexible SPSC queue.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    /// Oldest live segment; the only one we read from.
    segment: NonNull<Segment<T>>,
    segment_capacity: usize,
    /// Read index inside `segment`.
    slot: usize,
    head: usize,
    cached_tail: usize,
    /// `base` of the segment after ours, once it is known to exist.
    segment_end: Option<usize>,
}

// Safety: see `Producer`.
unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> Consumer<T> {
    /// Pops the oldest value.
    ///
    /// # Errors
    ///
    /// - [`PopError::Empty`] if nothing is queued
    /// - [`PopError::Closed`] if nothing is queued and the producer has been
    ///   dropped
    #[inline]
    pub fn pop(&mut self) -> Result<T, PopError> {
        // Fast path: cached tail says there is data.
        if self.head != self.cached_tail {
            return Ok(self.read());
        }

        self.pop_slow()
    }

    #[cold]
    fn pop_slow(&mut self) -> Result<T, PopError> {
        if self.refresh_tail() {
            return Ok(self.read());
        }

        if self.shared.producer_closed.load(Ordering::Acquire) {
            // The producer may have published right before closing.
            if self.refresh_tail() {
                return Ok(self.read());
            }
            return Err(PopError::Closed);
        }

        Err(PopError::Empty)
    }

    /// Reloads `tail`. Returns `true` if data is available.
    fn refresh_tail(&mut self) -> bool {
        self.cached_tail = self.shared.tail.load(Ordering::Acquire);
        if self.head == self.cached_tail {
            return false;
        }
        // Any segment holding a sequence number below the tail we just
        // acquired was linked before that tail was published.
        if self.segment_end.is_none() {
            self.segment_end = self.load_segment_end();
        }
        true
    }

    fn load_segment_end(&self) -> Option<usize> {
        // Safety: our segment is alive until we free it.
        let next = unsafe { self.segment.as_ref().next.load(Ordering::Acquire) };
        // Safety: a linked segment is not freed before we follow it.
        NonNull::new(next).map(|next| unsafe { next.as_ref().base })
    }

    #[inline(always)]
    fn read(&mut self) -> T {
        while self.segment_end == Some(self.head) {
            self.advance_segment();
        }

        // Safety: head < tail and head lies in this segment, so the slot
        // was published by the producer and will not be rewritten until we
        // move head past it.
        let value = unsafe { (*self.segment.as_ref().slot(self.slot)).assume_init_read() };
        self.slot = next_index(self.slot, self.segment_capacity);
        self.head = self.head.wrapping_add(1);
        self.shared.head.store(self.head, Ordering::Release);
        value
    }

    /// Frees the drained segment and moves to its successor.
    #[cold]
    fn advance_segment(&mut self) {
        let old = self.segment;
        // Safety: segment_end was Some, so `next` is non-null.
        let next = unsafe { old.as_ref().next.load(Ordering::Acquire) };
        let Some(next) = NonNull::new(next) else {
            self.segment_end = None;
            return;
        };

        self.shared.front.store(next.as_ptr(), Ordering::Release);
        self.segment = next;
        // Safety: `next` is live; the producer never frees segments.
        self.segment_capacity = unsafe { next.as_ref().slots.len() };
        self.slot = 0;
        self.segment_end = self.load_segment_end();

        // Safety: every element of `old` has been read and the producer
        // stopped writing to it when it linked `next`.
        let old = unsafe { Box::from_raw(old.as_ptr()) };
        let freed = old.slots.len();
        self.shared.capacity.fetch_sub(freed, Ordering::Relaxed);
        drop(old);
        trace!(freed, head = self.head, "released spsc segment");
    }

    /// Total slots allocated across live segments (snapshot).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity.load(Ordering::Relaxed)
    }

    /// Returns current length (snapshot, may be stale).
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.shared.tail.load(Ordering::Acquire);
        tail.wrapping_sub(self.head)
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

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.shared.consumer_closed.store(true, Ordering::Release);
        trace!(head = self.head, "flexible spsc consumer disconnected");
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
