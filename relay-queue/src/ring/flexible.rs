//! Growable ring with occupancy-driven shrinking.

use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;

use super::{Ring, allocate_slots, next_index};
use crate::config::{FlexibleConfig, ShrinkMonitor};
use crate::error::ConfigError;
use crate::trace::debug;

/// A ring buffer whose capacity adapts to load.
///
/// A push on a full ring relocates every element into a buffer
/// `growth_factor` times larger, with the oldest element moved to index 0.
/// Pushes are counted into windows of `shrink_interval`; after
/// `shrink_patience` windows in a row whose peak occupancy stays below
/// `low_water_fraction` of capacity, the ring relocates into a smaller buffer
/// (never below `min_capacity` or the current length).
///
/// # Example
///
/// ```
/// use relay_queue::FlexibleConfig;
/// use relay_queue::ring::{FlexibleRing, Ring};
///
/// let mut ring = FlexibleRing::with_config(FlexibleConfig::new(2)).unwrap();
/// for i in 0..5 {
///     ring.push(i).unwrap();
/// }
/// assert!(ring.capacity() >= 5);
/// assert_eq!(ring.pop(), Some(0));
/// ```
pub struct FlexibleRing<T> {
    slots: Box<[MaybeUninit<T>]>,
    head: usize,
    tail: usize,
    count: usize,
    max_capacity: usize,
    config: FlexibleConfig,
    monitor: ShrinkMonitor,
}

impl<T> FlexibleRing<T> {
    /// Creates an empty ring with `capacity` initial slots and default policy.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be non-zero");
        Self::build(FlexibleConfig::new(capacity))
    }

    /// Creates an empty ring sized and tuned by `config`.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] reported by [`FlexibleConfig::validate`].
    pub fn with_config(config: FlexibleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: FlexibleConfig) -> Self {
        let max_capacity = config.max_slots::<T>();
        let capacity = config.initial_capacity.min(max_capacity);
        Self {
            slots: allocate_slots(capacity, MaybeUninit::uninit),
            head: 0,
            tail: 0,
            count: 0,
            max_capacity,
            config,
            monitor: ShrinkMonitor::default(),
        }
    }

    /// The policy this ring was built with.
    pub const fn config(&self) -> &FlexibleConfig {
        &self.config
    }

    /// Moves every element into a fresh buffer of `capacity` slots, oldest
    /// element first.
    fn relocate(&mut self, capacity: usize) {
        debug_assert!(capacity >= self.count);

        let old_capacity = self.slots.len();
        let mut slots = allocate_slots(capacity, MaybeUninit::uninit);

        let first = self.count.min(old_capacity - self.head);
        let second = self.count - first;
        // Safety: [head, head + first) and [0, second) are the initialized
        // regions of the old buffer; the new buffer has room for `count`
        // elements. Ownership moves bitwise and the old slots are never read
        // again (MaybeUninit does not drop its contents).
        unsafe {
            ptr::copy_nonoverlapping(self.slots.as_ptr().add(self.head), slots.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(self.slots.as_ptr(), slots.as_mut_ptr().add(first), second);
        }

        self.slots = slots;
        self.head = 0;
        self.tail = if self.count == capacity { 0 } else { self.count };
        self.monitor.reset();
    }

    #[cold]
    fn grow(&mut self) -> bool {
        let capacity = self.slots.len();
        match self.config.grow_target(capacity, self.max_capacity) {
            Some(target) => {
                debug!(from = capacity, to = target, len = self.count, "growing ring");
                self.relocate(target);
                true
            }
            None => false,
        }
    }

    #[inline]
    fn tick(&mut self) {
        if self.monitor.tick(self.config.shrink_interval) {
            self.close_window();
        }
    }

    #[cold]
    fn close_window(&mut self) {
        let capacity = self.slots.len();
        if let Some(target) = self.monitor.close_window(&self.config, capacity, self.count) {
            debug!(from = capacity, to = target, len = self.count, "shrinking ring");
            self.relocate(target);
        }
    }
}

impl<T> Ring<T> for FlexibleRing<T> {
    fn push(&mut self, value: T) -> Result<(), T> {
        if self.count == self.slots.len() && !self.grow() {
            return Err(value);
        }
        self.slots[self.tail].write(value);
        self.tail = next_index(self.tail, self.slots.len());
        self.count += 1;
        self.monitor.observe(self.count);
        self.tick();
        Ok(())
    }

    fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        // Safety: slots in [head, head + count) are initialized.
        let value = unsafe { self.slots[self.head].assume_init_read() };
        self.head = next_index(self.head, self.slots.len());
        self.count -= 1;
        Some(value)
    }

    #[inline]
    fn len(&self) -> usize {
        self.count
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.count == self.slots.len() && self.slots.len() >= self.max_capacity
    }
}

impl<T> Drop for FlexibleRing<T> {
    fn drop(&mut self) {
        let capacity = self.slots.len();
        let mut index = self.head;
        for _ in 0..self.count {
            // Safety: slots in [head, head + count) are initialized.
            unsafe { self.slots[index].assume_init_drop() };
            index = next_index(index, capacity);
        }
    }
}

impl<T> fmt::Debug for FlexibleRing<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlexibleRing")
            .field("capacity", &self.slots.len())
            .field("len", &self.count)
            .finish_non_exhaustive()
    }
}
