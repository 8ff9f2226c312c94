//! Blocking handles, a flavor-typed factory and fan-out/fan-in over
//! [`relay_queue`].
//!
//! # Flavors
//!
//! A queue is created from a *flavor*, a marker type naming the concurrency
//! shape and the storage strategy:
//!
//! | Flavor | Engine | Capacity |
//! |--------|--------|----------|
//! | [`SpscFixed<N>`] | lock-free SPSC, park when blocked | `N`, in the type |
//! | [`SpscFlexible`] | lock-free SPSC, segment chain | grows/shrinks, [`FlexibleConfig`] |
//! | [`MpmcFixed<N>`] | mutex + two condvars | `N`, in the type |
//! | [`MpmcFlexible`] | mutex + two condvars | grows/shrinks, [`FlexibleConfig`] |
//!
//! Every flavor hands out a `(Sender, Receiver)` pair implementing [`Push`]
//! and [`Pop`], so code written against the traits works with any of them.
//! SPSC handles take `&mut self`, are not `Clone` and not `Sync`; MPMC
//! handles are `Clone + Sync`.
//!
//! # Example
//!
//! ```
//! use relay_channel::{create_fixed_queue, create_queue, MpmcFlexible, Pop, Push, SpscFixed};
//!
//! // Capacity baked into the type.
//! let (mut tx, mut rx) = create_fixed_queue::<u64, SpscFixed<2>>().unwrap();
//! tx.try_push(1).unwrap();
//! tx.try_push(2).unwrap();
//! assert!(tx.try_push(3).unwrap_err().is_full());
//! assert_eq!(rx.pop(), Ok(1));
//!
//! // Runtime capacity; a plain number converts into a FlexibleConfig.
//! let (mut tx, mut rx) = create_queue::<String, MpmcFlexible>(64).unwrap();
//! tx.push("hello".to_string()).unwrap();
//! assert_eq!(rx.pop().unwrap(), "hello");
//! ```
//!
//! # Closing
//!
//! Dropping every sender closes the queue for input: receivers drain what is
//! left and then get [`PopError::Closed`]. Dropping every receiver makes
//! pushes fail with [`PushError::Closed`], handing the value back.
//!
//! # Timeouts
//!
//! Each blocking operation has a `_timeout` variant returning
//! [`PushError::Timeout`] / [`PopError::Timeout`]:
//!
//! ```
//! use relay_channel::{create_fixed_queue, MpmcFixed, Pop, PopError};
//! use std::time::Duration;
//!
//! let (_tx, mut rx) = create_fixed_queue::<u64, MpmcFixed<8>>().unwrap();
//! assert_eq!(rx.pop_timeout(Duration::from_millis(10)), Err(PopError::Timeout));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::convert::Infallible;
use std::time::Duration;

pub mod fan;
mod mpmc;
pub mod spsc;
mod trace;

pub use fan::{DispatchPolicy, FanIn, FanOut, fan_in, fan_out, split_pairs};
pub use relay_queue::{ConfigError, FlexibleConfig, PopError, PushError, init_tracing};
pub use spsc::ChannelConfig;

/// Producer capability.
pub trait Push<T> {
    /// Pushes a value, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if every receiver has been dropped.
    fn push(&mut self, value: T) -> Result<(), PushError<T>>;

    /// Pushes a value without blocking.
    ///
    /// # Errors
    ///
    /// [`PushError::Full`], [`PushError::WouldBlock`] or
    /// [`PushError::Closed`], with the value handed back.
    fn try_push(&mut self, value: T) -> Result<(), PushError<T>>;

    /// Pushes a value, blocking at most `timeout`.
    ///
    /// # Errors
    ///
    /// [`PushError::Timeout`] or [`PushError::Closed`], with the value handed
    /// back.
    fn push_timeout(&mut self, value: T, timeout: Duration) -> Result<(), PushError<T>>;

    /// Returns `true` if every receiver has been dropped.
    fn is_closed(&self) -> bool;

    /// Current capacity.
    fn capacity(&self) -> usize;

    /// Number of queued elements (snapshot).
    fn len(&self) -> usize;

    /// Returns `true` if nothing is queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer capability.
pub trait Pop<T> {
    /// Pops the oldest value, blocking while the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`PopError::Closed`] once every sender has been dropped and
    /// the queue is drained.
    fn pop(&mut self) -> Result<T, PopError>;

    /// Pops the oldest value without blocking.
    ///
    /// # Errors
    ///
    /// [`PopError::Empty`], [`PopError::WouldBlock`] or [`PopError::Closed`].
    fn try_pop(&mut self) -> Result<T, PopError>;

    /// Pops the oldest value, blocking at most `timeout`.
    ///
    /// # Errors
    ///
    /// [`PopError::Timeout`] or [`PopError::Closed`].
    fn pop_timeout(&mut self, timeout: Duration) -> Result<T, PopError>;

    /// Returns `true` if every sender has been dropped. Values may remain.
    fn is_closed(&self) -> bool;

    /// Number of queued elements (snapshot).
    fn len(&self) -> usize;

    /// Returns `true` if nothing is queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A queue shape and storage strategy.
pub trait Flavor<T> {
    /// Construction options.
    type Config;
    /// Construction failure. [`Infallible`] for fixed flavors.
    type Error: std::error::Error;
    /// Producer handle.
    type Sender: Push<T>;
    /// Consumer handle.
    type Receiver: Pop<T>;

    /// Creates a connected `(Sender, Receiver)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if `config` is rejected.
    fn create(config: Self::Config) -> Result<(Self::Sender, Self::Receiver), Self::Error>;
}

/// Single producer, single consumer, `N` inline slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpscFixed<const N: usize>;

/// Single producer, single consumer, flexible capacity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpscFlexible;

/// Any number of producers and consumers, `N` inline slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct MpmcFixed<const N: usize>;

/// Any number of producers and consumers, flexible capacity.
#[derive(Debug, Clone, Copy, Default)]
pub struct MpmcFlexible;

impl<T, const N: usize> Flavor<T> for SpscFixed<N> {
    type Config = ChannelConfig;
    type Error = Infallible;
    type Sender = spsc::FixedSender<T, N>;
    type Receiver = spsc::FixedReceiver<T, N>;

    fn create(config: ChannelConfig) -> Result<(Self::Sender, Self::Receiver), Infallible> {
        Ok(spsc::fixed(config))
    }
}

impl<T> Flavor<T> for SpscFlexible {
    type Config = FlexibleConfig;
    type Error = ConfigError;
    type Sender = spsc::FlexibleSender<T>;
    type Receiver = spsc::FlexibleReceiver<T>;

    fn create(config: FlexibleConfig) -> Result<(Self::Sender, Self::Receiver), ConfigError> {
        spsc::flexible(config, ChannelConfig::default())
    }
}

impl<T, const N: usize> Flavor<T> for MpmcFixed<N> {
    type Config = ();
    type Error = Infallible;
    type Sender = relay_queue::mpmc::FixedSender<T, N>;
    type Receiver = relay_queue::mpmc::FixedReceiver<T, N>;

    fn create((): ()) -> Result<(Self::Sender, Self::Receiver), Infallible> {
        Ok(relay_queue::mpmc::fixed())
    }
}

impl<T> Flavor<T> for MpmcFlexible {
    type Config = FlexibleConfig;
    type Error = ConfigError;
    type Sender = relay_queue::mpmc::FlexibleSender<T>;
    type Receiver = relay_queue::mpmc::FlexibleReceiver<T>;

    fn create(config: FlexibleConfig) -> Result<(Self::Sender, Self::Receiver), ConfigError> {
        relay_queue::mpmc::flexible(config)
    }
}

/// Creates a queue of flavor `F`.
///
/// `config` is anything convertible into the flavor's config; for flexible
/// flavors a plain `usize` is taken as the initial capacity.
///
/// # Errors
///
/// Returns the flavor's error if `config` is rejected.
pub fn create_queue<T, F: Flavor<T>>(
    config: impl Into<F::Config>,
) -> Result<(F::Sender, F::Receiver), F::Error> {
    F::create(config.into())
}

/// Creates a queue of flavor `F` with its default config.
///
/// Meant for fixed flavors, whose capacity is part of the type and whose
/// creation cannot fail.
///
/// # Errors
///
/// Returns the flavor's error if the default config is rejected.
pub fn create_fixed_queue<T, F>() -> Result<(F::Sender, F::Receiver), F::Error>
where
    F: Flavor<T>,
    F::Config: Default,
{
    F::create(F::Config::default())
}
