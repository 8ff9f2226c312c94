//! # relay-queue
//!
//! Bounded in-process ring buffer queues for moving owned values between
//! threads.
//!
//! ## Engines
//!
//! - [`spsc::fixed`] - single producer, single consumer, const-generic
//!   capacity, lock-free
//! - [`spsc::flexible`] - single producer, single consumer, capacity grows
//!   when full and shrinks when underused, lock-free
//! - [`mpmc`] - any number of producers and consumers over a mutex and two
//!   condition variables, with fixed or flexible storage
//!
//! ## Storage
//!
//! [`ring::FixedRing`] and [`ring::FlexibleRing`] are the single-threaded
//! circular buffers behind the MPMC engine. They are public so callers can
//! plug either (or their own [`ring::Ring`]) into [`mpmc::channel`].
//!
//! ## Design Goals
//!
//! - No allocation on the hot path (flexible queues allocate only to resize)
//! - Cache-line isolation of producer and consumer indices
//! - Ownership moves in on push and out on pop; a rejected value is handed
//!   back inside the error
//! - Single-producer handles are neither `Clone` nor `Sync`, so a second
//!   producer is a compile error
//!
//! ## Example
//!
//! ```
//! use relay_queue::spsc::fixed;
//! use relay_queue::{PopError, PushError};
//!
//! let (mut tx, mut rx) = fixed::ring_buffer::<u64, 2>();
//!
//! tx.push(1).unwrap();
//! tx.push(2).unwrap();
//! assert_eq!(tx.push(3), Err(PushError::Full(3)));
//!
//! assert_eq!(rx.pop(), Ok(1));
//! assert_eq!(rx.pop(), Ok(2));
//! assert_eq!(rx.pop(), Err(PopError::Empty));
//! ```
//!
//! Blocking handles, the flavor factory and fan-out/fan-in live in the
//! `relay-channel` crate.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod mpmc;
pub mod ring;
pub mod spsc;
pub mod trace;

pub use config::FlexibleConfig;
pub use error::{ConfigError, PopError, PushError};
pub use trace::init_tracing;
