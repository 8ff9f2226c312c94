//! Single-producer single-consumer (SPSC) queues.
//!
//! Both engines use only acquire/release atomics on the data path. Each
//! handle owns one index and keeps a cached copy of the other side's index,
//! refreshing it only when the queue looks full (producer) or empty
//! (consumer).
//!
//! - [`fixed`] - capacity is a const generic, slots are inline
//! - [`flexible`] - a chain of heap segments the producer grows and shrinks
//!
//! # Ownership
//!
//! [`fixed::Producer`] and [`fixed::Consumer`] (and their flexible
//! counterparts) are `Send` but neither `Clone` nor `Sync`, and every
//! operation takes `&mut self`. A second producer or consumer cannot be
//! created or shared:
//!
//! ```compile_fail
//! use relay_queue::spsc::fixed;
//!
//! let (producer, _consumer) = fixed::ring_buffer::<u64, 8>();
//! let second = producer.clone();
//! ```
//!
//! ```compile_fail
//! use relay_queue::spsc::fixed;
//!
//! fn shared<S: Sync>(_: &S) {}
//! let (producer, _consumer) = fixed::ring_buffer::<u64, 8>();
//! shared(&producer);
//! ```
//!
//! # Disconnection
//!
//! Dropping either handle closes the queue for the other side:
//!
//! - `push` returns [`PushError::Closed`](crate::PushError::Closed) once the
//!   consumer is gone
//! - `pop` drains what is left, then returns
//!   [`PopError::Closed`](crate::PopError::Closed)
//!
//! # Example
//!
//! ```
//! use relay_queue::spsc::fixed;
//! use relay_queue::PopError;
//!
//! let (mut tx, mut rx) = fixed::ring_buffer::<u64, 100>();
//!
//! let handle = std::thread::spawn(move || {
//!     for i in 0..10_000 {
//!         let mut value = i;
//!         while let Err(err) = tx.push(value) {
//!             value = err.into_inner();
//!             std::hint::spin_loop();
//!         }
//!     }
//! });
//!
//! let mut expected = 0;
//! loop {
//!     match rx.pop() {
//!         Ok(v) => {
//!             assert_eq!(v, expected);
//!             expected += 1;
//!         }
//!         Err(PopError::Empty) => std::hint::spin_loop(),
//!         Err(_) => break,
//!     }
//! }
//! handle.join().unwrap();
//! assert_eq!(expected, 10_000);
//! ```

pub mod fixed;
pub mod flexible;
