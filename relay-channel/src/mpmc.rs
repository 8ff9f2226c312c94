//! [`Push`]/[`Pop`] for the lock-based MPMC handles.
//!
//! The handles already block on their condvars, so these impls just forward.

use std::time::Duration;

use relay_queue::mpmc::{Receiver, Sender};
use relay_queue::ring::Ring;
use relay_queue::{PopError, PushError};

use crate::{Pop, Push};

impl<T, R: Ring<T>> Push<T> for Sender<T, R> {
    #[inline]
    fn push(&mut self, value: T) -> Result<(), PushError<T>> {
        Sender::push(self, value)
    }

    #[inline]
    fn try_push(&mut self, value: T) -> Result<(), PushError<T>> {
        Sender::try_push(self, value)
    }

    fn push_timeout(&mut self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        Sender::push_timeout(self, value, timeout)
    }

    fn is_closed(&self) -> bool {
        Sender::is_closed(self)
    }

    fn capacity(&self) -> usize {
        Sender::capacity(self)
    }

    fn len(&self) -> usize {
        Sender::len(self)
    }
}

impl<T, R: Ring<T>> Pop<T> for Receiver<T, R> {
    #[inline]
    fn pop(&mut self) -> Result<T, PopError> {
        Receiver::pop(self)
    }

    #[inline]
    fn try_pop(&mut self) -> Result<T, PopError> {
        Receiver::try_pop(self)
    }

    fn pop_timeout(&mut self, timeout: Duration) -> Result<T, PopError> {
        Receiver::pop_timeout(self, timeout)
    }

    fn is_closed(&self) -> bool {
        Receiver::is_closed(self)
    }

    fn len(&self) -> usize {
        Receiver::len(self)
    }
}
