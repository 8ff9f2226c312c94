//! One-to-many and many-to-one compositions over independent queues.
//!
//! [`FanOut`] spreads values from one producer across several queues.
//! [`FanIn`] merges several queues into one consumer. Both work with any
//! [`Push`]/[`Pop`] implementation, so each sub-queue may be SPSC or MPMC,
//! fixed or flexible.
//!
//! Ordering is only guaranteed per sub-queue. Two values pushed through a
//! `FanOut` may come out of a `FanIn` in either order.
//!
//! ```
//! use relay_channel::{fan_out, Pop, Push, SpscFixed, ChannelConfig};
//!
//! let (mut fan, mut receivers) = fan_out::<u64, SpscFixed<4>>(2, ChannelConfig::default()).unwrap();
//! for i in 0..4 {
//!     fan.push(i).unwrap();
//! }
//! assert_eq!(receivers[0].pop(), Ok(0));
//! assert_eq!(receivers[1].pop(), Ok(1));
//! assert_eq!(receivers[0].pop(), Ok(2));
//! ```

use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;

use crate::trace::debug;
use crate::{Flavor, Pop, PopError, Push, PushError};

/// Default time a blocked [`FanIn`] waits on one sub-queue before rotating.
pub const DEFAULT_WAIT_SLICE: Duration = Duration::from_millis(1);

/// How a [`FanOut`] picks the sub-queue for the next value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Strict rotation. A full sub-queue holds up the whole fan-out.
    #[default]
    RoundRobin,
    /// Try every sub-queue from the cursor on, take the first with room,
    /// and block on the cursor's queue only if all are full.
    FirstAvailable,
}

#[inline]
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// How long a dispatch may wait.
#[derive(Clone, Copy)]
enum Wait {
    Never,
    Forever,
    Until(Instant),
}

impl Wait {
    fn after(timeout: Duration) -> Self {
        deadline_after(timeout).map_or(Self::Forever, Self::Until)
    }
}

/// Splits connected pairs into a vector of senders and a vector of receivers.
pub fn split_pairs<S, R>(pairs: Vec<(S, R)>) -> (Vec<S>, Vec<R>) {
    pairs.into_iter().unzip()
}

/// Creates `count` queues of flavor `F` and fans their senders out.
///
/// # Errors
///
/// Returns the flavor's error if `config` is rejected.
pub fn fan_out<T, F>(
    count: usize,
    config: impl Into<F::Config>,
) -> Result<(FanOut<F::Sender>, Vec<F::Receiver>), F::Error>
where
    F: Flavor<T>,
    F::Config: Clone,
{
    let (senders, receivers) = create_many::<T, F>(count, config.into())?;
    Ok((FanOut::new(senders), receivers))
}

/// Creates `count` queues of flavor `F` and fans their receivers in.
///
/// # Errors
///
/// Returns the flavor's error if `config` is rejected.
pub fn fan_in<T, F>(
    count: usize,
    config: impl Into<F::Config>,
) -> Result<(Vec<F::Sender>, FanIn<F::Receiver>), F::Error>
where
    F: Flavor<T>,
    F::Config: Clone,
{
    let (senders, receivers) = create_many::<T, F>(count, config.into())?;
    Ok((senders, FanIn::new(receivers)))
}

#[allow(clippy::type_complexity)]
fn create_many<T, F>(
    count: usize,
    config: F::Config,
) -> Result<(Vec<F::Sender>, Vec<F::Receiver>), F::Error>
where
    F: Flavor<T>,
    F::Config: Clone,
{
    let pairs = (0..count)
        .map(|_| F::create(config.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(split_pairs(pairs))
}

// ============================================================================
// FanOut
// ============================================================================

/// One producer, many queues.
///
/// Sub-queues whose receivers are gone are retired. Once every sub-queue is
/// retired, pushes fail with [`PushError::Closed`].
#[derive(Debug)]
pub struct FanOut<S> {
    queues: Vec<S>,
    cursor: usize,
    policy: DispatchPolicy,
}

impl<S> FanOut<S> {
    /// Fans out over `queues` with [`DispatchPolicy::RoundRobin`].
    pub const fn new(queues: Vec<S>) -> Self {
        Self {
            queues,
            cursor: 0,
            policy: DispatchPolicy::RoundRobin,
        }
    }

    /// Sets the dispatch policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The dispatch policy.
    pub const fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Number of sub-queues not yet retired.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Gives back the remaining sub-queues.
    pub fn into_queues(self) -> Vec<S> {
        self.queues
    }

    fn retire(&mut self, idx: usize) {
        self.queues.remove(idx);
        if self.cursor > idx {
            self.cursor -= 1;
        }
        debug!(remaining = self.queues.len(), "fan-out retired closed queue");
    }

    /// One non-blocking pass from the cursor. Hands the value back if no
    /// sub-queue took it.
    fn try_each<T>(&mut self, mut value: T) -> Result<(), T>
    where
        S: Push<T>,
    {
        let mut remaining = self.queues.len();
        let mut idx = self.cursor;
        while remaining > 0 {
            idx %= self.queues.len();
            match self.queues[idx].try_push(value) {
                Ok(()) => {
                    self.cursor = (idx + 1) % self.queues.len();
                    return Ok(());
                }
                Err(PushError::Closed(v)) => {
                    self.retire(idx);
                    value = v;
                }
                Err(err) => {
                    value = err.into_inner();
                    idx += 1;
                }
            }
            remaining -= 1;
        }
        Err(value)
    }

    fn dispatch<T>(&mut self, mut value: T, wait: Wait) -> Result<(), PushError<T>>
    where
        S: Push<T>,
    {
        loop {
            if self.queues.is_empty() {
                return Err(PushError::Closed(value));
            }
            if self.policy == DispatchPolicy::FirstAvailable {
                value = match self.try_each(value) {
                    Ok(()) => return Ok(()),
                    Err(v) => v,
                };
                if self.queues.is_empty() {
                    continue;
                }
            }

            let idx = self.cursor % self.queues.len();
            let queue = &mut self.queues[idx];
            let result = match wait {
                Wait::Never => queue.try_push(value),
                Wait::Forever => queue.push(value),
                Wait::Until(deadline) => {
                    queue.push_timeout(value, deadline.saturating_duration_since(Instant::now()))
                }
            };
            match result {
                Ok(()) => {
                    self.cursor = (idx + 1) % self.queues.len();
                    return Ok(());
                }
                Err(PushError::Closed(v)) => {
                    self.retire(idx);
                    value = v;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<T, S: Push<T>> Push<T> for FanOut<S> {
    fn push(&mut self, value: T) -> Result<(), PushError<T>> {
        self.dispatch(value, Wait::Forever)
    }

    fn try_push(&mut self, value: T) -> Result<(), PushError<T>> {
        self.dispatch(value, Wait::Never)
    }

    fn push_timeout(&mut self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        self.dispatch(value, Wait::after(timeout))
    }

    /// `true` once every sub-queue's receiver is gone.
    fn is_closed(&self) -> bool {
        self.queues.iter().all(Push::is_closed)
    }

    /// Sum of the sub-queue capacities.
    fn capacity(&self) -> usize {
        self.queues.iter().map(Push::capacity).sum()
    }

    fn len(&self) -> usize {
        self.queues.iter().map(Push::len).sum()
    }
}

// ============================================================================
// FanIn
// ============================================================================

/// Many queues, one consumer.
///
/// Polls the sub-queues in rotation, starting after the last one served, so
/// a busy queue cannot starve the others. When everything is empty it backs
/// off briefly, then blocks on one sub-queue for a short slice before
/// rotating again. Closed and drained sub-queues are retired. Once every
/// sub-queue is retired, pops fail with [`PopError::Closed`].
#[derive(Debug)]
pub struct FanIn<R> {
    queues: Vec<R>,
    cursor: usize,
    wait_slice: Duration,
}

impl<R> FanIn<R> {
    /// Fans in from `queues`, waiting [`DEFAULT_WAIT_SLICE`] per sub-queue
    /// when blocked.
    pub const fn new(queues: Vec<R>) -> Self {
        Self {
            queues,
            cursor: 0,
            wait_slice: DEFAULT_WAIT_SLICE,
        }
    }

    /// Sets how long a blocked pop waits on one sub-queue before moving on.
    /// Shorter slices notice other queues sooner at the cost of more wakeups.
    #[must_use]
    pub const fn with_wait_slice(mut self, wait_slice: Duration) -> Self {
        self.wait_slice = wait_slice;
        self
    }

    /// Number of sub-queues not yet retired.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Gives back the remaining sub-queues.
    pub fn into_queues(self) -> Vec<R> {
        self.queues
    }

    fn retire(&mut self, idx: usize) {
        self.queues.remove(idx);
        if self.cursor > idx {
            self.cursor -= 1;
        }
        debug!(remaining = self.queues.len(), "fan-in retired drained queue");
    }

    /// One non-blocking rotation over every live sub-queue.
    fn poll<T>(&mut self) -> Result<T, PopError>
    where
        R: Pop<T>,
    {
        let mut remaining = self.queues.len();
        let mut idx = self.cursor;
        let mut contended = false;
        while remaining > 0 {
            idx %= self.queues.len();
            match self.queues[idx].try_pop() {
                Ok(value) => {
                    self.cursor = (idx + 1) % self.queues.len();
                    return Ok(value);
                }
                Err(PopError::Closed) => self.retire(idx),
                Err(PopError::WouldBlock) => {
                    contended = true;
                    idx += 1;
                }
                Err(_) => idx += 1,
            }
            remaining -= 1;
        }

        if self.queues.is_empty() {
            Err(PopError::Closed)
        } else if contended {
            Err(PopError::WouldBlock)
        } else {
            Err(PopError::Empty)
        }
    }

    fn collect<T>(&mut self, deadline: Option<Instant>) -> Result<T, PopError>
    where
        R: Pop<T>,
    {
        let backoff = Backoff::new();
        loop {
            match self.poll() {
                Err(PopError::Empty | PopError::WouldBlock) => {}
                result => return result,
            }

            let slice = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(PopError::Timeout);
                    }
                    left.min(self.wait_slice)
                }
                None => self.wait_slice,
            };

            if !backoff.is_completed() {
                backoff.snooze();
                continue;
            }

            let idx = self.cursor % self.queues.len();
            match self.queues[idx].pop_timeout(slice) {
                Ok(value) => {
                    self.cursor = (idx + 1) % self.queues.len();
                    return Ok(value);
                }
                Err(PopError::Closed) => self.retire(idx),
                Err(_) => self.cursor = (idx + 1) % self.queues.len(),
            }
        }
    }
}

impl<T, R: Pop<T>> Pop<T> for FanIn<R> {
    fn pop(&mut self) -> Result<T, PopError> {
        self.collect(None)
    }

    fn try_pop(&mut self) -> Result<T, PopError> {
        self.poll()
    }

    fn pop_timeout(&mut self, timeout: Duration) -> Result<T, PopError> {
        match deadline_after(timeout) {
            Some(deadline) => self.collect(Some(deadline)),
            None => self.collect(None),
        }
    }

    /// `true` once every sub-queue's sender is gone.
    fn is_closed(&self) -> bool {
        self.queues.iter().all(Pop::is_closed)
    }

    fn len(&self) -> usize {
        self.queues.iter().map(Pop::len).sum()
    }
}
