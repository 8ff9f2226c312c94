//! Error types shared by every queue flavor.
//!
//! None of these are fatal. A value that could not be enqueued always travels
//! back to the caller inside the [`PushError`].

use thiserror::Error;

/// Error returned when a value could not be pushed.
///
/// Contains the value so it can be retried or dropped by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError<T> {
    /// The queue is at capacity and cannot grow.
    #[error("queue is full")]
    Full(T),
    /// The operation could not complete without waiting (e.g. the queue lock
    /// was held by another thread).
    #[error("operation would block")]
    WouldBlock(T),
    /// A bounded wait expired before space became available.
    #[error("timed out waiting for space")]
    Timeout(T),
    /// The receiving side has been dropped.
    #[error("receiver disconnected")]
    Closed(T),
}

impl<T> PushError<T> {
    /// Returns the value that couldn't be pushed.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(v) | Self::WouldBlock(v) | Self::Timeout(v) | Self::Closed(v) => v,
        }
    }

    /// Returns `true` if this error is the `Full` variant.
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Returns `true` if this error is the `WouldBlock` variant.
    pub const fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock(_))
    }

    /// Returns `true` if this error is the `Timeout` variant.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns `true` if this error is the `Closed` variant.
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Error returned when no value could be popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PopError {
    /// The queue is empty but the sending side is still alive.
    #[error("queue is empty")]
    Empty,
    /// The operation could not complete without waiting.
    #[error("operation would block")]
    WouldBlock,
    /// A bounded wait expired before a value arrived.
    #[error("timed out waiting for a value")]
    Timeout,
    /// The sending side has been dropped and nothing is left to drain.
    #[error("sender disconnected")]
    Closed,
}

impl PopError {
    /// Returns `true` if this error is the `Empty` variant.
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns `true` if this error is the `WouldBlock` variant.
    pub const fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }

    /// Returns `true` if this error is the `Timeout` variant.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this error is the `Closed` variant.
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Error returned when a [`FlexibleConfig`](crate::FlexibleConfig) is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A size or count was zero.
    #[error("{name} must be non-zero")]
    Zero {
        /// Name of the offending field.
        name: &'static str,
    },
    /// The growth factor does not grow.
    #[error("growth factor must be greater than 1.0 (got {0})")]
    GrowthFactor(f64),
    /// The low-water fraction is outside `(0, 1)`.
    #[error("low-water fraction must be within (0.0, 1.0) (got {0})")]
    LowWater(f64),
    /// Shrinking then growing once would land at the same threshold.
    #[error(
        "low-water fraction {low_water} times growth factor {growth_factor} must stay below 1.0"
    )]
    NoHysteresis {
        /// Configured low-water fraction.
        low_water: f64,
        /// Configured growth factor.
        growth_factor: f64,
    },
    /// The shrink floor exceeds the initial capacity.
    #[error("min capacity {min} exceeds initial capacity {initial}")]
    MinAboveInitial {
        /// Configured minimum capacity.
        min: usize,
        /// Configured initial capacity.
        initial: usize,
    },
    /// The growth ceiling is below the initial capacity.
    #[error("max capacity {max} is below initial capacity {initial}")]
    MaxBelowInitial {
        /// Configured maximum capacity.
        max: usize,
        /// Configured initial capacity.
        initial: usize,
    },
}
