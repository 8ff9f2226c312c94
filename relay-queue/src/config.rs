//! Sizing policy for flexible-capacity queues.
//!
//! A flexible queue starts at `initial_capacity`, grows by `growth_factor`
//! whenever a push finds it full, and shrinks back (never below
//! `min_capacity`) once occupancy has stayed under `low_water_fraction` of
//! capacity for `shrink_patience` consecutive windows of `shrink_interval`
//! pushes. Pops never close a window.
//!
//! # Example
//!
//! ```
//! use relay_queue::FlexibleConfig;
//!
//! let config = FlexibleConfig::new(128)
//!     .with_growth_factor(1.5)
//!     .with_min_capacity(64)
//!     .with_low_water_fraction(0.2);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.grow_target(128, usize::MAX), Some(192));
//! ```

use std::mem;

use crate::error::ConfigError;
use crate::trace::warn;

/// Initial capacity used by [`FlexibleConfig::default`].
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default multiplier applied when a full queue grows.
pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0;

/// Default occupancy ratio under which a window counts as underused.
pub const DEFAULT_LOW_WATER_FRACTION: f64 = 0.25;

/// Default number of pushes per occupancy window.
pub const DEFAULT_SHRINK_INTERVAL: usize = 1024;

/// Default number of consecutive underused windows before shrinking.
pub const DEFAULT_SHRINK_PATIENCE: u32 = 4;

/// Construction options for flexible-capacity storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlexibleConfig {
    /// Slot count allocated at construction.
    pub initial_capacity: usize,
    /// Multiplier applied on growth. Must be greater than 1.
    pub growth_factor: f64,
    /// Floor for shrinking.
    pub min_capacity: usize,
    /// Occupancy ratio below which a window counts as underused.
    pub low_water_fraction: f64,
    /// Pushes per occupancy window.
    pub shrink_interval: usize,
    /// Consecutive underused windows required before shrinking.
    pub shrink_patience: u32,
    /// Ceiling for growth. `None` means bounded only by addressable memory.
    pub max_capacity: Option<usize>,
}

impl FlexibleConfig {
    /// Creates a config with the given initial capacity and default policy.
    ///
    /// The shrink floor defaults to the initial capacity.
    pub const fn new(initial_capacity: usize) -> Self {
        Self {
            initial_capacity,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            min_capacity: initial_capacity,
            low_water_fraction: DEFAULT_LOW_WATER_FRACTION,
            shrink_interval: DEFAULT_SHRINK_INTERVAL,
            shrink_patience: DEFAULT_SHRINK_PATIENCE,
            max_capacity: None,
        }
    }

    /// Sets the growth multiplier.
    #[must_use]
    pub const fn with_growth_factor(mut self, growth_factor: f64) -> Self {
        self.growth_factor = growth_factor;
        self
    }

    /// Sets the shrink floor.
    #[must_use]
    pub const fn with_min_capacity(mut self, min_capacity: usize) -> Self {
        self.min_capacity = min_capacity;
        self
    }

    /// Sets the underuse threshold.
    #[must_use]
    pub const fn with_low_water_fraction(mut self, low_water_fraction: f64) -> Self {
        self.low_water_fraction = low_water_fraction;
        self
    }

    /// Sets the number of pushes per occupancy window.
    #[must_use]
    pub const fn with_shrink_interval(mut self, shrink_interval: usize) -> Self {
        self.shrink_interval = shrink_interval;
        self
    }

    /// Sets how many underused windows in a row trigger a shrink.
    #[must_use]
    pub const fn with_shrink_patience(mut self, shrink_patience: u32) -> Self {
        self.shrink_patience = shrink_patience;
        self
    }

    /// Caps growth at `max_capacity` slots.
    #[must_use]
    pub const fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = Some(max_capacity);
        self
    }

    /// Checks the config for consistency.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let result = self.check();
        if let Err(ref _err) = result {
            warn!(config = ?self, error = %_err, "rejected flexible queue config");
        }
        result
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.initial_capacity == 0 {
            return Err(ConfigError::Zero {
                name: "initial_capacity",
            });
        }
        if self.min_capacity == 0 {
            return Err(ConfigError::Zero {
                name: "min_capacity",
            });
        }
        if self.shrink_interval == 0 {
            return Err(ConfigError::Zero {
                name: "shrink_interval",
            });
        }
        if self.shrink_patience == 0 {
            return Err(ConfigError::Zero {
                name: "shrink_patience",
            });
        }
        if !self.growth_factor.is_finite() || self.growth_factor <= 1.0 {
            return Err(ConfigError::GrowthFactor(self.growth_factor));
        }
        if !(self.low_water_fraction > 0.0 && self.low_water_fraction < 1.0) {
            return Err(ConfigError::LowWater(self.low_water_fraction));
        }
        if self.low_water_fraction * self.growth_factor >= 1.0 {
            return Err(ConfigError::NoHysteresis {
                low_water: self.low_water_fraction,
                growth_factor: self.growth_factor,
            });
        }
        if self.min_capacity > self.initial_capacity {
            return Err(ConfigError::MinAboveInitial {
                min: self.min_capacity,
                initial: self.initial_capacity,
            });
        }
        if let Some(max) = self.max_capacity {
            if max < self.initial_capacity {
                return Err(ConfigError::MaxBelowInitial {
                    max,
                    initial: self.initial_capacity,
                });
            }
        }
        Ok(())
    }

    /// Largest slot count a queue of `T` may reach under this config.
    pub fn max_slots<T>(&self) -> usize {
        let addressable = isize::MAX as usize / mem::size_of::<T>().max(1);
        self.max_capacity.map_or(addressable, |max| max.min(addressable))
    }

    /// Capacity to grow to from `capacity`, or `None` if already at `max`.
    ///
    /// Always at least one slot larger than `capacity`.
    pub fn grow_target(&self, capacity: usize, max: usize) -> Option<usize> {
        if capacity >= max {
            return None;
        }
        let scaled = (capacity as f64 * self.growth_factor).ceil();
        let target = if scaled >= max as f64 {
            max
        } else {
            scaled as usize
        };
        Some(target.max(capacity + 1).min(max))
    }

    /// Capacity to shrink to from `capacity` while `live` elements are held,
    /// or `None` if no smaller capacity is allowed.
    ///
    /// Never below `min_capacity` and always leaves room for one more push.
    pub fn shrink_target(&self, capacity: usize, live: usize) -> Option<usize> {
        let scaled = (capacity as f64 / self.growth_factor).ceil() as usize;
        let target = scaled.max(self.min_capacity).max(live + 1);
        (target < capacity).then_some(target)
    }

    /// Smallest occupancy that marks a window over `capacity` as busy.
    pub(crate) fn low_water_mark(&self, capacity: usize) -> usize {
        (capacity as f64 * self.low_water_fraction).ceil() as usize
    }
}

impl Default for FlexibleConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl From<usize> for FlexibleConfig {
    fn from(initial_capacity: usize) -> Self {
        Self::new(initial_capacity)
    }
}

/// Tracks occupancy over fixed-size push windows and decides when a
/// flexible queue has been underused long enough to shrink.
#[derive(Debug, Clone, Default)]
pub(crate) struct ShrinkMonitor {
    ops: usize,
    peak: usize,
    quiet: u32,
}

impl ShrinkMonitor {
    /// Records an occupancy sample for the current window.
    #[inline]
    pub(crate) fn observe(&mut self, occupancy: usize) {
        if occupancy > self.peak {
            self.peak = occupancy;
        }
    }

    /// Highest occupancy recorded in the current window.
    #[inline]
    pub(crate) const fn peak(&self) -> usize {
        self.peak
    }

    /// Counts one push. Returns `true` when the window is complete.
    #[inline]
    pub(crate) fn tick(&mut self, interval: usize) -> bool {
        self.ops += 1;
        if self.ops >= interval {
            self.ops = 0;
            true
        } else {
            false
        }
    }

    /// Closes the current window and returns the capacity to shrink to, if
    /// the queue has now been underused for long enough.
    pub(crate) fn close_window(
        &mut self,
        config: &FlexibleConfig,
        capacity: usize,
        live: usize,
    ) -> Option<usize> {
        let peak = mem::take(&mut self.peak).max(live);

        if peak >= config.low_water_mark(capacity) {
            self.quiet = 0;
            return None;
        }

        self.quiet += 1;
        if self.quiet < config.shrink_patience {
            return None;
        }

        self.quiet = 0;
        config.shrink_target(capacity, live)
    }

    /// Forgets all history, e.g. after a resize.
    #[inline]
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // Validation
    // ============================================================================

    #[test]
    fn defaults_are_valid() {
        assert!(FlexibleConfig::new(100).validate().is_ok());
        assert!(FlexibleConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_initial_capacity() {
        assert_eq!(
            FlexibleConfig::new(0).validate(),
            Err(ConfigError::Zero {
                name: "initial_capacity"
            })
        );
    }

    #[test]
    fn rejects_non_growing_factor() {
        let config = FlexibleConfig::new(8).with_growth_factor(1.0);
        assert_eq!(config.validate(), Err(ConfigError::GrowthFactor(1.0)));

        let config = FlexibleConfig::new(8).with_growth_factor(f64::NAN);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::GrowthFactor(_))
        ));
    }

    #[test]
    fn rejects_thresholds_without_margin() {
        let config = FlexibleConfig::new(8)
            .with_growth_factor(2.0)
            .with_low_water_fraction(0.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoHysteresis { .. })
        ));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let config = FlexibleConfig::new(8).with_min_capacity(16);
        assert_eq!(
            config.validate(),
            Err(ConfigError::MinAboveInitial { min: 16, initial: 8 })
        );

        let config = FlexibleConfig::new(8).with_max_capacity(4);
        assert_eq!(
            config.validate(),
            Err(ConfigError::MaxBelowInitial { max: 4, initial: 8 })
        );
    }

    // ============================================================================
    // Targets
    // ============================================================================

    #[test]
    fn grow_target_scales_and_caps() {
        let config = FlexibleConfig::new(4);
        assert_eq!(config.grow_target(4, usize::MAX), Some(8));
        assert_eq!(config.grow_target(100, 150), Some(150));
        assert_eq!(config.grow_target(150, 150), None);
    }

    #[test]
    fn grow_target_always_makes_progress() {
        let config = FlexibleConfig::new(1).with_growth_factor(1.1);
        assert_eq!(config.grow_target(1, usize::MAX), Some(2));
    }

    #[test]
    fn shrink_target_respects_floor_and_live() {
        let config = FlexibleConfig::new(64).with_min_capacity(16);
        assert_eq!(config.shrink_target(256, 10), Some(128));
        assert_eq!(config.shrink_target(32, 0), Some(16));
        assert_eq!(config.shrink_target(16, 0), None);
        assert_eq!(config.shrink_target(256, 200), Some(201));
        assert_eq!(config.shrink_target(256, 255), None);
    }

    #[test]
    fn max_slots_defaults_to_addressable() {
        let config = FlexibleConfig::new(4);
        assert_eq!(config.max_slots::<u64>(), isize::MAX as usize / 8);
        assert_eq!(config.with_max_capacity(32).max_slots::<u64>(), 32);
    }

    // ============================================================================
    // Shrink Monitor
    // ============================================================================

    #[test]
    fn monitor_shrinks_after_patience() {
        let config = FlexibleConfig::new(16)
            .with_shrink_interval(4)
            .with_shrink_patience(2);
        let mut monitor = ShrinkMonitor::default();

        // First quiet window: not yet.
        for _ in 0..3 {
            monitor.observe(1);
            assert!(!monitor.tick(config.shrink_interval));
        }
        assert!(monitor.tick(config.shrink_interval));
        assert_eq!(monitor.close_window(&config, 64, 1), None);

        // Second quiet window: shrink.
        for _ in 0..3 {
            assert!(!monitor.tick(config.shrink_interval));
        }
        assert!(monitor.tick(config.shrink_interval));
        assert_eq!(monitor.close_window(&config, 64, 1), Some(32));
    }

    #[test]
    fn busy_window_resets_patience() {
        let config = FlexibleConfig::new(16).with_shrink_patience(2);
        let mut monitor = ShrinkMonitor::default();

        assert_eq!(monitor.close_window(&config, 64, 0), None);
        monitor.observe(40);
        assert_eq!(monitor.close_window(&config, 64, 0), None);
        assert_eq!(monitor.close_window(&config, 64, 0), None);
        assert_eq!(monitor.close_window(&config, 64, 0), Some(32));
    }

    #[test]
    fn low_water_mark_rounds_up() {
        let config = FlexibleConfig::new(16);
        assert_eq!(config.low_water_mark(64), 16);
        assert_eq!(config.low_water_mark(10), 3);
        assert_eq!(config.low_water_mark(1), 1);

        // A peak exactly at the mark keeps the window busy.
        let config = config.with_shrink_patience(1);
        let mut monitor = ShrinkMonitor::default();
        monitor.observe(16);
        assert_eq!(monitor.close_window(&config, 64, 0), None);
        monitor.observe(15);
        assert_eq!(monitor.close_window(&config, 64, 0), Some(32));
    }
}
