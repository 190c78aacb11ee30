//! Clock and time types for pipeline synchronization.
//!
//! This module provides:
//! - [`ClockTime`]: A nanosecond timestamp type (8 bytes, Copy)
//! - [`Clock`]: Trait for time sources
//! - [`SystemClock`]: Monotonic system clock
//! - [`PipelineClock`]: Pipeline timing context with base time

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// ============================================================================
// ClockTime
// ============================================================================

/// Time in nanoseconds (8 bytes, Copy).
///
/// Represents time as nanoseconds since an arbitrary epoch (usually pipeline
/// start). `ClockTime::NONE` is the invalid/unset sentinel carried by buffers
/// that have no timestamp.
///
/// # Examples
///
/// ```rust
/// use weft::clock::ClockTime;
///
/// let t1 = ClockTime::from_secs(1);
/// let t2 = ClockTime::from_millis(500);
/// let t3 = t1 + t2;
///
/// assert_eq!(t3.millis(), 1500);
/// assert_eq!(format!("{}", t3), "1.500s");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClockTime(u64);

impl ClockTime {
    /// Zero time.
    pub const ZERO: Self = Self(0);

    /// Maximum representable time (one less than the NONE sentinel).
    pub const MAX: Self = Self(u64::MAX - 1);

    /// Invalid/unset time (sentinel value).
    pub const NONE: Self = Self(u64::MAX);

    /// Create from nanoseconds.
    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    /// Create from microseconds.
    #[inline]
    pub const fn from_micros(us: u64) -> Self {
        Self(us.saturating_mul(1_000))
    }

    /// Create from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// Create from seconds.
    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Self(s.saturating_mul(1_000_000_000))
    }

    /// Get as nanoseconds.
    #[inline]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Get as microseconds (truncated).
    #[inline]
    pub const fn micros(self) -> u64 {
        self.0 / 1_000
    }

    /// Get as milliseconds (truncated).
    #[inline]
    pub const fn millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Get as seconds (truncated).
    #[inline]
    pub const fn secs(self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Check if this is the NONE sentinel value.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }

    /// Check if this is a valid time (not NONE).
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != u64::MAX
    }

    /// Convert to Option, returning None for the NONE sentinel.
    #[inline]
    pub const fn to_option(self) -> Option<Self> {
        if self.is_none() { None } else { Some(self) }
    }

    /// Saturating addition. Returns NONE if either operand is NONE.
    #[inline]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        if self.is_none() || rhs.is_none() {
            return Self::NONE;
        }
        let result = self.0.saturating_add(rhs.0);
        // Must not overflow into the NONE sentinel.
        if result == u64::MAX { Self::MAX } else { Self(result) }
    }

    /// Saturating subtraction. Returns NONE if either operand is NONE.
    #[inline]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        if self.is_none() || rhs.is_none() {
            return Self::NONE;
        }
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Checked subtraction. Returns None if either operand is NONE or on underflow.
    #[inline]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        if self.is_none() || rhs.is_none() {
            return None;
        }
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Convert to a 90 kHz tick count (MPEG PTS/DTS and RTP video clock).
    #[inline]
    pub const fn to_90khz(self) -> u64 {
        if self.is_none() {
            return 0;
        }
        self.0 / (1_000_000_000 / 90_000)
    }

    /// Create from a 90 kHz tick count.
    #[inline]
    pub const fn from_90khz(ticks: u64) -> Self {
        Self(ticks.saturating_mul(1_000_000_000 / 90_000))
    }
}

impl std::ops::Add for ClockTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl std::ops::AddAssign for ClockTime {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl std::ops::Sub for ClockTime {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl From<Duration> for ClockTime {
    #[inline]
    fn from(d: Duration) -> Self {
        Self(d.as_nanos() as u64)
    }
}

impl From<ClockTime> for Duration {
    #[inline]
    fn from(t: ClockTime) -> Self {
        if t.is_none() {
            Duration::ZERO
        } else {
            Duration::from_nanos(t.0)
        }
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            write!(f, "NONE")
        } else {
            let secs = self.secs();
            let ms = (self.0 / 1_000_000) % 1000;
            write!(f, "{}.{:03}s", secs, ms)
        }
    }
}

// ============================================================================
// Clock Trait
// ============================================================================

/// A clock that provides the current time.
///
/// Implementations must be monotonic (time never goes backwards).
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> ClockTime;

    /// Get a human-readable name for the clock.
    fn name(&self) -> &str {
        "unknown"
    }
}

// ============================================================================
// SystemClock
// ============================================================================

/// System monotonic clock.
///
/// Uses `std::time::Instant`. Time is relative to when the clock was created.
pub struct SystemClock {
    epoch: Instant,
    name: String,
}

impl SystemClock {
    /// Create a new system clock with the current instant as epoch.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            name: "system-monotonic".to_string(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> ClockTime {
        ClockTime::from_nanos(self.epoch.elapsed().as_nanos() as u64)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// PipelineClock
// ============================================================================

/// Pipeline timing context.
///
/// Manages pipeline time with a base time (when the pipeline started).
///
/// - **Clock time**: absolute time from the clock
/// - **Base time**: clock time when the pipeline started
/// - **Running time**: clock time − base time
pub struct PipelineClock {
    clock: Arc<dyn Clock>,
    /// Base time; u64::MAX means not started.
    base_time: AtomicU64,
}

impl PipelineClock {
    /// Create a new pipeline clock with the given clock source.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            base_time: AtomicU64::new(u64::MAX),
        }
    }

    /// Create a pipeline clock using the system monotonic clock.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }

    /// Start the pipeline clock (set base time to now).
    pub fn start(&self) {
        self.base_time
            .store(self.clock.now().nanos(), Ordering::Release);
    }

    /// Reset the pipeline clock (clear base time).
    pub fn reset(&self) {
        self.base_time.store(u64::MAX, Ordering::Release);
    }

    /// Check if the pipeline clock has been started.
    #[inline]
    pub fn is_started(&self) -> bool {
        self.base_time.load(Ordering::Acquire) != u64::MAX
    }

    /// Get the base time. Returns `ClockTime::NONE` if not started.
    #[inline]
    pub fn base_time(&self) -> ClockTime {
        ClockTime(self.base_time.load(Ordering::Acquire))
    }

    /// Get the current clock time.
    #[inline]
    pub fn clock_time(&self) -> ClockTime {
        self.clock.now()
    }

    /// Get the running time (time since the pipeline started).
    ///
    /// Returns `ClockTime::NONE` if the clock has not been started.
    pub fn running_time(&self) -> ClockTime {
        let base = self.base_time();
        if base.is_none() {
            return ClockTime::NONE;
        }
        self.clock.now().saturating_sub(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_time_conversions() {
        let t = ClockTime::from_millis(1500);
        assert_eq!(t.secs(), 1);
        assert_eq!(t.millis(), 1500);
        assert_eq!(t.micros(), 1_500_000);
        assert_eq!(t.nanos(), 1_500_000_000);
    }

    #[test]
    fn test_clock_time_none() {
        assert!(ClockTime::NONE.is_none());
        assert!(!ClockTime::ZERO.is_none());
        assert_eq!(ClockTime::NONE.to_option(), None);
        assert_eq!(format!("{}", ClockTime::NONE), "NONE");
    }

    #[test]
    fn test_clock_time_arithmetic() {
        let a = ClockTime::from_secs(2);
        let b = ClockTime::from_millis(500);
        assert_eq!((a + b).millis(), 2500);
        assert_eq!((a - b).millis(), 1500);

        // NONE poisons arithmetic
        assert!((ClockTime::NONE + a).is_none());
        assert!((a - ClockTime::NONE).is_none());
    }

    #[test]
    fn test_clock_time_90khz() {
        let t = ClockTime::from_millis(40);
        assert_eq!(t.to_90khz(), 3600);
        assert_eq!(ClockTime::from_90khz(3600).millis(), 40);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_pipeline_clock_running_time() {
        let clock = PipelineClock::system();
        assert!(!clock.is_started());
        assert!(clock.running_time().is_none());

        clock.start();
        assert!(clock.is_started());
        let r1 = clock.running_time();
        let r2 = clock.running_time();
        assert!(r1.is_some());
        assert!(r2 >= r1);

        clock.reset();
        assert!(!clock.is_started());
    }
}
