//! Time keeping for the bridge.
//!
//! All stamps flowing through the system come from one monotonic clock, so
//! staleness arithmetic (`now - last_valid`) is always well defined. The
//! clock can be mocked for tests, and a clone observes the same time as the
//! original, mocked or not.

use bincode::{Decode, Encode};
use quanta::{Clock, Instant, Mock};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};
use std::sync::Arc;
use std::time::Duration;

/// A duration in nanoseconds. Always positive to simplify reasoning on the
/// consumer side.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, Encode,
    Decode,
)]
pub struct BridgeDuration(pub u64);

/// A point in time is just a duration from the clock's reference time.
pub type BridgeTime = BridgeDuration;

impl BridgeDuration {
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Elapsed time since `earlier`, clamped to zero if `earlier` is in the
    /// future (a mocked clock can make that happen).
    pub fn elapsed_since(&self, earlier: BridgeTime) -> BridgeDuration {
        BridgeDuration(self.0.saturating_sub(earlier.0))
    }
}

impl From<Duration> for BridgeDuration {
    fn from(duration: Duration) -> Self {
        BridgeDuration(duration.as_nanos() as u64)
    }
}

impl From<BridgeDuration> for Duration {
    fn from(duration: BridgeDuration) -> Self {
        Duration::from_nanos(duration.0)
    }
}

impl Add for BridgeDuration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        BridgeDuration(self.0 + rhs.0)
    }
}

impl Sub for BridgeDuration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        BridgeDuration(self.0 - rhs.0)
    }
}

impl Display for BridgeDuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let nanos = self.0;
        if nanos >= 1_000_000_000 {
            write!(f, "{:.3} s", nanos as f64 / 1_000_000_000.0)
        } else if nanos >= 1_000_000 {
            write!(f, "{:.3} ms", nanos as f64 / 1_000_000.0)
        } else if nanos >= 1_000 {
            write!(f, "{:.3} µs", nanos as f64 / 1_000.0)
        } else {
            write!(f, "{nanos} ns")
        }
    }
}

/// The monotonic clock the bridge stamps everything with.
/// It starts at 0ns and increments monotonically from its creation.
#[derive(Clone, Debug)]
pub struct BridgeClock {
    inner: Clock,
    ref_time: Instant,
}

/// A handle controlling all the clones of a mocked [`BridgeClock`].
#[derive(Clone, Debug)]
pub struct BridgeClockMock(Arc<Mock>);

impl BridgeClockMock {
    pub fn increment(&self, amount: Duration) {
        self.0.increment(amount);
    }

    /// Current raw value of the mocked clock in nanoseconds.
    pub fn value(&self) -> u64 {
        self.0.value()
    }
}

impl BridgeClock {
    pub fn new() -> Self {
        let clock = Clock::new();
        let ref_time = clock.now();
        BridgeClock {
            inner: clock,
            ref_time,
        }
    }

    /// Builds a mocked clock pinned at 0ns and the handle to advance it.
    pub fn mock() -> (Self, BridgeClockMock) {
        let (clock, mock) = Clock::mock();
        let ref_time = clock.now();
        (
            BridgeClock {
                inner: clock,
                ref_time,
            },
            BridgeClockMock(mock),
        )
    }

    pub fn now(&self) -> BridgeTime {
        (self.inner.now() - self.ref_time).into()
    }
}

impl Default for BridgeClock {
    fn default() -> Self {
        Self::new()
    }
}
