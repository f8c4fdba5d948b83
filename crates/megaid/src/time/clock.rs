use core::time::Duration;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::time::{MEGAID_EPOCH, TimeSource};

fn unix_now() -> Duration {
    // A system clock set before 1970 reads as the origin.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

fn millis_since(now: Duration, epoch: Duration) -> u64 {
    let millis = now.saturating_sub(epoch).as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// A wall-clock time source reading [`SystemTime`] on every call.
///
/// Wall time can jump backward (NTP steps, manual changes). The
/// [`BitClock`] detects such jumps and refuses to issue IDs across them
/// instead of relying on this source to hide them.
///
/// Readings before the epoch saturate to `0`.
///
/// [`BitClock`]: crate::generator::BitClock
#[derive(Clone, Copy, Debug)]
pub struct WallClock {
    epoch: Duration,
}

impl Default for WallClock {
    /// Constructs a wall clock aligned to [`MEGAID_EPOCH`].
    fn default() -> Self {
        Self::with_epoch(MEGAID_EPOCH)
    }
}

impl WallClock {
    /// Constructs a wall clock using a custom epoch as the origin (t = 0),
    /// specified as a [`Duration`] since 1970-01-01 UTC.
    ///
    /// # Example
    ///
    /// ```
    /// use megaid::time::{TimeSource, UNIX_EPOCH_ORIGIN, WallClock};
    ///
    /// let clock = WallClock::with_epoch(UNIX_EPOCH_ORIGIN);
    /// let ts: u64 = clock.current_millis();
    /// assert!(ts > 0);
    /// ```
    pub const fn with_epoch(epoch: Duration) -> Self {
        Self { epoch }
    }

    /// The origin of this clock.
    pub const fn epoch(&self) -> Duration {
        self.epoch
    }
}

impl TimeSource<u64> for WallClock {
    fn current_millis(&self) -> u64 {
        millis_since(unix_now(), self.epoch)
    }
}

/// A monotonic time source that returns elapsed time since construction,
/// offset from a user-defined epoch.
///
/// This avoids wall-clock adjustments (e.g., NTP or daylight savings changes)
/// while still aligning timestamps to a fixed origin. The wall clock is read
/// exactly once, at construction; after that the clock advances with
/// [`Instant`] and never goes backward.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    start: Instant,
    epoch_offset: u64, // in milliseconds
}

impl Default for MonotonicClock {
    /// Constructs a monotonic clock aligned to [`MEGAID_EPOCH`].
    fn default() -> Self {
        Self::with_epoch(MEGAID_EPOCH)
    }
}

impl MonotonicClock {
    /// Constructs a monotonic clock anchored to `epoch`.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use megaid::time::{MonotonicClock, TimeSource, MEGAID_EPOCH};
    ///
    /// let clock = MonotonicClock::with_epoch(MEGAID_EPOCH);
    /// let a: u64 = clock.current_millis();
    /// std::thread::sleep(Duration::from_millis(2));
    /// let b: u64 = clock.current_millis();
    /// assert!(b >= a);
    /// ```
    pub fn with_epoch(epoch: Duration) -> Self {
        Self {
            start: Instant::now(),
            epoch_offset: millis_since(unix_now(), epoch),
        }
    }
}

impl TimeSource<u64> for MonotonicClock {
    fn current_millis(&self) -> u64 {
        let elapsed = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.epoch_offset.saturating_add(elapsed)
    }
}
