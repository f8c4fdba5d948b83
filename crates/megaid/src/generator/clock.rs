use core::{cmp::Ordering, time::Duration};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    error::{Error, Result},
    generator::{Mutex, Poll, Tick},
    time::TimeSource,
};

/// A tick source pairing a clock with a per-millisecond sequence counter.
///
/// The last handed-out [`Tick`] is the only mutable state and lives behind a
/// single mutex; the clock is read inside the same critical section, so two
/// callers can never observe each other's ticks as a clock regression.
///
/// Per call:
/// - same millisecond as the last tick: the sequence increments, or the call
///   returns [`Poll::Pending`] once it reaches `max_sequence`.
/// - later millisecond: the sequence resets to zero.
/// - earlier millisecond: [`Error::ClockRegression`] unless the regression is
///   within the tolerance window, in which case the call is `Pending` until
///   the clock catches up. The default tolerance is `0`, so any backward step
///   is an error.
pub struct BitClock<T>
where
    T: TimeSource<u64>,
{
    state: Mutex<Option<Tick>>,
    time: T,
    max_sequence: u64,
    tolerance_ms: u64,
}

impl<T> BitClock<T>
where
    T: TimeSource<u64>,
{
    /// Creates a clock with no history and zero regression tolerance.
    ///
    /// The first tick starts at sequence `0`.
    pub fn new(time: T, max_sequence: u64) -> Self {
        Self {
            state: Mutex::new(None),
            time,
            max_sequence,
            tolerance_ms: 0,
        }
    }

    /// Creates a clock that resumes after `last`, e.g. state restored from
    /// persistent storage.
    pub fn from_components(time: T, max_sequence: u64, last: Tick) -> Self {
        Self {
            state: Mutex::new(Some(last)),
            time,
            max_sequence,
            tolerance_ms: 0,
        }
    }

    /// Sets how many milliseconds of backward clock movement are waited out
    /// instead of failing.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance_ms: u64) -> Self {
        self.tolerance_ms = tolerance_ms;
        self
    }

    /// The configured regression tolerance in milliseconds.
    pub fn tolerance_ms(&self) -> u64 {
        self.tolerance_ms
    }

    /// The largest sequence handed out within one millisecond.
    pub fn max_sequence(&self) -> u64 {
        self.max_sequence
    }

    /// The underlying time source.
    pub fn time(&self) -> &T {
        &self.time
    }

    /// The last tick handed out, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying lock has been poisoned.
    pub fn last_tick(&self) -> Result<Option<Tick>> {
        #[cfg(feature = "parking-lot")]
        let state = self.state.lock();
        #[cfg(not(feature = "parking-lot"))]
        let state = self.state.lock()?;
        Ok(*state)
    }

    /// Attempts to take the next tick without blocking.
    ///
    /// # Returns
    /// - `Ok(Poll::Ready { value })`: a new, unique tick
    /// - `Ok(Poll::Pending { yield_for })`: the time to wait (in milliseconds)
    ///   before trying again
    ///
    /// # Errors
    /// - [`Error::ClockRegression`] if the clock is behind the last tick by
    ///   more than the tolerance. The state is left untouched.
    /// - [`Error::LockPoisoned`] if the underlying lock has been poisoned.
    ///
    /// # Example
    /// ```
    /// use megaid::generator::{BitClock, Poll};
    /// use megaid::time::TimeSource;
    ///
    /// struct FixedTime;
    /// impl TimeSource<u64> for FixedTime {
    ///     fn current_millis(&self) -> u64 {
    ///         7
    ///     }
    /// }
    ///
    /// let clock = BitClock::new(FixedTime, 1);
    /// assert!(matches!(clock.try_poll_tick(), Ok(Poll::Ready { .. })));
    /// assert!(matches!(clock.try_poll_tick(), Ok(Poll::Ready { .. })));
    /// assert_eq!(clock.try_poll_tick(), Ok(Poll::Pending { yield_for: 1 }));
    /// ```
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn try_poll_tick(&self) -> Result<Poll<Tick>> {
        #[cfg(feature = "parking-lot")]
        let mut state = self.state.lock();
        #[cfg(not(feature = "parking-lot"))]
        let mut state = self.state.lock()?;

        let now = self.time.current_millis();
        let Some(last) = *state else {
            let tick = Tick {
                timestamp: now,
                sequence: 0,
            };
            *state = Some(tick);
            return Ok(Poll::Ready { value: tick });
        };

        match now.cmp(&last.timestamp) {
            Ordering::Equal => {
                if last.sequence < self.max_sequence {
                    let tick = Tick {
                        timestamp: now,
                        sequence: last.sequence + 1,
                    };
                    *state = Some(tick);
                    Ok(Poll::Ready { value: tick })
                } else {
                    Ok(Poll::Pending { yield_for: 1 })
                }
            }
            Ordering::Greater => {
                let tick = Tick {
                    timestamp: now,
                    sequence: 0,
                };
                *state = Some(tick);
                Ok(Poll::Ready { value: tick })
            }
            Ordering::Less => self.cold_clock_behind(now, last.timestamp),
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(&self, now: u64, last: u64) -> Result<Poll<Tick>> {
        let behind = last - now;
        if behind <= self.tolerance_ms {
            return Ok(Poll::Pending { yield_for: behind });
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(last, now, tolerance_ms = self.tolerance_ms, "clock regression");
        Err(Error::ClockRegression { last, now })
    }

    /// Takes the next tick, calling `f(yield_for)` whenever the clock must
    /// advance first. The lock is not held while `f` runs.
    ///
    /// # Errors
    ///
    /// Same as [`Self::try_poll_tick`].
    pub fn next_tick(&self, mut f: impl FnMut(u64)) -> Result<Tick> {
        loop {
            match self.try_poll_tick()? {
                Poll::Ready { value } => break Ok(value),
                Poll::Pending { yield_for } => f(yield_for),
            }
        }
    }

    /// Takes the next tick, sleeping the current thread through sequence
    /// exhaustion. The wait is bounded by about one tick (or the tolerance
    /// window).
    ///
    /// # Errors
    ///
    /// Same as [`Self::try_poll_tick`].
    pub fn next_tick_blocking(&self) -> Result<Tick> {
        self.next_tick(|yield_for| std::thread::sleep(Duration::from_millis(yield_for)))
    }
}
