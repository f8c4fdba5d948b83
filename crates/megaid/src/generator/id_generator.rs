#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    error::{Error, Result},
    generator::{BitClock, Poll, Tick},
    id::{BitProfile, NumericId},
    time::TimeSource,
};

/// A generated ID together with the tick it was packed from.
///
/// `tick.timestamp` is the unmasked millisecond count, which matters for the
/// 32-bit profile where the packed timestamp wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StampedId {
    pub id: NumericId,
    pub tick: Tick,
}

/// A thread-safe Snowflake-style generator for one instance ID.
///
/// Ticks come from a [`BitClock`]; packing downstream of the tick is a pure
/// function and happens outside the lock.
///
/// Several generators may run side by side (e.g. one per tenant). Uniqueness
/// across generators relies on each having a distinct instance ID; assigning
/// those is the caller's job.
///
/// # Example
/// ```
/// use megaid::{generator::IdGenerator, id::BitProfile, time::MonotonicClock};
///
/// let generator = IdGenerator::new(BitProfile::Bits52, 3, MonotonicClock::default()).unwrap();
/// let a = generator.next_id_blocking().unwrap();
/// let b = generator.next_id_blocking().unwrap();
/// assert!(a.id < b.id);
/// assert_eq!(BitProfile::Bits52.unpack(a.id).instance_id, 3);
/// ```
pub struct IdGenerator<T>
where
    T: TimeSource<u64>,
{
    clock: BitClock<T>,
    profile: BitProfile,
    instance_id: u64,
}

impl<T> IdGenerator<T>
where
    T: TimeSource<u64>,
{
    /// Creates a generator for `instance_id` under `profile`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldOverflow`] if `instance_id` does not fit the
    /// profile's instance field.
    pub fn new(profile: BitProfile, instance_id: u64, time: T) -> Result<Self> {
        Self::with_clock(profile, instance_id, BitClock::new(time, profile.max_sequence()))
    }

    /// Creates a generator resuming after `last`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldOverflow`] if `instance_id` or `last.sequence`
    /// does not fit the profile.
    pub fn from_components(profile: BitProfile, instance_id: u64, last: Tick, time: T) -> Result<Self> {
        if last.sequence > profile.max_sequence() {
            return Err(Error::FieldOverflow {
                field: "sequence",
                value: last.sequence,
                max: profile.max_sequence(),
            });
        }
        let clock = BitClock::from_components(time, profile.max_sequence(), last);
        Self::with_clock(profile, instance_id, clock)
    }

    fn with_clock(profile: BitProfile, instance_id: u64, clock: BitClock<T>) -> Result<Self> {
        if instance_id > profile.max_instance_id() {
            return Err(Error::FieldOverflow {
                field: "instance_id",
                value: instance_id,
                max: profile.max_instance_id(),
            });
        }
        Ok(Self {
            clock,
            profile,
            instance_id,
        })
    }

    /// Sets the clock regression tolerance, see [`BitClock::with_tolerance`].
    #[must_use]
    pub fn with_tolerance(mut self, tolerance_ms: u64) -> Self {
        self.clock = self.clock.with_tolerance(tolerance_ms);
        self
    }

    pub fn profile(&self) -> BitProfile {
        self.profile
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// The tick source backing this generator.
    pub fn clock(&self) -> &BitClock<T> {
        &self.clock
    }

    fn stamp(&self, tick: Tick) -> Result<StampedId> {
        // The timestamp field wraps at 2^timestamp_bits.
        let timestamp = tick.timestamp & self.profile.max_timestamp();
        let id = self.profile.pack(timestamp, self.instance_id, tick.sequence)?;
        Ok(StampedId { id, tick })
    }

    /// Attempts to generate the next ID without blocking.
    ///
    /// # Errors
    ///
    /// See [`BitClock::try_poll_tick`].
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn try_poll_id(&self) -> Result<Poll<StampedId>> {
        match self.clock.try_poll_tick()? {
            Poll::Ready { value } => Ok(Poll::Ready {
                value: self.stamp(value)?,
            }),
            Poll::Pending { yield_for } => Ok(Poll::Pending { yield_for }),
        }
    }

    /// Generates the next ID, calling `f(yield_for)` while the clock must
    /// advance first.
    ///
    /// # Errors
    ///
    /// See [`BitClock::try_poll_tick`].
    pub fn next_id(&self, f: impl FnMut(u64)) -> Result<StampedId> {
        let tick = self.clock.next_tick(f)?;
        self.stamp(tick)
    }

    /// Generates the next ID, sleeping through sequence exhaustion.
    ///
    /// # Errors
    ///
    /// See [`BitClock::try_poll_tick`].
    pub fn next_id_blocking(&self) -> Result<StampedId> {
        let tick = self.clock.next_tick_blocking()?;
        self.stamp(tick)
    }
}
