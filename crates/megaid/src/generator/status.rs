/// Represents the result of attempting to take the next tick or ID.
///
/// - [`Poll::Ready`] indicates a new value was successfully produced.
/// - [`Poll::Pending`] means the generator is throttled and cannot produce a
///   new value until the clock advances by `yield_for` milliseconds.
///
/// This allows non-blocking generation loops and clean backoff strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll<T> {
    /// A unique value was produced and is ready to use.
    Ready {
        value: T,
    },
    /// No value could be produced because the sequence is exhausted for the
    /// current tick, or because the clock is briefly behind the last tick
    /// (within the configured tolerance).
    Pending {
        /// Milliseconds to wait before polling again.
        yield_for: u64,
    },
}

/// One `(timestamp, sequence)` pair handed out by a [`BitClock`].
///
/// `timestamp` is the full millisecond count since the clock's epoch; it is
/// only masked to the profile's timestamp width when packed.
///
/// [`BitClock`]: crate::generator::BitClock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick {
    pub timestamp: u64,
    pub sequence: u64,
}
