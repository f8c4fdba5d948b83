use core::time::Duration;

/// Default ID epoch: Wednesday, January 1, 2025 00:00:00 UTC
pub const MEGAID_EPOCH: Duration = Duration::from_millis(1_735_689_600_000);

/// Standard UNIX epoch: Thursday, January 1, 1970 00:00:00 UTC
pub const UNIX_EPOCH_ORIGIN: Duration = Duration::from_millis(0);

/// A trait for time sources that return a monotonic or wall-clock timestamp.
///
/// This abstraction allows you to plug in a real system clock, a monotonic
/// timer, or a mocked time source in tests.
///
/// The unit is expected to be **milliseconds** relative to the epoch the
/// source was built with.
///
/// # Example
///
/// ```
/// use megaid::time::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource<u64> for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// let time = FixedTime;
/// assert_eq!(time.current_millis(), 1234);
/// ```
pub trait TimeSource<T> {
    /// Returns the current time in milliseconds since the configured epoch.
    fn current_millis(&self) -> T;
}

impl<T, S: TimeSource<T> + ?Sized> TimeSource<T> for &S {
    fn current_millis(&self) -> T {
        (**self).current_millis()
    }
}

impl<T, S: TimeSource<T> + ?Sized> TimeSource<T> for std::sync::Arc<S> {
    fn current_millis(&self) -> T {
        (**self).current_millis()
    }
}
