/// A source of random integers.
///
/// [`MegaId`](crate::MegaId) draws each record's `random_bits` from one of
/// these. Tests substitute a fixed value to get reproducible tokens.
///
/// # Example
/// ```
/// use megaid::rand::RandSource;
///
/// struct FixedBits;
/// impl RandSource<u32> for FixedBits {
///     fn rand(&self) -> u32 {
///         0xdead_beef
///     }
/// }
///
/// assert_eq!(FixedBits.rand(), 0xdead_beef);
/// ```
pub trait RandSource<T> {
    fn rand(&self) -> T;
}
