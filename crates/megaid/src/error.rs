use crate::envelope::Section;

/// A result type defaulting to the crate [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `megaid` can emit.
///
/// The first four variants are the ones callers are expected to branch on:
///
/// - [`Error::ClockRegression`] fails the affected `create` call. It is not
///   retried automatically since retrying immediately observes the same clock.
/// - [`Error::FieldOverflow`] is a caller bug (e.g. an instance ID wider than
///   the configured [`BitProfile`]).
/// - [`Error::SignatureInvalid`] is a security event. Nothing from the section
///   is trusted, not even fields that look intact.
/// - [`Error::MalformedBlob`] means the input could not be parsed at all.
///
/// [`BitProfile`]: crate::id::BitProfile
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The clock moved backward further than the configured tolerance.
    #[error("clock moved backward: last tick {last} ms, now {now} ms")]
    ClockRegression {
        /// Last timestamp handed out by the generator.
        last: u64,
        /// The timestamp the clock reported afterwards.
        now: u64,
    },

    /// A value does not fit in its bit field.
    #[error("{field} overflow: {value} exceeds max {max}")]
    FieldOverflow {
        /// Name of the field, e.g. `"instance_id"` or `"id"` for a whole ID.
        field: &'static str,
        /// The rejected value.
        value: u64,
        /// Largest value the field can hold.
        max: u64,
    },

    /// Signature verification failed, or the verified sections do not belong
    /// to the same record.
    #[error("signature invalid for {section} section")]
    SignatureInvalid {
        /// The section that failed.
        section: Section,
    },

    /// The token or one of its sections could not be parsed.
    #[error("malformed blob: {reason}")]
    MalformedBlob {
        /// What failed to parse.
        reason: String,
    },

    /// Key material has the wrong length or encoding.
    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },

    /// A bit width that is not one of 32, 52 or 64.
    #[error("unsupported bit profile: {bits} (expected 32, 52 or 64)")]
    UnsupportedProfile { bits: u64 },

    /// A section payload could not be serialized.
    #[error("encoding failed: {reason}")]
    Encoding { reason: String },

    /// The operation failed because the tick lock was **poisoned**.
    ///
    /// This occurs when a thread panics while holding the lock. When the
    /// `parking-lot` feature is enabled, mutexes do **not** poison, so this
    /// variant is not available.
    #[cfg_attr(docsrs, doc(cfg(not(feature = "parking-lot"))))]
    #[cfg(not(feature = "parking-lot"))]
    #[error("tick lock poisoned")]
    LockPoisoned,
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedBlob {
            reason: reason.into(),
        }
    }
}

#[cfg(not(feature = "parking-lot"))]
use std::sync::{MutexGuard, PoisonError};
#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}
