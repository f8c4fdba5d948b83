use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    id::BitProfile,
};

/// A packed Snowflake-style identifier.
///
/// A `NumericId` is just its integer: equality and ordering are integer
/// equality and ordering. The field layout is not stored with the value, it
/// comes from the [`BitProfile`] the ID was packed with.
///
/// Serializes as its native integer.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NumericId {
    id: u64,
}

impl NumericId {
    /// Wraps a raw integer without checking it against a profile.
    pub const fn from_raw(raw: u64) -> Self {
        Self { id: raw }
    }

    /// Wraps a raw integer, rejecting values wider than `profile`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldOverflow`] if `raw` sets bits above the profile
    /// width.
    pub fn from_raw_checked(raw: u64, profile: BitProfile) -> Result<Self> {
        if !profile.contains(raw) {
            return Err(Error::FieldOverflow {
                field: "id",
                value: raw,
                max: profile.max_id(),
            });
        }
        Ok(Self::from_raw(raw))
    }

    /// Converts this type into its raw type representation
    pub const fn to_raw(&self) -> u64 {
        self.id
    }

    /// Returns the ID as a zero-padded 20-digit string.
    pub fn to_padded_string(&self) -> String {
        format!("{:020}", self.id)
    }
}

impl fmt::Display for NumericId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for NumericId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NumericId").field(&self.id).finish()
    }
}

impl FromStr for NumericId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u64>()
            .map(Self::from_raw)
            .map_err(|_| Error::malformed(format!("numeric id is not an unsigned integer: {s:?}")))
    }
}

impl From<NumericId> for u64 {
    fn from(id: NumericId) -> Self {
        id.to_raw()
    }
}

/// The unpacked fields of a [`NumericId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdParts {
    /// Milliseconds since the generator epoch, masked to the field width.
    pub timestamp: u64,
    pub instance_id: u64,
    pub sequence: u64,
}
