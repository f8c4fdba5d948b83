use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    id::{IdParts, NumericId},
};

/// Bit widths of the three fields packed into a [`NumericId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldWidths {
    pub timestamp: u8,
    pub instance_id: u8,
    pub sequence: u8,
}

impl FieldWidths {
    /// Sum of all field widths.
    pub const fn total(&self) -> u8 {
        self.timestamp + self.instance_id + self.sequence
    }
}

/// The total width of a packed ID, and with it the field allocation.
///
/// Every allocation is checked at compile time to add up to its profile
/// width. Never change the profile of a deployment
/// after IDs were issued; IDs from different profiles do not sort against
/// each other.
///
/// ```text
///  Bits64:  | timestamp (42) | instance (10) | sequence (12) |
///  Bits52:  | timestamp (41) | instance (4)  | sequence (7)  |   <= 2^53 - 1
///  Bits32:  | timestamp (22) | instance (4)  | sequence (6)  |
/// ```
///
/// `Bits52` keeps every ID below `Number.MAX_SAFE_INTEGER` so it survives a
/// JavaScript round trip. `Bits32` trades lifespan for footprint: its
/// timestamp wraps every 2^22 ms (about 70 minutes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BitProfile {
    Bits32,
    Bits52,
    #[default]
    Bits64,
}

const WIDTHS_32: FieldWidths = FieldWidths {
    timestamp: 22,
    instance_id: 4,
    sequence: 6,
};

const WIDTHS_52: FieldWidths = FieldWidths {
    timestamp: 41,
    instance_id: 4,
    sequence: 7,
};

const WIDTHS_64: FieldWidths = FieldWidths {
    timestamp: 42,
    instance_id: 10,
    sequence: 12,
};

const _: () = assert!(WIDTHS_32.total() == 32);
const _: () = assert!(WIDTHS_52.total() == 52);
const _: () = assert!(WIDTHS_64.total() == 64);

const fn mask(bits: u8) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

impl BitProfile {
    /// All supported profiles, narrowest first.
    pub const ALL: [Self; 3] = [Self::Bits32, Self::Bits52, Self::Bits64];

    /// Total width of a packed ID.
    pub const fn bits(self) -> u8 {
        match self {
            Self::Bits32 => 32,
            Self::Bits52 => 52,
            Self::Bits64 => 64,
        }
    }

    /// Field allocation for this profile.
    pub const fn widths(self) -> FieldWidths {
        match self {
            Self::Bits32 => WIDTHS_32,
            Self::Bits52 => WIDTHS_52,
            Self::Bits64 => WIDTHS_64,
        }
    }

    /// Returns the maximum possible value for the timestamp field.
    pub const fn max_timestamp(self) -> u64 {
        mask(self.widths().timestamp)
    }

    /// Returns the maximum possible value for the instance ID field.
    pub const fn max_instance_id(self) -> u64 {
        mask(self.widths().instance_id)
    }

    /// Returns the maximum possible value for the sequence field.
    pub const fn max_sequence(self) -> u64 {
        mask(self.widths().sequence)
    }

    /// Returns the largest packed integer this profile can produce.
    pub const fn max_id(self) -> u64 {
        mask(self.bits())
    }

    /// Number of bits to shift the timestamp to its correct position.
    pub const fn timestamp_shift(self) -> u8 {
        let w = self.widths();
        w.instance_id + w.sequence
    }

    /// Number of bits to shift the instance ID to its correct position.
    pub const fn instance_id_shift(self) -> u8 {
        self.widths().sequence
    }

    /// Packs the three fields into a [`NumericId`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldOverflow`] if any field exceeds its width. Inputs
    /// are never truncated.
    ///
    /// # Example
    ///
    /// ```
    /// use megaid::id::BitProfile;
    ///
    /// let profile = BitProfile::Bits64;
    /// let id = profile.pack(1_000, 2, 1).unwrap();
    /// let parts = profile.unpack(id);
    /// assert_eq!((parts.timestamp, parts.instance_id, parts.sequence), (1_000, 2, 1));
    ///
    /// assert!(profile.pack(0, 1 << 10, 0).is_err());
    /// ```
    pub fn pack(self, timestamp: u64, instance_id: u64, sequence: u64) -> Result<NumericId> {
        check_field("timestamp", timestamp, self.max_timestamp())?;
        check_field("instance_id", instance_id, self.max_instance_id())?;
        check_field("sequence", sequence, self.max_sequence())?;

        let raw = (timestamp << self.timestamp_shift())
            | (instance_id << self.instance_id_shift())
            | sequence;
        Ok(NumericId::from_raw(raw))
    }

    /// Splits a [`NumericId`] into its fields.
    ///
    /// Bits above the profile width are ignored; use
    /// [`NumericId::from_raw_checked`] to reject such integers up front.
    pub const fn unpack(self, id: NumericId) -> IdParts {
        let raw = id.to_raw();
        IdParts {
            timestamp: (raw >> self.timestamp_shift()) & self.max_timestamp(),
            instance_id: (raw >> self.instance_id_shift()) & self.max_instance_id(),
            sequence: raw & self.max_sequence(),
        }
    }

    /// Returns `true` if `raw` fits in this profile.
    pub const fn contains(self, raw: u64) -> bool {
        raw <= self.max_id()
    }
}

fn check_field(field: &'static str, value: u64, max: u64) -> Result<()> {
    if value > max {
        return Err(Error::FieldOverflow { field, value, max });
    }
    Ok(())
}

impl TryFrom<u8> for BitProfile {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            32 => Ok(Self::Bits32),
            52 => Ok(Self::Bits52),
            64 => Ok(Self::Bits64),
            other => Err(Error::UnsupportedProfile {
                bits: u64::from(other),
            }),
        }
    }
}

impl From<BitProfile> for u8 {
    fn from(profile: BitProfile) -> Self {
        profile.bits()
    }
}

impl FromStr for BitProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bits: u64 = s
            .trim()
            .parse()
            .map_err(|_| Error::malformed(format!("bit profile is not a number: {s:?}")))?;
        u8::try_from(bits)
            .map_err(|_| Error::UnsupportedProfile { bits })
            .and_then(Self::try_from)
    }
}

impl fmt::Display for BitProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Packs `(timestamp, instance_id, sequence)` under `profile`.
///
/// Equivalent to [`BitProfile::pack`].
///
/// # Errors
///
/// Returns [`Error::FieldOverflow`] if any field exceeds its width.
pub fn pack(timestamp: u64, instance_id: u64, sequence: u64, profile: BitProfile) -> Result<NumericId> {
    profile.pack(timestamp, instance_id, sequence)
}

/// Splits `id` into its fields under `profile`.
///
/// Equivalent to [`BitProfile::unpack`].
pub const fn unpack(id: NumericId, profile: BitProfile) -> IdParts {
    profile.unpack(id)
}
