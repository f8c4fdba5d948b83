//! Token wire format and the decoded record view.

use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    envelope::SignedBlob,
    error::{Error, Result},
    id::{IdParts, NumericId},
};

/// Free-form section data: a JSON object.
pub type Metadata = Map<String, Value>;

/// What the admin key signs, once, at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImmutablePayload {
    pub megaid: NumericId,
    /// Milliseconds since the UNIX epoch.
    pub date_created: u64,
    pub random_bits: u32,
    pub immutable_data: Metadata,
}

/// What the shared key signs, at creation and on every update.
///
/// `megaid` repeats the record's ID so a mutable section cannot be moved onto
/// another record signed under the same keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MutablePayload {
    pub megaid: NumericId,
    /// Milliseconds since the UNIX epoch.
    pub date_updated: u64,
    pub mutable_data: Metadata,
}

/// A serialized compound ID: `<megaid>:<immutable blob>:<mutable blob>`.
///
/// Each blob is `base64url(payload).base64url(signature)`, so the token is
/// safe to carry in URLs and headers. Parsing a token checks its shape only;
/// nothing in it is trusted until [`MegaId::read`] verified it.
///
/// [`MegaId::read`]: crate::service::MegaId::read
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    pub megaid: NumericId,
    pub immutable: SignedBlob,
    pub mutable: SignedBlob,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.megaid, self.immutable, self.mutable)
    }
}

impl FromStr for Token {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split(':');
        let (Some(megaid), Some(immutable), Some(mutable), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::malformed("token must have exactly three ':'-separated parts"));
        };
        Ok(Self {
            megaid: megaid.parse()?,
            immutable: immutable.parse()?,
            mutable: mutable.parse()?,
        })
    }
}

/// A verified, fully decoded compound ID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundRecord {
    pub megaid: NumericId,
    pub parts: IdParts,
    pub date_created: u64,
    pub date_updated: u64,
    pub random_bits: u32,
    pub immutable_data: Metadata,
    pub mutable_data: Metadata,
}

/// A bare numeric ID unpacked without any envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedId {
    pub megaid: NumericId,
    pub parts: IdParts,
    /// ID epoch plus the packed timestamp, in UNIX milliseconds. Under the
    /// 32-bit profile the packed timestamp wraps, so this is only the offset
    /// within the current wrap period.
    pub date_created: u64,
}
