//! Signed metadata sections.
//!
//! A [`SignedBlob`] is a canonical JSON payload plus an HMAC-SHA256 tag. The
//! MAC input is domain separated by section:
//!
//! ```text
//! "megaid/v1/" || section || "\n" || payload
//! ```
//!
//! The section comes from the key's type, never from the blob, so an
//! immutable blob cannot be opened as a mutable one (or the other way around)
//! even if both keys happened to hold the same bytes.

use core::{fmt, str::FromStr};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    error::{Error, Result},
    keys::{AdminKey, SectionKey, SharedKey},
};

type HmacSha256 = Hmac<Sha256>;

const DOMAIN_PREFIX: &[u8] = b"megaid/v1/";

/// Which half of a record a blob belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Section {
    /// Sealed once at creation with the [`AdminKey`].
    Immutable,
    /// Re-sealed on every update with the [`SharedKey`].
    Mutable,
}

impl Section {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immutable => "immutable",
            Self::Mutable => "mutable",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload and the signature over it.
///
/// Nothing in `payload` is trustworthy until [`open`] succeeded.
///
/// Text form: `base64url(payload) "." base64url(signature)`, without padding.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SignedBlob {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl fmt::Debug for SignedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedBlob")
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .field("signature", &URL_SAFE_NO_PAD.encode(&self.signature))
            .finish()
    }
}

impl fmt::Display for SignedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&self.payload),
            URL_SAFE_NO_PAD.encode(&self.signature)
        )
    }
}

impl FromStr for SignedBlob {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (payload, signature) = s
            .split_once('.')
            .ok_or_else(|| Error::malformed("blob is missing the signature separator"))?;
        if signature.contains('.') {
            return Err(Error::malformed("blob has more than two segments"));
        }
        let decode = |segment: &str, what: &str| {
            URL_SAFE_NO_PAD
                .decode(segment)
                .map_err(|e| Error::malformed(format!("blob {what} is not base64url: {e}")))
        };
        Ok(Self {
            payload: decode(payload, "payload")?,
            signature: decode(signature, "signature")?,
        })
    }
}

fn mac_for(section: Section, key: &[u8], payload: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| Error::InvalidKey {
        reason: format!("hmac key rejected: {e}"),
    })?;
    mac.update(DOMAIN_PREFIX);
    mac.update(section.as_str().as_bytes());
    mac.update(b"\n");
    mac.update(payload);
    Ok(mac)
}

fn seal<K, P>(data: &P, key: &K) -> Result<SignedBlob>
where
    K: SectionKey,
    P: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(data).map_err(|e| Error::Encoding {
        reason: format!("{} payload: {e}", K::SECTION),
    })?;
    let signature = mac_for(K::SECTION, key.as_bytes(), &payload)?
        .finalize()
        .into_bytes()
        .to_vec();
    Ok(SignedBlob { payload, signature })
}

/// Signs `data` as an immutable section.
///
/// Called once per record, at creation.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if `data` cannot be serialized to JSON.
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
pub fn seal_immutable<P>(data: &P, key: &AdminKey) -> Result<SignedBlob>
where
    P: Serialize + ?Sized,
{
    seal(data, key)
}

/// Signs `data` as a mutable section.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if `data` cannot be serialized to JSON.
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
pub fn seal_mutable<P>(data: &P, key: &SharedKey) -> Result<SignedBlob>
where
    P: Serialize + ?Sized,
{
    seal(data, key)
}

/// Verifies `blob` under `key` and decodes its payload.
///
/// The signature is checked (in constant time) before the payload is parsed.
///
/// # Errors
///
/// - [`Error::SignatureInvalid`] on tampering, a wrong key, or a key of the
///   other section.
/// - [`Error::MalformedBlob`] if the verified payload is not the expected
///   JSON shape.
///
/// # Example
/// ```
/// use megaid::{envelope, keys::KeyPair, Error};
/// use serde_json::{Map, Value, json};
///
/// let keys = KeyPair::random();
/// let data = json!({"user": "a"});
/// let blob = envelope::seal_immutable(&data, keys.admin()).unwrap();
///
/// let opened: Value = envelope::open(&blob, keys.admin()).unwrap();
/// assert_eq!(opened, data);
///
/// let wrong: Result<Map<String, Value>, _> = envelope::open(&blob, keys.shared());
/// assert!(matches!(wrong, Err(Error::SignatureInvalid { .. })));
/// ```
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
pub fn open<K, P>(blob: &SignedBlob, key: &K) -> Result<P>
where
    K: SectionKey,
    P: DeserializeOwned,
{
    let mac = mac_for(K::SECTION, key.as_bytes(), &blob.payload)?;
    if mac.verify_slice(&blob.signature).is_err() {
        #[cfg(feature = "tracing")]
        tracing::warn!(section = %K::SECTION, "signature verification failed");
        return Err(Error::SignatureInvalid {
            section: K::SECTION,
        });
    }
    serde_json::from_slice(&blob.payload)
        .map_err(|e| Error::malformed(format!("{} payload: {e}", K::SECTION)))
}
