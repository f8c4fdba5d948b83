//! Key material for the two signing tiers.
//!
//! [`AdminKey`] seals immutable sections, [`SharedKey`] seals mutable ones.
//! The sealing functions in [`envelope`](crate::envelope) take one or the
//! other, so handing the shared key to an immutable seal does not compile.

use core::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    envelope::Section,
    error::{Error, Result},
    rand::ThreadRandom,
};

/// Length of every key in bytes.
pub const KEY_LEN: usize = 32;

/// Environment variable holding the encoded admin key.
pub const ADMIN_KEY_ENV: &str = "MEGAID_ADMIN_KEY";

/// Environment variable holding the encoded shared key.
pub const SHARED_KEY_ENV: &str = "MEGAID_SHARED_KEY";

const HKDF_SALT: &[u8] = b"megaid/v1";
const ADMIN_INFO: &[u8] = b"megaid/admin";
const SHARED_INFO: &[u8] = b"megaid/shared";

mod sealed {
    pub trait Sealed {}
}

/// A key bound to exactly one envelope section.
///
/// Implemented only by [`AdminKey`] and [`SharedKey`].
pub trait SectionKey: sealed::Sealed {
    /// The section this key seals and opens.
    const SECTION: Section;

    /// Raw key bytes.
    fn as_bytes(&self) -> &[u8];
}

macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident, $section:expr) => {
        $(#[$meta])*
        #[derive(Clone, Zeroize, ZeroizeOnDrop)]
        pub struct $name([u8; KEY_LEN]);

        impl $name {
            /// Wraps raw key bytes.
            pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
                Self(bytes)
            }

            /// Encodes the key as unpadded URL-safe base64.
            pub fn to_encoded(&self) -> String {
                URL_SAFE_NO_PAD.encode(self.0)
            }

            /// Decodes a key from URL-safe base64. Trailing `=` padding is
            /// accepted.
            ///
            /// # Errors
            ///
            /// Returns [`Error::InvalidKey`] on a bad alphabet or if the key
            /// is not exactly [`KEY_LEN`] bytes.
            pub fn from_encoded(encoded: &str) -> Result<Self> {
                let mut bytes = URL_SAFE_NO_PAD
                    .decode(encoded.trim().trim_end_matches('='))
                    .map_err(|e| Error::InvalidKey {
                        reason: format!("{}: {e}", stringify!($name)),
                    })?;
                if bytes.len() != KEY_LEN {
                    let len = bytes.len();
                    bytes.zeroize();
                    return Err(Error::InvalidKey {
                        reason: format!("{}: expected {KEY_LEN} bytes, got {len}", stringify!($name)),
                    });
                }
                let mut key = Self([0; KEY_LEN]);
                key.0.copy_from_slice(&bytes);
                bytes.zeroize();
                Ok(key)
            }
        }

        impl sealed::Sealed for $name {}

        impl SectionKey for $name {
            const SECTION: Section = $section;

            fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(<redacted>)"))
            }
        }
    };
}

define_key!(
    /// High-privilege key. Seals and opens immutable sections only.
    AdminKey,
    Section::Immutable
);

define_key!(
    /// Lower-privilege key. Seals and opens mutable sections only.
    SharedKey,
    Section::Mutable
);

/// The admin and shared keys of one deployment.
#[derive(Clone, Debug)]
pub struct KeyPair {
    admin: AdminKey,
    shared: SharedKey,
}

impl KeyPair {
    pub fn new(admin: AdminKey, shared: SharedKey) -> Self {
        Self { admin, shared }
    }

    /// Generates a key pair.
    ///
    /// - `None`: two independent keys from the CSPRNG.
    /// - `Some(master)`: both keys derived from `master` with HKDF-SHA256
    ///   under distinct labels. The same master always yields the same pair,
    ///   and neither derived key reveals the other.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if `master` is empty.
    pub fn generate(master_secret: Option<&[u8]>) -> Result<Self> {
        match master_secret {
            Some(master) => Self::derive(master),
            None => Ok(Self::random()),
        }
    }

    /// Two independent keys from the thread-local CSPRNG.
    pub fn random() -> Self {
        let rng = ThreadRandom;
        let mut keys = Self::zeroed();
        rng.fill_bytes(&mut keys.admin.0);
        rng.fill_bytes(&mut keys.shared.0);
        keys
    }

    /// Derives both keys from `master`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if `master` is empty.
    pub fn derive(master: &[u8]) -> Result<Self> {
        if master.is_empty() {
            return Err(Error::InvalidKey {
                reason: "master secret is empty".into(),
            });
        }
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), master);
        let mut keys = Self::zeroed();
        for (info, okm) in [(ADMIN_INFO, &mut keys.admin.0), (SHARED_INFO, &mut keys.shared.0)] {
            hk.expand(info, okm).map_err(|e| Error::InvalidKey {
                reason: format!("hkdf expand failed: {e}"),
            })?;
        }
        Ok(keys)
    }

    // Key bytes are written in place so no copy outlives the zeroizing drop.
    const fn zeroed() -> Self {
        Self {
            admin: AdminKey([0; KEY_LEN]),
            shared: SharedKey([0; KEY_LEN]),
        }
    }

    /// Decodes both keys from their base64 form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if either key fails to decode.
    pub fn from_encoded(admin: &str, shared: &str) -> Result<Self> {
        Ok(Self::new(
            AdminKey::from_encoded(admin)?,
            SharedKey::from_encoded(shared)?,
        ))
    }

    /// Reads both keys from [`ADMIN_KEY_ENV`] and [`SHARED_KEY_ENV`].
    ///
    /// Returns `Ok(None)` when neither variable is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if only one of them is set, or if either
    /// fails to decode.
    pub fn from_env() -> Result<Option<Self>> {
        let admin = std::env::var(ADMIN_KEY_ENV).ok();
        let shared = std::env::var(SHARED_KEY_ENV).ok();
        match (admin, shared) {
            (None, None) => Ok(None),
            (Some(admin), Some(shared)) => Self::from_encoded(&admin, &shared).map(Some),
            _ => Err(Error::InvalidKey {
                reason: format!("{ADMIN_KEY_ENV} and {SHARED_KEY_ENV} must be set together"),
            }),
        }
    }

    pub fn admin(&self) -> &AdminKey {
        &self.admin
    }

    pub fn shared(&self) -> &SharedKey {
        &self.shared
    }

    /// `.env` lines for both keys.
    pub fn to_env_lines(&self) -> String {
        format!(
            "{ADMIN_KEY_ENV}='{}'\n{SHARED_KEY_ENV}='{}'\n",
            self.admin.to_encoded(),
            self.shared.to_encoded()
        )
    }
}
