use core::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    envelope::{self, Section},
    error::{Error, Result},
    generator::IdGenerator,
    id::{BitProfile, NumericId},
    keys::KeyPair,
    rand::{RandSource, ThreadRandom},
    record::{CompoundRecord, DecodedId, ImmutablePayload, Metadata, MutablePayload, Token},
    time::{MEGAID_EPOCH, TimeSource, WallClock},
};

#[cfg(test)]
mod tests;

/// Construction parameters for [`MegaId`].
#[derive(Clone, Debug, PartialEq)]
pub struct MegaIdConfig {
    /// Fixed for the lifetime of the IDs issued under it.
    pub profile: BitProfile,
    /// Must fit `profile`. Not checked for uniqueness across deployments.
    pub instance_id: u64,
    /// Origin of the packed timestamps, as a [`Duration`] since the UNIX
    /// epoch.
    pub epoch: Duration,
    /// Immutable data used when `create` receives none.
    pub default_metadata: Option<Metadata>,
    /// Backward clock movement (ms) waited out instead of failing `create`.
    pub clock_tolerance_ms: u64,
}

impl Default for MegaIdConfig {
    fn default() -> Self {
        Self {
            profile: BitProfile::default(),
            instance_id: 0,
            epoch: MEGAID_EPOCH,
            default_metadata: None,
            clock_tolerance_ms: 0,
        }
    }
}

/// Issues, verifies and updates compound IDs.
///
/// One `MegaId` owns one [`KeyPair`] and one [`IdGenerator`]. All methods
/// take `&self`; the only lock is the generator's tick state, held for the
/// duration of one clock read.
///
/// # Example
/// ```
/// use megaid::{KeyPair, MegaId, MegaIdConfig};
/// use serde_json::json;
///
/// let service = MegaId::new(MegaIdConfig::default(), KeyPair::random()).unwrap();
///
/// let imm = json!({"user": "a"}).as_object().cloned();
/// let mt = json!({"status": "pending"}).as_object().cloned();
/// let token = service.create(imm, mt).unwrap().to_string();
///
/// let approved = json!({"status": "approved"}).as_object().cloned().unwrap();
/// let token = service.update(&token, approved).unwrap().to_string();
///
/// let record = service.read(&token).unwrap();
/// assert_eq!(record.immutable_data["user"], "a");
/// assert_eq!(record.mutable_data["status"], "approved");
/// assert!(record.date_updated >= record.date_created);
/// ```
pub struct MegaId<T = WallClock, R = ThreadRandom>
where
    T: TimeSource<u64>,
    R: RandSource<u32>,
{
    generator: IdGenerator<T>,
    keys: KeyPair,
    rng: R,
    epoch_ms: u64,
    default_metadata: Option<Metadata>,
}

impl MegaId {
    /// Creates a service reading the wall clock and the thread-local CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldOverflow`] if `config.instance_id` does not fit
    /// `config.profile`.
    pub fn new(config: MegaIdConfig, keys: KeyPair) -> Result<Self> {
        let clock = WallClock::with_epoch(config.epoch);
        Self::with_sources(config, keys, clock, ThreadRandom)
    }

    /// See [`KeyPair::generate`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if `master_secret` is empty.
    pub fn generate_keys(master_secret: Option<&[u8]>) -> Result<KeyPair> {
        KeyPair::generate(master_secret)
    }
}

impl<T, R> MegaId<T, R>
where
    T: TimeSource<u64>,
    R: RandSource<u32>,
{
    /// Creates a service over custom sources.
    ///
    /// `clock` must count milliseconds since `config.epoch`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldOverflow`] if `config.instance_id` does not fit
    /// `config.profile`.
    pub fn with_sources(config: MegaIdConfig, keys: KeyPair, clock: T, rng: R) -> Result<Self> {
        let generator = IdGenerator::new(config.profile, config.instance_id, clock)?
            .with_tolerance(config.clock_tolerance_ms);
        Ok(Self {
            generator,
            keys,
            rng,
            epoch_ms: u64::try_from(config.epoch.as_millis()).unwrap_or(u64::MAX),
            default_metadata: config.default_metadata,
        })
    }

    pub fn profile(&self) -> BitProfile {
        self.generator.profile()
    }

    pub fn instance_id(&self) -> u64 {
        self.generator.instance_id()
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    fn now_unix_ms(&self) -> u64 {
        self.epoch_ms
            .saturating_add(self.generator.clock().time().current_millis())
    }

    /// Issues a new compound ID.
    ///
    /// Missing or empty `immutable_data` falls back to the configured default
    /// metadata (a copy of it), and then to `{}`. Missing `mutable_data` is
    /// `{}`. Both dates are set to the creation time.
    ///
    /// Blocks for at most about one millisecond when the current tick's
    /// sequence space is exhausted.
    ///
    /// # Errors
    ///
    /// - [`Error::ClockRegression`] if the clock moved backward beyond the
    ///   configured tolerance.
    /// - [`Error::Encoding`] if a section cannot be serialized.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(profile = %self.profile())))]
    pub fn create(&self, immutable_data: Option<Metadata>, mutable_data: Option<Metadata>) -> Result<Token> {
        let immutable_data = match immutable_data {
            Some(data) if !data.is_empty() => data,
            _ => self.default_metadata.clone().unwrap_or_default(),
        };
        let stamped = self.generator.next_id_blocking()?;
        let date_created = self.epoch_ms.saturating_add(stamped.tick.timestamp);

        let immutable = envelope::seal_immutable(
            &ImmutablePayload {
                megaid: stamped.id,
                date_created,
                random_bits: self.rng.rand(),
                immutable_data,
            },
            self.keys.admin(),
        )?;
        let mutable = envelope::seal_mutable(
            &MutablePayload {
                megaid: stamped.id,
                date_updated: date_created,
                mutable_data: mutable_data.unwrap_or_default(),
            },
            self.keys.shared(),
        )?;

        #[cfg(feature = "tracing")]
        tracing::debug!(megaid = %stamped.id, "created");

        Ok(Token {
            megaid: stamped.id,
            immutable,
            mutable,
        })
    }

    /// Verifies and decodes a token.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedBlob`] if the token cannot be parsed, or its ID
    ///   does not fit this service's profile.
    /// - [`Error::SignatureInvalid`] if either section fails verification,
    ///   or the sections belong to different records.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn read(&self, token: &str) -> Result<CompoundRecord> {
        let token: Token = token.parse()?;
        self.verify(&token)
    }

    /// Verifies an already parsed token.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read`].
    pub fn verify(&self, token: &Token) -> Result<CompoundRecord> {
        let profile = self.profile();
        if !profile.contains(token.megaid.to_raw()) {
            return Err(Error::malformed(format!(
                "megaid {} is wider than the {profile}-bit profile",
                token.megaid
            )));
        }

        let immutable: ImmutablePayload = envelope::open(&token.immutable, self.keys.admin())?;
        let mutable: MutablePayload = envelope::open(&token.mutable, self.keys.shared())?;

        if immutable.megaid != token.megaid {
            return Err(spliced(Section::Immutable, token.megaid, immutable.megaid));
        }
        if mutable.megaid != immutable.megaid {
            return Err(spliced(Section::Mutable, immutable.megaid, mutable.megaid));
        }

        Ok(CompoundRecord {
            megaid: token.megaid,
            parts: profile.unpack(token.megaid),
            date_created: immutable.date_created,
            date_updated: mutable.date_updated,
            random_bits: immutable.random_bits,
            immutable_data: immutable.immutable_data,
            mutable_data: mutable.mutable_data,
        })
    }

    /// Replaces the mutable data of a verified token.
    ///
    /// The ID, `date_created`, `random_bits` and the immutable section are
    /// carried over byte for byte. `date_updated` becomes the current time,
    /// or stays at its previous value if the clock reads earlier than that.
    /// An update within the creation millisecond leaves
    /// `date_updated == date_created`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read`], plus [`Error::Encoding`].
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn update(&self, token: &str, mutable_data: Metadata) -> Result<Token> {
        let token: Token = token.parse()?;
        let record = self.verify(&token)?;
        self.reseal(token, record.date_updated, mutable_data)
    }

    /// Like [`Self::update`], but merges `changes` into the existing mutable
    /// data (top-level keys in `changes` win) instead of replacing it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update`].
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn patch(&self, token: &str, changes: Metadata) -> Result<Token> {
        let token: Token = token.parse()?;
        let record = self.verify(&token)?;
        let mut mutable_data = record.mutable_data;
        mutable_data.extend(changes);
        self.reseal(token, record.date_updated, mutable_data)
    }

    fn reseal(&self, token: Token, previous: u64, mutable_data: Metadata) -> Result<Token> {
        let date_updated = self.now_unix_ms().max(previous);
        let mutable = envelope::seal_mutable(
            &MutablePayload {
                megaid: token.megaid,
                date_updated,
                mutable_data,
            },
            self.keys.shared(),
        )?;
        Ok(Token { mutable, ..token })
    }

    /// Unpacks a bare numeric ID under this service's profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldOverflow`] if `raw` is wider than the profile.
    pub fn decode_id(&self, raw: u64) -> Result<DecodedId> {
        let profile = self.profile();
        let megaid = NumericId::from_raw_checked(raw, profile)?;
        let parts = profile.unpack(megaid);
        Ok(DecodedId {
            megaid,
            parts,
            date_created: self.epoch_ms.saturating_add(parts.timestamp),
        })
    }
}

#[cold]
fn spliced(section: Section, expected: NumericId, found: NumericId) -> Error {
    #[cfg(feature = "tracing")]
    tracing::warn!(%section, %expected, %found, "section belongs to another record");
    #[cfg(not(feature = "tracing"))]
    let _ = (expected, found);
    Error::SignatureInvalid { section }
}
