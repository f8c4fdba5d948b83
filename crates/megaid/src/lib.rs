//! Time-ordered numeric IDs bound to a signed, partly mutable metadata
//! envelope.
//!
//! A compound ID couples a Snowflake-style [`NumericId`] (timestamp, instance
//! and sequence packed under a 32, 52 or 64-bit [`BitProfile`]) with two
//! HMAC-sealed JSON sections:
//!
//! - the immutable section, sealed once by the [`AdminKey`](keys::AdminKey);
//! - the mutable section, re-sealed on every update by the
//!   [`SharedKey`](keys::SharedKey).
//!
//! [`MegaId`] ties the pieces together:
//!
//! ```
//! use megaid::{KeyPair, MegaId, MegaIdConfig, id::BitProfile};
//! use serde_json::json;
//!
//! let config = MegaIdConfig {
//!     profile: BitProfile::Bits52,
//!     instance_id: 1,
//!     ..MegaIdConfig::default()
//! };
//! let service = MegaId::new(config, KeyPair::random()).unwrap();
//!
//! let token = service
//!     .create(json!({"user": "a"}).as_object().cloned(), None)
//!     .unwrap()
//!     .to_string();
//! let record = service.read(&token).unwrap();
//! assert_eq!(record.parts.instance_id, 1);
//! assert!(record.megaid.to_raw() < 1 << 53);
//! ```

pub mod envelope;
pub mod error;
pub mod generator;
pub mod id;
pub mod keys;
pub mod rand;
pub mod record;
pub mod service;
pub mod time;

pub use crate::error::{Error, Result};
pub use crate::id::{BitProfile, IdParts, NumericId};
pub use crate::keys::KeyPair;
pub use crate::record::{CompoundRecord, DecodedId, Metadata, Token};
pub use crate::service::{MegaId, MegaIdConfig};
