use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use megaid::{BitProfile, KeyPair, MegaId, MegaIdConfig, Metadata};
use serde_json::Value;

/// Command-line options for the `megaid` binary.
///
/// Every option can also be set through the environment (or a `.env` file in
/// the working directory).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "megaid",
    version,
    about = "Issue, inspect and update signed compound IDs"
)]
pub struct CliArgs {
    /// Base64url admin key. Falls back to `MEGAID_ADMIN_KEY` when no master
    /// secret is given either.
    ///
    /// Not read through clap's env support so the value never shows up in
    /// `--help`.
    #[arg(long, global = true)]
    pub admin_key: Option<String>,

    /// Base64url shared key. Falls back to `MEGAID_SHARED_KEY`.
    #[arg(long, global = true)]
    pub shared_key: Option<String>,

    /// Derive both keys from this secret instead of loading them. Takes
    /// precedence over `MEGAID_ADMIN_KEY`/`MEGAID_SHARED_KEY`, and cannot be
    /// combined with `--admin-key`/`--shared-key`.
    ///
    /// Environment variable: `MEGAID_MASTER_SECRET`
    #[arg(long, env = "MEGAID_MASTER_SECRET", hide_env_values = true, global = true)]
    pub master_secret: Option<String>,

    /// ID width: 32, 52 or 64. Must stay the same for every ID ever issued
    /// under one deployment.
    ///
    /// Environment variable: `MEGAID_BIT_SIZE`
    #[arg(long, env = "MEGAID_BIT_SIZE", default_value_t = BitProfile::Bits64, global = true)]
    pub bit_size: BitProfile,

    /// Instance number packed into every ID. Must be unique per concurrently
    /// running generator.
    ///
    /// Environment variable: `MEGAID_INSTANCE_ID`
    #[arg(long, env = "MEGAID_INSTANCE_ID", default_value_t = 0, global = true)]
    pub instance_id: u64,

    /// JSON object used as immutable data when `create` receives none.
    ///
    /// Environment variable: `MEGAID_DEFAULT_METADATA`
    #[arg(long, env = "MEGAID_DEFAULT_METADATA", value_parser = parse_object, global = true)]
    pub default_metadata: Option<Metadata>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate a key pair and print it as `.env` lines.
    Keygen {
        /// Append the keys to this file instead of printing them.
        #[arg(long)]
        write: Option<PathBuf>,
    },
    /// Issue a new compound ID and print its token.
    Create {
        /// Immutable data, a JSON object.
        #[arg(long, value_parser = parse_object)]
        immutable: Option<Metadata>,
        /// Mutable data, a JSON object.
        #[arg(long, value_parser = parse_object)]
        mutable: Option<Metadata>,
        /// JSON file with optional `immutable` and `mutable` objects.
        #[arg(long, conflicts_with_all = ["immutable", "mutable"])]
        file: Option<PathBuf>,
    },
    /// Verify and print a token, or unpack a bare numeric ID.
    Decode {
        /// A full token, or just the numeric ID.
        value: String,
    },
    /// Replace the mutable data of a token.
    Update {
        token: String,
        /// New mutable data, a JSON object.
        #[arg(long, value_parser = parse_object)]
        mutable: Metadata,
    },
    /// Merge changes into the mutable data of a token.
    Patch {
        token: String,
        /// Top-level keys to set, a JSON object.
        #[arg(long, value_parser = parse_object)]
        changes: Metadata,
    },
}

/// Validated settings derived from [`CliArgs`].
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub service: MegaIdConfig,
    pub keys: Option<KeyPair>,
    pub master_secret: Option<String>,
    pub command: Command,
}

impl CliConfig {
    /// Builds the service, failing if no keys are configured.
    pub fn service(&self) -> anyhow::Result<MegaId> {
        let Some(keys) = self.keys.clone() else {
            bail!(
                "no keys configured: set MEGAID_ADMIN_KEY and MEGAID_SHARED_KEY \
                 (see `megaid keygen`) or MEGAID_MASTER_SECRET"
            );
        };
        Ok(MegaId::new(self.service.clone(), keys)?)
    }
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let max_instance_id = args.bit_size.max_instance_id();
        if args.instance_id > max_instance_id {
            bail!(
                "MEGAID_INSTANCE_ID ({}) exceeds the {}-bit profile's instance space (max = {})",
                args.instance_id,
                args.bit_size,
                max_instance_id
            );
        }

        let keys = resolve_keys(
            args.admin_key.as_deref(),
            args.shared_key.as_deref(),
            args.master_secret.as_deref(),
            KeyPair::from_env,
        )?;

        Ok(Self {
            service: MegaIdConfig {
                profile: args.bit_size,
                instance_id: args.instance_id,
                default_metadata: args.default_metadata,
                ..MegaIdConfig::default()
            },
            keys,
            master_secret: args.master_secret,
            command: args.command,
        })
    }
}

/// Picks the key pair from, in order: the `--admin-key`/`--shared-key`
/// flags, the master secret, then the environment.
///
/// A master secret given alongside explicit keys is rejected. The
/// environment is only consulted when neither is given.
fn resolve_keys(
    admin: Option<&str>,
    shared: Option<&str>,
    master_secret: Option<&str>,
    from_env: impl FnOnce() -> megaid::Result<Option<KeyPair>>,
) -> anyhow::Result<Option<KeyPair>> {
    match (admin, shared, master_secret) {
        (Some(_), Some(_), Some(_)) => {
            bail!("--master-secret conflicts with --admin-key/--shared-key")
        }
        (Some(admin), Some(shared), None) => Ok(Some(
            KeyPair::from_encoded(admin, shared).context("invalid key on the command line")?,
        )),
        (Some(_), None, _) | (None, Some(_), _) => {
            bail!("--admin-key and --shared-key must be given together")
        }
        (None, None, Some(master)) => Ok(Some(
            KeyPair::derive(master.as_bytes()).context("invalid master secret")?,
        )),
        (None, None, None) => from_env().context("invalid key in the environment"),
    }
}

/// Parses a JSON object.
pub fn parse_object(raw: &str) -> Result<Metadata, String> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {other}")),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}
