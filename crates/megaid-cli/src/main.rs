mod config;
mod telemetry;

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::Path,
};

use anyhow::{Context, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Parser;
use config::{CliArgs, CliConfig, Command};
use megaid::{KeyPair, MegaId, Metadata, keys::ADMIN_KEY_ENV};
use serde_json::Value;
use telemetry::init_telemetry;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    init_telemetry()?;

    match &config.command {
        Command::Keygen { write } => keygen(config.master_secret.as_deref(), write.as_deref()),
        Command::Create {
            immutable,
            mutable,
            file,
        } => {
            let (immutable, mutable) = match file {
                Some(path) => read_create_file(path)?,
                None => (immutable.clone(), mutable.clone()),
            };
            let token = config.service()?.create(immutable, mutable)?;
            tracing::info!(megaid = %token.megaid, "created");
            println!("{token}");
            Ok(())
        }
        Command::Decode { value } => decode(&config, value),
        Command::Update { token, mutable } => {
            let token = config.service()?.update(token, mutable.clone())?;
            println!("{token}");
            Ok(())
        }
        Command::Patch { token, changes } => {
            let token = config.service()?.patch(token, changes.clone())?;
            println!("{token}");
            Ok(())
        }
    }
}

fn keygen(master_secret: Option<&str>, write: Option<&Path>) -> anyhow::Result<()> {
    let keys = MegaId::generate_keys(master_secret.map(str::as_bytes))?;
    let lines = keys.to_env_lines();

    let Some(path) = write else {
        print!("{lines}");
        return Ok(());
    };

    match fs::read_to_string(path) {
        Ok(existing) if holds_admin_key(&existing) => {
            bail!("{} already holds {ADMIN_KEY_ENV}; refusing to overwrite keys", path.display());
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(lines.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), derived = master_secret.is_some(), "keys written");
    Ok(())
}

/// Whether a `.env` body assigns [`ADMIN_KEY_ENV`] itself, not just a
/// variable sharing its prefix.
fn holds_admin_key(env_file: &str) -> bool {
    env_file.lines().any(|line| {
        let line = line.trim_start();
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
        line.strip_prefix(ADMIN_KEY_ENV)
            .is_some_and(|rest| rest.trim_start().starts_with('='))
    })
}

fn read_create_file(path: &Path) -> anyhow::Result<(Option<Metadata>, Option<Metadata>)> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let Value::Object(mut root) = serde_json::from_str::<Value>(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?
    else {
        bail!("{} must contain a JSON object", path.display());
    };

    let mut section = |name: &str| -> anyhow::Result<Option<Metadata>> {
        match root.remove(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => bail!("`{name}` in {} must be an object, got {other}", path.display()),
        }
    };
    Ok((section("immutable")?, section("mutable")?))
}

fn decode(config: &CliConfig, value: &str) -> anyhow::Result<()> {
    if value.contains(':') {
        let record = config.service()?.read(value)?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        println!("date_created: {}", utc(record.date_created));
        println!("date_updated: {}", utc(record.date_updated));
        return Ok(());
    }

    let raw: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{value:?} is neither a token nor a numeric ID"))?;
    // A bare ID carries no signatures, so any key pair will do.
    let keys = config.keys.clone().unwrap_or_else(KeyPair::random);
    let service = MegaId::new(config.service.clone(), keys)?;
    let decoded = service.decode_id(raw)?;

    println!("{}", service.profile().layout(decoded.megaid));
    println!("{}", serde_json::to_string_pretty(&decoded)?);
    println!("date_created: {}", utc(decoded.date_created));
    Ok(())
}

/// Formats UNIX milliseconds as ISO-8601 UTC, or the raw value if it is out
/// of chrono's range.
fn utc(unix_ms: u64) -> String {
    i64::try_from(unix_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map_or_else(
            || format!("{unix_ms} ms"),
            |dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
}
