use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber.
///
/// Filtering comes from `RUST_LOG` and defaults to `warn`, so signature
/// failures and clock regressions are reported without extra flags. Logs go
/// to stderr; stdout carries command output only.
pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_line_number(true)
                .compact(),
        )
        .try_init()?;
    Ok(())
}
