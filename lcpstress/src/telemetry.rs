//! Tracing initialization.
//!
//! Logs go to stderr so the per-call lines and final report printed on stdout can be
//! collected from several parallel instances without interleaved diagnostics. The level is
//! controlled with `RUST_LOG` and defaults to `lcpstress=info`.

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lcpstress=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    info!("Telemetry initialized");
    Ok(())
}
