use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Install the global subscriber. `logging_mode` picks the output shape:
/// `json` for machine-readable lines, `pretty` for multi-line development
/// output, anything else for the compact default. RUST_LOG still wins over
/// everything when set.
pub fn init(service_name: &str, logging_mode: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match logging_mode {
        "json" => fmt::layer().json().with_target(true).boxed(),
        "pretty" => fmt::layer().pretty().boxed(),
        _ => fmt::layer().compact().boxed(),
    };

    Registry::default().with(filter).with(fmt_layer).try_init()?;
    tracing::info!(service = service_name, mode = logging_mode, "logging initialized");
    Ok(())
}
