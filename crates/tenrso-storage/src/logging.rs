//! Subscriber setup for the storage engine's tracing events
//!
//! The library only emits events: `debug` for allocation, pack, unpack,
//! convert, slice and finalize summaries, `trace` for buffer growth.
//! Binaries that want them printed call [`init_tracing`] once at startup.
//!
//! `RUST_LOG` sets the filter (default `tenrso_storage=info,warn`) and
//! `TENRSO_LOG_FORMAT=json` switches from compact lines to JSON.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "tenrso_storage=info,warn";

/// Subscriber configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Filter directive (e.g., "tenrso_storage=trace")
    pub filter: String,
    /// Emit JSON lines instead of compact text
    pub json: bool,
}

impl TracingConfig {
    /// Reads `RUST_LOG` and `TENRSO_LOG_FORMAT`
    pub fn from_env() -> Self {
        Self {
            filter: std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            json: std::env::var("TENRSO_LOG_FORMAT")
                .is_ok_and(|format| format.eq_ignore_ascii_case("json")),
        }
    }
}

/// Installs the global subscriber. Fails if the filter does not parse or a
/// subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(EnvFilter::try_new(&config.filter)?);
    if config.json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer().compact()).try_init()?;
    }
    Ok(())
}
