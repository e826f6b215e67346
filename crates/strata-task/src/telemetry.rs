//! Tracing initialisation shared by the Strata binaries.
//!
//! Call [`init_tracing`] once at process start. Safe to call more than
//! once — subsequent calls are silently ignored, since the global
//! subscriber can only be installed once per process.

use std::env;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// How the process-wide subscriber is configured. Binaries build this from
/// their own flags (`--json`, `-v`); embedding applications from whatever
/// configuration they carry.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    /// Emit newline-delimited JSON log lines instead of the human-readable
    /// format.
    pub json: bool,
    /// Default verbosity when no filter variable is set.
    pub level: Level,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            json: false,
            level: Level::INFO,
        }
    }
}

impl TelemetryOptions {
    pub fn new(json: bool, level: Level) -> Self {
        Self { json, level }
    }
}

/// Initialise the global tracing subscriber.
///
/// Filter precedence: `STRATA_LOG` wins, then `RUST_LOG`, then
/// `options.level`. The Strata-specific variable exists so a deployment
/// can tune this process without disturbing the `RUST_LOG` its other Rust
/// services read.
pub fn init_tracing(options: &TelemetryOptions) {
    let env_filter = env::var("STRATA_LOG")
        .ok()
        .or_else(|| env::var("RUST_LOG").ok())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(options.level.as_str()));

    if options.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}
