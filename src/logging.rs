//! Tracing subscriber set-up for the CLI and the HTTP service.

use tracing::info;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{AnalysisError, Result};

/// Environment variable taking precedence over `RUST_LOG` and the config filter.
pub const LOG_ENV: &str = "AEP_LOG";

/// Installs the global tracing subscriber, writing to stderr.
///
/// Filter precedence: `AEP_LOG`, then `RUST_LOG`, then `config.filter`.
/// An invalid environment directive falls back to the next source. Calling
/// this again after a subscriber is installed leaves the first one in place.
///
/// # Errors
///
/// `InvalidConfig` if no environment override is set and `config.filter`
/// is not a valid directive.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = filter_from_env().map_or_else(
        || {
            EnvFilter::try_new(&config.filter).map_err(|e| {
                AnalysisError::InvalidConfig(format!(
                    "logging.filter \"{}\" is not a valid directive: {e}",
                    config.filter
                ))
            })
        },
        Ok,
    )?;

    let fmt_layer = match config.format {
        LogFormat::Json => fmt::layer()
            .with_target(false)
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();
    if installed {
        info!(format = ?config.format, "tracing initialised");
    } else {
        info!("tracing subscriber already installed; keeping it");
    }
    Ok(())
}

fn filter_from_env() -> Option<EnvFilter> {
    for var in [LOG_ENV, EnvFilter::DEFAULT_ENV] {
        let Ok(directive) = std::env::var(var) else {
            continue;
        };
        match EnvFilter::try_new(&directive) {
            Ok(filter) => return Some(filter),
            Err(err) => eprintln!("invalid {var} directive ({err}); ignoring it"),
        }
    }
    None
}
