//! Tracing subscriber setup.
//!
//! Console output, optional file output, either as text or JSON. `RUST_LOG`
//! takes precedence over the configured level.

use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::debug;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Filter used when `RUST_LOG` is unset.
pub fn default_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::new(config.log_level.to_string().to_ascii_lowercase())
}

/// Installs the global subscriber described by `config`.
///
/// Calling this a second time leaves the first subscriber in place.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_env_filter(config));

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.log_to_console {
        let console = fmt::layer().with_target(true).with_thread_names(true);
        layers.push(if config.json_format {
            console.json().boxed()
        } else {
            console.boxed()
        });
    }

    if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            ProtocolError::ConfigError("log_file_path must be set when log_to_file is true".into())
        })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open log file: {e}")))?;

        let file_layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(true);
        layers.push(if config.json_format {
            file_layer.json().boxed()
        } else {
            file_layer.boxed()
        });
    }

    if tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .is_err()
    {
        debug!(app = %config.app_name, "Global subscriber already installed");
    }
    Ok(())
}
