//! Configuration loading for the publisher.
//!
//! Sources, lowest precedence first:
//! - `config/default.{toml,yaml,json}` (optional)
//! - environment variables prefixed with `RABBITMQ_` (e.g. `RABBITMQ_URL`)
//!
//! `url` and `exchange` are required. When either is missing the problem is
//! logged and the default is used so the publisher can still start.

mod settings;

use config::{Config, Environment, File};
use tracing::warn;

use crate::utils::error::SettingsError;

pub use settings::{
    ConnectionConfig, DEFAULT_EXCHANGE, DEFAULT_RETRY_FLOOR, DEFAULT_URL,
    PartialConnectionConfig,
};

pub const ENV_PREFIX: &str = "RABBITMQ";

/// Loads the configuration from the default file and environment variables
/// and merges it with default values.
pub fn load_config() -> Result<ConnectionConfig, SettingsError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialConnectionConfig = config.try_deserialize()?;

    let (resolved, missing) = merge_with_defaults(partial);
    for field in missing {
        warn!(
            field,
            env = %format!("{ENV_PREFIX}_{}", field.to_uppercase()),
            "required setting missing, falling back to default"
        );
    }

    Ok(resolved)
}

/// Fills the gaps in `partial` from the defaults.
///
/// Returns the merged configuration and the names of required settings that
/// had to be defaulted. Blank strings count as missing.
pub fn merge_with_defaults(
    partial: PartialConnectionConfig,
) -> (ConnectionConfig, Vec<&'static str>) {
    let default = ConnectionConfig::default();
    let mut missing = Vec::new();

    let url = match partial.url.filter(|s| !s.trim().is_empty()) {
        Some(url) => url,
        None => {
            missing.push("url");
            default.url
        }
    };
    let exchange = match partial.exchange.filter(|s| !s.trim().is_empty()) {
        Some(exchange) => exchange,
        None => {
            missing.push("exchange");
            default.exchange
        }
    };

    let resolved = ConnectionConfig {
        url,
        exchange,
        retry_seconds: partial.retry_seconds.unwrap_or(default.retry_seconds),
        max_retry_seconds: partial
            .max_retry_seconds
            .unwrap_or(default.max_retry_seconds),
        backoff_factor: partial.backoff_factor.unwrap_or(default.backoff_factor),
        jitter_enabled: partial.jitter_enabled.unwrap_or(default.jitter_enabled),
        max_publish_retry: partial
            .max_publish_retry
            .unwrap_or(default.max_publish_retry),
        connect_timeout_secs: partial
            .connect_timeout_secs
            .unwrap_or(default.connect_timeout_secs),
        publish_timeout_secs: partial
            .publish_timeout_secs
            .unwrap_or(default.publish_timeout_secs),
    };

    (resolved, missing)
}
