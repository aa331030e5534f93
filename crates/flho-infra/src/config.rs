//! Service configuration loader.
//!
//! Reads the TOML file named on the command line and deserializes it into
//! [`ServiceConfig`]. Falls back to defaults when the file is missing or
//! malformed, then applies environment overrides.

use std::path::Path;

use flho_types::config::ServiceConfig;

/// Replaces `database.url` when set.
pub const DATABASE_URL_ENV: &str = "FLHO_DATABASE_URL";

/// Load the service configuration from `path`.
///
/// - If the file does not exist, starts from [`ServiceConfig::default()`].
/// - If the file exists but cannot be read or parsed, logs a warning and
///   starts from the default.
/// - `FLHO_DATABASE_URL` overrides the database URL in every case.
pub async fn load_service_config(path: &Path) -> ServiceConfig {
    let config = read_config_file(path).await;
    apply_env_overrides(config, |key| std::env::var(key).ok())
}

async fn read_config_file(path: &Path) -> ServiceConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return ServiceConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return ServiceConfig::default();
        }
    };

    match toml::from_str::<ServiceConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            ServiceConfig::default()
        }
    }
}

/// Apply overrides looked up through `lookup` (the process environment in
/// production).
pub fn apply_env_overrides(
    mut config: ServiceConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ServiceConfig {
    if let Some(url) = lookup(DATABASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
        tracing::debug!("database url taken from {DATABASE_URL_ENV}");
        config.database.url = url;
    }
    config
}
