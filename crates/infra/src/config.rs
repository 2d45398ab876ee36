//! Engine configuration.
//!
//! Loaded in layers:
//! 1. Defaults in code
//! 2. `config/<environment>.toml` (optional)
//! 3. Environment variables with the `SITEOPS_` prefix, `__` between levels
//!    (`SITEOPS_DATABASE__URL`, `SITEOPS_TRANSACTION_TIMEOUT_MS`)

use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use siteops_observability::LogFormat;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Current environment (development, production, ...)
    pub environment: String,

    /// Budget for one engine operation, transaction body and commit included.
    pub transaction_timeout_ms: u64,

    pub log_format: LogFormat,

    pub database: DatabaseConfig,

    pub dispatch: DispatchConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; unset means no database is configured.
    pub url: Option<String>,

    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Let handout create an inventory record from the line's site purchase
    /// when nothing else resolves.
    pub allow_inventory_seeding: bool,
}

impl EngineConfig {
    /// Load configuration from files and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("SITEOPS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        with_defaults(config::Config::builder(), &environment)?
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(
                Environment::with_prefix("SITEOPS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults overlaid with a TOML document.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        with_defaults(config::Config::builder(), "development")?
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
    environment: &str,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default("environment", environment)?
        .set_default("transaction_timeout_ms", 5_000)?
        .set_default("log_format", "json")?
        .set_default("database.max_connections", 10)?
        .set_default("dispatch.allow_inventory_seeding", true)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            transaction_timeout_ms: 5_000,
            log_format: LogFormat::Json,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
            },
            dispatch: DispatchConfig {
                allow_inventory_seeding: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = EngineConfig::from_toml("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.transaction_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn file_values_override_defaults() {
        let cfg = EngineConfig::from_toml(
            r#"
            transaction_timeout_ms = 250
            log_format = "pretty"

            [database]
            url = "postgres://localhost/siteops"

            [dispatch]
            allow_inventory_seeding = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.transaction_timeout_ms, 250);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.database.url.as_deref(), Some("postgres://localhost/siteops"));
        assert_eq!(cfg.database.max_connections, 10);
        assert!(!cfg.dispatch.allow_inventory_seeding);
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(EngineConfig::from_toml("log_format = \"xml\"").is_err());
    }
}
