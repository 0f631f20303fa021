//! Service configuration
//!
//! Layered from defaults, an optional `coop.toml` and `COOP__`-prefixed
//! environment variables, e.g. `COOP__PORT=9000` or
//! `COOP__EXPOSURE__MAX_GUARANTEES=3`.

use serde::Deserialize;

use domain_loan::{ExposureLimits, LoanLimits};
use domain_savings::LedgerConfig;

/// Where accounts and loans are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local; state is lost on restart
    Memory,
}

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    /// Fallback filter when `RUST_LOG` is unset
    pub log_level: String,
    pub storage: StorageBackend,
    pub ledger: LedgerConfig,
    pub loan: LoanLimits,
    pub exposure: ExposureLimits,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/coop".to_string(),
            max_connections: 10,
            log_level: "info".to_string(),
            storage: StorageBackend::default(),
            ledger: LedgerConfig::default(),
            loan: LoanLimits::default(),
            exposure: ExposureLimits::default(),
        }
    }
}

impl AppConfig {
    /// Loads `coop.toml` (if present) and the environment over the defaults
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_builder(
            config::Config::builder()
                .add_source(config::File::with_name("coop").required(false))
                .add_source(config::Environment::with_prefix("COOP").separator("__")),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        builder.build()?.try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    #[test]
    fn test_defaults_match_policy_numbers() {
        let config = AppConfig::default();
        assert_eq!(config.exposure.max_guarantees, 5);
        assert_eq!(config.ledger.lock_timeout_ms, 5_000);
        assert_eq!(config.loan.max_term_months, 240);
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_partial_file_keeps_remaining_defaults() {
        let toml = r#"
            port = 9000
            storage = "memory"

            [exposure]
            max_guarantees = 3
        "#;
        let config = AppConfig::from_builder(
            Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.exposure.max_guarantees, 3);
        assert_eq!(config.exposure.max_exposure, ExposureLimits::default().max_exposure);
        assert_eq!(config.host, "0.0.0.0");
    }
}
