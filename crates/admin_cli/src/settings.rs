//! Settings for `tesoro_admin`.
//!
//! Read from `config/tesoro.toml` (or `--config`), then from `TESORO_*`
//! environment variables, then from command line flags. Nested keys use a
//! double underscore: `TESORO_AGENCY__MANUAL_BREAKDOWN=true`.

use config::{Config, ConfigError, Environment, File};
use engine::AgencyConfig;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/tesoro.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub log_level: String,
    pub agency: AgencyConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./tesoro.db?mode=rwc".to_string(),
            log_level: "info".to_string(),
            agency: AgencyConfig::default(),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("TESORO")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
