use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::types::*;
use crate::error_handling::types::ConfigError;

pub const ENV_API_URL: &str = "CAPTURE_SYNC_API_URL";
pub const ENV_SESSION_ID: &str = "CAPTURE_SYNC_SESSION_ID";

const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;
const MAX_DEBOUNCE_MS: u64 = 10_000;
const MAX_WINDOW_SECS: u64 = 3_600;
const MAX_ITEM_BYTES: u64 = 1024 * MIB;

/// Runtime configuration, read from a TOML file.
///
/// ```toml
/// [persistence]
/// base_url = "https://inspections.example.com/api"
/// session_id = "insp-2041"
/// request_timeout_secs = 30
///
/// [limits]
/// max_recording_bytes = 10485760
/// max_screenshot_bytes = 10485760
///
/// [save]
/// debounce_ms = 300
/// reconciliation_window_secs = 60
/// ```
///
/// `[limits]` and `[save]` may be omitted. `CAPTURE_SYNC_API_URL` and
/// `CAPTURE_SYNC_SESSION_ID` override the matching `[persistence]` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub save: SaveConfig,
}

impl Config {
    /// Loads, applies environment overrides and validates.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        info!("Reading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        let mut config = Config::parse(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML without touching the environment or validating.
    pub fn parse(raw: &str) -> Result<Config, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            debug!("{} overrides persistence.base_url", ENV_API_URL);
            self.persistence.base_url = url;
        }
        if let Ok(session_id) = std::env::var(ENV_SESSION_ID) {
            debug!("{} overrides persistence.session_id", ENV_SESSION_ID);
            self.persistence.session_id = session_id;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.persistence.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingField("persistence.base_url".into()));
        }
        let parsed =
            Url::parse(url).map_err(|e| ConfigError::InvalidUrl(format!("{} ({})", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }
        if self.persistence.session_id.trim().is_empty() {
            return Err(ConfigError::MissingField("persistence.session_id".into()));
        }

        check_range(
            "persistence.request_timeout_secs",
            self.persistence.request_timeout_secs,
            MAX_REQUEST_TIMEOUT_SECS,
        )?;
        check_range(
            "limits.max_recording_bytes",
            self.limits.max_recording_bytes,
            MAX_ITEM_BYTES,
        )?;
        check_range(
            "limits.max_screenshot_bytes",
            self.limits.max_screenshot_bytes,
            MAX_ITEM_BYTES,
        )?;
        check_range("save.debounce_ms", self.save.debounce_ms, MAX_DEBOUNCE_MS)?;
        check_range(
            "save.reconciliation_window_secs",
            self.save.reconciliation_window_secs,
            MAX_WINDOW_SECS,
        )?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.persistence.request_timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.save.debounce_ms)
    }

    pub fn reconciliation_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.save.reconciliation_window_secs as i64)
    }
}

fn check_range(field: &str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value == 0 || value > max {
        return Err(ConfigError::NotInRange(format!(
            "{} = {} (expected 1..={})",
            field, value, max
        )));
    }
    Ok(())
}
