//! Application-level configuration loading.

use std::{collections::HashMap, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::{
    bus::memory::RedeliveryPolicy,
    gateway::lookups::UserRole,
    scheduler::ReminderOffsets,
    state::round::TagNumber,
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ROUND_COORDINATOR_CONFIG_PATH";
/// Port used when neither the file nor `PORT` provides one.
const DEFAULT_PORT: u16 = 8080;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// How long a correlated lookup waits for its response.
    pub gateway_timeout: Duration,
    /// How often expired pending correlations are purged.
    pub sweep_interval: Duration,
    /// Retry behaviour of the in-memory bus.
    pub redelivery: RedeliveryPolicy,
    /// Lead times of the two reminders.
    pub reminders: ReminderOffsets,
    /// Demo lookup directory answered in-process, if any.
    pub directory: Option<DirectoryConfig>,
}

/// Tags and roles answered by the in-process lookup responders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DirectoryConfig {
    /// Ranking tag per user.
    #[serde(default)]
    pub tags: HashMap<String, TagNumber>,
    /// Permission role per user.
    #[serde(default)]
    pub roles: HashMap<String, UserRole>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    ///
    /// `PORT` overrides whatever port the file (or the defaults) provide.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        gateway_timeout_ms = config.gateway_timeout.as_millis() as u64,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        match env::var("PORT").ok().and_then(|value| value.parse().ok()) {
            Some(port) => Self { port, ..config },
            None => config,
        }
    }

    /// Parse a JSON document. Missing keys take their default value.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    port: u16,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    gateway_timeout_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    sweep_interval_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    redelivery_delay_ms: Duration,
    max_deliveries: u32,
    first_reminder_minutes: u32,
    second_reminder_minutes: u32,
    directory: Option<DirectoryConfig>,
}

impl Default for RawConfig {
    fn default() -> Self {
        let redelivery = RedeliveryPolicy::default();
        Self {
            port: DEFAULT_PORT,
            gateway_timeout_ms: Duration::from_secs(3),
            sweep_interval_ms: Duration::from_secs(1),
            redelivery_delay_ms: redelivery.delay,
            max_deliveries: redelivery.max_deliveries,
            first_reminder_minutes: 60,
            second_reminder_minutes: 30,
            directory: None,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            port: value.port,
            gateway_timeout: value.gateway_timeout_ms,
            sweep_interval: value.sweep_interval_ms,
            redelivery: RedeliveryPolicy {
                delay: value.redelivery_delay_ms,
                max_deliveries: value.max_deliveries.max(1),
            },
            reminders: ReminderOffsets {
                one_hour: time::Duration::minutes(value.first_reminder_minutes.into()),
                thirty_minutes: time::Duration::minutes(value.second_reminder_minutes.into()),
            },
            directory: value.directory,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.gateway_timeout, Duration::from_secs(3));
        assert_eq!(config.reminders, ReminderOffsets::default());
        assert!(config.directory.is_none());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let config = AppConfig::from_json(
            r#"{
                "gateway_timeout_ms": 250,
                "second_reminder_minutes": 15,
                "directory": { "tags": { "p1": 7 }, "roles": { "admin": "admin" } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.gateway_timeout, Duration::from_millis(250));
        assert_eq!(config.reminders.one_hour, time::Duration::hours(1));
        assert_eq!(config.reminders.thirty_minutes, time::Duration::minutes(15));
        let directory = config.directory.unwrap();
        assert_eq!(directory.tags.get("p1"), Some(&TagNumber(7)));
        assert_eq!(directory.roles.get("admin"), Some(&UserRole::Admin));
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(AppConfig::from_json(r#"{ "port": "eighty" }"#).is_err());
    }
}
