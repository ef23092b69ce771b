//! Startup configuration.
//!
//! Read once from `config.json` (or `--config`), layered with
//! `QUEUEWATCH_`-prefixed environment variables:
//!
//! ```json
//! {
//!   "rabbitmq": {
//!     "username": "guest",
//!     "password": "guest",
//!     "host": "localhost",
//!     "port": "5672",
//!     "management_port": "15672"
//!   },
//!   "monitor": { "refresh_interval": "5s", "alert_cooldown": "60s" }
//! }
//! ```
//!
//! `QUEUEWATCH_RABBITMQ__PASSWORD=secret` overrides `rabbitmq.password`.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};

use crate::data::duration::parse_duration;
use crate::data::DEFAULT_BUFFER_CAPACITY;
use crate::error::ConfigError;

/// Default configuration file, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Complete application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub rabbitmq: BrokerSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
}

/// Broker connection fields.
#[derive(Clone, Deserialize)]
pub struct BrokerSettings {
    pub username: String,
    pub password: String,
    pub host: String,
    /// AMQP port (ports may be given as strings, as older config files do).
    pub port: u16,
    /// Management HTTP API port.
    pub management_port: u16,
    #[serde(default = "default_vhost")]
    pub vhost: String,
}

// Keep the password out of logs and panics.
impl std::fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("username", &self.username)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("management_port", &self.management_port)
            .field("vhost", &self.vhost)
            .finish()
    }
}

impl BrokerSettings {
    /// Base URL of the management API, e.g. `http://localhost:15672`.
    pub fn management_url(&self) -> String {
        format!("http://{}:{}", self.host, self.management_port)
    }

    /// Password-free AMQP address for display and logs.
    pub fn amqp_endpoint(&self) -> String {
        format!("amqp://{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Timing and buffering knobs. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Interval between sampling cycles.
    #[serde(deserialize_with = "deserialize_duration")]
    pub refresh_interval: Duration,
    /// Minimum time between two alert firings.
    #[serde(deserialize_with = "deserialize_duration")]
    pub alert_cooldown: Duration,
    /// Delay before a consumer retries a failed subscription.
    #[serde(deserialize_with = "deserialize_duration")]
    pub retry_delay: Duration,
    /// Upper bound for every network call (HTTP and broker).
    #[serde(deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,
    /// Messages retained per monitored queue.
    pub buffer_capacity: usize,
    /// Ring the terminal bell when an alert is raised.
    pub audible_alert: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
            alert_cooldown: Duration::from_secs(60),
            retry_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            audible_alert: true,
        }
    }
}

fn default_vhost() -> String {
    "/".to_string()
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

impl Settings {
    /// Load settings from `path` plus the environment.
    ///
    /// A missing file, malformed content or missing broker field is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix("QUEUEWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rabbitmq.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "rabbitmq.host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.rabbitmq.port == 0 {
            return Err(ConfigError::Invalid {
                key: "rabbitmq.port",
                reason: "must be a non-zero port".to_string(),
            });
        }
        if self.rabbitmq.management_port == 0 {
            return Err(ConfigError::Invalid {
                key: "rabbitmq.management_port",
                reason: "must be a non-zero port".to_string(),
            });
        }
        if self.monitor.refresh_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "monitor.refresh_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.monitor.request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "monitor.request_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_string_ports() {
        let file = write_config(
            r#"{"rabbitmq": {"username": "guest", "password": "guest",
                "host": "localhost", "port": "5672", "management_port": "15672"}}"#,
        );

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.rabbitmq.port, 5672);
        assert_eq!(settings.rabbitmq.management_port, 15672);
        assert_eq!(settings.rabbitmq.vhost, "/");
        assert_eq!(settings.rabbitmq.management_url(), "http://localhost:15672");
        assert_eq!(settings.monitor.refresh_interval, Duration::from_secs(5));
        assert_eq!(settings.monitor.alert_cooldown, Duration::from_secs(60));
    }

    #[test]
    fn test_load_monitor_section() {
        let file = write_config(
            r#"{"rabbitmq": {"username": "u", "password": "p", "host": "mq",
                "port": 5672, "management_port": 15672},
                "monitor": {"refresh_interval": "2s", "retry_delay": "500ms",
                "buffer_capacity": 50, "audible_alert": false}}"#,
        );

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.monitor.refresh_interval, Duration::from_secs(2));
        assert_eq!(settings.monitor.retry_delay, Duration::from_millis(500));
        assert_eq!(settings.monitor.buffer_capacity, 50);
        assert!(!settings.monitor.audible_alert);
        // Untouched fields keep their defaults
        assert_eq!(settings.monitor.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load(&dir.path().join("config.json"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_missing_broker_field_is_an_error() {
        let file = write_config(r#"{"rabbitmq": {"username": "guest", "host": "localhost"}}"#);
        assert!(Settings::load(file.path()).is_err());
    }

    #[test]
    fn test_malformed_duration_is_an_error() {
        let file = write_config(
            r#"{"rabbitmq": {"username": "u", "password": "p", "host": "mq",
                "port": 5672, "management_port": 15672},
                "monitor": {"refresh_interval": "soon"}}"#,
        );
        assert!(Settings::load(file.path()).is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let file = write_config(
            r#"{"rabbitmq": {"username": "u", "password": "hunter2", "host": "mq",
                "port": 5672, "management_port": 15672}}"#,
        );
        let settings = Settings::load(file.path()).unwrap();
        assert!(!format!("{:?}", settings).contains("hunter2"));
    }
}
