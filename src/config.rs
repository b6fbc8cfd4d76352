//! Service configuration.
//!
//! Values come from three layers, later layers winning:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file named by `RIPPLE_CONFIG`,
//! 3. environment variables (a `.env` file is loaded first via `dotenv`).
//!
//! ```toml
//! flush_interval_secs = 10
//!
//! [broker]
//! url = "mqtts://broker.example.net"
//! username = "ripple"
//!
//! [alert]
//! endpoint = "https://example.net/api/warn"
//! flow_threshold = 1200.0
//! ```

use std::path::Path;
use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;
use thiserror::Error;

use crate::alert::thresholds::ThresholdConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// `mqtt://host`, `mqtts://host:8883` or a bare host name.
    pub url: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: None,
            port: 8883,
            username: None,
            password: None,
            client_id: "ripple-monitor".to_string(),
            keep_alive_secs: 30,
        }
    }
}

/// Host, port and TLS flag extracted from a broker URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerConfig {
    /// Splits `url` into host, port and TLS flag. An explicit port in the URL
    /// wins over `port`; `mqtt://` disables TLS, everything else enables it.
    pub fn address(&self) -> Result<BrokerAddress, ConfigError> {
        let url = self.url.as_deref().ok_or(ConfigError::Missing("MQTT_CLIENT"))?;
        let invalid = || ConfigError::Invalid {
            key: "MQTT_CLIENT",
            value: url.to_string(),
        };

        let (tls, rest) = if let Some(rest) = url.strip_prefix("mqtts://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("ssl://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("mqtt://") {
            (false, rest)
        } else if let Some(rest) = url.strip_prefix("tcp://") {
            (false, rest)
        } else if url.contains("://") {
            return Err(invalid());
        } else {
            (true, url)
        };

        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (authority, self.port),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        Ok(BrokerAddress {
            host: host.to_string(),
            port,
            tls,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub pinata_jwt: Option<String>,
    /// Dedicated gateway host, e.g. `example.mypinata.cloud`.
    pub gateway_url: Option<String>,
    pub api_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pinata_jwt: None,
            gateway_url: None,
            api_url: "https://api.pinata.cloud".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub endpoint: Option<String>,
    pub cooldown_secs: u64,
    pub sustained_duration_secs: u64,
    pub flow_threshold: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            cooldown_secs: 600,
            sustained_duration_secs: 10,
            flow_threshold: 1000.0,
        }
    }
}

impl AlertConfig {
    /// Converts the second counts into detector durations. Counts that do not
    /// fit a `chrono::Duration` are rejected rather than wrapped.
    pub fn threshold_config(&self) -> Result<ThresholdConfig, ConfigError> {
        Ok(ThresholdConfig {
            sustained_duration: seconds_to_duration(
                "SUSTAINED_DURATION_SECS",
                self.sustained_duration_secs,
            )?,
            cooldown: seconds_to_duration("WARNING_COOLDOWN_SECS", self.cooldown_secs)?,
            flow_threshold: self.flow_threshold,
        })
    }
}

fn seconds_to_duration(key: &'static str, secs: u64) -> Result<chrono::Duration, ConfigError> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or(ConfigError::Invalid {
            key,
            value: secs.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub console_timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            console_timestamps: true,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.level.parse::<LevelFilter>().map_err(|_| ConfigError::Invalid {
            key: "LOG_LEVEL",
            value: self.level.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub broker: BrokerConfig,
    pub storage: StorageConfig,
    pub alert: AlertConfig,
    pub logging: LoggingConfig,
    /// Flush cadence. 120 in production, 10 for the fast variant.
    pub flush_interval_secs: u64,
    /// Timeout for the warning POST and every storage request.
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            storage: StorageConfig::default(),
            alert: AlertConfig::default(),
            logging: LoggingConfig::default(),
            flush_interval_secs: 120,
            http_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Loads `.env`, the optional `RIPPLE_CONFIG` file, then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let lookup = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        let mut config = match lookup("RIPPLE_CONFIG") {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies environment-style overrides through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MQTT_CLIENT") {
            self.broker.url = Some(v);
        }
        if let Some(v) = lookup("MQTT_PORT") {
            self.broker.port = parse_value("MQTT_PORT", &v)?;
        }
        if let Some(v) = lookup("MQTT_USERNAME") {
            self.broker.username = Some(v);
        }
        if let Some(v) = lookup("MQTT_PASSWORD") {
            self.broker.password = Some(v);
        }
        if let Some(v) = lookup("MQTT_CLIENT_ID") {
            self.broker.client_id = v;
        }

        if let Some(v) = lookup("PINATA_JWT") {
            self.storage.pinata_jwt = Some(v);
        }
        if let Some(v) = lookup("GATEWAY_URL") {
            self.storage.gateway_url = Some(v);
        }
        if let Some(v) = lookup("PINATA_API_URL") {
            self.storage.api_url = v;
        }

        if let Some(v) = lookup("FLUSH_INTERVAL_SECS") {
            self.flush_interval_secs = parse_value("FLUSH_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_value("HTTP_TIMEOUT_SECS", &v)?;
        }

        if let Some(v) = lookup("WARNING_ENDPOINT") {
            self.alert.endpoint = Some(v);
        }
        if let Some(v) = lookup("WARNING_COOLDOWN_SECS") {
            self.alert.cooldown_secs = parse_value("WARNING_COOLDOWN_SECS", &v)?;
        }
        if let Some(v) = lookup("SUSTAINED_DURATION_SECS") {
            self.alert.sustained_duration_secs = parse_value("SUSTAINED_DURATION_SECS", &v)?;
        }
        if let Some(v) = lookup("FLOW_THRESHOLD") {
            self.alert.flow_threshold = parse_value("FLOW_THRESHOLD", &v)?;
        }

        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("LOG_FILE") {
            self.logging.file = Some(v);
        }
        if let Some(v) = lookup("LOG_TIMESTAMPS") {
            self.logging.console_timestamps = parse_value("LOG_TIMESTAMPS", &v)?;
        }
        Ok(())
    }

    /// Checks everything the ingestion daemon needs.
    pub fn validate_daemon(&self) -> Result<(), ConfigError> {
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "FLUSH_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "HTTP_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }
        self.alert.threshold_config()?;
        if !self.alert.flow_threshold.is_finite() || self.alert.flow_threshold < 0.0 {
            return Err(ConfigError::Invalid {
                key: "FLOW_THRESHOLD",
                value: self.alert.flow_threshold.to_string(),
            });
        }
        self.broker.address()?;
        if self.alert.endpoint.is_none() {
            return Err(ConfigError::Missing("WARNING_ENDPOINT"));
        }
        self.logging.level_filter()?;
        self.validate_storage()
    }

    /// Checks the storage section only; enough for the read path.
    pub fn validate_storage(&self) -> Result<(), ConfigError> {
        if self.storage.pinata_jwt.is_none() {
            return Err(ConfigError::Missing("PINATA_JWT"));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn complete() -> Config {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("MQTT_CLIENT", "mqtts://broker.example.net"),
                ("PINATA_JWT", "jwt"),
                ("WARNING_ENDPOINT", "https://example.net/warn"),
            ]))
            .unwrap();
        config
    }

    #[test]
    fn test_defaults_match_production_cadence() {
        let config = Config::default();
        assert_eq!(config.flush_interval(), Duration::from_secs(120));
        assert_eq!(config.alert.cooldown_secs, 600);
        assert_eq!(config.alert.sustained_duration_secs, 10);
        assert_eq!(config.broker.port, 8883);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::from_toml(
            r#"
            flush_interval_secs = 120
            [alert]
            flow_threshold = 1200.0
            "#,
        )
        .unwrap();
        assert_eq!(config.alert.flow_threshold, 1200.0);

        config
            .apply_overrides(env(&[("FLUSH_INTERVAL_SECS", "10"), ("FLOW_THRESHOLD", "1500")]))
            .unwrap();
        assert_eq!(config.flush_interval_secs, 10);
        assert_eq!(config.alert.flow_threshold, 1500.0);
        assert_eq!(config.alert.cooldown_secs, 600, "untouched keys keep defaults");
    }

    #[test]
    fn test_unparseable_override_is_reported() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[("WARNING_COOLDOWN_SECS", "ten minutes")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "WARNING_COOLDOWN_SECS", .. }));
    }

    #[test]
    fn test_mistyped_toml_value_is_rejected() {
        let err = Config::from_toml("flush_interval_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_threshold_config_conversion() {
        let t = AlertConfig::default().threshold_config().unwrap();
        assert_eq!(t.cooldown, chrono::Duration::minutes(10));
        assert_eq!(t.sustained_duration, chrono::Duration::seconds(10));
    }

    #[test]
    fn test_oversized_durations_are_rejected_not_wrapped() {
        let mut config = complete();
        config
            .apply_overrides(env(&[("WARNING_COOLDOWN_SECS", "18446744073709551615")]))
            .unwrap();
        assert!(matches!(
            config.alert.threshold_config(),
            Err(ConfigError::Invalid { key: "WARNING_COOLDOWN_SECS", .. })
        ));
        assert!(config.validate_daemon().is_err());

        // Fits in i64 but not in a chrono::Duration.
        let alert = AlertConfig {
            sustained_duration_secs: 10_000_000_000_000_000,
            ..AlertConfig::default()
        };
        assert!(matches!(
            alert.threshold_config(),
            Err(ConfigError::Invalid { key: "SUSTAINED_DURATION_SECS", .. })
        ));
    }

    #[test]
    fn test_large_but_representable_cooldown_is_kept() {
        let alert = AlertConfig {
            cooldown_secs: 86_400 * 365,
            ..AlertConfig::default()
        };
        let t = alert.threshold_config().unwrap();
        assert_eq!(t.cooldown, chrono::Duration::days(365));
    }

    #[test]
    fn test_broker_address_parsing() {
        let mut broker = BrokerConfig {
            url: Some("mqtts://broker.example.net".to_string()),
            ..BrokerConfig::default()
        };
        assert_eq!(
            broker.address().unwrap(),
            BrokerAddress { host: "broker.example.net".to_string(), port: 8883, tls: true }
        );

        broker.url = Some("mqtt://localhost:1883".to_string());
        assert_eq!(
            broker.address().unwrap(),
            BrokerAddress { host: "localhost".to_string(), port: 1883, tls: false }
        );

        broker.url = Some("broker.example.net".to_string());
        assert!(broker.address().unwrap().tls);

        broker.url = Some("http://broker.example.net".to_string());
        assert!(broker.address().is_err());

        broker.url = Some("mqtt://host:notaport".to_string());
        assert!(broker.address().is_err());
    }

    #[test]
    fn test_daemon_validation() {
        assert!(complete().validate_daemon().is_ok());

        let mut missing_endpoint = complete();
        missing_endpoint.alert.endpoint = None;
        assert!(matches!(
            missing_endpoint.validate_daemon(),
            Err(ConfigError::Missing("WARNING_ENDPOINT"))
        ));

        let mut zero_interval = complete();
        zero_interval.flush_interval_secs = 0;
        assert!(zero_interval.validate_daemon().is_err());

        let mut zero_timeout = complete();
        zero_timeout.http_timeout_secs = 0;
        assert!(matches!(
            zero_timeout.validate_daemon(),
            Err(ConfigError::Invalid { key: "HTTP_TIMEOUT_SECS", .. })
        ));

        let mut bad_level = complete();
        bad_level.logging.level = "loud".to_string();
        assert!(bad_level.validate_daemon().is_err());
    }

    #[test]
    fn test_storage_validation_alone_is_enough_for_read_path() {
        let mut config = Config::default();
        assert!(matches!(config.validate_storage(), Err(ConfigError::Missing("PINATA_JWT"))));
        config.storage.pinata_jwt = Some("jwt".to_string());
        assert!(config.validate_storage().is_ok());
    }
}
