//! Daemon configuration
//!
//! Two inputs, both read once at startup:
//!
//! - the queue mapping file (`config.json`)
//! - broker settings, layered with the `config` crate: the
//!   `RabbitMqServerSettings` section of an optional `appsettings.json`,
//!   overridden by `RABBITMQ__SERVER`, `RABBITMQ__SERVERPORT`,
//!   `RABBITMQ__USERNAME` and `RABBITMQ__PASSWORD`

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use event_consumer_core::application::worker::constants::MAX_IN_FLIGHT_FORWARDS;
use event_consumer_core::domain::{BrokerSettings, ConsumerConfig, DEFAULT_BROKER_PORT};
use event_consumer_infra_http::DEFAULT_REQUEST_TIMEOUT;

const DEFAULT_CONFIG_PATH: &str = "config.json";
const DEFAULT_SETTINGS_PATH: &str = "appsettings.json";
const BROKER_SECTION: &str = "RabbitMqServerSettings";
const BROKER_ENV_PREFIX: &str = "RABBITMQ";

/// Everything the composition root needs
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub consumer: ConsumerConfig,
    pub broker: BrokerSettings,
    pub http_timeout: Duration,
    pub probe_on_startup: bool,
    pub max_in_flight: usize,
}

impl DaemonConfig {
    /// Load from the process environment
    ///
    /// # Environment Variables
    ///
    /// - `EVENT_CONSUMER_CONFIG`: queue mapping file (default: config.json)
    /// - `EVENT_CONSUMER_SETTINGS`: broker settings file (default: appsettings.json, optional)
    /// - `EVENT_CONSUMER_HTTP_TIMEOUT_SECS`: forward timeout (default: 300)
    /// - `EVENT_CONSUMER_PROBE`: `false` disables the startup connectivity check
    /// - `EVENT_CONSUMER_MAX_IN_FLIGHT`: concurrent forwards per queue (default: 1)
    pub fn from_env() -> Result<Self> {
        let config_path = std::env::var("EVENT_CONSUMER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let settings_path = std::env::var("EVENT_CONSUMER_SETTINGS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_PATH));

        let http_timeout = match std::env::var("EVENT_CONSUMER_HTTP_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("Invalid EVENT_CONSUMER_HTTP_TIMEOUT_SECS: {raw}"))?,
            ),
            Err(_) => DEFAULT_REQUEST_TIMEOUT,
        };

        let probe_on_startup = std::env::var("EVENT_CONSUMER_PROBE")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);

        let max_in_flight = parse_max_in_flight(std::env::var("EVENT_CONSUMER_MAX_IN_FLIGHT").ok())?;

        Ok(Self {
            consumer: load_consumer_config(&config_path)?,
            broker: load_broker_settings(&settings_path, None)?,
            http_timeout,
            probe_on_startup,
            max_in_flight,
        })
    }
}

fn parse_max_in_flight(raw: Option<String>) -> Result<usize> {
    let Some(raw) = raw else {
        return Ok(MAX_IN_FLIGHT_FORWARDS);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => Err(anyhow!(
            "Invalid EVENT_CONSUMER_MAX_IN_FLIGHT: {raw} (expected a positive integer)"
        )),
        Ok(limit) => Ok(limit),
    }
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

/// Read and validate the queue mapping file
pub fn load_consumer_config(path: &Path) -> Result<ConsumerConfig> {
    ConsumerConfig::from_file(path)
        .with_context(|| format!("Configuration could not be loaded from {}", path.display()))
}

/// Broker settings where every field is optional, so layers can be merged.
///
/// Aliases cover the file's PascalCase/camelCase keys and the env source's
/// flattened ones.
#[derive(Debug, Default, Deserialize)]
struct PartialBrokerSettings {
    #[serde(alias = "Server", alias = "SERVER")]
    server: Option<String>,
    #[serde(
        alias = "serverPort",
        alias = "ServerPort",
        alias = "serverport",
        alias = "SERVERPORT"
    )]
    server_port: Option<u16>,
    #[serde(alias = "Username", alias = "USERNAME")]
    username: Option<String>,
    #[serde(alias = "Password", alias = "PASSWORD")]
    password: Option<String>,
}

/// The parts of the settings file this daemon reads
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(rename = "RabbitMqServerSettings", alias = "rabbitmqserversettings", default)]
    broker: Option<PartialBrokerSettings>,
}

impl PartialBrokerSettings {
    fn overlay(self, top: PartialBrokerSettings) -> Self {
        Self {
            server: top.server.or(self.server),
            server_port: top.server_port.or(self.server_port),
            username: top.username.or(self.username),
            password: top.password.or(self.password),
        }
    }

    fn finish(self) -> Result<BrokerSettings> {
        let settings = BrokerSettings {
            server: self
                .server
                .ok_or_else(|| anyhow!("Missing broker setting: server"))?,
            server_port: self.server_port.unwrap_or(DEFAULT_BROKER_PORT),
            username: self
                .username
                .ok_or_else(|| anyhow!("Missing broker setting: username"))?,
            password: self
                .password
                .ok_or_else(|| anyhow!("Missing broker setting: password"))?,
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Layer the settings file section under environment overrides.
///
/// `env` replaces the process environment (tests).
pub fn load_broker_settings(
    settings_file: &Path,
    env: Option<HashMap<String, String>>,
) -> Result<BrokerSettings> {
    let from_file = config::Config::builder()
        .add_source(config::File::from(settings_file).required(false))
        .build()
        .and_then(|c| c.try_deserialize::<SettingsFile>())
        .with_context(|| format!("Invalid {BROKER_SECTION} section in {}", settings_file.display()))?
        .broker
        .unwrap_or_default();

    let from_env = config::Config::builder()
        .add_source(
            config::Environment::with_prefix(BROKER_ENV_PREFIX)
                .prefix_separator("__")
                .source(env),
        )
        .build()
        .and_then(|c| c.try_deserialize::<PartialBrokerSettings>())
        .context("Invalid RABBITMQ__* environment variables")?;

    from_file
        .overlay(from_env)
        .finish()
        .context("Broker settings are incomplete")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn json_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_parse_max_in_flight() {
        assert_eq!(parse_max_in_flight(None).unwrap(), MAX_IN_FLIGHT_FORWARDS);
        assert_eq!(parse_max_in_flight(Some(" 8 ".to_string())).unwrap(), 8);
        assert!(parse_max_in_flight(Some("0".to_string())).is_err());
        assert!(parse_max_in_flight(Some("many".to_string())).is_err());
    }

    #[test]
    fn test_load_consumer_config() {
        let file = json_file(
            r#"{"queues":[
                {"queueName":"orders","apiEndpoint":"http://svc/orders"},
                {"queueName":"invoices","apiEndpoint":"http://svc/invoices"}
            ]}"#,
        );
        let config = load_consumer_config(file.path()).unwrap();
        assert_eq!(config.queue_names().collect::<Vec<_>>(), vec!["orders", "invoices"]);
    }

    #[test]
    fn test_missing_or_malformed_config_fails() {
        assert!(load_consumer_config(Path::new("/nonexistent/config.json")).is_err());

        let malformed = json_file("{ not json");
        assert!(load_consumer_config(malformed.path()).is_err());

        let duplicate = json_file(
            r#"{"queues":[
                {"queueName":"orders","apiEndpoint":"http://a"},
                {"queueName":"orders","apiEndpoint":"http://b"}
            ]}"#,
        );
        assert!(load_consumer_config(duplicate.path()).is_err());
    }

    #[test]
    fn test_broker_settings_from_file() {
        let file = json_file(
            r#"{"RabbitMqServerSettings":{
                "Server":"rabbit.local","ServerPort":5673,"Username":"svc","Password":"pw"
            }}"#,
        );
        let settings = load_broker_settings(file.path(), env(&[])).unwrap();
        assert_eq!(settings, BrokerSettings::new("rabbit.local", 5673, "svc", "pw"));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = json_file(
            r#"{"RabbitMqServerSettings":{
                "Server":"rabbit.local","Username":"svc","Password":"pw"
            }}"#,
        );
        let settings = load_broker_settings(
            file.path(),
            env(&[("RABBITMQ__SERVER", "rabbit.prod"), ("RABBITMQ__SERVERPORT", "5999")]),
        )
        .unwrap();

        assert_eq!(settings.server, "rabbit.prod");
        assert_eq!(settings.server_port, 5999);
        assert_eq!(settings.username, "svc");
    }

    #[test]
    fn test_env_only_with_default_port() {
        let settings = load_broker_settings(
            Path::new("/nonexistent/appsettings.json"),
            env(&[
                ("RABBITMQ__SERVER", "localhost"),
                ("RABBITMQ__USERNAME", "guest"),
                ("RABBITMQ__PASSWORD", "guest"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.server_port, DEFAULT_BROKER_PORT);
    }

    #[test]
    fn test_missing_credentials_fail() {
        let result = load_broker_settings(
            Path::new("/nonexistent/appsettings.json"),
            env(&[("RABBITMQ__SERVER", "localhost")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(" OFF "));
    }
}
