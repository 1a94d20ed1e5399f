// Broker Settings Domain Model

use serde::Deserialize;

use super::error::{DomainError, Result};

/// Default AMQP port
pub const DEFAULT_BROKER_PORT: u16 = 5672;

/// Connection settings for the message broker.
///
/// Loaded once at startup and shared read-only by every consumer loop.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerSettings {
    #[serde(alias = "Server")]
    pub server: String,
    #[serde(rename = "serverPort", alias = "ServerPort", alias = "serverport", default = "default_port")]
    pub server_port: u16,
    #[serde(alias = "Username")]
    pub username: String,
    #[serde(alias = "Password")]
    pub password: String,
}

fn default_port() -> u16 {
    DEFAULT_BROKER_PORT
}

impl BrokerSettings {
    pub fn new(
        server: impl Into<String>,
        server_port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            server_port,
            username: username.into(),
            password: password.into(),
        }
    }

    /// `host:port`, safe to log
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.server_port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(DomainError::Validation(
                "broker server must not be empty".to_string(),
            ));
        }
        if self.server_port == 0 {
            return Err(DomainError::Validation(
                "broker port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("server", &self.server)
            .field("server_port", &self.server_port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
