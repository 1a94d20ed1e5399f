// AMQP Connection Setup

use async_trait::async_trait;
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::{Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, info};

use event_consumer_core::domain::BrokerSettings;
use event_consumer_core::port::{BrokerConnection, BrokerConnector, BrokerError, QueueChannel};

use crate::channel::AmqpChannel;
use crate::{CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT};

/// Client-provided connection name shown in the broker's management UI
pub const CONNECTION_NAME: &str = "event-consumer";

/// Build the connection URI from settings.
///
/// Credentials go into the URI struct directly, so no percent-encoding is
/// needed for special characters. Default vhost `/`.
pub fn amqp_uri(settings: &BrokerSettings) -> AMQPUri {
    AMQPUri {
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: settings.username.clone(),
                password: settings.password.clone(),
            },
            host: settings.server.clone(),
            port: settings.server_port,
        },
        ..Default::default()
    }
}

/// Dials the broker with lapin
#[derive(Debug, Clone, Default)]
pub struct AmqpConnector;

impl AmqpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(
        &self,
        settings: &BrokerSettings,
    ) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        debug!(broker = %settings.address(), "Connecting to RabbitMQ server");

        let properties =
            ConnectionProperties::default().with_connection_name(CONNECTION_NAME.to_string().into());
        let connection = Connection::connect_uri(amqp_uri(settings), properties)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        info!(broker = %settings.address(), "Connected to RabbitMQ server");
        Ok(Arc::new(AmqpConnection { inner: connection }))
    }
}

/// One lapin connection
pub struct AmqpConnection {
    inner: Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn open_channel(&self) -> Result<Box<dyn QueueChannel>, BrokerError> {
        let channel = self
            .inner
            .create_channel()
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        debug!(channel_id = channel.id(), "AMQP channel created");
        Ok(Box::new(AmqpChannel::new(channel)))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if !self.is_connected() {
            debug!("AMQP connection already closed");
            return Ok(());
        }
        self.inner
            .close(CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.inner.status().connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_from_settings() {
        let settings = BrokerSettings::new("rabbit.internal", 5673, "svc", "p@ss:word/1");
        let uri = amqp_uri(&settings);

        assert_eq!(uri.authority.host, "rabbit.internal");
        assert_eq!(uri.authority.port, 5673);
        assert_eq!(uri.authority.userinfo.username, "svc");
        assert_eq!(uri.authority.userinfo.password, "p@ss:word/1");
        assert_eq!(uri.vhost, "/");
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        // Port 1 on loopback is never an AMQP broker
        let settings = BrokerSettings::new("127.0.0.1", 1, "guest", "guest");
        let result = AmqpConnector::new().connect(&settings).await;

        assert!(matches!(result, Err(BrokerError::Connection(_))));
    }
}
