// Shared Connection
// One physical broker connection for all loops; each loop still opens its own channel

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::BrokerSettings;
use crate::port::{BrokerConnection, BrokerConnector, BrokerError};

/// Connector decorator that dials lazily and hands the same connection to every caller.
///
/// A dead connection is replaced on the next `connect`; there is no background
/// reconnect.
pub struct SharedConnector {
    inner: Arc<dyn BrokerConnector>,
    current: Mutex<Option<Arc<dyn BrokerConnection>>>,
}

impl SharedConnector {
    pub fn new(inner: Arc<dyn BrokerConnector>) -> Self {
        Self {
            inner,
            current: Mutex::new(None),
        }
    }

    /// Close the shared connection, if one was opened
    pub async fn close(&self) -> Result<(), BrokerError> {
        let Some(connection) = self.current.lock().await.take() else {
            return Ok(());
        };
        if !connection.is_connected() {
            return Ok(());
        }
        info!("Closing broker connection");
        connection.close().await
    }
}

#[async_trait]
impl BrokerConnector for SharedConnector {
    async fn connect(
        &self,
        settings: &BrokerSettings,
    ) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        // Held across the dial so concurrent loops share one attempt
        let mut current = self.current.lock().await;
        if let Some(connection) = current.as_ref() {
            if connection.is_connected() {
                debug!("Reusing broker connection");
                return Ok(Arc::clone(connection));
            }
            warn!(broker = %settings.address(), "Broker connection lost, dialing again");
        }

        let connection = self.inner.connect(settings).await?;
        info!(broker = %settings.address(), "RabbitMQ connection established");
        *current = Some(Arc::clone(&connection));
        Ok(connection)
    }
}
