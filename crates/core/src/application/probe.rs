// Startup Connectivity Probe
// One-shot broker check; reports, never aborts startup

use tracing::{error, info, warn};

use crate::domain::BrokerSettings;
use crate::port::BrokerConnector;

/// Connect, open and close one channel, then close the connection.
///
/// Returns whether the broker was reachable.
pub async fn check_connectivity(connector: &dyn BrokerConnector, settings: &BrokerSettings) -> bool {
    match probe(connector, settings).await {
        Ok(()) => {
            info!(broker = %settings.address(), "Broker connectivity check succeeded");
            true
        }
        Err(e) => {
            error!(broker = %settings.address(), error = %e, "Broker connectivity check failed");
            false
        }
    }
}

async fn probe(connector: &dyn BrokerConnector, settings: &BrokerSettings) -> crate::Result<()> {
    let connection = connector.connect(settings).await?;
    let channel = connection.open_channel().await?;

    if let Err(e) = channel.close().await {
        warn!(error = %e, "Probe channel close failed");
    }
    connection.close().await?;
    Ok(())
}
