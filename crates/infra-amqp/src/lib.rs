// Event Consumer Infrastructure - AMQP Adapter
// Implements: BrokerConnector, BrokerConnection, QueueChannel over lapin

mod channel;
mod connection;

pub use channel::AmqpChannel;
pub use connection::{amqp_uri, AmqpConnection, AmqpConnector, CONNECTION_NAME};

/// Reply code used when closing channels and connections ("OK")
pub(crate) const CLOSE_REPLY_CODE: u16 = 200;
pub(crate) const CLOSE_REPLY_TEXT: &str = "OK";
