// Port Layer - Interfaces for external dependencies

pub mod broker;
pub mod forwarder;

// Re-exports
pub use broker::{
    BrokerConnection, BrokerConnector, BrokerError, DeliveryStream, QueueChannel, QueueOptions,
};
pub use forwarder::{ForwardError, ForwardOutcome, MessageForwarder};
