// Domain Layer - Configuration models and consumer lifecycle

pub mod error;
pub mod mapping;
pub mod message;
pub mod settings;
pub mod state;

// Re-exports
pub use error::DomainError;
pub use mapping::{ConsumerConfig, QueueMapping, QueueName};
pub use message::InFlightMessage;
pub use settings::{BrokerSettings, DEFAULT_BROKER_PORT};
pub use state::LoopState;
