// Application Layer - Worker orchestration

pub mod probe;
pub mod shared_connection;
pub mod supervisor;
pub mod worker;

// Re-exports
pub use probe::check_connectivity;
pub use shared_connection::SharedConnector;
pub use supervisor::{RejectedQueue, RunExit, WorkerSupervisor};
pub use worker::{
    forward_message, shutdown_channel, ConsumerLoop, DeliveryResult, DeliveryStats, LoopOutcome,
    LoopReport, ShutdownSender, ShutdownToken,
};
