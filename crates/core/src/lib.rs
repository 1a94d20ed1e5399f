// Event Consumer Core - Domain Logic, Ports & Worker Orchestration
// NO infrastructure dependencies: broker and HTTP access go through ports

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
