// Event Consumer Infrastructure - HTTP Adapter
// Implements: MessageForwarder over a shared reqwest client

mod forwarder;

pub use forwarder::{build_client, HttpForwarder, DEFAULT_REQUEST_TIMEOUT};
