// HTTP Forwarder
// One POST per message, fixed client timeout, no retry

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;
use url::Url;

use event_consumer_core::application::worker::constants::DEFAULT_FORWARD_TIMEOUT;
use event_consumer_core::port::{ForwardError, ForwardOutcome, MessageForwarder};

/// Default client timeout for one forward (5 minutes)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = DEFAULT_FORWARD_TIMEOUT;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Build the shared client. Safe to clone; clones share the connection pool.
pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("event-consumer/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// MessageForwarder backed by reqwest
#[derive(Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            timeout,
        })
    }

    /// Use an existing client; `timeout` is only reported in errors
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_error(&self, err: reqwest::Error) -> ForwardError {
        if err.is_timeout() {
            ForwardError::Timeout(self.timeout.as_secs())
        } else {
            ForwardError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl MessageForwarder for HttpForwarder {
    async fn forward(&self, endpoint: &Url, body: String) -> Result<ForwardOutcome, ForwardError> {
        debug!(endpoint = %endpoint, bytes = body.len(), "POST");

        let response = self
            .client
            .post(endpoint.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(ForwardOutcome::new(response.status().as_u16()))
    }
}
