// Message Forwarder Port
// Delivers a consumed message body to its HTTP endpoint

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Response of a completed forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardOutcome {
    pub status: u16,
}

impl ForwardOutcome {
    pub fn new(status: u16) -> Self {
        Self { status }
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Forward errors (no HTTP response was obtained)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request cancelled by shutdown")]
    Cancelled,
}

/// Message Forwarder trait
///
/// Implementations must be safe to call concurrently: one instance is shared
/// by every consumer loop and every in-flight message.
#[async_trait]
pub trait MessageForwarder: Send + Sync {
    /// POST `body` to `endpoint` as `application/json`.
    ///
    /// Any HTTP status is `Ok`; classification is up to the caller.
    ///
    /// # Errors
    /// - ForwardError::Timeout if no response arrives within the client timeout
    /// - ForwardError::Transport for connection or protocol failures
    async fn forward(&self, endpoint: &Url, body: String) -> Result<ForwardOutcome, ForwardError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock forwarder behavior
    #[derive(Debug, Clone)]
    pub enum MockForwardBehavior {
        /// Respond with this status
        Status(u16),
        /// Fail at the transport level
        Fail(String),
        /// Wait, then respond with this status
        Delay(Duration, u16),
    }

    /// A recorded POST
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ForwardedRequest {
        pub endpoint: String,
        pub body: String,
    }

    /// Records every forward and answers per the configured behavior
    #[derive(Clone)]
    pub struct RecordingForwarder {
        behavior: Arc<Mutex<MockForwardBehavior>>,
        requests: Arc<Mutex<Vec<ForwardedRequest>>>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    /// Counts a forward as active until it completes or is dropped
    struct ActiveGuard(Arc<AtomicUsize>);

    impl Drop for ActiveGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl RecordingForwarder {
        pub fn new(behavior: MockForwardBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                requests: Arc::new(Mutex::new(Vec::new())),
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn new_ok() -> Self {
            Self::new(MockForwardBehavior::Status(200))
        }

        pub fn set_behavior(&self, behavior: MockForwardBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn requests(&self) -> Vec<ForwardedRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn requests_to(&self, endpoint: &str) -> Vec<ForwardedRequest> {
            self.requests()
                .into_iter()
                .filter(|r| r.endpoint == endpoint)
                .collect()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        /// Forwards started and not yet finished
        pub fn in_flight(&self) -> usize {
            self.active.load(Ordering::SeqCst)
        }

        /// Highest number of forwards seen running at once
        pub fn peak_in_flight(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageForwarder for RecordingForwarder {
        async fn forward(
            &self,
            endpoint: &Url,
            body: String,
        ) -> Result<ForwardOutcome, ForwardError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _active = ActiveGuard(Arc::clone(&self.active));

            self.requests.lock().unwrap().push(ForwardedRequest {
                endpoint: endpoint.to_string(),
                body,
            });

            let behavior = self.behavior.lock().unwrap().clone();
            match behavior {
                MockForwardBehavior::Status(status) => Ok(ForwardOutcome::new(status)),
                MockForwardBehavior::Fail(msg) => Err(ForwardError::Transport(msg)),
                MockForwardBehavior::Delay(delay, status) => {
                    tokio::time::sleep(delay).await;
                    Ok(ForwardOutcome::new(status))
                }
            }
        }
    }
}
