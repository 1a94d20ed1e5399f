// Broker Port
// Abstraction over the message-broker transport: connection, channel, queue, subscription

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::BrokerSettings;

/// Stream of message bodies delivered to one subscription.
///
/// Messages are already acknowledged when they appear here. The stream ends
/// when the broker cancels the consumer or the channel is closed.
pub type DeliveryStream = BoxStream<'static, Result<Vec<u8>, BrokerError>>;

/// Broker errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Queue declaration failed for '{queue}': {reason}")]
    Declaration { queue: String, reason: String },

    #[error("Subscription failed for '{queue}': {reason}")]
    Subscription { queue: String, reason: String },

    #[error("Delivery error: {0}")]
    Delivery(String),
}

/// Queue declaration flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

impl QueueOptions {
    /// Durable, shared, kept when the last consumer leaves
    pub const fn durable() -> Self {
        Self {
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::durable()
    }
}

/// Opens connections to the broker
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Establish (or reuse) a connection
    ///
    /// # Errors
    /// - BrokerError::Connection if the broker is unreachable or rejects the credentials
    async fn connect(&self, settings: &BrokerSettings)
        -> Result<Arc<dyn BrokerConnection>, BrokerError>;
}

/// One physical link to the broker
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Open a logical channel scoped to a single consumer loop
    async fn open_channel(&self) -> Result<Box<dyn QueueChannel>, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;

    fn is_connected(&self) -> bool;
}

/// A channel bound to one queue and at most one subscription
#[async_trait]
pub trait QueueChannel: Send + Sync {
    /// Create the queue if absent.
    ///
    /// Idempotent for matching options; fails with BrokerError::Declaration
    /// if the queue exists with incompatible options.
    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<(), BrokerError>;

    /// Register an auto-acknowledging consumer on `queue`
    async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use futures::channel::mpsc;
    use futures::StreamExt;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    struct MockQueue {
        options: QueueOptions,
        backlog: VecDeque<Vec<u8>>,
        consumers: Vec<(u64, mpsc::UnboundedSender<Result<Vec<u8>, BrokerError>>)>,
        next_consumer: usize,
    }

    #[derive(Default)]
    struct BrokerState {
        queues: HashMap<String, MockQueue>,
        connect_attempts: usize,
        declare_calls: usize,
        fail_connect: Option<String>,
        fail_open_channel: Option<String>,
    }

    /// In-memory broker with AMQP-like queue semantics.
    ///
    /// Publishing to an undeclared queue drops the message, like the default
    /// exchange does for unroutable messages. Deliveries round-robin across
    /// consumers of the same queue.
    #[derive(Clone, Default)]
    pub struct InMemoryBroker {
        state: Arc<Mutex<BrokerState>>,
        next_channel: Arc<AtomicU64>,
    }

    impl InMemoryBroker {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every following connect fail
        pub fn fail_connections(&self, reason: impl Into<String>) {
            self.state.lock().unwrap().fail_connect = Some(reason.into());
        }

        pub fn fail_channels(&self, reason: impl Into<String>) {
            self.state.lock().unwrap().fail_open_channel = Some(reason.into());
        }

        /// Pre-create a queue, e.g. with incompatible options
        pub fn declare(&self, queue: &str, options: QueueOptions) {
            self.state
                .lock()
                .unwrap()
                .queues
                .entry(queue.to_string())
                .or_insert_with(|| MockQueue {
                    options,
                    backlog: VecDeque::new(),
                    consumers: Vec::new(),
                    next_consumer: 0,
                });
        }

        /// Returns false when the message was dropped (no such queue)
        pub fn publish(&self, queue: &str, body: impl Into<Vec<u8>>) -> bool {
            let mut state = self.state.lock().unwrap();
            let Some(q) = state.queues.get_mut(queue) else {
                return false;
            };
            let mut body = body.into();

            q.consumers.retain(|(_, tx)| !tx.is_closed());
            while !q.consumers.is_empty() {
                let idx = q.next_consumer % q.consumers.len();
                q.next_consumer = q.next_consumer.wrapping_add(1);
                match q.consumers[idx].1.unbounded_send(Ok(body)) {
                    Ok(()) => return true,
                    Err(e) => {
                        body = match e.into_inner() {
                            Ok(b) => b,
                            Err(_) => return false,
                        };
                        q.consumers.remove(idx);
                    }
                }
            }
            q.backlog.push_back(body);
            true
        }

        /// Simulate the broker cancelling every consumer of a queue
        pub fn cancel_consumers(&self, queue: &str) {
            if let Some(q) = self.state.lock().unwrap().queues.get_mut(queue) {
                q.consumers.clear();
            }
        }

        /// Push a delivery-level error to every consumer of a queue
        pub fn inject_delivery_error(&self, queue: &str, reason: &str) {
            if let Some(q) = self.state.lock().unwrap().queues.get_mut(queue) {
                for (_, tx) in &q.consumers {
                    let _ = tx.unbounded_send(Err(BrokerError::Delivery(reason.to_string())));
                }
            }
        }

        pub fn queue_exists(&self, queue: &str) -> bool {
            self.state.lock().unwrap().queues.contains_key(queue)
        }

        pub fn queue_count(&self) -> usize {
            self.state.lock().unwrap().queues.len()
        }

        /// Messages waiting in the queue with no consumer to take them
        pub fn backlog(&self, queue: &str) -> usize {
            self.state
                .lock()
                .unwrap()
                .queues
                .get(queue)
                .map(|q| q.backlog.len())
                .unwrap_or(0)
        }

        pub fn consumer_count(&self, queue: &str) -> usize {
            self.state
                .lock()
                .unwrap()
                .queues
                .get(queue)
                .map(|q| q.consumers.iter().filter(|(_, tx)| !tx.is_closed()).count())
                .unwrap_or(0)
        }

        pub fn connect_attempts(&self) -> usize {
            self.state.lock().unwrap().connect_attempts
        }

        pub fn declare_calls(&self) -> usize {
            self.state.lock().unwrap().declare_calls
        }
    }

    #[async_trait]
    impl BrokerConnector for InMemoryBroker {
        async fn connect(
            &self,
            _settings: &BrokerSettings,
        ) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
            let mut state = self.state.lock().unwrap();
            state.connect_attempts += 1;
            if let Some(reason) = &state.fail_connect {
                return Err(BrokerError::Connection(reason.clone()));
            }
            Ok(Arc::new(MockConnection {
                broker: self.clone(),
                open: Arc::new(AtomicBool::new(true)),
            }))
        }
    }

    pub struct MockConnection {
        broker: InMemoryBroker,
        open: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BrokerConnection for MockConnection {
        async fn open_channel(&self) -> Result<Box<dyn QueueChannel>, BrokerError> {
            if !self.is_connected() {
                return Err(BrokerError::Channel("connection closed".to_string()));
            }
            if let Some(reason) = &self.broker.state.lock().unwrap().fail_open_channel {
                return Err(BrokerError::Channel(reason.clone()));
            }
            Ok(Box::new(MockChannel {
                id: self.broker.next_channel.fetch_add(1, Ordering::SeqCst),
                broker: self.broker.clone(),
            }))
        }

        async fn close(&self) -> Result<(), BrokerError> {
            self.open.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    pub struct MockChannel {
        id: u64,
        broker: InMemoryBroker,
    }

    #[async_trait]
    impl QueueChannel for MockChannel {
        async fn declare_queue(
            &self,
            queue: &str,
            options: QueueOptions,
        ) -> Result<(), BrokerError> {
            let mut state = self.broker.state.lock().unwrap();
            state.declare_calls += 1;
            let existing = state.queues.entry(queue.to_string()).or_insert_with(|| MockQueue {
                options,
                backlog: VecDeque::new(),
                consumers: Vec::new(),
                next_consumer: 0,
            });
            if existing.options != options {
                return Err(BrokerError::Declaration {
                    queue: queue.to_string(),
                    reason: "PRECONDITION_FAILED - inequivalent arguments".to_string(),
                });
            }
            Ok(())
        }

        async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
            let mut state = self.broker.state.lock().unwrap();
            let q = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::Subscription {
                    queue: queue.to_string(),
                    reason: "NOT_FOUND - no queue".to_string(),
                })?;

            let (tx, rx) = mpsc::unbounded();
            while let Some(body) = q.backlog.pop_front() {
                let _ = tx.unbounded_send(Ok(body));
            }
            q.consumers.push((self.id, tx));
            Ok(rx.boxed())
        }

        async fn close(&self) -> Result<(), BrokerError> {
            let mut state = self.broker.state.lock().unwrap();
            for q in state.queues.values_mut() {
                q.consumers.retain(|(channel, _)| *channel != self.id);
            }
            Ok(())
        }
    }
}
