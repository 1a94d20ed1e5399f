// Consumer Loop - one queue's connect -> declare -> subscribe -> forward lifecycle

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::domain::{BrokerSettings, DomainError, InFlightMessage, LoopState, QueueMapping};
use crate::port::{
    BrokerConnection, BrokerConnector, DeliveryStream, ForwardError, MessageForwarder,
    QueueChannel, QueueOptions,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use url::Url;

/// Why a consumer loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Shutdown signal observed (the normal path)
    Cancelled,
    ConnectFailed(String),
    DeclareFailed(String),
    SubscribeFailed(String),
    /// The broker ended the subscription
    StreamEnded,
}

/// Outcome of one receive -> forward cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// 2xx response
    Forwarded(u16),
    /// Any other status
    Rejected(u16),
    /// No response
    Failed(ForwardError),
}

/// Per-loop delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub received: u64,
    pub forwarded: u64,
    pub rejected: u64,
    pub failed: u64,
}

impl DeliveryStats {
    fn record(&mut self, queue: &str, joined: std::result::Result<DeliveryResult, JoinError>) {
        match joined {
            Ok(DeliveryResult::Forwarded(_)) => self.forwarded += 1,
            Ok(DeliveryResult::Rejected(_)) => self.rejected += 1,
            Ok(DeliveryResult::Failed(_)) => self.failed += 1,
            Err(join_err) => {
                if join_err.is_panic() {
                    error!(queue, error = ?join_err, "Message handler panicked");
                } else {
                    error!(queue, error = ?join_err, "Message handler cancelled");
                }
                self.failed += 1;
            }
        }
    }
}

/// Final report of a stopped loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport {
    pub queue_name: String,
    pub state: LoopState,
    pub outcome: LoopOutcome,
    pub stats: DeliveryStats,
}

/// Live broker resources held while subscribed
struct Subscription {
    _connection: Arc<dyn BrokerConnection>,
    channel: Box<dyn QueueChannel>,
    deliveries: DeliveryStream,
}

/// Consumes one queue and forwards each message to its endpoint.
///
/// `run` consumes the loop: a stopped loop cannot be restarted, build a new one.
pub struct ConsumerLoop {
    mapping: QueueMapping,
    endpoint: Arc<Url>,
    settings: Arc<BrokerSettings>,
    connector: Arc<dyn BrokerConnector>,
    forwarder: Arc<dyn MessageForwarder>,
    max_in_flight: usize,
    state: watch::Sender<LoopState>,
}

impl ConsumerLoop {
    /// Create a loop for one mapping
    ///
    /// # Errors
    /// - DomainError::InvalidEndpoint if the mapping's endpoint is not an http(s) URL
    pub fn new(
        mapping: QueueMapping,
        settings: Arc<BrokerSettings>,
        connector: Arc<dyn BrokerConnector>,
        forwarder: Arc<dyn MessageForwarder>,
    ) -> std::result::Result<Self, DomainError> {
        let endpoint = Arc::new(mapping.endpoint_url()?);
        let (state, _) = watch::channel(LoopState::Connecting);
        Ok(Self {
            mapping,
            endpoint,
            settings,
            connector,
            forwarder,
            max_in_flight: MAX_IN_FLIGHT_FORWARDS,
            state,
        })
    }

    /// Allow up to `limit` concurrent forwards (at least one)
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit.max(1);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn queue_name(&self) -> &str {
        &self.mapping.queue_name
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Observe lifecycle transitions from outside the loop
    pub fn state_receiver(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Run until shutdown or a fatal error; always ends in `Stopped`
    pub async fn run(self, mut shutdown: ShutdownToken) -> LoopReport {
        let queue = self.mapping.queue_name.clone();
        info!(queue = %queue, endpoint = %self.endpoint, "Starting consumer loop");

        let mut stats = DeliveryStats::default();
        let outcome = self.consume(&mut shutdown, &mut stats).await;
        self.transition(LoopState::Stopped);

        match &outcome {
            LoopOutcome::Cancelled => {
                info!(queue = %queue, "Consumer loop is shutting down gracefully")
            }
            other => warn!(queue = %queue, outcome = ?other, "Consumer loop stopped"),
        }

        LoopReport {
            queue_name: queue,
            state: self.state(),
            outcome,
            stats,
        }
    }

    async fn consume(&self, shutdown: &mut ShutdownToken, stats: &mut DeliveryStats) -> LoopOutcome {
        let queue = self.queue_name();

        // Setup I/O may hang on an unreachable broker; shutdown must still win
        let opened = tokio::select! {
            opened = self.open() => opened,
            _ = shutdown.wait() => Err(LoopOutcome::Cancelled),
        };
        let Subscription {
            _connection,
            channel,
            mut deliveries,
        } = match opened {
            Ok(subscription) => subscription,
            Err(outcome) => return outcome,
        };

        let mut in_flight: JoinSet<DeliveryResult> = JoinSet::new();
        let outcome = loop {
            tokio::select! {
                _ = shutdown.wait() => break LoopOutcome::Cancelled,
                next = deliveries.next(), if in_flight.len() < self.max_in_flight => match next {
                    Some(Ok(body)) => {
                        stats.received += 1;
                        in_flight.spawn(forward_message(
                            InFlightMessage::new(queue, body),
                            Arc::clone(&self.endpoint),
                            Arc::clone(&self.forwarder),
                            shutdown.clone(),
                        ));
                    }
                    Some(Err(e)) => warn!(queue, error = %e, "Delivery error"),
                    None => {
                        warn!(queue, "Subscription ended by broker");
                        break LoopOutcome::StreamEnded;
                    }
                },
                Some(joined) = in_flight.join_next() => stats.record(queue, joined),
            }
        };

        self.transition(LoopState::Draining);
        drop(deliveries);
        if !in_flight.is_empty() {
            info!(queue, in_flight = in_flight.len(), "Waiting for in-flight forwards");
        }
        while let Some(joined) = in_flight.join_next().await {
            stats.record(queue, joined);
        }
        close_channel(queue, channel.as_ref()).await;

        outcome
    }

    /// Connecting -> Declaring -> Subscribed
    async fn open(&self) -> std::result::Result<Subscription, LoopOutcome> {
        let queue = self.queue_name();

        info!(queue, broker = %self.settings.address(), "Connecting to broker");
        let connection = self.connector.connect(&self.settings).await.map_err(|e| {
            error!(queue, broker = %self.settings.address(), error = %e, "Broker connection failed");
            LoopOutcome::ConnectFailed(e.to_string())
        })?;
        let channel = connection.open_channel().await.map_err(|e| {
            error!(queue, error = %e, "Channel creation failed");
            LoopOutcome::ConnectFailed(e.to_string())
        })?;
        debug!(queue, "Channel created");

        self.transition(LoopState::Declaring);
        if let Err(e) = channel.declare_queue(queue, QueueOptions::durable()).await {
            error!(queue, error = %e, "Queue declaration failed");
            close_channel(queue, channel.as_ref()).await;
            return Err(LoopOutcome::DeclareFailed(e.to_string()));
        }
        info!(queue, "Queue declared");

        let deliveries = match channel.subscribe(queue).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                error!(queue, error = %e, "Subscription failed");
                close_channel(queue, channel.as_ref()).await;
                return Err(LoopOutcome::SubscribeFailed(e.to_string()));
            }
        };
        self.transition(LoopState::Subscribed);
        info!(queue, endpoint = %self.endpoint, "Started consuming messages");

        Ok(Subscription {
            _connection: connection,
            channel,
            deliveries,
        })
    }

    fn transition(&self, next: LoopState) {
        let queue = self.queue_name();
        self.state.send_modify(|state| match state.transition(next) {
            Ok(s) => {
                debug!(queue, from = %state, to = %s, "Consumer loop state change");
                *state = s;
            }
            Err(e) => warn!(queue, error = %e, "Ignoring state change"),
        });
    }
}

async fn close_channel(queue: &str, channel: &dyn QueueChannel) {
    match channel.close().await {
        Ok(()) => debug!(queue, "Channel closed"),
        Err(e) => warn!(queue, error = %e, "Channel close failed"),
    }
}

/// Forward one message: a single POST, no retry, no requeue.
///
/// The request races the shutdown token; a cancelled request counts as failed.
pub async fn forward_message(
    message: InFlightMessage,
    endpoint: Arc<Url>,
    forwarder: Arc<dyn MessageForwarder>,
    mut shutdown: ShutdownToken,
) -> DeliveryResult {
    let queue = message.queue_name.as_str();
    let text = message.text();
    let body = preview(&text);
    info!(queue, bytes = message.len(), body = %body, "Received message");

    let result = tokio::select! {
        result = forwarder.forward(&endpoint, text) => result,
        _ = shutdown.wait() => Err(ForwardError::Cancelled),
    };

    match result {
        Ok(outcome) if outcome.is_success() => {
            info!(queue, endpoint = %endpoint, status = outcome.status, body = %body, "Message processed successfully");
            DeliveryResult::Forwarded(outcome.status)
        }
        Ok(outcome) => {
            warn!(queue, endpoint = %endpoint, status = outcome.status, body = %body, "Failed to process message");
            DeliveryResult::Rejected(outcome.status)
        }
        Err(e) => {
            warn!(queue, endpoint = %endpoint, error = %e, body = %body, "Failed to forward message");
            DeliveryResult::Failed(e)
        }
    }
}

fn preview(text: &str) -> String {
    if text.len() <= LOG_BODY_PREVIEW_LIMIT {
        return text.to_string();
    }
    let mut end = LOG_BODY_PREVIEW_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
