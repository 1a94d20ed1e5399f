// Worker Supervisor
// Starts one consumer loop per configured queue and stops them all together

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::application::worker::constants::MAX_IN_FLIGHT_FORWARDS;
use crate::application::worker::{shutdown_channel, ConsumerLoop, LoopReport, ShutdownSender};
use crate::domain::{BrokerSettings, ConsumerConfig, DomainError, LoopState};
use crate::port::{BrokerConnector, MessageForwarder};

/// A queue whose loop could not be built (e.g. malformed endpoint)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedQueue {
    pub queue_name: String,
    pub error: DomainError,
}

/// Why `run_until` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The external shutdown signal fired
    Signalled,
    /// Every loop stopped on its own
    AllLoopsExited,
}

/// Owns the consumer loops and their joint lifecycle.
///
/// The set of loops is fixed at `start`; nothing is added or removed later.
pub struct WorkerSupervisor {
    shutdown: ShutdownSender,
    tasks: JoinSet<LoopReport>,
    states: Vec<(String, watch::Receiver<LoopState>)>,
    rejected: Vec<RejectedQueue>,
    reports: Vec<LoopReport>,
}

impl WorkerSupervisor {
    /// Build and spawn one loop per mapping. Does not wait for any of them.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        config: &ConsumerConfig,
        settings: Arc<BrokerSettings>,
        connector: Arc<dyn BrokerConnector>,
        forwarder: Arc<dyn MessageForwarder>,
    ) -> Self {
        Self::start_with_limit(config, settings, connector, forwarder, MAX_IN_FLIGHT_FORWARDS)
    }

    /// Like `start`, with every loop allowed `max_in_flight` concurrent forwards
    pub fn start_with_limit(
        config: &ConsumerConfig,
        settings: Arc<BrokerSettings>,
        connector: Arc<dyn BrokerConnector>,
        forwarder: Arc<dyn MessageForwarder>,
        max_in_flight: usize,
    ) -> Self {
        let (shutdown, token) = shutdown_channel();
        let mut tasks = JoinSet::new();
        let mut states = Vec::with_capacity(config.queues.len());
        let mut rejected = Vec::new();

        for mapping in &config.queues {
            let queue_name = mapping.queue_name.clone();
            let worker = match ConsumerLoop::new(
                mapping.clone(),
                Arc::clone(&settings),
                Arc::clone(&connector),
                Arc::clone(&forwarder),
            ) {
                Ok(worker) => worker.with_max_in_flight(max_in_flight),
                Err(e) => {
                    error!(queue = %queue_name, error = %e, "Skipping queue: consumer loop could not be created");
                    rejected.push(RejectedQueue {
                        queue_name,
                        error: e,
                    });
                    continue;
                }
            };

            info!(queue = %queue_name, max_in_flight = worker.max_in_flight(), "Starting QueueWorker");
            states.push((queue_name, worker.state_receiver()));
            tasks.spawn(worker.run(token.clone()));
        }

        info!(
            started = states.len(),
            rejected = rejected.len(),
            "Worker supervisor started"
        );

        Self {
            shutdown,
            tasks,
            states,
            rejected,
            reports: Vec::new(),
        }
    }

    /// Queues that got a loop, in configuration order
    pub fn active_queues(&self) -> Vec<&str> {
        self.states.iter().map(|(q, _)| q.as_str()).collect()
    }

    pub fn rejected(&self) -> &[RejectedQueue] {
        &self.rejected
    }

    /// Current lifecycle state of every started loop
    pub fn states(&self) -> Vec<(String, LoopState)> {
        self.states
            .iter()
            .map(|(q, rx)| (q.clone(), *rx.borrow()))
            .collect()
    }

    /// Loops that have not reached `Stopped` yet
    pub fn running(&self) -> usize {
        self.states
            .iter()
            .filter(|(_, rx)| !rx.borrow().is_terminal())
            .count()
    }

    /// Block until `signal` resolves or every loop has exited
    pub async fn run_until<F>(&mut self, signal: F) -> RunExit
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => {
                info!("Shutdown signal received");
                RunExit::Signalled
            }
            _ = self.join_all() => {
                warn!("All consumer loops have exited");
                RunExit::AllLoopsExited
            }
        }
    }

    /// Fire the shared cancellation signal and wait for every loop to stop.
    ///
    /// Returns the reports of loops joined by this call; later calls return
    /// an empty list.
    pub async fn shutdown(&mut self) -> Vec<LoopReport> {
        if self.shutdown.shutdown() {
            info!(loops = self.tasks.len(), "Signalling shutdown to consumer loops");
        }
        self.join_all().await;
        info!(stopped = self.reports.len(), "All consumer loops stopped");
        std::mem::take(&mut self.reports)
    }

    // Cancel-safe: reports joined so far are kept if the caller stops polling
    async fn join_all(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => self.reports.push(report),
                Err(e) => error!(error = ?e, "Consumer loop task failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::worker::LoopOutcome;
    use crate::domain::QueueMapping;
    use crate::port::broker::mocks::InMemoryBroker;
    use crate::port::forwarder::mocks::RecordingForwarder;
    use std::time::Duration;

    fn settings() -> Arc<BrokerSettings> {
        Arc::new(BrokerSettings::new("localhost", 5672, "guest", "guest"))
    }

    fn two_queue_config() -> ConsumerConfig {
        ConsumerConfig::new(vec![
            QueueMapping::new("orders", "http://svc/orders"),
            QueueMapping::new("invoices", "http://svc/invoices"),
        ])
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_start_with_limit_applies_to_every_loop() {
        use crate::port::forwarder::mocks::MockForwardBehavior;

        let broker = InMemoryBroker::new();
        let forwarder =
            RecordingForwarder::new(MockForwardBehavior::Delay(Duration::from_secs(300), 200));
        let mut supervisor = WorkerSupervisor::start_with_limit(
            &two_queue_config(),
            settings(),
            Arc::new(broker.clone()),
            Arc::new(forwarder.clone()),
            2,
        );
        wait_until(|| broker.consumer_count("orders") == 1 && broker.consumer_count("invoices") == 1)
            .await;

        for queue in ["orders", "invoices"] {
            for body in ["a", "b", "c"] {
                broker.publish(queue, body);
            }
        }
        wait_until(|| forwarder.call_count() == 4).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(forwarder.requests_to("http://svc/orders").len(), 2);
        assert_eq!(forwarder.requests_to("http://svc/invoices").len(), 2);

        let reports = supervisor.shutdown().await;
        assert!(reports.iter().all(|r| r.stats.received == 2 && r.stats.failed == 2));
    }

    #[tokio::test]
    async fn test_one_consumer_per_mapping() {
        let broker = InMemoryBroker::new();
        let forwarder = RecordingForwarder::new_ok();
        let mut supervisor = WorkerSupervisor::start(
            &two_queue_config(),
            settings(),
            Arc::new(broker.clone()),
            Arc::new(forwarder.clone()),
        );

        assert_eq!(supervisor.active_queues(), vec!["orders", "invoices"]);
        wait_until(|| broker.consumer_count("orders") == 1 && broker.consumer_count("invoices") == 1)
            .await;
        assert_eq!(supervisor.running(), 2);

        let reports = supervisor.shutdown().await;
        assert_eq!(reports.len(), 2);
        assert!(reports
            .iter()
            .all(|r| r.state == LoopState::Stopped && r.outcome == LoopOutcome::Cancelled));
        assert_eq!(supervisor.running(), 0);
    }

    #[tokio::test]
    async fn test_bad_endpoint_does_not_block_others() {
        let broker = InMemoryBroker::new();
        let config = ConsumerConfig::new(vec![
            QueueMapping::new("orders", "::not-a-url::"),
            QueueMapping::new("invoices", "http://svc/invoices"),
        ]);
        let mut supervisor = WorkerSupervisor::start(
            &config,
            settings(),
            Arc::new(broker.clone()),
            Arc::new(RecordingForwarder::new_ok()),
        );

        assert_eq!(supervisor.active_queues(), vec!["invoices"]);
        assert_eq!(supervisor.rejected().len(), 1);
        assert_eq!(supervisor.rejected()[0].queue_name, "orders");

        wait_until(|| broker.consumer_count("invoices") == 1).await;
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let broker = InMemoryBroker::new();
        let mut supervisor = WorkerSupervisor::start(
            &two_queue_config(),
            settings(),
            Arc::new(broker.clone()),
            Arc::new(RecordingForwarder::new_ok()),
        );
        wait_until(|| broker.consumer_count("invoices") == 1).await;

        assert_eq!(supervisor.shutdown().await.len(), 2);
        assert!(supervisor.shutdown().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_until_returns_when_all_loops_fail() {
        let broker = InMemoryBroker::new();
        broker.fail_connections("ACCESS_REFUSED");
        let mut supervisor = WorkerSupervisor::start(
            &two_queue_config(),
            settings(),
            Arc::new(broker.clone()),
            Arc::new(RecordingForwarder::new_ok()),
        );

        let exit = tokio::time::timeout(
            Duration::from_secs(2),
            supervisor.run_until(std::future::pending()),
        )
        .await
        .expect("run_until should return once every loop stopped");
        assert_eq!(exit, RunExit::AllLoopsExited);

        let reports = supervisor.shutdown().await;
        assert_eq!(reports.len(), 2);
        assert!(reports
            .iter()
            .all(|r| matches!(r.outcome, LoopOutcome::ConnectFailed(_))));
        assert_eq!(broker.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_run_until_signal() {
        let broker = InMemoryBroker::new();
        let mut supervisor = WorkerSupervisor::start(
            &two_queue_config(),
            settings(),
            Arc::new(broker.clone()),
            Arc::new(RecordingForwarder::new_ok()),
        );

        let exit = supervisor
            .run_until(tokio::time::sleep(Duration::from_millis(20)))
            .await;
        assert_eq!(exit, RunExit::Signalled);

        let reports = supervisor.shutdown().await;
        assert_eq!(reports.len(), 2);
    }
}
