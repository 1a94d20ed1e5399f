//! Shared fixtures: an HTTP endpoint that records every POST it receives

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use event_consumer_core::domain::BrokerSettings;

#[derive(Clone, Default)]
struct EndpointState {
    received: Arc<Mutex<Vec<(String, String)>>>,
    statuses: Arc<Mutex<HashMap<String, Vec<StatusCode>>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

/// Records `POST /{route}` bodies; answers 200 unless told otherwise
pub struct RecordingEndpoint {
    pub base_url: String,
    state: EndpointState,
    stop: Option<oneshot::Sender<()>>,
}

impl Drop for RecordingEndpoint {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn record(
    State(state): State<EndpointState>,
    Path(route): Path<String>,
    body: Bytes,
) -> StatusCode {
    state
        .received
        .lock()
        .unwrap()
        .push((route.clone(), String::from_utf8_lossy(&body).into_owned()));

    let delay = *state.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut statuses = state.statuses.lock().unwrap();
    match statuses.get_mut(&route) {
        Some(queue) if !queue.is_empty() => queue.remove(0),
        _ => StatusCode::OK,
    }
}

impl RecordingEndpoint {
    pub async fn spawn() -> Self {
        let state = EndpointState::default();
        let app = Router::new()
            .route("/:route", post(record))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            stop: Some(tx),
        }
    }

    pub fn url(&self, route: &str) -> String {
        format!("{}/{}", self.base_url, route)
    }

    /// Answer the next POSTs to `route` with these statuses, in order
    pub fn respond_with(&self, route: &str, statuses: Vec<StatusCode>) {
        self.state
            .statuses
            .lock()
            .unwrap()
            .insert(route.to_string(), statuses);
    }

    pub fn delay_responses(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }

    pub fn received(&self, route: &str) -> Vec<String> {
        self.state
            .received
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == route)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn total_received(&self) -> usize {
        self.state.received.lock().unwrap().len()
    }
}

pub fn broker_settings() -> Arc<BrokerSettings> {
    Arc::new(BrokerSettings::new("localhost", 5672, "guest", "guest"))
}

pub async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for: {what}");
}
