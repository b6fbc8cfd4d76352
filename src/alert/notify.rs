//! Warning delivery.
//!
//! A warning is a single `POST` with a JSON body `{"message": "..."}`. Any 2xx
//! status counts as accepted. [`WarningDispatcher`] runs each send on its own
//! thread so a slow endpoint never holds up ingestion; results are collected
//! later and fed back to the detector. Nothing here retries.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;

use crate::alert::thresholds::Warning;
use crate::logging::{log_failure, Component};
use crate::model::NotifyError;

/// Sink for warning messages.
pub trait Notifier: Send + Sync {
    fn send(&self, message: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct WarningBody<'a> {
    message: &'a str,
}

/// Posts warnings to a configured HTTP endpoint.
pub struct HttpNotifier {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Notifier for HttpNotifier {
    fn send(&self, message: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&WarningBody { message })
            .send()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Http(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Background delivery
// ---------------------------------------------------------------------------

/// Result of one warning send.
#[derive(Debug)]
pub struct Delivery {
    pub warning: Warning,
    pub result: Result<(), NotifyError>,
}

/// Sends warnings on background threads and hands back finished deliveries.
pub struct WarningDispatcher<N: Notifier + 'static> {
    notifier: Arc<N>,
    in_flight: Vec<(Warning, JoinHandle<Result<(), NotifyError>>)>,
}

impl<N: Notifier + 'static> WarningDispatcher<N> {
    pub fn new(notifier: N) -> Self {
        Self {
            notifier: Arc::new(notifier),
            in_flight: Vec::new(),
        }
    }

    pub fn dispatch(&mut self, warning: Warning) {
        let notifier = Arc::clone(&self.notifier);
        let message = warning.message.clone();
        let sensor_id = warning.sensor_id.clone();
        let handle = thread::spawn(move || {
            let result = notifier.send(&message);
            if let Err(e) = &result {
                log_failure(Component::Alert, Some(sensor_id.as_str()), "Warning dispatch", e);
            }
            result
        });
        self.in_flight.push((warning, handle));
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Deliveries that have finished since the last call. Never blocks.
    pub fn finished(&mut self) -> Vec<Delivery> {
        let (done, pending): (Vec<_>, Vec<_>) = self
            .in_flight
            .drain(..)
            .partition(|(_, handle)| handle.is_finished());
        self.in_flight = pending;
        done.into_iter().map(join_delivery).collect()
    }

    /// Waits for every pending delivery.
    pub fn wait_all(&mut self) -> Vec<Delivery> {
        self.in_flight.drain(..).map(join_delivery).collect()
    }
}

fn join_delivery((warning, handle): (Warning, JoinHandle<Result<(), NotifyError>>)) -> Delivery {
    let result = handle
        .join()
        .unwrap_or_else(|_| Err(NotifyError::Transport("notifier thread panicked".to_string())));
    Delivery { warning, result }
}
