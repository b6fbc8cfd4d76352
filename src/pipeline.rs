//! The ingestion pipeline.
//!
//! Two producers feed one consumer over an mpsc channel:
//!
//! - the MQTT subscription sends `Message` events as publishes arrive,
//! - the ticker sends `Tick` events at the flush interval.
//!
//! The consumer owns the buffer store and the threshold detector, so every
//! append, detector update and drain happens in channel order on one thread.
//! A drain sees exactly the messages queued before its tick. Uploads and
//! warning sends leave the consumer on their own threads (see `flush` and
//! `alert::notify`), so slow network calls never delay the next message.
//! Finished warning deliveries are fed back to the detector before each
//! message and each tick.

use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::alert::notify::{Notifier, WarningDispatcher};
use crate::alert::thresholds::{Outcome, ThresholdDetector};
use crate::buffer::TopicBufferStore;
use crate::flush::{FlushReport, SnapshotFlusher};
use crate::ingest::normalize;
use crate::model::{IngestError, Topic};

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// One raw publish, stamped with its local receipt time.
    Message {
        channel: String,
        payload: Vec<u8>,
        received_at: DateTime<Utc>,
    },
    /// Flush timer fired.
    Tick(DateTime<Utc>),
    /// Flush once more, wait for uploads, and stop.
    Shutdown,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// Buffered; water readings also report the detector outcome.
    Buffered(Topic, Option<Outcome>),
    Rejected,
}

pub struct Pipeline<N: Notifier + 'static> {
    store: TopicBufferStore,
    detector: ThresholdDetector,
    warnings: WarningDispatcher<N>,
    flusher: SnapshotFlusher,
}

impl<N: Notifier + 'static> Pipeline<N> {
    pub fn new(detector: ThresholdDetector, notifier: N, flusher: SnapshotFlusher) -> Self {
        Self {
            store: TopicBufferStore::new(),
            detector,
            warnings: WarningDispatcher::new(notifier),
            flusher,
        }
    }

    pub fn store(&self) -> &TopicBufferStore {
        &self.store
    }

    pub fn detector(&self) -> &ThresholdDetector {
        &self.detector
    }

    pub fn warnings_in_flight(&self) -> usize {
        self.warnings.in_flight()
    }

    /// Reports finished warning sends to the detector.
    fn collect_deliveries(&mut self) {
        for delivery in self.warnings.finished() {
            self.detector.complete_warning(&delivery.warning, delivery.result.is_ok());
        }
    }

    /// Normalizes, buffers, and for water readings runs the detector.
    pub fn ingest(&mut self, channel: &str, payload: &[u8], received_at: DateTime<Utc>) -> Ingested {
        let Some(topic) = Topic::from_channel(channel) else {
            warn!(target: "ingest", "{}", IngestError::UnknownTopic(channel.to_string()));
            return Ingested::Rejected;
        };

        let Some(reading) = normalize::accept(topic, payload, received_at) else {
            return Ingested::Rejected;
        };

        let outcome = if topic == Topic::Water {
            self.collect_deliveries();
            let (outcome, warning) = self.detector.observe(&reading);
            if let Some(warning) = warning {
                self.warnings.dispatch(warning);
            }
            Some(outcome)
        } else {
            None
        };
        debug!(
            target: "buffer",
            "[{}] buffered {} = {}",
            topic.channel(),
            reading.sensor_id,
            reading.value
        );
        self.store.append(topic, reading);
        Ingested::Buffered(topic, outcome)
    }

    pub fn flush(&mut self, now: DateTime<Utc>) -> FlushReport {
        self.collect_deliveries();
        self.flusher.tick(&mut self.store, now)
    }

    /// Handles one event. Returns `false` once the pipeline has stopped.
    pub fn handle(&mut self, event: PipelineEvent) -> bool {
        match event {
            PipelineEvent::Message {
                channel,
                payload,
                received_at,
            } => {
                self.ingest(&channel, &payload, received_at);
                true
            }
            PipelineEvent::Tick(now) => {
                self.flush(now);
                true
            }
            PipelineEvent::Shutdown => {
                self.shutdown();
                false
            }
        }
    }

    /// Final flush, then waits for every in-flight upload and warning.
    pub fn shutdown(&mut self) -> Vec<Option<String>> {
        info!(target: "pipeline", "Shutting down, flushing {} buffered readings", self.store.len());
        self.flush(Utc::now());
        info!(
            target: "pipeline",
            "Waiting for {} uploads and {} warnings",
            self.flusher.uploads_in_flight(),
            self.warnings.in_flight()
        );
        for delivery in self.warnings.wait_all() {
            self.detector.complete_warning(&delivery.warning, delivery.result.is_ok());
        }
        self.flusher.join_uploads()
    }

    /// Consumes events until `Shutdown` or until every sender is gone.
    pub fn run(mut self, rx: Receiver<PipelineEvent>) {
        info!(target: "pipeline", "Pipeline started");
        for event in rx.iter() {
            if !self.handle(event) {
                return;
            }
        }
        self.shutdown();
    }
}

/// Sends a `Tick` every `interval` until the pipeline hangs up.
pub fn spawn_ticker(interval: Duration, tx: Sender<PipelineEvent>) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            thread::sleep(interval);
            if tx.send(PipelineEvent::Tick(Utc::now())).is_err() {
                break;
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
