//! Snapshot flushing.
//!
//! Each tick drains every topic buffer in one step, wraps the readings in a
//! [`Snapshot`] stamped with the tick time, and hands it to an [`Uploader`] on
//! a background thread so ingestion keeps running while the upload is in
//! flight. Uploads from consecutive ticks may overlap.
//!
//! Delivery is at-most-once. A failed upload is logged and the drained
//! readings are gone; they are never put back into the buffers.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use log::info;

use crate::buffer::TopicBufferStore;
use crate::logging::{log_failure, log_flush_summary, Component};
use crate::model::{Snapshot, SnapshotMetadata, UploadError};

/// Content-addressed destination for snapshots.
pub trait Uploader: Send + Sync {
    /// Stores the snapshot payload and returns its content identifier.
    fn upload(&self, snapshot: &Snapshot, metadata: &SnapshotMetadata) -> Result<String, UploadError>;
}

/// What one tick drained.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    pub taken_at: DateTime<Utc>,
    pub total_records: usize,
    pub topics: Vec<String>,
    pub epoch: u64,
    pub peak_buffered: usize,
}

/// Drains `store` into a snapshot taken at `now`.
pub fn cut_snapshot(store: &mut TopicBufferStore, now: DateTime<Utc>) -> (Snapshot, FlushReport) {
    let drained = store.drain_all();
    let epoch = drained.epoch;
    let peak_buffered = drained.peak_buffered;
    let snapshot = drained.into_snapshot(now);
    let metadata = snapshot.metadata();

    log_flush_summary(metadata.total_records, &metadata.topics, peak_buffered);

    let report = FlushReport {
        taken_at: now,
        total_records: metadata.total_records,
        topics: metadata.topics,
        epoch,
        peak_buffered,
    };
    (snapshot, report)
}

/// Uploads one snapshot, logging the outcome. Returns the content id on
/// success; on failure the snapshot is dropped.
pub fn upload_snapshot(uploader: &dyn Uploader, snapshot: &Snapshot) -> Option<String> {
    let metadata = snapshot.metadata();
    match uploader.upload(snapshot, &metadata) {
        Ok(cid) => {
            info!(
                target: "flush",
                "Snapshot {} uploaded: {} ({} records)",
                crate::model::format_timestamp(&snapshot.taken_at),
                cid,
                metadata.total_records
            );
            Some(cid)
        }
        Err(e) => {
            log_failure(Component::Flush, None, "Snapshot upload", &e);
            None
        }
    }
}

/// Runs flush ticks and tracks the upload threads they start.
pub struct SnapshotFlusher {
    uploader: Arc<dyn Uploader>,
    in_flight: Vec<JoinHandle<Option<String>>>,
}

impl SnapshotFlusher {
    pub fn new(uploader: Arc<dyn Uploader>) -> Self {
        Self {
            uploader,
            in_flight: Vec::new(),
        }
    }

    /// Drains the store and starts the upload in the background. Handles of
    /// uploads that already finished are released here.
    pub fn tick(&mut self, store: &mut TopicBufferStore, now: DateTime<Utc>) -> FlushReport {
        self.in_flight.retain(|handle| !handle.is_finished());

        let (snapshot, report) = cut_snapshot(store, now);
        let uploader = Arc::clone(&self.uploader);
        self.in_flight
            .push(thread::spawn(move || upload_snapshot(uploader.as_ref(), &snapshot)));
        report
    }

    pub fn uploads_in_flight(&self) -> usize {
        self.in_flight.iter().filter(|h| !h.is_finished()).count()
    }

    /// Waits for every upload still tracked. Returns their content ids in tick
    /// order; failed uploads yield `None`.
    pub fn join_uploads(&mut self) -> Vec<Option<String>> {
        self.in_flight
            .drain(..)
            .map(|handle| handle.join().unwrap_or(None))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
