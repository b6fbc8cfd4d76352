//! Per-topic reading buffers between flushes.
//!
//! The store is a plain owned value: exclusion comes from ownership, and in
//! the daemon the store is owned by the pipeline consumer thread, which
//! serializes appends and drains (see `pipeline`). A drain therefore sees
//! every append that happened before it and none that happened after.
//!
//! Buffers are unbounded between flushes. Growth is tracked (`BufferStats`)
//! and logged each cycle rather than capped.

use crate::model::{SensorReading, Snapshot, Topic};
use chrono::{DateTime, Utc};

/// Counters describing buffer growth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Readings appended since the process started.
    pub total_appended: u64,
    /// Readings handed out by drains since the process started.
    pub total_drained: u64,
    /// Largest combined buffer length seen during the current epoch.
    pub peak_buffered: usize,
    /// Number of completed drains.
    pub epoch: u64,
}

/// Contents of every buffer taken in a single drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainedBuffers {
    pub water: Vec<SensorReading>,
    pub temperature: Vec<SensorReading>,
    pub solar: Vec<SensorReading>,
    /// Epoch the readings were accumulated in.
    pub epoch: u64,
    /// Peak combined length reached during that epoch.
    pub peak_buffered: usize,
}

impl DrainedBuffers {
    pub fn len(&self) -> usize {
        self.water.len() + self.temperature.len() + self.solar.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_snapshot(self, taken_at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            taken_at,
            water: self.water,
            temperature: self.temperature,
            solar: self.solar,
        }
    }
}

#[derive(Debug, Default)]
pub struct TopicBufferStore {
    water: Vec<SensorReading>,
    temperature: Vec<SensorReading>,
    solar: Vec<SensorReading>,
    stats: BufferStats,
}

impl TopicBufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer_mut(&mut self, topic: Topic) -> &mut Vec<SensorReading> {
        match topic {
            Topic::Water => &mut self.water,
            Topic::Temperature => &mut self.temperature,
            Topic::Solar => &mut self.solar,
        }
    }

    /// Appends in arrival order. Never rejects a reading.
    pub fn append(&mut self, topic: Topic, reading: SensorReading) {
        self.buffer_mut(topic).push(reading);
        self.stats.total_appended += 1;
        let buffered = self.len();
        if buffered > self.stats.peak_buffered {
            self.stats.peak_buffered = buffered;
        }
    }

    /// Takes every buffer at once and leaves all of them empty.
    pub fn drain_all(&mut self) -> DrainedBuffers {
        let drained = DrainedBuffers {
            water: std::mem::take(&mut self.water),
            temperature: std::mem::take(&mut self.temperature),
            solar: std::mem::take(&mut self.solar),
            epoch: self.stats.epoch,
            peak_buffered: self.stats.peak_buffered,
        };
        self.stats.total_drained += drained.len() as u64;
        self.stats.peak_buffered = 0;
        self.stats.epoch += 1;
        drained
    }

    pub fn len_of(&self, topic: Topic) -> usize {
        match topic {
            Topic::Water => self.water.len(),
            Topic::Temperature => self.temperature.len(),
            Topic::Solar => self.solar.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.water.len() + self.temperature.len() + self.solar.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
