//! Core data types for the Ripple sensor monitoring service.
//!
//! This module defines the shared domain model imported by all other modules:
//! topics, readings, snapshots, aggregated points, and the error enums each
//! stage of the pipeline reports. It contains no I/O.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// Sensor category. Each category is published on its own MQTT channel and
/// buffered separately until the next flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Water,
    Temperature,
    Solar,
}

impl Topic {
    /// All topics, in snapshot payload order.
    pub const ALL: [Topic; 3] = [Topic::Water, Topic::Temperature, Topic::Solar];

    /// MQTT channel the topic arrives on.
    pub fn channel(self) -> &'static str {
        match self {
            Topic::Water => "ripple-water",
            Topic::Temperature => "ripple-temperature",
            Topic::Solar => "ripple-solar",
        }
    }

    /// Key used in snapshot payloads and aggregated output.
    pub fn key(self) -> &'static str {
        match self {
            Topic::Water => "water",
            Topic::Temperature => "temperature",
            Topic::Solar => "solar",
        }
    }

    /// Maps an inbound MQTT channel name back to a topic.
    pub fn from_channel(channel: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.channel() == channel)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// One normalized sensor reading.
///
/// `timestamp` is the local receipt time assigned by the normalizer, never a
/// sensor-provided clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(rename = "sensorId", deserialize_with = "deserialize_sensor_id")]
    pub sensor_id: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "data", deserialize_with = "deserialize_lenient_number")]
    pub value: f64,
}

/// One flush cycle's worth of readings across every topic.
///
/// Only the three reading sequences form the stored payload; `taken_at`
/// travels separately in [`SnapshotMetadata`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(skip)]
    pub taken_at: DateTime<Utc>,
    #[serde(default)]
    pub water: Vec<SensorReading>,
    #[serde(default)]
    pub temperature: Vec<SensorReading>,
    #[serde(default)]
    pub solar: Vec<SensorReading>,
}

impl Snapshot {
    pub fn readings(&self, topic: Topic) -> &[SensorReading] {
        match topic {
            Topic::Water => &self.water,
            Topic::Temperature => &self.temperature,
            Topic::Solar => &self.solar,
        }
    }

    /// Sum of readings across all topics.
    pub fn total_records(&self) -> usize {
        self.water.len() + self.temperature.len() + self.solar.len()
    }

    /// Topics that carry at least one reading, in payload order.
    pub fn non_empty_topics(&self) -> Vec<Topic> {
        Topic::ALL
            .into_iter()
            .filter(|t| !self.readings(*t).is_empty())
            .collect()
    }

    pub fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata {
            timestamp: self.taken_at,
            total_records: self.total_records(),
            topics: self
                .non_empty_topics()
                .into_iter()
                .map(|t| t.key().to_string())
                .collect(),
        }
    }
}

/// Descriptive metadata handed to the uploader alongside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotMetadata {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "totalRecords")]
    pub total_records: usize,
    pub topics: Vec<String>,
}

/// One recency-weighted average for a (snapshot, category) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedPoint {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub sensor: Topic,
    pub data: f64,
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// RFC 3339, UTC, millisecond precision: `2024-05-01T12:00:00.000Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(ts))
}

/// Accepts `812`, `812.5` or `"812.5"`. Stored snapshots written by older
/// publishers carry the raw string payload.
fn deserialize_lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    number_from_json(&value).ok_or_else(|| {
        serde::de::Error::custom(format!("expected a number or numeric string, got {}", value))
    })
}

/// Stored snapshots from the serial bridge carry numeric sensor ids.
fn deserialize_sensor_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or numeric sensor id, got {}",
            other
        ))),
    }
}

/// Extracts a finite number from a JSON scalar, accepting numeric strings.
pub fn number_from_json(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Reasons an inbound message is rejected before it reaches a buffer.
#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("Malformed JSON: {0}")]
    MalformedJson(String),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),
}

/// Warning POST failures. The cooldown is not advanced on any of these.
#[derive(Debug, Error, PartialEq)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("Request failed: {0}")]
    Transport(String),
}

/// Snapshot upload failures. Drained readings are not requeued.
#[derive(Debug, Error, PartialEq)]
pub enum UploadError {
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Read-path failures when listing or fetching stored snapshots.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
