//! Inbound message normalization.
//!
//! Publishers send one UTF-8 JSON object per MQTT message:
//!
//! ```text
//! {"sensorId": "pump-3", "data": 812.4}
//! {"sensorId": 1, "data": "812.4"}      // serial bridge publisher
//! ```
//!
//! A message becomes a [`SensorReading`] only if it carries a non-empty sensor
//! identifier and a numeric payload. Rejected messages never touch a buffer;
//! they are reported through the log and dropped.
//!
//! Publishers may put any JSON scalar in `data`, but only numbers and numeric
//! strings are kept. Text, booleans and objects are rejected as
//! `InvalidValue`, because every stored value feeds the averages and the flow
//! threshold.
//!
//! # Clock injection
//! The receipt timestamp is passed in by the caller. Ordering in this service
//! trusts only the local clock, so any sensor-side timestamp in the payload is
//! ignored.

use chrono::{DateTime, Utc};
use log::warn;
use serde_json::Value;

use crate::model::{number_from_json, IngestError, SensorReading, Topic};

/// Parses and validates one raw payload.
pub fn normalize(payload: &[u8], received_at: DateTime<Utc>) -> Result<SensorReading, IngestError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| IngestError::MalformedJson(format!("payload is not UTF-8: {}", e)))?;

    let parsed: Value =
        serde_json::from_str(text).map_err(|e| IngestError::MalformedJson(e.to_string()))?;

    let object = parsed
        .as_object()
        .ok_or_else(|| IngestError::MalformedJson("expected a JSON object".to_string()))?;

    let sensor_id = match object.get("sensorId") {
        None | Some(Value::Null) => return Err(IngestError::MissingField("sensorId")),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(IngestError::MissingField("sensorId"));
        }
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(IngestError::InvalidValue {
                field: "sensorId",
                value: other.to_string(),
            });
        }
    };

    let data = match object.get("data") {
        None | Some(Value::Null) => return Err(IngestError::MissingField("data")),
        Some(v) => v,
    };

    let value = number_from_json(data).ok_or_else(|| IngestError::InvalidValue {
        field: "data",
        value: data.to_string(),
    })?;

    Ok(SensorReading {
        sensor_id,
        timestamp: received_at,
        value,
    })
}

/// Normalizes a message for `topic`, logging and swallowing rejections.
pub fn accept(topic: Topic, payload: &[u8], received_at: DateTime<Utc>) -> Option<SensorReading> {
    match normalize(payload, received_at) {
        Ok(reading) => Some(reading),
        Err(e) => {
            warn!(
                target: "ingest",
                "[{}] dropped message: {} (payload: {})",
                topic.channel(),
                e,
                String::from_utf8_lossy(payload)
            );
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
