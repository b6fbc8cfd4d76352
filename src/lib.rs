//! Ripple sensor monitoring service.
//!
//! Ingests water-flow, temperature and solar telemetry over MQTT, buffers it
//! in memory, warns on sustained high water flow, and periodically uploads
//! the buffered readings as immutable snapshots to content-addressed storage.
//! The read side turns stored snapshots back into recency-weighted series.

pub mod alert;
pub mod analysis;
pub mod buffer;
pub mod config;
pub mod flush;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod storage;
