//! Water-flow alerting.
//!
//! Submodules:
//! - `thresholds`: sustained high-flow detection with cooldown.
//! - `notify`: delivery of warning messages to the external endpoint.

pub mod notify;
pub mod thresholds;
