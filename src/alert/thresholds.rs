//! Sustained high-water-flow detection.
//!
//! The detector keeps a high-water mark over the water-flow stream. Every
//! reading above the mark raises it and restarts the hold timer. A reading
//! that arrives once the mark has held for the sustained duration, and that is
//! itself at or above the absolute flow threshold, raises a [`Warning`].
//!
//! The detector never talks to the network. It hands the warning back to the
//! caller, which delivers it elsewhere and reports the result through
//! [`ThresholdDetector::complete_warning`]. While a delivery is pending no
//! second warning is raised, and the cooldown only starts once delivery is
//! confirmed.
//!
//! The high-water mark never decays. Once a large peak is recorded it stays
//! the reference until the process restarts or a higher peak arrives; there is
//! no reset operation. `test_watermark_is_monotonic_for_process_lifetime`
//! pins this behavior.
//!
//! # Clock injection
//! The reading's receipt timestamp is the only clock consulted, so tests drive
//! time by constructing readings.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use crate::model::{format_timestamp, SensorReading};

// ---------------------------------------------------------------------------
// Configuration and state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    /// How long a peak must hold before a warning becomes eligible.
    pub sustained_duration: Duration,
    /// Minimum spacing between two delivered warnings.
    pub cooldown: Duration,
    /// Absolute flow a qualifying reading must meet or exceed.
    pub flow_threshold: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            sustained_duration: Duration::seconds(10),
            cooldown: Duration::minutes(10),
            flow_threshold: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No peak recorded yet.
    Below,
    /// A peak is recorded and its hold timer is running.
    Peaking,
    /// A warning was delivered for the current peak.
    SustainedWarned,
}

/// Detector state. `max_reached_at` is `Some` whenever `current_max > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdState {
    pub current_max: f64,
    pub max_reached_at: Option<DateTime<Utc>>,
    /// `None` until the first warning is delivered.
    pub last_warning_at: Option<DateTime<Utc>>,
    /// Raise time of the warning whose delivery has not been reported yet.
    pub warning_in_flight: Option<DateTime<Utc>>,
    pub phase: Phase,
}

impl Default for ThresholdState {
    fn default() -> Self {
        Self {
            current_max: 0.0,
            max_reached_at: None,
            last_warning_at: None,
            warning_in_flight: None,
            phase: Phase::Below,
        }
    }
}

/// What a single reading did to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing changed.
    Idle,
    /// The high-water mark was raised.
    NewPeak,
    /// A warning was raised and handed back for delivery.
    Dispatched,
    /// A warning was due but the cooldown had not elapsed, or an earlier
    /// warning is still being delivered.
    CooldownSuppressed,
}

/// A warning waiting to be delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub sensor_id: String,
    /// Receipt time of the reading that raised it.
    pub raised_at: DateTime<Utc>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ThresholdDetector {
    config: ThresholdConfig,
    state: ThresholdState,
}

impl ThresholdDetector {
    pub fn new(config: ThresholdConfig) -> Self {
        Self {
            config,
            state: ThresholdState::default(),
        }
    }

    /// Resumes from an existing state, e.g. in tests.
    pub fn with_state(config: ThresholdConfig, state: ThresholdState) -> Self {
        Self { config, state }
    }

    pub fn state(&self) -> &ThresholdState {
        &self.state
    }

    /// Feeds one water-flow reading through the detector.
    ///
    /// The sustained check runs against the mark as it stood before this
    /// reading, then the mark is raised if the reading exceeds it. A reading
    /// that both qualifies and sets a new peak reports the warning outcome.
    pub fn observe(&mut self, reading: &SensorReading) -> (Outcome, Option<Warning>) {
        let now = reading.timestamp;
        let mut outcome = Outcome::Idle;
        let mut warning = None;

        if self.is_sustained(reading) {
            warning = self.raise_warning(reading);
            outcome = if warning.is_some() {
                Outcome::Dispatched
            } else {
                Outcome::CooldownSuppressed
            };
        }

        if reading.value > self.state.current_max {
            self.state.current_max = reading.value;
            self.state.max_reached_at = Some(now);
            self.state.phase = Phase::Peaking;
            debug!(
                target: "alert",
                "[{}] new water-flow peak {:.2}",
                reading.sensor_id,
                reading.value
            );
            if outcome == Outcome::Idle {
                outcome = Outcome::NewPeak;
            }
        }

        (outcome, warning)
    }

    /// Records the delivery result of a warning returned by `observe`.
    /// Only a delivered warning starts the cooldown.
    pub fn complete_warning(&mut self, warning: &Warning, delivered: bool) {
        self.state.warning_in_flight = None;
        if !delivered {
            return;
        }
        if self.state.last_warning_at.is_none_or(|last| last < warning.raised_at) {
            self.state.last_warning_at = Some(warning.raised_at);
        }
        self.state.phase = Phase::SustainedWarned;
        info!(target: "alert", "[{}] warning sent: {}", warning.sensor_id, warning.message);
    }

    fn is_sustained(&self, reading: &SensorReading) -> bool {
        let Some(reached_at) = self.state.max_reached_at else {
            return false;
        };
        reading.timestamp - reached_at >= self.config.sustained_duration
            && reading.value >= self.config.flow_threshold
    }

    fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.state.last_warning_at?;
        let elapsed = now - last;
        (elapsed < self.config.cooldown).then(|| self.config.cooldown - elapsed)
    }

    fn raise_warning(&mut self, reading: &SensorReading) -> Option<Warning> {
        let now = reading.timestamp;

        if let Some(raised_at) = self.state.warning_in_flight {
            info!(
                target: "alert",
                "[{}] sustained high flow {:.2}, warning from {} still in flight",
                reading.sensor_id,
                reading.value,
                format_timestamp(&raised_at)
            );
            return None;
        }
        if let Some(remaining) = self.cooldown_remaining(now) {
            info!(
                target: "alert",
                "[{}] sustained high flow {:.2}, warning suppressed ({}s of cooldown left)",
                reading.sensor_id,
                reading.value,
                remaining.num_seconds()
            );
            return None;
        }

        self.state.warning_in_flight = Some(now);
        Some(Warning {
            sensor_id: reading.sensor_id.clone(),
            raised_at: now,
            message: self.warning_message(reading),
        })
    }

    fn warning_message(&self, reading: &SensorReading) -> String {
        let since = self
            .state
            .max_reached_at
            .map(|t| format_timestamp(&t))
            .unwrap_or_default();
        format!(
            "Sustained high water flow on sensor {}: {:.2} (threshold {:.2}, peak {:.2} holding since {})",
            reading.sensor_id,
            reading.value,
            self.config.flow_threshold,
            self.state.current_max,
            since
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
