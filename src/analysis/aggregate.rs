//! Recency-weighted snapshot aggregation.
//!
//! Every stored snapshot contributes at most one point per sensor category:
//! the weighted mean of that category's readings, where the i-th reading in
//! arrival order carries weight `GROWTH_FACTOR^i`, rounded to two decimals and
//! stamped with the last reading's timestamp. Points are then filtered by the
//! requested time window and sorted oldest first.
//!
//! # Clock injection
//! `aggregate_at` takes `now` explicitly; `aggregate` is the wall-clock
//! wrapper.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::Serialize;

use crate::model::{AggregatedPoint, SensorReading, Snapshot, Topic};

/// Weight ratio between consecutive readings.
pub const GROWTH_FACTOR: f64 = 1.2;

// ---------------------------------------------------------------------------
// Time filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFilter {
    Last10Minutes,
    LastHour,
    #[default]
    AllTime,
}

impl TimeFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeFilter::Last10Minutes => "last-10-minutes",
            TimeFilter::LastHour => "last-hour",
            TimeFilter::AllTime => "all-time",
        }
    }

    /// Query-string semantics: absent or unrecognized values mean all-time.
    pub fn from_query(value: Option<&str>) -> TimeFilter {
        match value.map(str::parse::<TimeFilter>) {
            Some(Ok(filter)) => filter,
            Some(Err(unknown)) => {
                debug!(target: "aggregate", "unknown time filter {:?}, using all-time", unknown);
                TimeFilter::AllTime
            }
            None => TimeFilter::AllTime,
        }
    }

    /// Oldest timestamp kept. `None` keeps everything.
    pub fn cutoff(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeFilter::Last10Minutes => Some(now - Duration::minutes(10)),
            TimeFilter::LastHour => Some(now - Duration::hours(1)),
            TimeFilter::AllTime => None,
        }
    }
}

impl FromStr for TimeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "last-10-minutes" => Ok(TimeFilter::Last10Minutes),
            "last-hour" => Ok(TimeFilter::LastHour),
            "all-time" => Ok(TimeFilter::AllTime),
            other => Err(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Weighted average
// ---------------------------------------------------------------------------

/// Rounds half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Weighted mean with weight `GROWTH_FACTOR^i`, unrounded. `None` when empty.
///
/// Weights are computed relative to the newest reading
/// (`GROWTH_FACTOR^(i - (n - 1))`), which leaves the ratio unchanged and keeps
/// long cycles from overflowing.
pub fn weighted_average(readings: &[SensorReading]) -> Option<f64> {
    if readings.is_empty() {
        return None;
    }
    let newest = (readings.len() - 1) as i32;

    let (weighted_sum, total_weight) =
        readings
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(sum, total), (i, reading)| {
                let weight = GROWTH_FACTOR.powi(i as i32 - newest);
                (sum + reading.value * weight, total + weight)
            });

    Some(weighted_sum / total_weight)
}

/// One point for `topic` in `snapshot`, or `None` if it has no readings.
pub fn summarize(snapshot: &Snapshot, topic: Topic) -> Option<AggregatedPoint> {
    let readings = snapshot.readings(topic);
    let last = readings.last()?;
    let average = weighted_average(readings)?;
    Some(AggregatedPoint {
        timestamp: last.timestamp,
        sensor: topic,
        data: round2(average),
    })
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// Aggregation output, serialized as
/// `{"solar": [...], "water": [...], "temperature": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedSeries {
    pub solar: Vec<AggregatedPoint>,
    pub water: Vec<AggregatedPoint>,
    pub temperature: Vec<AggregatedPoint>,
}

impl AggregatedSeries {
    pub fn series(&self, topic: Topic) -> &[AggregatedPoint] {
        match topic {
            Topic::Water => &self.water,
            Topic::Temperature => &self.temperature,
            Topic::Solar => &self.solar,
        }
    }

    fn series_mut(&mut self, topic: Topic) -> &mut Vec<AggregatedPoint> {
        match topic {
            Topic::Water => &mut self.water,
            Topic::Temperature => &mut self.temperature,
            Topic::Solar => &mut self.solar,
        }
    }
}

/// Aggregates `snapshots` for the window described by `filter` as of `now`.
pub fn aggregate_at(snapshots: &[Snapshot], filter: TimeFilter, now: DateTime<Utc>) -> AggregatedSeries {
    let cutoff = filter.cutoff(now);
    let mut output = AggregatedSeries::default();

    for topic in Topic::ALL {
        let series = output.series_mut(topic);
        series.extend(
            snapshots
                .iter()
                .filter_map(|snapshot| summarize(snapshot, topic))
                .filter(|point| cutoff.is_none_or(|c| point.timestamp >= c)),
        );
        series.sort_by_key(|point| point.timestamp);
    }

    debug!(
        target: "aggregate",
        "{} snapshots -> water {}, temperature {}, solar {} points ({})",
        snapshots.len(),
        output.water.len(),
        output.temperature.len(),
        output.solar.len(),
        filter.as_str()
    );
    output
}

/// Convenience wrapper that uses the real current time.
pub fn aggregate(snapshots: &[Snapshot], filter: TimeFilter) -> AggregatedSeries {
    aggregate_at(snapshots, filter, Utc::now())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// A fixed "now" used across all tests: 2024-05-01 13:00:00 UTC.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    fn reading(value: f64, minutes_ago: i64) -> SensorReading {
        SensorReading {
            sensor_id: "1".to_string(),
            timestamp: fixed_now() - Duration::minutes(minutes_ago),
            value,
        }
    }

    fn water_snapshot(values: &[(f64, i64)]) -> Snapshot {
        Snapshot {
            water: values.iter().map(|&(v, ago)| reading(v, ago)).collect(),
            ..Snapshot::default()
        }
    }

    // --- Weighted average ---------------------------------------------------

    #[test]
    fn test_two_reading_weighted_average() {
        // (100*1 + 200*1.2) / (1 + 1.2) = 340 / 2.2 = 154.5454...
        let snapshot = water_snapshot(&[(100.0, 3), (200.0, 2)]);
        let point = summarize(&snapshot, Topic::Water).unwrap();
        assert_eq!(point.data, 154.55);
        assert_eq!(point.sensor, Topic::Water);
    }

    #[test]
    fn test_single_reading_average_is_the_reading() {
        let snapshot = water_snapshot(&[(42.5, 1)]);
        assert_eq!(summarize(&snapshot, Topic::Water).unwrap().data, 42.5);
    }

    #[test]
    fn test_recent_readings_weigh_more() {
        let rising = weighted_average(&[reading(0.0, 3), reading(100.0, 2)]).unwrap();
        let falling = weighted_average(&[reading(100.0, 3), reading(0.0, 2)]).unwrap();
        assert!(rising > 50.0 && falling < 50.0);
    }

    #[test]
    fn test_long_cycle_stays_finite() {
        let readings: Vec<SensorReading> = (0..5000).map(|_| reading(7.0, 1)).collect();
        let avg = weighted_average(&readings).unwrap();
        assert!((avg - 7.0).abs() < 1e-9, "got {}", avg);
    }

    #[test]
    fn test_point_is_stamped_with_last_reading() {
        let snapshot = water_snapshot(&[(1.0, 5), (2.0, 4), (3.0, 3)]);
        let point = summarize(&snapshot, Topic::Water).unwrap();
        assert_eq!(point.timestamp, fixed_now() - Duration::minutes(3));
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round2(172.72727), 172.73);
        assert_eq!(round2(-1.005_1), -1.01);
        assert_eq!(round2(3.0), 3.0);
    }

    // --- Grouping, filtering, sorting --------------------------------------

    #[test]
    fn test_empty_category_yields_empty_series() {
        let series = aggregate_at(&[water_snapshot(&[(1.0, 1)])], TimeFilter::AllTime, fixed_now());
        assert!(series.solar.is_empty());
        assert!(series.temperature.is_empty());
        assert_eq!(series.water.len(), 1);

        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(json["solar"], serde_json::json!([]));
    }

    #[test]
    fn test_no_snapshots_yields_three_empty_series() {
        let series = aggregate_at(&[], TimeFilter::LastHour, fixed_now());
        assert_eq!(series, AggregatedSeries::default());
    }

    #[test]
    fn test_one_point_per_snapshot_sorted_ascending() {
        // Listing order is arbitrary; output is oldest first.
        let snapshots = vec![
            water_snapshot(&[(30.0, 2)]),
            water_snapshot(&[(10.0, 40)]),
            water_snapshot(&[(20.0, 20)]),
        ];
        let series = aggregate_at(&snapshots, TimeFilter::AllTime, fixed_now());
        let values: Vec<f64> = series.water.iter().map(|p| p.data).collect();
        assert_eq!(values, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_last_10_minutes_excludes_older_points() {
        let snapshots = vec![
            water_snapshot(&[(1.0, 30)]),
            water_snapshot(&[(2.0, 11)]),
            water_snapshot(&[(3.0, 10)]),
            water_snapshot(&[(4.0, 1)]),
        ];
        let series = aggregate_at(&snapshots, TimeFilter::Last10Minutes, fixed_now());
        let values: Vec<f64> = series.water.iter().map(|p| p.data).collect();
        assert_eq!(values, vec![3.0, 4.0], "cutoff is inclusive");
    }

    #[test]
    fn test_last_hour_and_all_time() {
        let snapshots = vec![water_snapshot(&[(1.0, 24 * 60)]), water_snapshot(&[(2.0, 59)])];
        assert_eq!(
            aggregate_at(&snapshots, TimeFilter::LastHour, fixed_now()).water.len(),
            1
        );
        assert_eq!(
            aggregate_at(&snapshots, TimeFilter::AllTime, fixed_now()).water.len(),
            2
        );
    }

    #[test]
    fn test_filter_uses_last_reading_timestamp() {
        // The snapshot started 15 minutes ago but its last reading is fresh.
        let snapshots = vec![water_snapshot(&[(1.0, 15), (1.0, 2)])];
        let series = aggregate_at(&snapshots, TimeFilter::Last10Minutes, fixed_now());
        assert_eq!(series.water.len(), 1);
    }

    #[test]
    fn test_categories_are_independent() {
        let snapshot = Snapshot {
            water: vec![reading(100.0, 3), reading(200.0, 2)],
            solar: vec![reading(5.0, 1)],
            ..Snapshot::default()
        };
        let series = aggregate_at(&[snapshot], TimeFilter::AllTime, fixed_now());
        assert_eq!(series.series(Topic::Water)[0].data, 154.55);
        assert_eq!(series.series(Topic::Solar)[0].data, 5.0);
        assert!(series.series(Topic::Temperature).is_empty());
    }

    #[test]
    fn test_output_json_shape() {
        let series = aggregate_at(&[water_snapshot(&[(100.0, 3), (200.0, 2)])], TimeFilter::AllTime, fixed_now());
        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(
            json["water"][0],
            serde_json::json!({
                "timestamp": "2024-05-01T12:58:00.000Z",
                "sensor": "water",
                "data": 154.55
            })
        );
    }

    // --- Filter parsing -----------------------------------------------------

    #[test]
    fn test_time_filter_parsing() {
        assert_eq!(TimeFilter::from_query(Some("last-10-minutes")), TimeFilter::Last10Minutes);
        assert_eq!(TimeFilter::from_query(Some("last-hour")), TimeFilter::LastHour);
        assert_eq!(TimeFilter::from_query(Some("all-time")), TimeFilter::AllTime);
        assert_eq!(TimeFilter::from_query(Some("last-week")), TimeFilter::AllTime);
        assert_eq!(TimeFilter::from_query(None), TimeFilter::AllTime);
        assert!("yesterday".parse::<TimeFilter>().is_err());
    }
}
