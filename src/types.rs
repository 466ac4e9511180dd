//! Core types for the eyecal pipeline
//!
//! This module defines the values that flow between the record source, the
//! fields and the aligned table: timestamps, time windows, raw records and
//! the typed results fields produce.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;

/// Rig timestamp: microseconds since the Unix epoch (the `tstamp` column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn micros(self) -> i64 {
        self.0
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Timestamp(dt.timestamp_micros())
    }

    /// Midnight UTC of the given calendar date
    pub fn from_date(date: NaiveDate) -> Self {
        Timestamp::from_datetime(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(v: i64) -> Self {
        Timestamp(v)
    }
}

/// How a window's endpoints compare against record timestamps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// `start <= t <= stop`, the rig's `BETWEEN` semantics
    #[default]
    Inclusive,
    /// `start <= t < stop`; contiguous windows never share a record
    HalfOpen,
}

impl Boundary {
    /// SQL predicate over `column` taking the window start and stop as the
    /// next two positional parameters
    pub fn sql_predicate(&self, column: &str) -> String {
        match self {
            Boundary::Inclusive => format!("{column} BETWEEN ? AND ?"),
            Boundary::HalfOpen => format!("{column} >= ? AND {column} < ?"),
        }
    }
}

/// Interval of rig time over which fields are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WindowBounds")]
pub struct TimeWindow {
    start: Timestamp,
    stop: Timestamp,
}

#[derive(Deserialize)]
struct WindowBounds {
    start: Timestamp,
    stop: Timestamp,
}

impl TryFrom<WindowBounds> for TimeWindow {
    type Error = PipelineError;

    fn try_from(bounds: WindowBounds) -> Result<Self, Self::Error> {
        TimeWindow::new(bounds.start, bounds.stop)
    }
}

impl TimeWindow {
    pub fn new(start: impl Into<Timestamp>, stop: impl Into<Timestamp>) -> Result<Self, PipelineError> {
        let (start, stop) = (start.into(), stop.into());
        if start > stop {
            return Err(PipelineError::InvalidWindow {
                start: start.0,
                stop: stop.0,
            });
        }
        Ok(Self { start, stop })
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn stop(&self) -> Timestamp {
        self.stop
    }

    pub fn contains(&self, t: Timestamp, boundary: Boundary) -> bool {
        match boundary {
            Boundary::Inclusive => self.start <= t && t <= self.stop,
            Boundary::HalfOpen => self.start <= t && t < self.stop,
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.stop)
    }
}

/// 2-D coordinate: a screen position in degrees or a voltage pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One row of the behavioural or eye message stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: String,
}

/// One row of the stimulus specification or stimulus object data streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimRecord {
    pub id: i64,
    pub spec: String,
    pub util: Option<String>,
}

/// Result of evaluating one field over one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldValue {
    /// No applicable record in the window
    Absent,
    Point(Point),
    TimestampPair {
        first: Option<Timestamp>,
        second: Option<Timestamp>,
    },
    Series {
        left: Vec<Point>,
        right: Vec<Point>,
    },
    PointPair {
        left: Option<Point>,
        right: Option<Point>,
    },
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    pub fn as_point(&self) -> Option<Point> {
        match self {
            FieldValue::Point(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_point_pair(&self) -> Option<(Option<Point>, Option<Point>)> {
        match self {
            FieldValue::PointPair { left, right } => Some((*left, *right)),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<(&[Point], &[Point])> {
        match self {
            FieldValue::Series { left, right } => Some((left, right)),
            _ => None,
        }
    }

    pub fn as_timestamp_pair(&self) -> Option<(Option<Timestamp>, Option<Timestamp>)> {
        match self {
            FieldValue::TimestampPair { first, second } => Some((*first, *second)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_rejects_reversed_bounds() {
        assert!(TimeWindow::new(10, 5).is_err());
        assert!(TimeWindow::new(5, 5).is_ok());
    }

    #[test]
    fn test_deserialize_checks_bounds() {
        let window: TimeWindow = serde_json::from_str(r#"{"start":5,"stop":10}"#).unwrap();
        assert_eq!(window, TimeWindow::new(5, 10).unwrap());

        assert!(serde_json::from_str::<TimeWindow>(r#"{"start":10,"stop":5}"#).is_err());
    }

    #[test]
    fn test_boundary_containment() {
        let w = TimeWindow::new(100, 200).unwrap();

        assert!(w.contains(Timestamp(100), Boundary::Inclusive));
        assert!(w.contains(Timestamp(200), Boundary::Inclusive));
        assert!(w.contains(Timestamp(100), Boundary::HalfOpen));
        assert!(!w.contains(Timestamp(200), Boundary::HalfOpen));
        assert!(!w.contains(Timestamp(99), Boundary::Inclusive));
    }

    #[test]
    fn test_boundary_sql_predicate() {
        assert_eq!(
            Boundary::Inclusive.sql_predicate("tstamp"),
            "tstamp BETWEEN ? AND ?"
        );
        assert_eq!(
            Boundary::HalfOpen.sql_predicate("id"),
            "id >= ? AND id < ?"
        );
    }

    #[test]
    fn test_timestamp_datetime_conversion() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 11).unwrap();
        let ts = Timestamp::from_date(date);
        let dt = ts.to_datetime().unwrap();

        assert_eq!(dt.date_naive(), date);
        assert_eq!(Timestamp::from_datetime(dt), ts);
    }

    #[test]
    fn test_field_value_serializes_with_kind_tag() {
        let value = FieldValue::Point(Point::new(1.0, -2.5));
        let json = serde_json::to_value(&value).unwrap();

        assert_eq!(json["kind"], "point");
        assert_eq!(json["x"], 1.0);
        assert_eq!(serde_json::to_value(FieldValue::Absent).unwrap()["kind"], "absent");
    }
}
