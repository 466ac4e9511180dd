//! Calibration target position

use log::warn;
use std::sync::Arc;

use super::{messages, select_in_window, Field};
use crate::config::{DuplicatePolicy, ExtractConfig};
use crate::error::FieldError;
use crate::payload::{decode_message, Lookup};
use crate::source::{column_i64, column_opt_text, tables, RecordSource};
use crate::types::{FieldValue, Point, TimeWindow, Timestamp};

/// Screen position of the calibration target shown in the window
pub struct CalibrationPointPositionField {
    name: String,
    source: Arc<RecordSource>,
    extract: ExtractConfig,
}

impl CalibrationPointPositionField {
    pub const DEFAULT_NAME: &'static str = "CalibrationPointPosition";

    pub fn new(source: Arc<RecordSource>, extract: ExtractConfig) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            source,
            extract,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Look up the setup message and decode its fixation position
    fn lookup(&self, window: &TimeWindow) -> Result<(Option<Timestamp>, Lookup<Point>), FieldError> {
        let rows = select_in_window(
            &self.source,
            "tstamp, msg",
            tables::BEH_MSG,
            messages::CALIBRATION_POINT_SETUP,
            window,
            self.extract,
            false,
        )?;

        if rows.len() > 1 {
            match self.extract.duplicates {
                DuplicatePolicy::First => warn!(
                    "{} {} messages in window {}; using the first",
                    rows.len(),
                    messages::CALIBRATION_POINT_SETUP,
                    window
                ),
                DuplicatePolicy::Reject => {
                    return Err(FieldError::Ambiguous {
                        kind: messages::CALIBRATION_POINT_SETUP.to_string(),
                        count: rows.len(),
                    })
                }
            }
        }

        let Some(row) = rows.first() else {
            return Ok((None, Lookup::NotFound));
        };
        let timestamp = Timestamp(column_i64(row, 0, "tstamp")?);
        let payload = column_opt_text(row, 1, "msg")?.unwrap_or_default();
        let lookup = Lookup::from_payload(Some(payload.as_str()), |text| {
            decode_message(text, messages::CALIBRATION_POINT_SETUP_ROOT)?.point_at("fixationPosition")
        });
        Ok((Some(timestamp), lookup))
    }
}

impl Field for CalibrationPointPositionField {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, window: &TimeWindow) -> Result<FieldValue, FieldError> {
        match self.lookup(window)? {
            (_, Lookup::NotFound) => Ok(FieldValue::Absent),
            (_, Lookup::Decoded(point)) => Ok(FieldValue::Point(point)),
            (timestamp, Lookup::Undecodable(source)) => Err(FieldError::Decode {
                timestamp: timestamp.unwrap_or(window.start()),
                source,
            }),
        }
    }
}
