//! Fields
//!
//! A field is a named computation over one time window. It queries the
//! record source, decodes what it finds and returns one typed value, or
//! `FieldValue::Absent` when no record applies. The name doubles as the
//! column key in the aligned table.
//!
//! Evaluating a field twice on the same window against an unchanged source
//! yields the same value; fields keep no state between calls.

mod calibration;
mod slide;
mod volts;

pub use calibration::CalibrationPointPositionField;
pub use slide::SlideOnOffTimestampField;
pub use volts::{AverageVoltsField, EyeSamples, VoltsField};

use std::sync::Arc;

use crate::config::ExtractConfig;
use crate::error::{AlignError, FieldError, SourceError};
use crate::source::{Row, RecordSource, SqlValue};
use crate::types::{FieldValue, TimeWindow};

/// Message types and device ids written by the rig
pub mod messages {
    pub const CALIBRATION_POINT_SETUP: &str = "CalibrationPointSetup";
    pub const CALIBRATION_POINT_SETUP_ROOT: &str = "CalibrationPointSetupMessage";
    pub const SLIDE_ON: &str = "SlideOn";
    pub const SLIDE_OFF: &str = "SlideOff";
    pub const EYE_DEVICE_MESSAGE: &str = "EyeDeviceMessage";
    pub const TRIAL_START: &str = "TrialStart";
    pub const TRIAL_STOP: &str = "TrialStop";

    pub const LEFT_ISCAN: &str = "leftIscan";
    pub const RIGHT_ISCAN: &str = "rightIscan";
}

/// Named computation over a time window
pub trait Field: Send + Sync {
    /// Column key in the aligned table
    fn name(&self) -> &str;

    /// Evaluate over `window`; `Ok(FieldValue::Absent)` when nothing matches
    fn get(&self, window: &TimeWindow) -> Result<FieldValue, FieldError>;
}

/// Ordered set of fields with unique names
#[derive(Default)]
pub struct FieldList {
    fields: Vec<Box<dyn Field>>,
}

impl FieldList {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four calibration columns, in the order the rig analysis uses
    pub fn calibration(source: &Arc<RecordSource>, extract: ExtractConfig) -> Self {
        let fields: Vec<Box<dyn Field>> = vec![
            Box::new(CalibrationPointPositionField::new(Arc::clone(source), extract)),
            Box::new(SlideOnOffTimestampField::new(Arc::clone(source), extract)),
            Box::new(VoltsField::new(Arc::clone(source), extract)),
            Box::new(AverageVoltsField::new(Arc::clone(source), extract)),
        ];
        Self { fields }
    }

    /// Append a field; names must be unique
    pub fn push(&mut self, field: impl Field + 'static) -> Result<(), AlignError> {
        if self.fields.iter().any(|f| f.name() == field.name()) {
            return Err(AlignError::DuplicateField(field.name().to_string()));
        }
        self.fields.push(Box::new(field));
        Ok(())
    }

    pub fn with(mut self, field: impl Field + 'static) -> Result<Self, AlignError> {
        self.push(field)?;
        Ok(self)
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Field> {
        self.fields.iter().map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// `SELECT {columns} FROM {table} WHERE type = ? AND tstamp in window`,
/// oldest first, optionally only the oldest row
pub(crate) fn select_in_window(
    source: &RecordSource,
    columns: &str,
    table: &str,
    kind: &str,
    window: &TimeWindow,
    extract: ExtractConfig,
    earliest_only: bool,
) -> Result<Vec<Row>, SourceError> {
    let limit = if earliest_only { " LIMIT 1" } else { "" };
    let sql = format!(
        "SELECT {columns} FROM {table} WHERE type = ? AND {} ORDER BY tstamp ASC{limit}",
        extract.boundary.sql_predicate("tstamp"),
    );
    source.read(
        &sql,
        &[
            SqlValue::from(kind),
            SqlValue::from(window.start()),
            SqlValue::from(window.stop()),
        ],
    )
}
