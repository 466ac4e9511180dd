//! Slide presentation timestamps

use std::sync::Arc;

use super::{messages, select_in_window, Field};
use crate::config::ExtractConfig;
use crate::error::FieldError;
use crate::source::{column_i64, tables, RecordSource};
use crate::types::{FieldValue, TimeWindow, Timestamp};

/// Earliest slide-on and slide-off timestamps in the window.
///
/// The two lookups are independent: either side may be absent.
pub struct SlideOnOffTimestampField {
    name: String,
    source: Arc<RecordSource>,
    extract: ExtractConfig,
}

impl SlideOnOffTimestampField {
    pub const DEFAULT_NAME: &'static str = "SlideOnOffTimestamps";

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

    fn earliest(&self, kind: &str, window: &TimeWindow) -> Result<Option<Timestamp>, FieldError> {
        let rows = select_in_window(
            &self.source,
            "tstamp",
            tables::BEH_MSG,
            kind,
            window,
            self.extract,
            true,
        )?;
        match rows.first() {
            Some(row) => Ok(Some(Timestamp(column_i64(row, 0, "tstamp")?))),
            None => Ok(None),
        }
    }
}

impl Field for SlideOnOffTimestampField {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, window: &TimeWindow) -> Result<FieldValue, FieldError> {
        Ok(FieldValue::TimestampPair {
            first: self.earliest(messages::SLIDE_ON, window)?,
            second: self.earliest(messages::SLIDE_OFF, window)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RigFixture;

    fn field(rig: &RigFixture) -> SlideOnOffTimestampField {
        SlideOnOffTimestampField::new(rig.source(), ExtractConfig::default())
    }

    #[test]
    fn test_earliest_of_each() {
        let rig = RigFixture::new();
        rig.message(140, "SlideOn", "");
        rig.message(120, "SlideOn", "");
        rig.message(190, "SlideOff", "");
        rig.message(160, "SlideOff", "");

        let value = field(&rig).get(&TimeWindow::new(100, 200).unwrap()).unwrap();
        assert_eq!(
            value.as_timestamp_pair(),
            Some((Some(Timestamp(120)), Some(Timestamp(160))))
        );
    }

    #[test]
    fn test_missing_side_does_not_fail_other() {
        let rig = RigFixture::new();
        rig.message(130, "SlideOn", "");
        rig.message(250, "SlideOff", "");

        let value = field(&rig).get(&TimeWindow::new(100, 200).unwrap()).unwrap();
        assert_eq!(value.as_timestamp_pair(), Some((Some(Timestamp(130)), None)));
    }

    #[test]
    fn test_get_is_deterministic() {
        let rig = RigFixture::new();
        rig.message(130, "SlideOn", "");
        rig.message(170, "SlideOff", "");
        let field = field(&rig);
        let w = TimeWindow::new(100, 200).unwrap();

        assert_eq!(field.get(&w).unwrap(), field.get(&w).unwrap());
    }

    #[test]
    fn test_neither_side() {
        let rig = RigFixture::new();

        let value = field(&rig).get(&TimeWindow::new(100, 200).unwrap()).unwrap();
        assert_eq!(value.as_timestamp_pair(), Some((None, None)));
    }
}
