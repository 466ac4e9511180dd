//! Eye-device voltage series and their averages

use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{messages, select_in_window, Field};
use crate::config::ExtractConfig;
use crate::error::FieldError;
use crate::features::mean_pair;
use crate::payload::decode_message;
use crate::source::{column_i64, column_opt_text, tables, RecordSource};
use crate::types::{FieldValue, Point, TimeWindow, Timestamp};

/// Voltage samples of one window, split by eye
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EyeSamples {
    pub left: Vec<Point>,
    pub right: Vec<Point>,
}

/// Raw eye-device voltages in the window, partitioned into left and right
/// eye series in source order. Samples from other devices are dropped.
pub struct VoltsField {
    name: String,
    source: Arc<RecordSource>,
    extract: ExtractConfig,
}

impl VoltsField {
    pub const DEFAULT_NAME: &'static str = "VoltsLeftRight";

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

    /// Every eye-device sample in the window, decoded and partitioned
    pub fn samples(&self, window: &TimeWindow) -> Result<EyeSamples, FieldError> {
        let rows = select_in_window(
            &self.source,
            "tstamp, msg",
            tables::BEH_MSG_EYE,
            messages::EYE_DEVICE_MESSAGE,
            window,
            self.extract,
            false,
        )?;

        let mut samples = EyeSamples::default();
        let mut dropped = 0usize;

        for row in &rows {
            let timestamp = Timestamp(column_i64(row, 0, "tstamp")?);
            let payload = column_opt_text(row, 1, "msg")?.unwrap_or_default();
            let decoded = decode_message(&payload, messages::EYE_DEVICE_MESSAGE)
                .and_then(|msg| Ok((msg.text_at("id")?.to_string(), msg.point_at("volt")?)))
                .map_err(|source| FieldError::Decode { timestamp, source })?;

            match decoded {
                (id, volt) if id == messages::LEFT_ISCAN => samples.left.push(volt),
                (id, volt) if id == messages::RIGHT_ISCAN => samples.right.push(volt),
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!("Dropped {dropped} samples from unrecognized devices in window {window}");
        }
        Ok(samples)
    }
}

impl Field for VoltsField {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, window: &TimeWindow) -> Result<FieldValue, FieldError> {
        let EyeSamples { left, right } = self.samples(window)?;
        Ok(FieldValue::Series { left, right })
    }
}

/// Mean voltage of each eye over the window
pub struct AverageVoltsField {
    name: String,
    volts: VoltsField,
}

impl AverageVoltsField {
    pub const DEFAULT_NAME: &'static str = "AverageVoltsLeftRight";

    pub fn new(source: Arc<RecordSource>, extract: ExtractConfig) -> Self {
        Self::from_volts(VoltsField::new(source, extract))
    }

    /// Average the samples of an existing series field
    pub fn from_volts(volts: VoltsField) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            volts,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Field for AverageVoltsField {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, window: &TimeWindow) -> Result<FieldValue, FieldError> {
        let samples = self.volts.samples(window)?;
        let (left, right) = mean_pair(&samples.left, &samples.right);
        Ok(FieldValue::PointPair { left, right })
    }
}
