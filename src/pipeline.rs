//! Pipeline orchestration
//!
//! This module provides the public API for eyecal. It aligns field values
//! over a list of time windows and wires the calibration run end to end.
//!
//! Pipeline stages:
//! 1. TrialCollector - discover calibration trial windows
//! 2. filter_after_experiment_start - drop trials from earlier experiments
//! 3. FieldList - the configured columns
//! 4. build - evaluate every field on every window into an AlignedTable

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ExtractConfig;
use crate::error::{AlignError, PipelineError};
use crate::fields::{messages, FieldList};
use crate::source::{column_i64, column_text, tables, RecordSource, SqlValue};
use crate::types::{FieldValue, TimeWindow, Timestamp};

/// One aligned row: the window's position, the window, one value per column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedRow {
    pub index: usize,
    pub window: TimeWindow,
    pub values: Vec<FieldValue>,
}

/// One row per input window, one column per field, in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableParts")]
pub struct AlignedTable {
    columns: Vec<String>,
    rows: Vec<AlignedRow>,
}

#[derive(Deserialize)]
struct TableParts {
    columns: Vec<String>,
    rows: Vec<AlignedRow>,
}

impl TryFrom<TableParts> for AlignedTable {
    type Error = PipelineError;

    fn try_from(parts: TableParts) -> Result<Self, Self::Error> {
        if let Some(row) = parts.rows.iter().find(|r| r.values.len() != parts.columns.len()) {
            return Err(PipelineError::InvalidTable(format!(
                "row {} has {} values for {} columns",
                row.index,
                row.values.len(),
                parts.columns.len()
            )));
        }
        Ok(Self {
            columns: parts.columns,
            rows: parts.rows,
        })
    }
}

impl AlignedTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[AlignedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of `column` in row `row`
    pub fn get(&self, row: usize, column: &str) -> Option<&FieldValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.values.get(idx))
    }

    /// Every value of `column`, in row order
    pub fn column(&self, column: &str) -> Option<Vec<&FieldValue>> {
        let idx = self.column_index(column)?;
        self.rows.iter().map(|r| r.values.get(idx)).collect()
    }

    /// Rows as JSON objects keyed by column name
    pub fn to_records(&self) -> Result<Vec<serde_json::Value>, serde_json::Error> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = serde_json::Map::new();
                record.insert("index".to_string(), serde_json::to_value(row.index)?);
                record.insert("window".to_string(), serde_json::to_value(row.window)?);
                for (name, value) in self.columns.iter().zip(&row.values) {
                    record.insert(name.clone(), serde_json::to_value(value)?);
                }
                Ok(serde_json::Value::Object(record))
            })
            .collect()
    }
}

/// Evaluate every field on every window.
///
/// Traversal is window-major. The first field error aborts the build and
/// names the offending field and window; no partial table is returned.
pub fn build(fields: &FieldList, windows: &[TimeWindow]) -> Result<AlignedTable, AlignError> {
    let columns = fields.names();
    let mut rows = Vec::with_capacity(windows.len());

    for (index, window) in windows.iter().enumerate() {
        let mut values = Vec::with_capacity(fields.len());
        for field in fields.iter() {
            let value = field.get(window).map_err(|source| AlignError::Field {
                field: field.name().to_string(),
                window_index: index,
                window: *window,
                source,
            })?;
            values.push(value);
        }
        debug!("Aligned window #{index} {window}");
        rows.push(AlignedRow {
            index,
            window: *window,
            values,
        });
    }

    info!("Built aligned table: {} rows x {} columns", rows.len(), columns.len());
    Ok(AlignedTable { columns, rows })
}

/// Keep windows starting strictly after the latest `ExperimentStart`
pub fn filter_after_experiment_start(
    source: &RecordSource,
    windows: Vec<TimeWindow>,
) -> Result<Vec<TimeWindow>, PipelineError> {
    let experiment_start = source
        .latest_experiment_start()?
        .ok_or(PipelineError::NoExperimentStart)?;

    let before = windows.len();
    let kept: Vec<TimeWindow> = windows
        .into_iter()
        .filter(|w| w.start() > experiment_start)
        .collect();
    debug!(
        "Experiment start {experiment_start}: kept {} of {before} windows",
        kept.len()
    );
    Ok(kept)
}

/// Produces the calibration trial windows of a session
pub trait TrialCollector {
    fn collect_calibration_trials(&self) -> Result<Vec<TimeWindow>, PipelineError>;
}

/// Pairs `TrialStart`/`TrialStop` messages and keeps the trials that set up
/// a calibration point
pub struct MessageTrialCollector {
    source: Arc<RecordSource>,
}

impl MessageTrialCollector {
    pub fn new(source: Arc<RecordSource>) -> Self {
        Self { source }
    }
}

impl TrialCollector for MessageTrialCollector {
    fn collect_calibration_trials(&self) -> Result<Vec<TimeWindow>, PipelineError> {
        let sql = format!(
            "SELECT tstamp, type FROM {} WHERE type IN (?, ?, ?) ORDER BY tstamp ASC",
            tables::BEH_MSG
        );
        let rows = self.source.read(
            &sql,
            &[
                SqlValue::from(messages::TRIAL_START),
                SqlValue::from(messages::TRIAL_STOP),
                SqlValue::from(messages::CALIBRATION_POINT_SETUP),
            ],
        )?;

        let mut trials = Vec::new();
        let mut open: Option<(Timestamp, bool)> = None;
        for row in &rows {
            let timestamp = Timestamp(column_i64(row, 0, "tstamp")?);
            let kind = column_text(row, 1, "type")?;
            match kind.as_str() {
                messages::TRIAL_START => open = Some((timestamp, false)),
                messages::CALIBRATION_POINT_SETUP => {
                    if let Some((_, calibration)) = open.as_mut() {
                        *calibration = true;
                    }
                }
                messages::TRIAL_STOP => {
                    if let Some((start, true)) = open.take() {
                        trials.push(TimeWindow::new(start, timestamp)?);
                    }
                }
                _ => {}
            }
        }

        info!("Collected {} calibration trials", trials.len());
        Ok(trials)
    }
}

/// End-to-end calibration run over one rig database
pub struct CalibrationPipeline {
    source: Arc<RecordSource>,
    extract: ExtractConfig,
}

impl CalibrationPipeline {
    pub fn new(source: Arc<RecordSource>, extract: ExtractConfig) -> Self {
        Self { source, extract }
    }

    pub fn source(&self) -> &Arc<RecordSource> {
        &self.source
    }

    /// Calibration trials of the latest experiment
    pub fn trials(&self, collector: &dyn TrialCollector) -> Result<Vec<TimeWindow>, PipelineError> {
        let trials = collector.collect_calibration_trials()?;
        filter_after_experiment_start(&self.source, trials)
    }

    /// Collect, filter and align with the four calibration fields
    pub fn run(&self, collector: &dyn TrialCollector) -> Result<AlignedTable, PipelineError> {
        let windows = self.trials(collector)?;
        let fields = FieldList::calibration(&self.source, self.extract);
        Ok(build(&fields, &windows)?)
    }

    /// `run` with the message-based trial collector
    pub fn run_default(&self) -> Result<AlignedTable, PipelineError> {
        self.run(&MessageTrialCollector::new(Arc::clone(&self.source)))
    }
}
