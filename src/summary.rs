//! Calibration summary
//!
//! Groups the aligned table by calibration target so a plot can colour each
//! target's averaged voltages alike. Reads the `CalibrationPointPosition` and
//! `AverageVoltsLeftRight` columns by name.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::features::mean_present;
use crate::fields::{AverageVoltsField, CalibrationPointPositionField};
use crate::pipeline::AlignedTable;
use crate::types::{FieldValue, Point};

/// Averaged voltages of every trial that showed one calibration target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationGroup {
    pub target: Point,
    /// Row indices in the aligned table
    pub trials: Vec<usize>,
    pub left: Vec<Option<Point>>,
    pub right: Vec<Option<Point>>,
    pub mean_left: Option<Point>,
    pub mean_right: Option<Point>,
}

/// Group rows by target, targets sorted by (x, y). Rows without a target
/// are skipped.
pub fn calibration_summary(table: &AlignedTable) -> Result<Vec<CalibrationGroup>, PipelineError> {
    summarize(
        table,
        CalibrationPointPositionField::DEFAULT_NAME,
        AverageVoltsField::DEFAULT_NAME,
    )
}

/// `calibration_summary` over custom column names
pub fn summarize(
    table: &AlignedTable,
    target_column: &str,
    average_column: &str,
) -> Result<Vec<CalibrationGroup>, PipelineError> {
    let targets = table
        .column(target_column)
        .ok_or_else(|| PipelineError::MissingColumn(target_column.to_string()))?;
    let averages = table
        .column(average_column)
        .ok_or_else(|| PipelineError::MissingColumn(average_column.to_string()))?;

    let mut groups: Vec<CalibrationGroup> = Vec::new();
    for (row, (target, average)) in targets.into_iter().zip(averages).enumerate() {
        let FieldValue::Point(target) = target else {
            continue;
        };
        let (left, right) = average.as_point_pair().unwrap_or((None, None));

        let idx = match groups.iter().position(|g| g.target == *target) {
            Some(idx) => idx,
            None => {
                groups.push(CalibrationGroup {
                    target: *target,
                    trials: Vec::new(),
                    left: Vec::new(),
                    right: Vec::new(),
                    mean_left: None,
                    mean_right: None,
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        group.trials.push(table.rows()[row].index);
        group.left.push(left);
        group.right.push(right);
    }

    for group in &mut groups {
        group.mean_left = mean_present(&group.left);
        group.mean_right = mean_present(&group.right);
    }
    groups.sort_by(|a, b| {
        a.target
            .x
            .total_cmp(&b.target.x)
            .then(a.target.y.total_cmp(&b.target.y))
    });
    Ok(groups)
}
