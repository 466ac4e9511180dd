//! Windowed reads over the rig's record streams
//!
//! The rig writes two message streams with the same shape
//! (`tstamp`, `type`, `msg`) and two stimulus streams keyed by id
//! (`id`, `spec`, `util`).

use chrono::NaiveDate;
use log::debug;

use super::driver::{column_i64, column_opt_text, column_text, SqlValue};
use super::RecordSource;
use crate::error::SourceError;
use crate::types::{Boundary, RawRecord, StimRecord, TimeWindow, Timestamp};

/// Table and message-type names used by the rig
pub mod tables {
    pub const BEH_MSG: &str = "BehMsg";
    pub const BEH_MSG_EYE: &str = "BehMsgEye";
    pub const STIM_SPEC: &str = "StimSpec";
    pub const STIM_OBJ_DATA: &str = "StimObjData";

    pub const EXPERIMENT_START: &str = "ExperimentStart";
}

/// Message stream selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStream {
    /// General behavioural messages
    Behavior,
    /// Eye-device samples
    Eye,
}

impl RecordStream {
    pub fn table(&self) -> &'static str {
        match self {
            RecordStream::Behavior => tables::BEH_MSG,
            RecordStream::Eye => tables::BEH_MSG_EYE,
        }
    }
}

/// End of the open window returned for "since experiment N"
fn open_window_end() -> Timestamp {
    NaiveDate::from_ymd_opt(3022, 1, 1)
        .map(Timestamp::from_date)
        .unwrap_or(Timestamp(i64::MAX))
}

impl RecordSource {
    /// Every message of `stream` inside `window`, in timestamp order.
    ///
    /// This is a diagnostic read: an empty window means the window itself is
    /// wrong, so it fails with `EmptyResult`.
    pub fn messages(
        &self,
        stream: RecordStream,
        window: &TimeWindow,
        boundary: Boundary,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let sql = format!(
            "SELECT tstamp, type, msg FROM {} WHERE {} ORDER BY tstamp ASC",
            stream.table(),
            boundary.sql_predicate("tstamp")
        );
        let rows = self.read(&sql, &[SqlValue::from(window.start()), SqlValue::from(window.stop())])?;

        if rows.is_empty() {
            return Err(SourceError::EmptyResult {
                table: stream.table().to_string(),
                window: *window,
            });
        }

        rows.iter()
            .map(|row| {
                Ok(RawRecord {
                    timestamp: Timestamp(column_i64(row, 0, "tstamp")?),
                    kind: column_text(row, 1, "type")?,
                    payload: column_opt_text(row, 2, "msg")?.unwrap_or_default(),
                })
            })
            .collect()
    }

    pub fn beh_msg(&self, window: &TimeWindow, boundary: Boundary) -> Result<Vec<RawRecord>, SourceError> {
        self.messages(RecordStream::Behavior, window, boundary)
    }

    pub fn beh_msg_eye(&self, window: &TimeWindow, boundary: Boundary) -> Result<Vec<RawRecord>, SourceError> {
        self.messages(RecordStream::Eye, window, boundary)
    }

    /// Stimulus specifications with `first <= id <= last`
    pub fn stim_spec(&self, first: i64, last: i64) -> Result<Vec<StimRecord>, SourceError> {
        self.stim_rows(tables::STIM_SPEC, first, last)
    }

    /// Stimulus object data with `first <= id <= last`
    pub fn stim_obj_data(&self, first: i64, last: i64) -> Result<Vec<StimRecord>, SourceError> {
        self.stim_rows(tables::STIM_OBJ_DATA, first, last)
    }

    fn stim_rows(&self, table: &str, first: i64, last: i64) -> Result<Vec<StimRecord>, SourceError> {
        let sql = format!("SELECT id, spec, util FROM {table} WHERE id >= ? AND id <= ? ORDER BY id ASC");
        let rows = self.read(&sql, &[SqlValue::Integer(first), SqlValue::Integer(last)])?;
        debug!("{} rows from {table} for ids {first}..={last}", rows.len());

        rows.iter()
            .map(|row| {
                Ok(StimRecord {
                    id: column_i64(row, 0, "id")?,
                    spec: column_text(row, 1, "spec")?,
                    util: column_opt_text(row, 2, "util")?,
                })
            })
            .collect()
    }

    /// Timestamp of the most recent `ExperimentStart` message, if any
    pub fn latest_experiment_start(&self) -> Result<Option<Timestamp>, SourceError> {
        let sql = format!(
            "SELECT MAX(tstamp) FROM {} WHERE type = ?",
            tables::BEH_MSG
        );
        let value = self.read_one(&sql, &[SqlValue::from(tables::EXPERIMENT_START)])?;
        Ok(value.and_then(|v| v.as_i64()).map(Timestamp))
    }

    /// Open window starting at the `n`-th most recent experiment (1 = latest)
    pub fn since_nth_most_recent_experiment(&self, n: usize) -> Result<Option<TimeWindow>, SourceError> {
        let offset = n.saturating_sub(1) as i64;
        let sql = format!(
            "SELECT tstamp FROM {} WHERE type = ? ORDER BY tstamp DESC LIMIT 1 OFFSET ?",
            tables::BEH_MSG
        );
        let start = self.read_one(&sql, &[SqlValue::from(tables::EXPERIMENT_START), SqlValue::Integer(offset)])?;

        Ok(start
            .and_then(|v| v.as_i64())
            .map(Timestamp)
            .and_then(|start| TimeWindow::new(start, open_window_end().max(start)).ok()))
    }
}
