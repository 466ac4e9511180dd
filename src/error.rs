//! Error types for eyecal
//!
//! Each layer of the pipeline owns one error enum. Lower layers convert into
//! higher ones with `#[from]`, so a failure deep in the record source still
//! reaches the caller with its original cause attached.

use thiserror::Error;

use crate::types::{TimeWindow, Timestamp};

/// Errors raised by the record source and its drivers
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transient network/database unavailability. Retried once on `query`.
    #[error("Connection fault: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("No pending result: fetch called before query")]
    NoPendingResult,

    /// A diagnostic read expected at least one record and found none
    #[error("No records in {table} for window {window}")]
    EmptyResult { table: String, window: TimeWindow },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Unexpected column value in {column}: {reason}")]
    ColumnType { column: String, reason: String },
}

impl SourceError {
    /// Whether this fault warrants a reconnect-and-retry
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, SourceError::Connection(_))
    }
}

/// Errors raised while decoding a structured-text payload
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Malformed payload at {line}:{column}: {reason}")]
    Malformed { line: u32, column: u32, reason: String },

    #[error("Missing path in payload: {0}")]
    MissingPath(String),

    #[error("Invalid number at {path}: {value:?}")]
    InvalidNumber { path: String, value: String },
}

/// Errors raised by a field while evaluating one window
#[derive(Debug, Error)]
pub enum FieldError {
    /// A record was found but could not be decoded
    #[error("Undecodable record at {timestamp}: {source}")]
    Decode {
        timestamp: Timestamp,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Source(#[from] SourceError),

    /// More than one record matched where exactly one was expected
    #[error("Ambiguous match: {count} {kind} records in window")]
    Ambiguous { kind: String, count: usize },
}

/// Errors raised by the alignment table builder
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("Field {field} failed on window #{window_index} {window}: {source}")]
    Field {
        field: String,
        window_index: usize,
        window: TimeWindow,
        #[source]
        source: FieldError,
    },

    #[error("Duplicate field name: {0}")]
    DuplicateField(String),
}

/// Top-level errors for a full calibration run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Align(#[from] AlignError),

    #[error("No ExperimentStart message found")]
    NoExperimentStart,

    #[error("Invalid time window: start {start} is after stop {stop}")]
    InvalidWindow { start: i64, stop: i64 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid aligned table: {0}")]
    InvalidTable(String),

    #[error("Aligned table has no column {0}")]
    MissingColumn(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
