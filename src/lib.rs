//! eyecal - Time-windowed alignment of eye-tracker calibration data
//!
//! eyecal reads the event log an experiment rig writes to its database and
//! aligns it per calibration trial: for every trial window it evaluates a list
//! of fields (target position, slide timing, raw and averaged eye voltages)
//! and assembles one row per window.
//!
//! ## Modules
//!
//! - **Record source**: reconnecting, serialized access to the rig tables
//! - **Payload decoding**: XML message payloads to typed values
//! - **Fields**: named per-window computations over the record source
//! - **Pipeline**: trial discovery, experiment filter, aligned table builder

pub mod config;
pub mod error;
pub mod features;
pub mod fields;
pub mod payload;
pub mod pipeline;
pub mod source;
pub mod summary;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{Config, DuplicatePolicy, ExtractConfig, SourceConfig};
pub use error::{AlignError, DecodeError, FieldError, PipelineError, SourceError};
pub use fields::{Field, FieldList};
pub use pipeline::{build, AlignedTable, CalibrationPipeline, MessageTrialCollector, TrialCollector};
pub use source::RecordSource;
pub use types::{Boundary, FieldValue, Point, TimeWindow, Timestamp};

/// eyecal version
pub const EYECAL_VERSION: &str = env!("CARGO_PKG_VERSION");
