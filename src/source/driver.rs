//! Driver seam between the record source and a concrete database client

use crate::error::SourceError;
use crate::types::Timestamp;

/// A single column value as returned by (or bound into) a statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Real(r) => Some(*r),
            SqlValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text columns stored as blobs by some rig versions are accepted if UTF-8
    pub fn into_text(self) -> Option<String> {
        match self {
            SqlValue::Text(s) => Some(s),
            SqlValue::Blob(b) => String::from_utf8(b).ok(),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Timestamp> for SqlValue {
    fn from(v: Timestamp) -> Self {
        SqlValue::Integer(v.micros())
    }
}

/// One result row, columns in select order
pub type Row = Vec<SqlValue>;

/// What a statement produced
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// Tabular result, fully buffered
    Rows(Vec<Row>),
    /// Statement without a result set; number of rows changed
    Affected(usize),
}

/// Opens connections to a database
pub trait Driver: Send + Sync {
    /// Open a fresh connection. Failures are connection faults.
    fn connect(&self) -> Result<Box<dyn DriverConnection>, SourceError>;

    /// Human-readable target for log lines
    fn describe(&self) -> String;
}

/// One live connection
pub trait DriverConnection: Send {
    /// Run one statement with positional `?` parameters
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<StatementOutcome, SourceError>;

    /// Commit any open transaction
    fn commit(&mut self) -> Result<(), SourceError>;
}

/// Read column `idx` of `row` as an integer
pub fn column_i64(row: &Row, idx: usize, column: &str) -> Result<i64, SourceError> {
    row.get(idx)
        .and_then(SqlValue::as_i64)
        .ok_or_else(|| SourceError::ColumnType {
            column: column.to_string(),
            reason: format!("expected integer, got {:?}", row.get(idx)),
        })
}

/// Read column `idx` of `row` as text
pub fn column_text(row: &Row, idx: usize, column: &str) -> Result<String, SourceError> {
    row.get(idx)
        .cloned()
        .and_then(SqlValue::into_text)
        .ok_or_else(|| SourceError::ColumnType {
            column: column.to_string(),
            reason: format!("expected text, got {:?}", row.get(idx)),
        })
}

/// Read column `idx` of `row` as nullable text
pub fn column_opt_text(row: &Row, idx: usize, column: &str) -> Result<Option<String>, SourceError> {
    match row.get(idx) {
        None | Some(SqlValue::Null) => Ok(None),
        Some(_) => column_text(row, idx, column).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_readers() {
        let row: Row = vec![
            SqlValue::Integer(42),
            SqlValue::Text("SlideOn".into()),
            SqlValue::Blob(b"<a/>".to_vec()),
            SqlValue::Null,
        ];

        assert_eq!(column_i64(&row, 0, "tstamp").unwrap(), 42);
        assert_eq!(column_text(&row, 1, "type").unwrap(), "SlideOn");
        assert_eq!(column_text(&row, 2, "msg").unwrap(), "<a/>");
        assert_eq!(column_opt_text(&row, 3, "util").unwrap(), None);
        assert!(column_i64(&row, 1, "tstamp").is_err());
        assert!(column_text(&row, 9, "missing").is_err());
    }

    #[test]
    fn test_sql_value_conversions() {
        assert_eq!(SqlValue::from(Timestamp(7)), SqlValue::Integer(7));
        assert_eq!(SqlValue::from("x").as_str(), Some("x"));
        assert_eq!(SqlValue::Integer(3).as_f64(), Some(3.0));
        assert!(SqlValue::Null.is_null());
    }
}
