//! SQLite driver on rusqlite

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, OpenFlags};
use std::path::{Path, PathBuf};

use super::driver::{Driver, DriverConnection, Row, SqlValue, StatementOutcome};
use crate::error::SourceError;

/// Opens read-write connections to an existing rig database file
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    path: PathBuf,
}

impl SqliteDriver {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Driver for SqliteDriver {
    fn connect(&self) -> Result<Box<dyn DriverConnection>, SourceError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags).map_err(|err| {
            SourceError::Connection(format!("cannot open {}: {}", self.path.display(), err))
        })?;
        Ok(Box::new(SqliteConnection { conn }))
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

struct SqliteConnection {
    conn: Connection,
}

impl DriverConnection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<StatementOutcome, SourceError> {
        let mut stmt = self.conn.prepare(sql).map_err(classify)?;
        let values: Vec<Value> = params.iter().map(to_sqlite).collect();
        let column_count = stmt.column_count();

        if column_count == 0 {
            let affected = stmt
                .execute(params_from_iter(values.iter()))
                .map_err(classify)?;
            return Ok(StatementOutcome::Affected(affected));
        }

        let mut rows = stmt.query(params_from_iter(values.iter())).map_err(classify)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(classify)? {
            let mut record: Row = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value: Value = row.get(idx).map_err(classify)?;
                record.push(from_sqlite(value));
            }
            out.push(record);
        }
        Ok(StatementOutcome::Rows(out))
    }

    fn commit(&mut self) -> Result<(), SourceError> {
        // SQLite runs in autocommit mode unless a statement opened a transaction
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT").map_err(classify)?;
        }
        Ok(())
    }
}

/// Busy, locked and I/O failures are transient; everything else is a query fault
fn classify(err: rusqlite::Error) -> SourceError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if matches!(
            failure.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
        ) {
            return SourceError::Connection(err.to_string());
        }
    }
    SourceError::Query(err.to_string())
}

fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Real(r) => Value::Real(*r),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Blob(b) => Value::Blob(b.clone()),
    }
}

fn from_sqlite(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(i),
        Value::Real(r) => SqlValue::Real(r),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Blob(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE BehMsg (tstamp INTEGER, type TEXT, msg TEXT);
             INSERT INTO BehMsg VALUES (10, 'SlideOn', '<SlideEvent/>');
             INSERT INTO BehMsg VALUES (20, 'SlideOff', NULL);",
        )
        .unwrap();
        (dir, path)
    }

    #[test]
    fn test_select_returns_typed_rows() {
        let (_dir, path) = fixture();
        let mut conn = SqliteDriver::new(&path).connect().unwrap();

        let outcome = conn
            .execute(
                "SELECT tstamp, type, msg FROM BehMsg WHERE tstamp >= ? ORDER BY tstamp",
                &[SqlValue::Integer(0)],
            )
            .unwrap();

        assert_eq!(
            outcome,
            StatementOutcome::Rows(vec![
                vec![
                    SqlValue::Integer(10),
                    SqlValue::Text("SlideOn".into()),
                    SqlValue::Text("<SlideEvent/>".into()),
                ],
                vec![
                    SqlValue::Integer(20),
                    SqlValue::Text("SlideOff".into()),
                    SqlValue::Null,
                ],
            ])
        );
    }

    #[test]
    fn test_statement_reports_affected_rows() {
        let (_dir, path) = fixture();
        let mut conn = SqliteDriver::new(&path).connect().unwrap();

        let outcome = conn.execute("DELETE FROM BehMsg WHERE tstamp = ?", &[SqlValue::Integer(10)]);
        assert_eq!(outcome.unwrap(), StatementOutcome::Affected(1));
        conn.commit().unwrap();
    }

    #[test]
    fn test_missing_database_is_connection_fault() {
        let dir = tempfile::tempdir().unwrap();
        let driver = SqliteDriver::new(dir.path().join("absent.sqlite"));

        assert!(matches!(driver.connect(), Err(SourceError::Connection(_))));
    }

    #[test]
    fn test_bad_sql_is_query_fault() {
        let (_dir, path) = fixture();
        let mut conn = SqliteDriver::new(&path).connect().unwrap();

        assert!(matches!(
            conn.execute("SELECT nope FROM BehMsg", &[]),
            Err(SourceError::Query(_))
        ));
    }
}
