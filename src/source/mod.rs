//! Record source
//!
//! A reconnecting, serialized client over the rig database. All access goes
//! through one mutex that is held for a whole query→fetch cycle, so a second
//! caller can never interleave its query between another caller's query and
//! fetch.
//!
//! Connection state is an explicit machine:
//!
//! ```text
//! Disconnected --query--> ResultReady --fetch_all--> Connected
//!      ^                      |  ^                       |
//!      |                      |  +--------query----------+
//!      +---connection fault---+
//! ```
//!
//! A connection fault during `query` drops the connection, waits the
//! configured delay, reconnects once and retries the statement once. A second
//! fault surfaces to the caller. Fetches read a buffered result and are never
//! retried.

mod driver;
mod sqlite;
mod streams;

#[cfg(test)]
pub(crate) mod scripted;

pub use driver::{
    column_i64, column_opt_text, column_text, Driver, DriverConnection, Row, SqlValue,
    StatementOutcome,
};
pub use sqlite::SqliteDriver;
pub use streams::{tables, RecordStream};

use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::config::SourceConfig;
use crate::error::SourceError;

enum State {
    Disconnected,
    Connected(Box<dyn DriverConnection>),
    ResultReady {
        conn: Box<dyn DriverConnection>,
        rows: VecDeque<Row>,
    },
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Disconnected => "disconnected",
            State::Connected(_) => "connected",
            State::ResultReady { .. } => "result_ready",
        }
    }
}

/// Shared, thread-safe handle on the rig database
pub struct RecordSource {
    driver: Box<dyn Driver>,
    reconnect_delay: Duration,
    state: Mutex<State>,
}

impl RecordSource {
    /// Create a source over `driver` without connecting yet
    pub fn new(driver: impl Driver + 'static, reconnect_delay: Duration) -> Self {
        Self {
            driver: Box::new(driver),
            reconnect_delay,
            state: Mutex::new(State::Disconnected),
        }
    }

    /// Open the SQLite database named by `config` and connect eagerly
    pub fn open(config: &SourceConfig) -> Result<Self, SourceError> {
        let source = Self::new(
            SqliteDriver::new(&config.database),
            config.reconnect_delay(),
        );
        source.connect()?;
        Ok(source)
    }

    /// Ensure a live connection. Idempotent; a failed attempt is retried once.
    pub fn connect(&self) -> Result<(), SourceError> {
        let mut state = self.lock();
        if matches!(*state, State::Disconnected) {
            *state = State::Connected(self.establish()?);
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        !matches!(*self.lock(), State::Disconnected)
    }

    /// Name of the current connection state, for diagnostics
    pub fn state_name(&self) -> &'static str {
        self.lock().name()
    }

    pub fn describe(&self) -> String {
        self.driver.describe()
    }

    /// Take exclusive access for a query→fetch cycle
    pub fn session(&self) -> SourceSession<'_> {
        SourceSession {
            source: self,
            state: self.lock(),
        }
    }

    /// Run `sql` and return every row, under one lock acquisition
    pub fn read(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, SourceError> {
        let mut session = self.session();
        session.query(sql, params)?;
        session.fetch_all()
    }

    /// Run `sql` and return the first column of the first row, if any
    pub fn read_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlValue>, SourceError> {
        let mut session = self.session();
        session.query(sql, params)?;
        session.fetch_one()
    }

    /// Run a statement without a result set. Committed immediately.
    pub fn execute_statement(&self, sql: &str, params: &[SqlValue]) -> Result<usize, SourceError> {
        let mut session = self.session();
        Ok(session.run(sql, params)?.unwrap_or(0))
    }

    /// Remove every row of `table`
    pub fn truncate(&self, table: &str) -> Result<usize, SourceError> {
        validate_identifier(table)?;
        self.execute_statement(&format!("DELETE FROM {table}"), &[])
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn establish(&self) -> Result<Box<dyn DriverConnection>, SourceError> {
        match self.driver.connect() {
            Ok(conn) => {
                info!("Connected to {}", self.driver.describe());
                Ok(conn)
            }
            Err(err) if err.is_connection_fault() => {
                warn!("Connect to {} failed ({err}); retrying once", self.driver.describe());
                thread::sleep(self.reconnect_delay);
                self.driver.connect()
            }
            Err(err) => Err(err),
        }
    }
}

/// Exclusive access to the record source for one query→fetch cycle.
///
/// Dropping the session releases the lock; an unread result stays pending
/// and is discarded by the next `query`.
pub struct SourceSession<'a> {
    source: &'a RecordSource,
    state: MutexGuard<'a, State>,
}

impl SourceSession<'_> {
    /// Issue `sql`, discarding any unread result from a previous query
    pub fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<(), SourceError> {
        self.run(sql, params).map(|_| ())
    }

    /// Consume the pending result
    pub fn fetch_all(&mut self) -> Result<Vec<Row>, SourceError> {
        match std::mem::replace(&mut *self.state, State::Disconnected) {
            State::ResultReady { conn, rows } => {
                *self.state = State::Connected(conn);
                Ok(rows.into())
            }
            other => {
                *self.state = other;
                Err(SourceError::NoPendingResult)
            }
        }
    }

    /// First column of the next pending row. `None` when the result is
    /// exhausted or the value is NULL.
    pub fn fetch_one(&mut self) -> Result<Option<SqlValue>, SourceError> {
        match &mut *self.state {
            State::ResultReady { rows, .. } => Ok(rows
                .pop_front()
                .and_then(|row| row.into_iter().next())
                .filter(|value| !value.is_null())),
            _ => Err(SourceError::NoPendingResult),
        }
    }

    /// Returns the affected row count for statements without a result set
    fn run(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<usize>, SourceError> {
        let conn = match std::mem::replace(&mut *self.state, State::Disconnected) {
            State::Disconnected => self.source.establish()?,
            State::Connected(conn) => conn,
            State::ResultReady { conn, rows } => {
                if !rows.is_empty() {
                    debug!("Discarding {} unread rows before next query", rows.len());
                }
                conn
            }
        };

        match self.attempt(conn, sql, params) {
            Err(err) if err.is_connection_fault() => {
                warn!(
                    "Connection fault on {} ({err}); reconnecting",
                    self.source.driver.describe()
                );
                thread::sleep(self.source.reconnect_delay);
                let conn = self.source.driver.connect()?;
                self.attempt(conn, sql, params)
            }
            result => result,
        }
    }

    /// Execute once on `conn` and settle the state. A connection fault leaves
    /// the session disconnected.
    fn attempt(
        &mut self,
        mut conn: Box<dyn DriverConnection>,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<usize>, SourceError> {
        match conn.execute(sql, params) {
            Ok(StatementOutcome::Rows(rows)) => {
                *self.state = State::ResultReady {
                    conn,
                    rows: rows.into(),
                };
                Ok(None)
            }
            Ok(StatementOutcome::Affected(n)) => {
                let committed = conn.commit();
                *self.state = State::Connected(conn);
                committed.map(|_| Some(n))
            }
            Err(err) if err.is_connection_fault() => Err(err),
            Err(err) => {
                *self.state = State::Connected(conn);
                Err(err)
            }
        }
    }
}

/// Accept only plain SQL identifiers for interpolated table names
fn validate_identifier(name: &str) -> Result<(), SourceError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(SourceError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::{Reply, ScriptedDriver};
    use super::*;
    use std::sync::Arc;

    fn rows(values: &[i64]) -> StatementOutcome {
        StatementOutcome::Rows(values.iter().map(|v| vec![SqlValue::Integer(*v)]).collect())
    }

    fn source(driver: &ScriptedDriver) -> RecordSource {
        RecordSource::new(driver.clone(), Duration::ZERO)
    }

    #[test]
    fn test_query_then_fetch_all() {
        let driver = ScriptedDriver::new(vec![Reply::Ok(rows(&[1, 2]))]);
        let source = source(&driver);

        let result = source.read("SELECT 1", &[]).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(source.state_name(), "connected");
    }

    #[test]
    fn test_fetch_without_query_is_usage_error() {
        let driver = ScriptedDriver::new(vec![]);
        let source = source(&driver);
        let mut session = source.session();

        assert!(matches!(session.fetch_all(), Err(SourceError::NoPendingResult)));
        assert!(matches!(session.fetch_one(), Err(SourceError::NoPendingResult)));
    }

    #[test]
    fn test_reconnect_once_then_succeed() {
        let driver = ScriptedDriver::new(vec![
            Reply::Err(SourceError::Connection("server has gone away".into())),
            Reply::Ok(rows(&[7])),
        ]);
        let source = source(&driver);
        source.connect().unwrap();

        let result = source.read("SELECT tstamp FROM BehMsg", &[]).unwrap();
        assert_eq!(result, vec![vec![SqlValue::Integer(7)]]);
        assert_eq!(driver.connects(), 2);
        assert_eq!(driver.executed(), 2);
    }

    #[test]
    fn test_second_connection_fault_is_fatal() {
        let driver = ScriptedDriver::new(vec![
            Reply::Err(SourceError::Connection("lost".into())),
            Reply::Err(SourceError::Connection("lost again".into())),
            Reply::Ok(rows(&[1])),
        ]);
        let source = source(&driver);

        let result = source.read("SELECT 1", &[]);
        assert!(matches!(result, Err(SourceError::Connection(_))));
        assert_eq!(driver.executed(), 2);
        assert!(!source.is_connected());
    }

    #[test]
    fn test_query_error_is_not_retried() {
        let driver = ScriptedDriver::new(vec![
            Reply::Err(SourceError::Query("syntax error".into())),
            Reply::Ok(rows(&[1])),
        ]);
        let source = source(&driver);

        assert!(matches!(source.read("SELEC 1", &[]), Err(SourceError::Query(_))));
        assert_eq!(driver.executed(), 1);
        assert!(source.is_connected());
    }

    #[test]
    fn test_failed_reconnect_surfaces() {
        let driver = ScriptedDriver::new(vec![Reply::Err(SourceError::Connection("lost".into()))]);
        let source = source(&driver);
        source.connect().unwrap();
        driver.fail_next_connects(1);

        assert!(matches!(source.read("SELECT 1", &[]), Err(SourceError::Connection(_))));
        assert_eq!(driver.executed(), 1);
    }

    #[test]
    fn test_connect_is_idempotent_and_retried() {
        let driver = ScriptedDriver::new(vec![]);
        driver.fail_next_connects(1);
        let source = source(&driver);

        source.connect().unwrap();
        source.connect().unwrap();
        assert_eq!(driver.connects(), 2);
        assert!(source.is_connected());
    }

    #[test]
    fn test_unread_result_discarded_by_next_query() {
        let driver = ScriptedDriver::new(vec![Reply::Ok(rows(&[1, 2, 3])), Reply::Ok(rows(&[9]))]);
        let source = source(&driver);

        {
            let mut session = source.session();
            session.query("SELECT a", &[]).unwrap();
            assert_eq!(session.fetch_one().unwrap(), Some(SqlValue::Integer(1)));
        }

        let result = source.read("SELECT b", &[]).unwrap();
        assert_eq!(result, vec![vec![SqlValue::Integer(9)]]);
    }

    #[test]
    fn test_fetch_one_walks_rows_then_none() {
        let driver = ScriptedDriver::new(vec![Reply::Ok(rows(&[4, 5]))]);
        let source = source(&driver);
        let mut session = source.session();

        session.query("SELECT x", &[]).unwrap();
        assert_eq!(session.fetch_one().unwrap(), Some(SqlValue::Integer(4)));
        assert_eq!(session.fetch_one().unwrap(), Some(SqlValue::Integer(5)));
        assert_eq!(session.fetch_one().unwrap(), None);
    }

    #[test]
    fn test_statement_without_result_commits() {
        let driver = ScriptedDriver::new(vec![Reply::Ok(StatementOutcome::Affected(3))]);
        let source = source(&driver);

        assert_eq!(source.truncate("BehMsg").unwrap(), 3);
        assert_eq!(driver.commits(), 1);
        assert!(matches!(source.session().fetch_all(), Err(SourceError::NoPendingResult)));
    }

    #[test]
    fn test_truncate_rejects_bad_identifier() {
        let driver = ScriptedDriver::new(vec![]);
        let source = source(&driver);

        assert!(matches!(
            source.truncate("BehMsg; DROP TABLE x"),
            Err(SourceError::InvalidIdentifier(_))
        ));
        assert_eq!(driver.executed(), 0);
    }

    #[test]
    fn test_sessions_serialize_across_threads() {
        let replies = (0..8).map(|i| Reply::Ok(rows(&[i]))).collect();
        let driver = ScriptedDriver::new(replies);
        let source = Arc::new(source(&driver));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let source = Arc::clone(&source);
                thread::spawn(move || {
                    let mut session = source.session();
                    session.query("SELECT n", &[]).unwrap();
                    thread::sleep(Duration::from_millis(1));
                    session.fetch_all().unwrap()
                })
            })
            .collect();

        let mut seen: Vec<i64> = handles
            .into_iter()
            .map(|h| h.join().unwrap()[0][0].as_i64().unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }
}
