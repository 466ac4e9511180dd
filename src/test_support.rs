//! SQLite rig fixtures shared by unit tests

use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::source::{RecordSource, SqliteDriver};

const SCHEMA: &str = "
    CREATE TABLE BehMsg (tstamp INTEGER NOT NULL, type TEXT NOT NULL, msg TEXT);
    CREATE TABLE BehMsgEye (tstamp INTEGER NOT NULL, type TEXT NOT NULL, msg TEXT);
    CREATE TABLE StimSpec (id INTEGER PRIMARY KEY, spec TEXT NOT NULL, util TEXT);
    CREATE TABLE StimObjData (id INTEGER PRIMARY KEY, spec TEXT NOT NULL, util TEXT);
";

/// Temporary rig database with the four record tables
pub(crate) struct RigFixture {
    _dir: TempDir,
    path: PathBuf,
    conn: Connection,
}

impl RigFixture {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        Self {
            _dir: dir,
            path,
            conn,
        }
    }

    pub(crate) fn message(&self, tstamp: i64, kind: &str, msg: &str) {
        self.conn
            .execute("INSERT INTO BehMsg VALUES (?1, ?2, ?3)", params![tstamp, kind, msg])
            .unwrap();
    }

    pub(crate) fn eye(&self, tstamp: i64, kind: &str, msg: &str) {
        self.conn
            .execute("INSERT INTO BehMsgEye VALUES (?1, ?2, ?3)", params![tstamp, kind, msg])
            .unwrap();
    }

    pub(crate) fn stim_spec(&self, id: i64, spec: &str) {
        self.conn
            .execute("INSERT INTO StimSpec VALUES (?1, ?2, NULL)", params![id, spec])
            .unwrap();
    }

    /// `EyeDeviceMessage` sample for device `id`
    pub(crate) fn volt(&self, tstamp: i64, id: &str, x: f64, y: f64) {
        self.eye(tstamp, "EyeDeviceMessage", &eye_device_message(id, x, y));
    }

    /// `CalibrationPointSetup` message at screen position (x, y)
    pub(crate) fn calibration_point(&self, tstamp: i64, x: f64, y: f64) {
        self.message(tstamp, "CalibrationPointSetup", &calibration_point_message(x, y));
    }

    pub(crate) fn source(&self) -> Arc<RecordSource> {
        Arc::new(RecordSource::new(SqliteDriver::new(&self.path), Duration::ZERO))
    }
}

pub(crate) fn eye_device_message(id: &str, x: f64, y: f64) -> String {
    format!(
        "<EyeDeviceMessage><timestamp>0</timestamp><id>{id}</id>\
         <volt><x>{x}</x><y>{y}</y></volt>\
         <degree><x>0.0</x><y>0.0</y></degree></EyeDeviceMessage>"
    )
}

pub(crate) fn calibration_point_message(x: f64, y: f64) -> String {
    format!(
        "<CalibrationPointSetupMessage><timestamp>0</timestamp>\
         <fixationPosition><x>{x}</x><y>{y}</y></fixationPosition>\
         </CalibrationPointSetupMessage>"
    )
}
