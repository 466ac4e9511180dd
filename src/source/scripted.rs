//! Scripted driver for fault-injection tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::driver::{Driver, DriverConnection, SqlValue, StatementOutcome};
use crate::error::SourceError;

pub(crate) enum Reply {
    Ok(StatementOutcome),
    Err(SourceError),
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Reply>,
    failing_connects: usize,
    connects: usize,
    executed: usize,
    commits: usize,
}

/// Replays canned replies in order, across reconnects
#[derive(Clone)]
pub(crate) struct ScriptedDriver {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDriver {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                replies: replies.into(),
                ..Script::default()
            })),
        }
    }

    pub(crate) fn fail_next_connects(&self, n: usize) {
        self.script.lock().unwrap().failing_connects = n;
    }

    /// Connection attempts, failed ones included
    pub(crate) fn connects(&self) -> usize {
        self.script.lock().unwrap().connects
    }

    pub(crate) fn executed(&self) -> usize {
        self.script.lock().unwrap().executed
    }

    pub(crate) fn commits(&self) -> usize {
        self.script.lock().unwrap().commits
    }
}

impl Driver for ScriptedDriver {
    fn connect(&self) -> Result<Box<dyn DriverConnection>, SourceError> {
        let mut script = self.script.lock().unwrap();
        script.connects += 1;
        if script.failing_connects > 0 {
            script.failing_connects -= 1;
            return Err(SourceError::Connection("connection refused".into()));
        }
        Ok(Box::new(ScriptedConnection {
            script: Arc::clone(&self.script),
        }))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
}

impl DriverConnection for ScriptedConnection {
    fn execute(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<StatementOutcome, SourceError> {
        let mut script = self.script.lock().unwrap();
        script.executed += 1;
        match script.replies.pop_front() {
            Some(Reply::Ok(outcome)) => Ok(outcome),
            Some(Reply::Err(err)) => Err(err),
            None => Ok(StatementOutcome::Rows(Vec::new())),
        }
    }

    fn commit(&mut self) -> Result<(), SourceError> {
        self.script.lock().unwrap().commits += 1;
        Ok(())
    }
}
