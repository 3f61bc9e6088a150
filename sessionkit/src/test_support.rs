// In-memory cluster driver for unit tests. Records every connect, probe and
// statement; connects and handles fail on demand.

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use scylla::frame::response::result::{CqlValue, Row};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::database::driver::{ClusterDriver, ConnectionHandle, RowStream, Statement};
use crate::database::options::ClusterConfig;
use crate::database::probe::PROBE_QUERY;
use crate::errors::SessionError;

pub fn text_row(value: &str) -> Row {
    Row {
        columns: vec![Some(CqlValue::Text(value.to_string()))],
    }
}

pub fn uuid_row(value: Uuid) -> Row {
    Row {
        columns: vec![Some(CqlValue::Uuid(value))],
    }
}

pub fn row(columns: Vec<Option<CqlValue>>) -> Row {
    Row { columns }
}

// Row is not Clone; scripted results are handed out as fresh copies.
fn copy_rows(rows: &[Row]) -> Vec<Row> {
    rows.iter()
        .map(|r| Row {
            columns: r.columns.clone(),
        })
        .collect()
}

#[derive(Default)]
struct DriverState {
    create_calls: AtomicUsize,
    failed_creates: AtomicUsize,
    scripted_failures: Mutex<VecDeque<SessionError>>,
    fail_all: AtomicBool,
    hang: AtomicBool,
    next_id: AtomicU64,
    last_config: Mutex<Option<ClusterConfig>>,
    last_statement: Mutex<Option<Statement>>,
    rows: Mutex<HashMap<String, Vec<Row>>>,
    probe_rows: Mutex<Option<Vec<Row>>>,
    probe_times: Mutex<Vec<Instant>>,
}

#[derive(Clone, Default)]
pub struct ScriptedDriver {
    state: Arc<DriverState>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_creates(&self, count: usize) {
        let mut failures = self.state.scripted_failures.lock();
        for _ in 0..count {
            failures.push_back(SessionError::ConnectivityError("connection refused".to_string()));
        }
    }

    pub fn fail_next_with(&self, err: SessionError) {
        self.state.scripted_failures.lock().push_back(err);
    }

    pub fn fail_all_creates(&self, fail: bool) {
        self.state.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Connect attempts never complete while set.
    pub fn hang_creates(&self, hang: bool) {
        self.state.hang.store(hang, Ordering::SeqCst);
    }

    pub fn set_rows(&self, query: &str, rows: Vec<Row>) {
        self.state.rows.lock().insert(query.to_string(), rows);
    }

    pub fn set_probe_rows(&self, rows: Vec<Row>) {
        *self.state.probe_rows.lock() = Some(rows);
    }

    /// A healthy handle, opened outside the factory.
    pub fn open_handle(&self) -> ScriptedHandle {
        ScriptedHandle {
            id: self.state.next_id.fetch_add(1, Ordering::SeqCst),
            alive: Arc::new(AtomicBool::new(true)),
            state: self.state.clone(),
        }
    }

    pub fn create_calls(&self) -> usize {
        self.state.create_calls.load(Ordering::SeqCst)
    }

    pub fn failed_creates(&self) -> usize {
        self.state.failed_creates.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.state.probe_times.lock().len()
    }

    pub fn probe_times(&self) -> Vec<Instant> {
        self.state.probe_times.lock().clone()
    }

    pub fn last_config(&self) -> Option<ClusterConfig> {
        self.state.last_config.lock().clone()
    }

    pub fn last_statement(&self) -> Option<Statement> {
        self.state.last_statement.lock().clone()
    }
}

#[async_trait]
impl ClusterDriver for ScriptedDriver {
    type Handle = ScriptedHandle;

    async fn create_session(&self, config: &ClusterConfig) -> Result<ScriptedHandle, SessionError> {
        self.state.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.last_config.lock() = Some(config.clone());

        if self.state.hang.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }

        let scripted = self.state.scripted_failures.lock().pop_front();
        let failure = match scripted {
            Some(err) => Some(err),
            None if self.state.fail_all.load(Ordering::SeqCst) => {
                Some(SessionError::ConnectivityError("connection refused".to_string()))
            }
            None => None,
        };
        if let Some(err) = failure {
            self.state.failed_creates.fetch_add(1, Ordering::SeqCst);
            return Err(err);
        }
        Ok(self.open_handle())
    }

    fn driver_name(&self) -> &str {
        "scripted"
    }
}

pub struct ScriptedHandle {
    id: u64,
    alive: Arc<AtomicBool>,
    state: Arc<DriverState>,
}

impl ScriptedHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Every later query on this handle fails with a connectivity error.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    fn run(&self, statement: Statement) -> Result<Vec<Row>, SessionError> {
        let is_probe = statement.text == PROBE_QUERY;
        if is_probe {
            self.state.probe_times.lock().push(Instant::now());
        }
        if !self.alive.load(Ordering::SeqCst) {
            return Err(SessionError::ConnectivityError(format!(
                "handle {} is closed",
                self.id
            )));
        }
        if is_probe {
            return Ok(match self.state.probe_rows.lock().as_deref() {
                Some(rows) => copy_rows(rows),
                None => vec![uuid_row(Uuid::new_v4())],
            });
        }

        let rows = self
            .state
            .rows
            .lock()
            .get(&statement.text)
            .map(|rows| copy_rows(rows))
            .unwrap_or_default();
        *self.state.last_statement.lock() = Some(statement);
        Ok(rows)
    }
}

#[async_trait]
impl ConnectionHandle for ScriptedHandle {
    async fn query(&self, statement: Statement) -> Result<Vec<Row>, SessionError> {
        self.run(statement)
    }

    async fn query_iter(&self, statement: Statement) -> Result<RowStream, SessionError> {
        let rows = self.run(statement)?;
        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }

    fn connection_info(&self) -> String {
        format!("scripted://{}", self.id)
    }
}
