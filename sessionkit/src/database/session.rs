// sessionkit/src/database/session.rs
//
// Session: holds exactly one active connection handle and runs queries
// against whichever handle is active when the call starts. The
// reconnection supervisor is the only writer of the active handle.
//

use futures::stream::Stream;
use futures::StreamExt;
use parking_lot::RwLock;
use scylla::cql_to_rust::{FromRow, FromRowError};
use scylla::frame::response::result::Row;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tracing::{debug, info};

use crate::database::driver::{ConnectionHandle, RowStream, Statement};
use crate::database::options::ClusterConfig;
use crate::database::query_options::{QueryOption, QueryOptions};
use crate::errors::SessionError;
use crate::metrics;

pub struct Session<H: ConnectionHandle> {
    inner: Arc<SessionInner<H>>,
}

struct SessionInner<H> {
    active: RwLock<Arc<H>>,
    config: ClusterConfig,
    generation: AtomicU64,
}

impl<H: ConnectionHandle> Clone for Session<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: ConnectionHandle> Session<H> {
    pub fn new(handle: H, config: ClusterConfig) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                active: RwLock::new(Arc::new(handle)),
                config,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// The handle active right now. Callers keep using it even if it is
    /// swapped out afterwards.
    pub fn unwrap_handle(&self) -> Arc<H> {
        self.inner.active.read().clone()
    }

    /// Configuration the session was created with; reconnection reuses it.
    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    /// Number of times the active handle has been replaced.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Swap in a freshly established handle. Only the supervisor calls this.
    pub(crate) fn replace_handle(&self, handle: H) -> u64 {
        let fresh = Arc::new(handle);
        let info = fresh.connection_info();
        let previous = std::mem::replace(&mut *self.inner.active.write(), fresh);
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::HANDLE_SWAPS.inc();
        info!("Active connection replaced ({}), generation {}", info, generation);
        // in-flight calls may still hold the old handle; it closes when they finish
        drop(previous);
        generation
    }

    /// Run `query` and bind its first row into `T`.
    ///
    /// Zero rows is [`SessionError::NotFound`].
    pub async fn get<T: FromRow>(&self, query: &str, options: &[QueryOption]) -> Result<T, SessionError> {
        let start = Instant::now();
        let result = self.get_inner(query, options).await;
        metrics::record_query("get", result.is_ok(), start.elapsed().as_secs_f64());
        result
    }

    async fn get_inner<T: FromRow>(&self, query: &str, options: &[QueryOption]) -> Result<T, SessionError> {
        let statement = self.statement(query, options)?;
        let strict = statement.strict;
        let mut rows = self.unwrap_handle().query(statement).await?.into_iter();

        let row = rows
            .next()
            .ok_or_else(|| SessionError::NotFound(format!("no rows returned by {:?}", query)))?;
        bind_row(row, strict)
    }

    /// Run `query` and bind every row into `T`.
    pub async fn select<T: FromRow>(&self, query: &str, options: &[QueryOption]) -> Result<Vec<T>, SessionError> {
        let start = Instant::now();
        let result = self.select_inner(query, options).await;
        metrics::record_query("select", result.is_ok(), start.elapsed().as_secs_f64());
        result
    }

    async fn select_inner<T: FromRow>(&self, query: &str, options: &[QueryOption]) -> Result<Vec<T>, SessionError> {
        let statement = self.statement(query, options)?;
        let strict = statement.strict;
        let rows = self.unwrap_handle().query(statement).await?;
        rows.into_iter().map(|row| bind_row(row, strict)).collect()
    }

    /// Run `query` and return a forward-only cursor over its rows.
    pub async fn iter<T: FromRow>(&self, query: &str, options: &[QueryOption]) -> Result<RowIter<T>, SessionError> {
        let start = Instant::now();
        let result = match self.statement(query, options) {
            Ok(statement) => {
                let strict = statement.strict;
                self.unwrap_handle()
                    .query_iter(statement)
                    .await
                    .map(|rows| RowIter::new(rows, strict))
            }
            Err(e) => Err(e),
        };
        metrics::record_query("iter", result.is_ok(), start.elapsed().as_secs_f64());
        result
    }

    fn statement(&self, query: &str, options: &[QueryOption]) -> Result<Statement, SessionError> {
        let statement = QueryOptions::resolve(options).to_statement(query)?;
        debug!(
            "Dispatching query (generation {}): {}",
            self.generation(),
            statement.text
        );
        Ok(statement)
    }
}

/// Bind one row into `T`.
///
/// Strict binding rejects a row carrying columns `T` has no place for.
/// Otherwise surplus trailing columns are dropped before binding.
fn bind_row<T: FromRow>(row: Row, strict: bool) -> Result<T, SessionError> {
    if strict {
        return T::from_row(row).map_err(row_shape_error);
    }
    let columns = row.columns;
    match T::from_row(Row {
        columns: columns.clone(),
    }) {
        Err(FromRowError::WrongRowSize { expected, actual }) if actual > expected => {
            let mut columns = columns;
            columns.truncate(expected);
            T::from_row(Row { columns }).map_err(row_shape_error)
        }
        other => other.map_err(row_shape_error),
    }
}

fn row_shape_error(err: FromRowError) -> SessionError {
    SessionError::RowShapeError(err.to_string())
}

/// Single-pass cursor over the rows of one query.
///
/// The driver stream is released by [`RowIter::close`] or when the cursor
/// is dropped.
pub struct RowIter<T> {
    rows: RowStream,
    strict: bool,
    _row: PhantomData<fn() -> T>,
}

impl<T: FromRow> RowIter<T> {
    fn new(rows: RowStream, strict: bool) -> Self {
        Self {
            rows,
            strict,
            _row: PhantomData,
        }
    }

    pub async fn next_row(&mut self) -> Option<Result<T, SessionError>> {
        self.next().await
    }

    /// Release the underlying driver stream.
    pub fn close(self) {
        drop(self.rows);
    }
}

impl<T: FromRow> Stream for RowIter<T> {
    type Item = Result<T, SessionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let strict = self.strict;
        self.rows
            .poll_next_unpin(cx)
            .map(|row| row.map(|row| row.and_then(|row| bind_row(row, strict))))
    }
}
