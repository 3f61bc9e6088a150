// sessionkit/src/database/driver.rs
//
// Narrow capability interface over the underlying CQL driver:
// open a connection, run a query, stream a query's rows.
//

use async_trait::async_trait;
use futures::stream::BoxStream;

use scylla::frame::response::result::{CqlValue, Row};

use crate::database::options::ClusterConfig;
use crate::database::retry::RetryPolicy;
use crate::errors::SessionError;
use crate::types::ConsistencyLevel;

/// Lazily fetched rows of one query.
pub type RowStream = BoxStream<'static, Result<Row, SessionError>>;

/// Values bound to a statement's placeholders. `None` binds NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValues {
    Positional(Vec<Option<CqlValue>>),
    Named(Vec<(String, Option<CqlValue>)>),
}

impl Default for BoundValues {
    fn default() -> Self {
        BoundValues::Positional(Vec::new())
    }
}

impl BoundValues {
    pub fn is_empty(&self) -> bool {
        match self {
            BoundValues::Positional(values) => values.is_empty(),
            BoundValues::Named(values) => values.is_empty(),
        }
    }
}

/// A query plus the per-query modifiers requested by the caller.
/// Unset modifiers fall back to the connection's configuration.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    pub text: String,
    pub values: BoundValues,
    pub strict: bool,
    pub idempotent: Option<bool>,
    pub consistency: Option<ConsistencyLevel>,
    pub retry_policy: Option<RetryPolicy>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn bind(mut self, values: BoundValues) -> Self {
        self.values = values;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = Some(idempotent);
        self
    }

    pub fn consistency(mut self, level: ConsistencyLevel) -> Self {
        self.consistency = Some(level);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

/// A live link to the cluster. Immutable once opened; replaced wholesale
/// when it goes bad.
#[async_trait]
pub trait ConnectionHandle: Send + Sync + 'static {
    async fn query(&self, statement: Statement) -> Result<Vec<Row>, SessionError>;

    async fn query_iter(&self, statement: Statement) -> Result<RowStream, SessionError>;

    /// Human readable description for logs.
    fn connection_info(&self) -> String;
}

/// Opens connection handles from a resolved cluster configuration.
#[async_trait]
pub trait ClusterDriver: Send + Sync + 'static {
    type Handle: ConnectionHandle;

    async fn create_session(&self, config: &ClusterConfig) -> Result<Self::Handle, SessionError>;

    fn driver_name(&self) -> &str;
}
