use thiserror::Error;

use scylla::transport::errors::{NewSessionError, QueryError};

#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connectivity error: {0}")]
    ConnectivityError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Probe validation error: {0}")]
    ProbeValidationError(String),

    #[error("Reconnection exhausted after {attempts} attempts: {last_error}")]
    ExhaustedRecoveryError { attempts: u32, last_error: String },

    #[error("Supervisor aborted: {0}")]
    SupervisorAborted(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Row shape error: {0}")]
    RowShapeError(String),

    #[error("Bind error: {0}")]
    BindError(String),
}

impl SessionError {
    /// Whether the failure may go away by trying again on a fresh connection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::ConnectivityError(_) | SessionError::ProbeValidationError(_)
        )
    }

    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::ConfigError(_) => "config",
            SessionError::ConnectivityError(_) => "connectivity",
            SessionError::DatabaseError(_) => "database",
            SessionError::ProbeValidationError(_) => "validation",
            SessionError::ExhaustedRecoveryError { .. } => "exhausted",
            SessionError::SupervisorAborted(_) => "aborted",
            SessionError::NotFound(_) => "not_found",
            SessionError::RowShapeError(_) => "row_shape",
            SessionError::BindError(_) => "bind",
        }
    }
}

impl From<QueryError> for SessionError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::IoError(_) | QueryError::TimeoutError | QueryError::RequestTimeout(_) => {
                SessionError::ConnectivityError(err.to_string())
            }
            _ => SessionError::DatabaseError(err.to_string()),
        }
    }
}

impl From<NewSessionError> for SessionError {
    fn from(err: NewSessionError) -> Self {
        SessionError::ConnectivityError(format!("Connection failed: {}", err))
    }
}
