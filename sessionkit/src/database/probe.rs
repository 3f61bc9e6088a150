use scylla::frame::response::result::{CqlValue, Row};
use std::time::Instant;
use tracing::debug;

use crate::database::driver::{ConnectionHandle, Statement};
use crate::errors::SessionError;
use crate::metrics;

/// Cheap read against a system table every node serves locally.
pub const PROBE_QUERY: &str = "SELECT uuid() FROM system.local";

/// Liveness check for a connection handle.
///
/// A transport failure surfaces as the driver's error (usually
/// [`SessionError::ConnectivityError`]); a reply that is not exactly one
/// non-empty scalar is a [`SessionError::ProbeValidationError`].
#[derive(Debug, Clone, Default)]
pub struct LivenessProber;

impl LivenessProber {
    pub fn new() -> Self {
        Self
    }

    pub async fn probe<H: ConnectionHandle + ?Sized>(&self, handle: &H) -> Result<(), SessionError> {
        let start = Instant::now();
        let result = match handle.query(Statement::new(PROBE_QUERY).idempotent(true)).await {
            Ok(rows) => validate(rows),
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(()) => "healthy",
            Err(e) => e.kind(),
        };
        metrics::record_probe(outcome);
        debug!(
            "Probe of {} finished in {:?}: {}",
            handle.connection_info(),
            start.elapsed(),
            outcome
        );
        result
    }
}

fn validate(rows: Vec<Row>) -> Result<(), SessionError> {
    if rows.len() != 1 {
        return Err(SessionError::ProbeValidationError(format!(
            "expected one row, got {}",
            rows.len()
        )));
    }
    let column = rows
        .into_iter()
        .next()
        .and_then(|row| row.columns.into_iter().next())
        .flatten();

    match column {
        Some(CqlValue::Uuid(id)) if !id.is_nil() => Ok(()),
        Some(CqlValue::Text(s)) | Some(CqlValue::Ascii(s)) if !s.is_empty() => Ok(()),
        Some(CqlValue::Uuid(_)) => Err(SessionError::ProbeValidationError(
            "nil uuid from db".to_string(),
        )),
        Some(CqlValue::Text(_)) | Some(CqlValue::Ascii(_)) => Err(
            SessionError::ProbeValidationError("empty uuid from db".to_string()),
        ),
        Some(other) => Err(SessionError::ProbeValidationError(format!(
            "unexpected probe value: {:?}",
            other
        ))),
        None => Err(SessionError::ProbeValidationError(
            "null probe value".to_string(),
        )),
    }
}
