//! Self-healing CQL sessions.
//!
//! A [`database::ConnectionFactory`] opens sessions from layered cluster
//! options, and a [`database::Supervisor`] keeps probing a session in the
//! background, swapping in a fresh connection handle whenever a probe fails.

pub mod config;
pub mod database;
pub mod errors;
pub mod metrics;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::{load_settings, SessionSettings, SupervisorSettings};
pub use errors::SessionError;
pub use types::{ConsistencyLevel, Credentials, HostSelection};
