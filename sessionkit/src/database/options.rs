// sessionkit/src/database/options.rs
//
// Cluster configuration and the ordered option list applied to it.
// A fixed baseline is applied first, caller overrides after it; the last
// option touching a field wins.
//

use std::time::Duration;

use crate::database::retry::RetryPolicy;
use crate::errors::SessionError;
use crate::types::{ConsistencyLevel, Credentials, HostSelection};

/// CQL version announced to the cluster. Not user-configurable.
pub const CQL_VERSION: &str = "3.11";

/// Native protocol version spoken to the cluster. Not user-configurable.
pub const PROTOCOL_VERSION: u8 = 4;

pub const DEFAULT_PORT: u16 = 9042;

/// Fully resolved cluster-level configuration handed to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub hosts: Vec<String>,
    pub keyspace: Option<String>,
    pub consistency: ConsistencyLevel,
    pub timeout: Duration,
    pub credentials: Option<Credentials>,
    pub retry_policy: Option<RetryPolicy>,
    pub host_selection: HostSelection,
    /// Always [`CQL_VERSION`] once resolved by the factory. The scylla driver
    /// negotiates CQL itself, so this is only reported in connection logs.
    pub cql_version: String,
    /// Always [`PROTOCOL_VERSION`] once resolved by the factory. Drivers
    /// refuse a hand-built config carrying any other version.
    pub protocol_version: u8,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1".to_string()],
            keyspace: None,
            consistency: ConsistencyLevel::Quorum,
            timeout: Duration::from_millis(600),
            credentials: None,
            retry_policy: None,
            host_selection: HostSelection::RoundRobin,
            cql_version: CQL_VERSION.to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

impl ClusterConfig {
    /// Contact points as `host:port`, adding the default port when absent.
    pub fn contact_points(&self) -> Vec<String> {
        self.hosts
            .iter()
            .map(|host| {
                if host.contains(':') {
                    host.clone()
                } else {
                    format!("{}:{}", host, DEFAULT_PORT)
                }
            })
            .collect()
    }

    pub(crate) fn pin_versions(&mut self) {
        self.cql_version = CQL_VERSION.to_string();
        self.protocol_version = PROTOCOL_VERSION;
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.hosts.is_empty() {
            return Err(SessionError::ConfigError("host list is empty".to_string()));
        }
        if self.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(SessionError::ConfigError(
                "host list contains an empty entry".to_string(),
            ));
        }
        if let Some(keyspace) = &self.keyspace {
            if !is_valid_identifier(keyspace) {
                return Err(SessionError::ConfigError(format!(
                    "invalid keyspace name: {:?}",
                    keyspace
                )));
            }
        }
        if self.timeout.is_zero() {
            return Err(SessionError::ConfigError("timeout must be positive".to_string()));
        }
        if let Some(policy) = &self.retry_policy {
            policy.validate().map_err(SessionError::ConfigError)?;
        }
        if let HostSelection::DcAware { local_dc } = &self.host_selection {
            if local_dc.is_empty() {
                return Err(SessionError::ConfigError(
                    "dc-aware host selection needs a datacenter name".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// Unquoted CQL identifiers: a letter followed by letters, digits or underscores, max 48.
fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name.len() <= 48 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One named modification of a [`ClusterConfig`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterOption {
    Hosts(Vec<String>),
    Keyspace(String),
    Consistency(ConsistencyLevel),
    Timeout(Duration),
    Credentials(Credentials),
    RetryPolicy(RetryPolicy),
    HostSelection(HostSelection),
}

impl ClusterOption {
    pub fn apply(&self, config: &mut ClusterConfig) {
        match self {
            ClusterOption::Hosts(hosts) => config.hosts = hosts.clone(),
            ClusterOption::Keyspace(keyspace) => config.keyspace = Some(keyspace.clone()),
            ClusterOption::Consistency(level) => config.consistency = *level,
            ClusterOption::Timeout(timeout) => config.timeout = *timeout,
            ClusterOption::Credentials(creds) => config.credentials = Some(creds.clone()),
            ClusterOption::RetryPolicy(policy) => config.retry_policy = Some(policy.clone()),
            ClusterOption::HostSelection(policy) => config.host_selection = policy.clone(),
        }
    }
}

pub fn with_hosts<I, S>(hosts: I) -> ClusterOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ClusterOption::Hosts(hosts.into_iter().map(Into::into).collect())
}

pub fn with_keyspace(keyspace: impl Into<String>) -> ClusterOption {
    ClusterOption::Keyspace(keyspace.into())
}

pub fn with_consistency(level: ConsistencyLevel) -> ClusterOption {
    ClusterOption::Consistency(level)
}

pub fn with_timeout(timeout: Duration) -> ClusterOption {
    ClusterOption::Timeout(timeout)
}

pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> ClusterOption {
    ClusterOption::Credentials(Credentials {
        username: username.into(),
        password: password.into(),
    })
}

pub fn with_retry_policy(policy: RetryPolicy) -> ClusterOption {
    ClusterOption::RetryPolicy(policy)
}

pub fn with_host_selection(policy: HostSelection) -> ClusterOption {
    ClusterOption::HostSelection(policy)
}

/// Ordered list of cluster options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options(Vec<ClusterOption>);

impl Options {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// 10s timeout, consistency ONE, exponential backoff retry (5 retries,
    /// 5ms..5s) and token-aware round-robin host selection.
    pub fn baseline() -> Self {
        Self(vec![
            with_timeout(Duration::from_secs(10)),
            with_consistency(ConsistencyLevel::One),
            with_retry_policy(RetryPolicy::default()),
            with_host_selection(HostSelection::TokenAwareRoundRobin),
        ])
    }

    /// New list with `overrides` appended after the existing options.
    pub fn extended(&self, overrides: &[ClusterOption]) -> Self {
        let mut options = self.0.clone();
        options.extend_from_slice(overrides);
        Self(options)
    }

    pub fn apply(&self, config: &mut ClusterConfig) {
        for option in &self.0 {
            option.apply(config);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<ClusterOption>> for Options {
    fn from(options: Vec<ClusterOption>) -> Self {
        Self(options)
    }
}

impl FromIterator<ClusterOption> for Options {
    fn from_iter<T: IntoIterator<Item = ClusterOption>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
