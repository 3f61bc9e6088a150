use async_trait::async_trait;
use futures::StreamExt;
use scylla::frame::response::result::{CqlValue, Row};
use scylla::query::Query;
use scylla::transport::load_balancing::{DefaultPolicy, LoadBalancingPolicy};
use scylla::transport::execution_profile::ExecutionProfile;
use scylla::{Session, SessionBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::database::driver::{BoundValues, ClusterDriver, ConnectionHandle, RowStream, Statement};
use crate::database::options::{ClusterConfig, PROTOCOL_VERSION};
use crate::database::retry::RetryPolicy;
use crate::errors::SessionError;
use crate::types::HostSelection;

/// Cluster driver backed by the scylla crate (ScyllaDB and Cassandra 4.x).
#[derive(Debug, Clone, Default)]
pub struct ScyllaDriver;

#[async_trait]
impl ClusterDriver for ScyllaDriver {
    type Handle = ScyllaConnection;

    async fn create_session(&self, config: &ClusterConfig) -> Result<ScyllaConnection, SessionError> {
        ScyllaConnection::new(config).await
    }

    fn driver_name(&self) -> &str {
        "scylla"
    }
}

/// One live scylla session.
pub struct ScyllaConnection {
    session: Arc<Session>,
    config: ClusterConfig,
}

impl ScyllaConnection {
    /// Create a new ScyllaDB connection
    pub async fn new(config: &ClusterConfig) -> Result<Self, SessionError> {
        if config.protocol_version != PROTOCOL_VERSION {
            return Err(SessionError::ConfigError(format!(
                "scylla driver speaks protocol v{}, got v{}",
                PROTOCOL_VERSION, config.protocol_version
            )));
        }

        let contact_points = config.contact_points();
        info!(
            "Connecting to cluster: {:?} (CQL {}, protocol v{})",
            contact_points, config.cql_version, config.protocol_version
        );

        let profile = ExecutionProfile::builder()
            .consistency(config.consistency.into())
            .request_timeout(Some(config.timeout))
            .load_balancing_policy(load_balancing_policy(&config.host_selection))
            .build();

        let mut session_builder = SessionBuilder::new()
            .known_nodes(&contact_points)
            .connection_timeout(config.timeout)
            .default_execution_profile_handle(profile.into_handle());

        if let Some(keyspace) = &config.keyspace {
            session_builder = session_builder.use_keyspace(keyspace, false);
        }

        // Add authentication if provided
        if let Some(creds) = &config.credentials {
            session_builder = session_builder.user(&creds.username, &creds.password);
        }

        let session = session_builder.build().await.map_err(|e| {
            error!("Failed to connect to cluster: {}", e);
            SessionError::from(e)
        })?;

        info!("Successfully connected to cluster {:?}", config.hosts);

        Ok(Self {
            session: Arc::new(session),
            config: config.clone(),
        })
    }

    /// Get the underlying scylla session
    pub fn get_session(&self) -> &Session {
        &self.session
    }

    fn query_for(&self, statement: &Statement) -> Query {
        prepare_query(statement, self.config.retry_policy.as_ref())
    }
}

/// Driver query for `statement`. Unset modifiers keep the execution profile
/// defaults; the statement's retry policy wins over `fallback_retry`.
fn prepare_query(statement: &Statement, fallback_retry: Option<&RetryPolicy>) -> Query {
    let mut query = Query::new(statement.text.clone());
    if let Some(idempotent) = statement.idempotent {
        query.set_is_idempotent(idempotent);
    }
    if let Some(level) = statement.consistency {
        query.set_consistency(level.into());
    }
    if let Some(policy) = statement.retry_policy.as_ref().or(fallback_retry) {
        query.set_retry_policy(Some(policy.to_driver_policy()));
    }
    query
}

fn load_balancing_policy(selection: &HostSelection) -> Arc<dyn LoadBalancingPolicy> {
    match selection {
        HostSelection::RoundRobin => DefaultPolicy::builder().token_aware(false).build(),
        HostSelection::TokenAwareRoundRobin => DefaultPolicy::builder().token_aware(true).build(),
        HostSelection::DcAware { local_dc } => DefaultPolicy::builder()
            .prefer_datacenter(local_dc.clone())
            .token_aware(true)
            .build(),
    }
}

fn named_values(values: &[(String, Option<CqlValue>)]) -> HashMap<&str, Option<CqlValue>> {
    values
        .iter()
        .map(|(name, value)| (name.as_str(), value.clone()))
        .collect()
}

#[async_trait]
impl ConnectionHandle for ScyllaConnection {
    async fn query(&self, statement: Statement) -> Result<Vec<Row>, SessionError> {
        debug!("Executing query: {}", statement.text);
        let query = self.query_for(&statement);

        let result = match &statement.values {
            BoundValues::Positional(values) => self.session.query_unpaged(query, values).await?,
            BoundValues::Named(values) => {
                self.session
                    .query_unpaged(query, named_values(values))
                    .await?
            }
        };

        Ok(result.rows.unwrap_or_default())
    }

    async fn query_iter(&self, statement: Statement) -> Result<RowStream, SessionError> {
        debug!("Opening row stream: {}", statement.text);
        let query = self.query_for(&statement);

        let rows = match &statement.values {
            BoundValues::Positional(values) => self.session.query_iter(query, values).await?,
            BoundValues::Named(values) => {
                self.session
                    .query_iter(query, named_values(values))
                    .await?
            }
        };

        Ok(rows.map(|row| row.map_err(SessionError::from)).boxed())
    }

    fn connection_info(&self) -> String {
        format!("scylla://{}", self.config.hosts.join(","))
    }
}

/// Convert a JSON value to a bindable CQL value; `null` binds as NULL.
pub fn json_to_bound_value(value: &serde_json::Value) -> Option<CqlValue> {
    match value {
        serde_json::Value::Null => None,
        other => Some(json_to_cql_value(other)),
    }
}

/// Convert a JSON value to a CQL value.
///
/// CQL collections cannot hold NULL, so a nested `null` becomes the empty
/// value. Use [`json_to_bound_value`] for top-level parameters.
pub fn json_to_cql_value(value: &serde_json::Value) -> CqlValue {
    match value {
        serde_json::Value::Null => CqlValue::Empty,
        serde_json::Value::Bool(b) => CqlValue::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                CqlValue::BigInt(i)
            } else if let Some(f) = n.as_f64() {
                CqlValue::Double(f)
            } else {
                CqlValue::Empty
            }
        }
        serde_json::Value::String(s) => CqlValue::Text(s.clone()),
        serde_json::Value::Array(items) => {
            CqlValue::List(items.iter().map(json_to_cql_value).collect())
        }
        serde_json::Value::Object(fields) => CqlValue::Map(
            fields
                .iter()
                .map(|(k, v)| (CqlValue::Text(k.clone()), json_to_cql_value(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::options::Options;
    use crate::types::ConsistencyLevel;
    use scylla::statement::Consistency;
    use std::time::Duration;

    #[test]
    fn test_json_to_cql_value() {
        let value = json_to_cql_value(&serde_json::json!(42));
        assert_eq!(value, CqlValue::BigInt(42));

        let value = json_to_cql_value(&serde_json::json!(["a", true]));
        assert_eq!(
            value,
            CqlValue::List(vec![CqlValue::Text("a".into()), CqlValue::Boolean(true)])
        );
    }

    #[test]
    fn test_json_null_binds_as_null() {
        assert_eq!(json_to_bound_value(&serde_json::Value::Null), None);
        assert_eq!(
            json_to_bound_value(&serde_json::json!("x")),
            Some(CqlValue::Text("x".into()))
        );
        // collections have no NULL element
        assert_eq!(
            json_to_cql_value(&serde_json::json!([null])),
            CqlValue::List(vec![CqlValue::Empty])
        );
    }

    #[test]
    fn test_named_values() {
        let values = vec![
            ("id".to_string(), Some(CqlValue::Int(1))),
            ("name".to_string(), None),
        ];
        let named = named_values(&values);
        assert_eq!(named.get("id"), Some(&Some(CqlValue::Int(1))));
        assert_eq!(named.get("name"), Some(&None));
        assert_eq!(named.len(), 2);
    }

    fn retry_budget(query: &Query) -> Option<String> {
        query.get_retry_policy().map(|policy| format!("{:?}", policy))
    }

    #[test]
    fn test_prepare_query_leaves_unset_modifiers_alone() {
        let query = prepare_query(&Statement::new("SELECT * FROM ks.t"), None);
        assert_eq!(query.contents, "SELECT * FROM ks.t");
        assert_eq!(query.get_consistency(), None);
        assert!(!query.get_is_idempotent());
        assert!(query.get_retry_policy().is_none());
    }

    #[test]
    fn test_prepare_query_applies_modifiers() {
        let statement = Statement::new("SELECT * FROM ks.t")
            .idempotent(true)
            .consistency(ConsistencyLevel::LocalQuorum);
        let query = prepare_query(&statement, None);
        assert_eq!(query.get_consistency(), Some(Consistency::LocalQuorum));
        assert!(query.get_is_idempotent());
    }

    #[test]
    fn test_prepare_query_retry_policy_fallback() {
        let config_policy = RetryPolicy::exponential(5, Duration::from_millis(5), Duration::from_secs(5));
        let call_policy = RetryPolicy::exponential(1, Duration::from_millis(5), Duration::from_secs(5));

        let from_config = prepare_query(&Statement::new("SELECT 1"), Some(&config_policy));
        assert!(retry_budget(&from_config).unwrap().contains("num_retries: 5"));

        let overridden = prepare_query(
            &Statement::new("SELECT 1").retry_policy(call_policy),
            Some(&config_policy),
        );
        assert!(retry_budget(&overridden).unwrap().contains("num_retries: 1"));
    }

    #[tokio::test]
    async fn test_rejects_foreign_protocol_version() {
        let mut config = ClusterConfig::default();
        Options::baseline().apply(&mut config);
        config.protocol_version = 3;

        let result = ScyllaDriver.create_session(&config).await;
        assert!(matches!(result, Err(SessionError::ConfigError(_))));
    }

    #[tokio::test]
    #[ignore] // Requires a running cluster
    async fn test_connect_and_query_local() {
        let mut config = ClusterConfig::default();
        Options::baseline().apply(&mut config);

        let conn = ScyllaDriver.create_session(&config).await.unwrap();
        let rows = conn
            .query(Statement::new("SELECT release_version FROM system.local"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
