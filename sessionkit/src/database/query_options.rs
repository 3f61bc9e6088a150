use scylla::frame::response::result::CqlValue;

use crate::database::driver::{BoundValues, Statement};
use crate::database::retry::RetryPolicy;
use crate::database::scylla::json_to_bound_value;
use crate::errors::SessionError;
use crate::types::ConsistencyLevel;

/// One per-call override for a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOption {
    Strict,
    Idempotent(bool),
    Consistency(ConsistencyLevel),
    RetryPolicy(RetryPolicy),
    Bind(Vec<Option<CqlValue>>),
    Names(Vec<String>),
}

pub fn strict() -> QueryOption {
    QueryOption::Strict
}

pub fn idempotent(idempotent: bool) -> QueryOption {
    QueryOption::Idempotent(idempotent)
}

pub fn consistency(level: ConsistencyLevel) -> QueryOption {
    QueryOption::Consistency(level)
}

pub fn retry_policy(policy: RetryPolicy) -> QueryOption {
    QueryOption::RetryPolicy(policy)
}

pub fn bind<I, V>(values: I) -> QueryOption
where
    I: IntoIterator<Item = V>,
    V: Into<CqlValue>,
{
    QueryOption::Bind(values.into_iter().map(|v| Some(v.into())).collect())
}

/// Bind JSON values, converted to their closest CQL representation.
/// A JSON `null` binds NULL.
pub fn bind_json(values: &[serde_json::Value]) -> QueryOption {
    QueryOption::Bind(values.iter().map(json_to_bound_value).collect())
}

pub fn names<I, S>(names: I) -> QueryOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    QueryOption::Names(names.into_iter().map(Into::into).collect())
}

/// Resolved per-call options. `None` means "use the session default".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub strict: Option<bool>,
    pub idempotent: Option<bool>,
    pub consistency: Option<ConsistencyLevel>,
    pub retry_policy: Option<RetryPolicy>,
    pub values: Option<Vec<Option<CqlValue>>>,
    pub names: Option<Vec<String>>,
}

impl QueryOptions {
    /// Fold `overrides` in order; later entries win.
    pub fn resolve(overrides: &[QueryOption]) -> Self {
        let mut resolved = Self::default();
        for option in overrides {
            resolved.apply(option);
        }
        resolved
    }

    fn apply(&mut self, option: &QueryOption) {
        match option {
            QueryOption::Strict => self.strict = Some(true),
            QueryOption::Idempotent(value) => self.idempotent = Some(*value),
            QueryOption::Consistency(level) => self.consistency = Some(*level),
            QueryOption::RetryPolicy(policy) => self.retry_policy = Some(policy.clone()),
            QueryOption::Bind(values) => self.values = Some(values.clone()),
            QueryOption::Names(names) => self.names = Some(names.clone()),
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict.unwrap_or(false)
    }

    /// Bound values, keyed by name when a name list was given.
    pub fn bound_values(&self) -> Result<BoundValues, SessionError> {
        let values = self.values.clone().unwrap_or_default();
        match &self.names {
            None => Ok(BoundValues::Positional(values)),
            Some(names) if names.len() == values.len() => Ok(BoundValues::Named(
                names.iter().cloned().zip(values).collect(),
            )),
            Some(names) => Err(SessionError::BindError(format!(
                "{} parameter names for {} bound values",
                names.len(),
                values.len()
            ))),
        }
    }

    /// Build the statement for `query`, applying strict, idempotent,
    /// consistency and retry policy in that order, each only when set.
    pub fn to_statement(&self, query: &str) -> Result<Statement, SessionError> {
        let mut statement = Statement::new(query).bind(self.bound_values()?);
        if self.is_strict() {
            statement = statement.strict();
        }
        if let Some(idempotent) = self.idempotent {
            statement = statement.idempotent(idempotent);
        }
        if let Some(level) = self.consistency {
            statement = statement.consistency(level);
        }
        if let Some(policy) = &self.retry_policy {
            statement = statement.retry_policy(policy.clone());
        }
        Ok(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_overrides_leave_everything_unset() {
        let resolved = QueryOptions::resolve(&[]);
        assert_eq!(resolved, QueryOptions::default());
        assert!(!resolved.is_strict());
    }

    #[test]
    fn test_last_write_wins() {
        let resolved = QueryOptions::resolve(&[
            idempotent(true),
            consistency(ConsistencyLevel::Quorum),
            idempotent(false),
        ]);
        assert_eq!(resolved.idempotent, Some(false));
        assert_eq!(resolved.consistency, Some(ConsistencyLevel::Quorum));
        assert_eq!(resolved.strict, None);
        assert_eq!(resolved.retry_policy, None);
    }

    #[test]
    fn test_statement_carries_only_set_modifiers() {
        let statement = QueryOptions::resolve(&[strict(), consistency(ConsistencyLevel::All)])
            .to_statement("SELECT * FROM ks.t")
            .unwrap();
        assert!(statement.strict);
        assert_eq!(statement.consistency, Some(ConsistencyLevel::All));
        assert_eq!(statement.idempotent, None);
        assert!(statement.retry_policy.is_none());
        assert!(statement.values.is_empty());
    }

    #[test]
    fn test_names_pair_with_values() {
        let resolved = QueryOptions::resolve(&[
            bind([CqlValue::Int(7), CqlValue::Text("x".into())]),
            names(["id", "name"]),
        ]);
        assert_eq!(
            resolved.bound_values().unwrap(),
            BoundValues::Named(vec![
                ("id".to_string(), Some(CqlValue::Int(7))),
                ("name".to_string(), Some(CqlValue::Text("x".into()))),
            ])
        );
    }

    #[test]
    fn test_name_count_mismatch_is_bind_error() {
        let resolved = QueryOptions::resolve(&[bind([CqlValue::Int(7)]), names(["id", "name"])]);
        assert!(matches!(
            resolved.to_statement("SELECT 1"),
            Err(SessionError::BindError(_))
        ));
    }

    #[test]
    fn test_bind_json() {
        let resolved = QueryOptions::resolve(&[bind_json(&[
            serde_json::json!("abc"),
            serde_json::json!(1),
            serde_json::Value::Null,
        ])]);
        assert_eq!(
            resolved.bound_values().unwrap(),
            BoundValues::Positional(vec![
                Some(CqlValue::Text("abc".into())),
                Some(CqlValue::BigInt(1)),
                None,
            ])
        );
    }
}
