use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::database::options::{
    with_consistency, with_credentials, with_host_selection, with_hosts, with_keyspace,
    with_retry_policy, with_timeout, ClusterOption,
};
use crate::database::retry::RetryPolicy;
use crate::errors::SessionError;
use crate::types::{ConsistencyLevel, HostSelection};

/// Connection settings as read from a file and the environment.
/// Unset fields keep the factory defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    pub hosts: Vec<String>,
    #[serde(default)]
    pub keyspace: Option<String>,
    #[serde(default)]
    pub consistency: Option<ConsistencyLevel>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub local_datacenter: Option<String>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub supervisor: SupervisorSettings,
}

impl SessionSettings {
    pub fn from_yaml(contents: &str) -> Result<Self, SessionError> {
        let config = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Yaml))
            .build()
            .map_err(|e| SessionError::ConfigError(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| SessionError::ConfigError(e.to_string()))
    }

    /// Cluster overrides for the fields that are set.
    pub fn to_options(&self) -> Result<Vec<ClusterOption>, SessionError> {
        let mut options = Vec::new();

        if !self.hosts.is_empty() {
            options.push(with_hosts(self.hosts.iter().cloned()));
        }
        if let Some(keyspace) = &self.keyspace {
            options.push(with_keyspace(keyspace.clone()));
        }
        if let Some(level) = self.consistency {
            options.push(with_consistency(level));
        }
        if let Some(ms) = self.timeout_ms {
            options.push(with_timeout(Duration::from_millis(ms)));
        }
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                options.push(with_credentials(username.clone(), password.clone()))
            }
            (None, None) => {}
            _ => {
                return Err(SessionError::ConfigError(
                    "username and password must be set together".to_string(),
                ))
            }
        }
        if let Some(policy) = &self.retry_policy {
            options.push(with_retry_policy(policy.clone()));
        }
        if let Some(local_dc) = &self.local_datacenter {
            options.push(with_host_selection(HostSelection::DcAware {
                local_dc: local_dc.clone(),
            }));
        }

        Ok(options)
    }
}

/// Timing and retry budget of the reconnection supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorSettings {
    #[serde(rename = "probe_interval_ms", with = "millis", default = "default_probe_interval")]
    pub probe_interval: Duration,
    #[serde(default = "default_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Delay schedule between reconnect attempts; `None` retries back-to-back.
    #[serde(default)]
    pub reconnect_backoff: Option<RetryPolicy>,
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_reconnect_attempts() -> u32 {
    10
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            probe_interval: default_probe_interval(),
            max_reconnect_attempts: default_reconnect_attempts(),
            reconnect_backoff: None,
        }
    }
}

/// Load settings from `path`, overridden by `SESSION__*` environment variables
/// (`SESSION__HOSTS=a,b`, `SESSION__SUPERVISOR__MAX_RECONNECT_ATTEMPTS=3`).
pub fn load_settings(path: &str) -> Result<SessionSettings, SessionError> {
    let config = Config::builder()
        .add_source(File::with_name(path))
        .add_source(
            Environment::with_prefix("SESSION")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("hosts")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| SessionError::ConfigError(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| SessionError::ConfigError(e.to_string()))
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::options::{ClusterConfig, Options};

    const FULL: &str = r#"
hosts: ["10.0.0.1", "10.0.0.2:19042"]
keyspace: app
consistency: local_quorum
timeout_ms: 2500
username: svc
password: secret
local_datacenter: dc1
supervisor:
  probe_interval_ms: 500
  max_reconnect_attempts: 3
  reconnect_backoff:
    num_retries: 3
    min: 50
    max: 400
"#;

    #[test]
    fn test_parse_full_settings() {
        let settings = SessionSettings::from_yaml(FULL).unwrap();
        assert_eq!(settings.hosts.len(), 2);
        assert_eq!(settings.consistency, Some(ConsistencyLevel::LocalQuorum));
        assert_eq!(settings.supervisor.probe_interval, Duration::from_millis(500));
        assert_eq!(settings.supervisor.max_reconnect_attempts, 3);
        assert_eq!(
            settings.supervisor.reconnect_backoff.unwrap().max,
            Duration::from_millis(400)
        );
    }

    #[test]
    fn test_supervisor_defaults() {
        let settings = SessionSettings::from_yaml("hosts: [\"db1\"]").unwrap();
        assert_eq!(settings.supervisor, SupervisorSettings::default());
        assert_eq!(settings.supervisor.probe_interval, Duration::from_secs(1));
        assert_eq!(settings.supervisor.max_reconnect_attempts, 10);
    }

    #[test]
    fn test_options_override_baseline() {
        let settings = SessionSettings::from_yaml(FULL).unwrap();
        let options = Options::baseline().extended(&settings.to_options().unwrap());

        let mut config = ClusterConfig::default();
        options.apply(&mut config);
        assert_eq!(config.keyspace.as_deref(), Some("app"));
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.consistency, ConsistencyLevel::LocalQuorum);
        assert_eq!(
            config.host_selection,
            HostSelection::DcAware {
                local_dc: "dc1".to_string()
            }
        );
        assert_eq!(config.credentials.unwrap().username, "svc");
    }

    #[test]
    fn test_unset_fields_produce_no_options() {
        let settings = SessionSettings::from_yaml("hosts: [\"db1\"]").unwrap();
        assert_eq!(settings.to_options().unwrap().len(), 1);
    }

    #[test]
    fn test_half_credentials_rejected() {
        let settings = SessionSettings {
            hosts: vec!["db1".to_string()],
            username: Some("svc".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            settings.to_options(),
            Err(SessionError::ConfigError(_))
        ));
    }

    #[test]
    fn test_load_settings_from_file() {
        let path = std::env::temp_dir().join(format!("session-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, FULL).unwrap();

        let settings = load_settings(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.keyspace.as_deref(), Some("app"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = load_settings("/nonexistent/session-settings.yaml");
        assert!(matches!(result, Err(SessionError::ConfigError(_))));
    }
}
