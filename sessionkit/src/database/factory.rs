// sessionkit/src/database/factory.rs
//
// Connection factory: resolves the injected defaults plus caller overrides
// into a cluster configuration and asks the driver for one live handle.
// No retries at this layer; recovery belongs to the supervisor.
//

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::database::driver::{ClusterDriver, ConnectionHandle};
use crate::database::options::{ClusterConfig, ClusterOption, Options};
use crate::database::session::Session;
use crate::errors::SessionError;
use crate::metrics;

pub struct ConnectionFactory<D: ClusterDriver> {
    driver: Arc<D>,
    defaults: Options,
}

impl<D: ClusterDriver> Clone for ConnectionFactory<D> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            defaults: self.defaults.clone(),
        }
    }
}

impl<D: ClusterDriver> ConnectionFactory<D> {
    pub fn new(driver: D, defaults: Options) -> Self {
        Self {
            driver: Arc::new(driver),
            defaults,
        }
    }

    /// Factory using [`Options::baseline`] as defaults.
    pub fn with_baseline(driver: D) -> Self {
        Self::new(driver, Options::baseline())
    }

    pub fn defaults(&self) -> &Options {
        &self.defaults
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Defaults first, then `overrides` in order, then the pinned versions.
    pub fn build_config(&self, overrides: &[ClusterOption]) -> Result<ClusterConfig, SessionError> {
        let mut config = ClusterConfig::default();
        self.defaults.extended(overrides).apply(&mut config);
        config.pin_versions();
        config.validate()?;
        Ok(config)
    }

    /// Open one handle for `config`. Fails on the first driver error.
    pub async fn establish(&self, config: &ClusterConfig) -> Result<D::Handle, SessionError> {
        let start = Instant::now();
        let result = self.driver.create_session(config).await;
        metrics::record_connect(result.is_ok(), start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            warn!(
                "Driver {} failed to open a session to {:?}: {}",
                self.driver.driver_name(),
                config.hosts,
                e
            );
        }
        result
    }

    /// Resolve `overrides`, open the initial handle and wrap it in a [`Session`].
    pub async fn connect(&self, overrides: &[ClusterOption]) -> Result<Session<D::Handle>, SessionError> {
        let config = self.build_config(overrides)?;
        let handle = self.establish(&config).await?;

        info!(
            "Session established via {} ({})",
            self.driver.driver_name(),
            handle.connection_info()
        );
        Ok(Session::new(handle, config))
    }
}
