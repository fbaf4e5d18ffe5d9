//! Engine configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use shuttle_gateway::GatewayConfig;

use crate::error::{Result, ShuttleError};
use crate::plan::ExecutionOptions;
use crate::session::CredentialStore;

/// Settings for the CLI and for plans it drives
#[derive(Debug, Clone)]
pub struct ShuttleConfig {
    /// Gateway Execution Service and identity provider
    pub gateway: GatewayConfig,
    /// Sleep between polling iterations of `join`
    pub poll_interval: Duration,
    /// Tasks handled at once; 1 processes tasks in order
    pub concurrency: usize,
    /// Draw progress bars while joining
    pub show_progress: bool,
    /// Credential cache; `None` uses the per-user config directory
    pub credentials_path: Option<PathBuf>,
    /// Default destination for collected results
    pub results_dir: PathBuf,
}

impl Default for ShuttleConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            poll_interval: Duration::from_secs(180),
            concurrency: 1,
            show_progress: true,
            credentials_path: None,
            results_dir: PathBuf::from("results"),
        }
    }
}

impl ShuttleConfig {
    /// Load configuration from the environment (and a `.env` file if present)
    ///
    /// Recognised variables: `SHUTTLE_POLL_INTERVAL_SECS`, `SHUTTLE_CONCURRENCY`,
    /// `SHUTTLE_SHOW_PROGRESS`, `SHUTTLE_CREDENTIALS`, `SHUTTLE_RESULTS_DIR`,
    /// plus the gateway variables read by [`GatewayConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self {
            gateway: GatewayConfig::from_env()?,
            ..Self::default()
        };
        if let Some(secs) = env_parse::<u64>("SHUTTLE_POLL_INTERVAL_SECS")? {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(concurrency) = env_parse::<usize>("SHUTTLE_CONCURRENCY")? {
            config.concurrency = concurrency;
        }
        if let Some(show) = env_parse::<bool>("SHUTTLE_SHOW_PROGRESS")? {
            config.show_progress = show;
        }
        if let Ok(path) = std::env::var("SHUTTLE_CREDENTIALS") {
            config.credentials_path = Some(PathBuf::from(path));
        }
        if let Ok(dir) = std::env::var("SHUTTLE_RESULTS_DIR") {
            config.results_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ShuttleError::Config("concurrency must be at least 1".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ShuttleError::Config("poll interval must be positive".into()));
        }
        self.gateway.validate()?;
        Ok(())
    }

    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            concurrency: self.concurrency,
            show_progress: self.show_progress,
        }
    }

    pub fn credential_store(&self) -> Result<CredentialStore> {
        let path = match &self.credentials_path {
            Some(path) => path.clone(),
            None => CredentialStore::default_path()?,
        };
        Ok(CredentialStore::new(path))
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ShuttleError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}
