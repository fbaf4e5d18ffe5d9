//! Configuration for the gateway client and the device-code login

use crate::error::{GatewayError, Result};
use std::time::Duration;

pub const DEFAULT_GATEWAY_URL: &str = "https://api.gateway.cybershuttle.org";
pub const DEFAULT_AUTH_SERVER_URL: &str = "https://auth.cybershuttle.org";
pub const DEFAULT_REALM: &str = "10000000";
pub const DEFAULT_CLIENT_ID: &str = "cybershuttle-agent";

/// Settings for the OAuth2 device authorization flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Authorization server root, e.g. `https://auth.example.org`
    pub server_url: String,
    /// Realm the client is registered in
    pub realm: String,
    /// Public client identifier
    pub client_id: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_AUTH_SERVER_URL.to_string(),
            realm: DEFAULT_REALM.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(GatewayError::Config("auth server url must not be empty".into()));
        }
        if self.realm.trim().is_empty() {
            return Err(GatewayError::Config("realm must not be empty".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(GatewayError::Config("client id must not be empty".into()));
        }
        Ok(())
    }

    pub fn device_endpoint(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/auth/device",
            self.server_url.trim_end_matches('/'),
            self.realm
        )
    }

    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.server_url.trim_end_matches('/'),
            self.realm
        )
    }
}

/// Configuration for [`GatewayClient`](crate::GatewayClient)
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the Gateway Execution Service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries for idempotent reads (status, listing, download)
    pub max_retries: u32,
    /// Delay between retry attempts
    pub retry_delay: Duration,
    /// Device-code login settings
    pub auth: AuthConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            auth: AuthConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Create a new builder for gateway configuration
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Load configuration from the environment (and a `.env` file if present)
    ///
    /// Recognised variables: `SHUTTLE_GATEWAY_URL`, `SHUTTLE_GATEWAY_TIMEOUT_SECS`,
    /// `SHUTTLE_GATEWAY_MAX_RETRIES`, `SHUTTLE_AUTH_URL`, `SHUTTLE_AUTH_REALM`,
    /// `SHUTTLE_CLIENT_ID`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = Self::builder();
        if let Ok(url) = std::env::var("SHUTTLE_GATEWAY_URL") {
            builder = builder.base_url(url);
        }
        if let Ok(secs) = std::env::var("SHUTTLE_GATEWAY_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                GatewayError::Config(format!("SHUTTLE_GATEWAY_TIMEOUT_SECS is not a number: {}", secs))
            })?;
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Ok(retries) = std::env::var("SHUTTLE_GATEWAY_MAX_RETRIES") {
            let retries: u32 = retries.parse().map_err(|_| {
                GatewayError::Config(format!("SHUTTLE_GATEWAY_MAX_RETRIES is not a number: {}", retries))
            })?;
            builder = builder.max_retries(retries);
        }
        if let Ok(url) = std::env::var("SHUTTLE_AUTH_URL") {
            builder = builder.auth_server_url(url);
        }
        if let Ok(realm) = std::env::var("SHUTTLE_AUTH_REALM") {
            builder = builder.realm(realm);
        }
        if let Ok(client_id) = std::env::var("SHUTTLE_CLIENT_ID") {
            builder = builder.client_id(client_id);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(GatewayError::Config("gateway base url must not be empty".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(GatewayError::Config(format!(
                "gateway base url must be http(s): {}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(GatewayError::Config("timeout must be greater than 0".into()));
        }
        self.auth.validate()
    }
}

/// Builder for gateway configuration
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_delay: Option<Duration>,
    auth_server_url: Option<String>,
    realm: Option<String>,
    client_id: Option<String>,
}

impl GatewayConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn auth_server_url(mut self, url: impl Into<String>) -> Self {
        self.auth_server_url = Some(url.into());
        self
    }

    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Build the gateway configuration
    pub fn build(self) -> GatewayConfig {
        let defaults = GatewayConfig::default();

        GatewayConfig {
            base_url: self.base_url.unwrap_or(defaults.base_url),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_delay: self.retry_delay.unwrap_or(defaults.retry_delay),
            auth: AuthConfig {
                server_url: self.auth_server_url.unwrap_or(defaults.auth.server_url),
                realm: self.realm.unwrap_or(defaults.auth.realm),
                client_id: self.client_id.unwrap_or(defaults.auth.client_id),
            },
        }
    }
}
