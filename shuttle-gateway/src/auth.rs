//! OAuth2 device authorization flow
//!
//! The login is two steps: ask the authorization server for a device code and
//! a user code, show the verification link to the user, then poll the token
//! endpoint until the user approves (or the code expires).

use crate::config::AuthConfig;
use crate::error::{GatewayError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

fn default_expires_in() -> u64 {
    600
}

fn default_interval() -> u64 {
    5
}

/// Response of the device authorization endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

impl DeviceAuthorization {
    /// Link to show the user, preferring the one with the code pre-filled
    pub fn verification_url(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }
}

/// Tokens issued once the user approved the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
}

pub struct DeviceFlowAuthenticator {
    http: Client,
    config: AuthConfig,
}

impl DeviceFlowAuthenticator {
    pub fn new(config: AuthConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            http: Client::new(),
            config,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Step 1: request device and user code
    pub async fn request_device_code(&self) -> Result<DeviceAuthorization> {
        let response = self
            .http
            .post(self.config.device_endpoint())
            .form(&[("client_id", self.config.client_id.as_str()), ("scope", "openid")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Auth(format!(
                "device authorization request failed: {} - {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json::<DeviceAuthorization>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    /// Step 2: poll the token endpoint until the user approves
    pub async fn poll_for_token(&self, authorization: &DeviceAuthorization) -> Result<TokenSet> {
        let mut interval = Duration::from_secs(authorization.interval);
        let deadline = Instant::now() + Duration::from_secs(authorization.expires_in);

        info!("Waiting for authorization...");

        loop {
            let response = self
                .http
                .post(self.config.token_endpoint())
                .form(&[
                    ("client_id", self.config.client_id.as_str()),
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("device_code", authorization.device_code.as_str()),
                ])
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let tokens = response
                    .json::<TokenSet>()
                    .await
                    .map_err(|e| GatewayError::Decode(e.to_string()))?;
                info!("Authorization successful");
                return Ok(tokens);
            }

            let body = response.text().await.unwrap_or_default();
            let error = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or_default();

            match (status.as_u16(), error.as_str()) {
                (400, "authorization_pending") => debug!("Authorization pending"),
                (400, "slow_down") => {
                    interval += Duration::from_secs(5);
                    debug!("Authorization server asked to slow down, polling every {:?}", interval);
                }
                _ => {
                    return Err(GatewayError::Auth(format!(
                        "authorization error: {} - {}",
                        status.as_u16(),
                        body
                    )))
                }
            }

            if Instant::now() + interval > deadline {
                return Err(GatewayError::Auth(
                    "device code expired before authorization completed".to_string(),
                ));
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Full login: request a code, hand it to `notify`, then wait for approval
    pub async fn login<F>(&self, notify: F) -> Result<TokenSet>
    where
        F: FnOnce(&DeviceAuthorization),
    {
        let authorization = self.request_device_code().await?;
        notify(&authorization);
        self.poll_for_token(&authorization).await
    }
}
