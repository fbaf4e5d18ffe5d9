//! # shuttle-gateway
//!
//! Client library for the Gateway Execution Service that runs experiments on
//! remote compute resources, plus the device-code login used to obtain the
//! bearer token it expects.
//!
//! ## Submitting an experiment
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use shuttle_gateway::{GatewayClient, GatewayConfig, LaunchRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GatewayClient::new(GatewayConfig::from_env()?)?;
//!     let token = std::env::var("SHUTTLE_TOKEN")?;
//!
//!     let request = LaunchRequest {
//!         name: "namd-replica-1".to_string(),
//!         app_id: "namd".to_string(),
//!         inputs: BTreeMap::new(),
//!         args: BTreeMap::new(),
//!     };
//!     let id = client.launch(&token, &request).await?;
//!     println!("state: {}", client.status(&token, &id).await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Logging in
//!
//! ```no_run
//! use shuttle_gateway::{AuthConfig, DeviceFlowAuthenticator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let auth = DeviceFlowAuthenticator::new(AuthConfig::default())?;
//!     let tokens = auth
//!         .login(|code| println!("Visit {} and enter {}", code.verification_url(), code.user_code))
//!         .await?;
//!     println!("logged in, token length {}", tokens.access_token.len());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;

pub use auth::{DeviceAuthorization, DeviceFlowAuthenticator, TokenSet};
pub use client::{artifact_path, GatewayClient, LaunchRequest};
pub use config::{AuthConfig, GatewayConfig, GatewayConfigBuilder};
pub use error::{GatewayError, Result};
