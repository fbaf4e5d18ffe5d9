//! HTTP client for the Gateway Execution Service
//!
//! The client speaks a small JSON API rooted at `{base_url}/api/v1`. Every
//! request carries the caller's bearer token; the client never stores one.
//! Idempotent reads (status, file listing, download) are retried on transient
//! failures. Submissions and signals are sent exactly once.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Submission payload for one unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Human label of the task
    pub name: String,
    /// Application identifier registered in the gateway
    pub app_id: String,
    /// Application inputs, file inputs already replaced by upload locators
    pub inputs: BTreeMap<String, Value>,
    /// Backend arguments of the runtime (cluster, queue, profile, ...)
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    locator: String,
}

#[derive(Debug, Deserialize)]
struct LaunchResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    state: String,
}

#[derive(Debug, Deserialize)]
struct FilesResponse {
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SignalRequest<'a> {
    signal: &'a str,
}

/// Gateway Execution Service client
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: Client,
    base: Url,
    config: GatewayConfig,
}

impl GatewayClient {
    /// Create a client from a validated configuration
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;

        let base = Url::parse(&config.base_url).map_err(|e| {
            GatewayError::Config(format!("invalid gateway url {}: {}", config.base_url, e))
        })?;
        let http = Client::builder().timeout(config.timeout).build()?;

        info!("Gateway client configured for {}", base);

        Ok(Self { http, base, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Stage a local file; returns the gateway locator for it
    pub async fn upload(&self, token: &str, local: &Path) -> Result<String> {
        let bytes = tokio::fs::read(local).await?;
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        debug!("Uploading {} ({} bytes)", local.display(), bytes.len());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = self.endpoint(&["files"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        let body: UploadResponse = decode(check(response).await?).await?;

        Ok(body.locator)
    }

    /// Create and launch an experiment; returns its identifier
    pub async fn launch(&self, token: &str, request: &LaunchRequest) -> Result<String> {
        let url = self.endpoint(&["experiments"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        let body: LaunchResponse = decode(check(response).await?).await?;

        info!(
            "Gateway accepted {} ({}) as experiment {}",
            request.name, request.app_id, body.experiment_id
        );
        Ok(body.experiment_id)
    }

    /// Current state label of an experiment
    pub async fn status(&self, token: &str, experiment_id: &str) -> Result<String> {
        self.with_retry("status", || async move {
            let url = self.endpoint(&["experiments", experiment_id, "status"])?;
            let response = self.http.get(url).bearer_auth(token).send().await?;
            let body: StatusResponse = decode(check(response).await?).await?;
            Ok(body.state)
        })
        .await
    }

    /// Ask the gateway to deliver a signal to a running experiment
    pub async fn cancel(&self, token: &str, experiment_id: &str, signal: &str) -> Result<()> {
        let url = self.endpoint(&["experiments", experiment_id, "signal"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&SignalRequest { signal })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Result artifacts currently visible for an experiment
    pub async fn list_files(&self, token: &str, experiment_id: &str) -> Result<Vec<String>> {
        self.with_retry("list files", || async move {
            let url = self.endpoint(&["experiments", experiment_id, "files"])?;
            let response = self.http.get(url).bearer_auth(token).send().await?;
            let body: FilesResponse = decode(check(response).await?).await?;
            Ok(body.files)
        })
        .await
    }

    /// Download one artifact into `dest_dir`; returns the written path
    pub async fn download(
        &self,
        token: &str,
        experiment_id: &str,
        remote_path: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        let relative = artifact_path(remote_path)
            .ok_or_else(|| GatewayError::Decode(format!("unusable remote path: {}", remote_path)))?;

        let bytes = self
            .with_retry("download", || async move {
                let mut segments = vec!["experiments", experiment_id, "files"];
                segments.extend(remote_path.split('/').filter(|s| !s.is_empty()));
                let url = self.endpoint(&segments)?;
                let response = self.http.get(url).bearer_auth(token).send().await?;
                Ok(check(response).await?.bytes().await?.to_vec())
            })
            .await?;

        let target = dest_dir.join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;

        debug!("Downloaded {} to {}", remote_path, target.display());
        Ok(target)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Config(format!("gateway url cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry_count = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retry_count < self.config.max_retries => {
                    retry_count += 1;
                    warn!(
                        "Gateway {} failed (attempt {}/{}), retrying after {:?}: {}",
                        operation, retry_count, self.config.max_retries, self.config.retry_delay, e
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Local path, relative to a download directory, for a remote artifact
///
/// Keeps the directory structure of `remote_path` so artifacts with equal
/// file names in different directories stay apart. Returns `None` for empty
/// paths and for paths with absolute, drive or `..` components.
pub fn artifact_path(remote_path: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(remote_path).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| GatewayError::Decode(e.to_string()))
}
