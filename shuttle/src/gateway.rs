//! Seam between the remote runtime and the Gateway Execution Service

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shuttle_gateway::{GatewayClient, LaunchRequest, Result as GatewayResult};

/// Operations the remote runtime needs from the execution service
///
/// Implemented by [`GatewayClient`]; tests substitute an in-memory fake.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Stage a local file, returning the locator the service knows it by
    async fn upload(&self, token: &str, local: &Path) -> GatewayResult<String>;

    /// Submit a task, returning the execution reference
    async fn launch(&self, token: &str, request: &LaunchRequest) -> GatewayResult<String>;

    /// Raw state label of a submitted task
    async fn status(&self, token: &str, experiment_id: &str) -> GatewayResult<String>;

    async fn cancel(&self, token: &str, experiment_id: &str, signal: &str) -> GatewayResult<()>;

    async fn list_files(&self, token: &str, experiment_id: &str) -> GatewayResult<Vec<String>>;

    async fn download(
        &self,
        token: &str,
        experiment_id: &str,
        remote_path: &str,
        dest_dir: &Path,
    ) -> GatewayResult<PathBuf>;
}

#[async_trait]
impl Gateway for GatewayClient {
    async fn upload(&self, token: &str, local: &Path) -> GatewayResult<String> {
        GatewayClient::upload(self, token, local).await
    }

    async fn launch(&self, token: &str, request: &LaunchRequest) -> GatewayResult<String> {
        GatewayClient::launch(self, token, request).await
    }

    async fn status(&self, token: &str, experiment_id: &str) -> GatewayResult<String> {
        GatewayClient::status(self, token, experiment_id).await
    }

    async fn cancel(&self, token: &str, experiment_id: &str, signal: &str) -> GatewayResult<()> {
        GatewayClient::cancel(self, token, experiment_id, signal).await
    }

    async fn list_files(&self, token: &str, experiment_id: &str) -> GatewayResult<Vec<String>> {
        GatewayClient::list_files(self, token, experiment_id).await
    }

    async fn download(
        &self,
        token: &str,
        experiment_id: &str,
        remote_path: &str,
        dest_dir: &Path,
    ) -> GatewayResult<PathBuf> {
        GatewayClient::download(self, token, experiment_id, remote_path, dest_dir).await
    }
}
