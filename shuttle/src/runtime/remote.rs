//! Backend that submits tasks to the Gateway Execution Service

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use shuttle_gateway::LaunchRequest;
use tracing::{debug, info};

use super::{Backend, ExecutionRef, RuntimeKind};
use crate::error::{Result, ShuttleError};
use crate::inputs::{InputValue, Inputs};
use crate::session::Session;
use crate::state::ExecutionState;

/// Runtime backed by remote compute
///
/// `args` select the placement (`cluster`, `partition`, `profile`, ...) and
/// are forwarded verbatim with every launch.
#[derive(Debug)]
pub struct RemoteRuntime {
    args: Inputs,
    session: Session,
}

impl RemoteRuntime {
    pub fn new(args: Inputs, session: Session) -> Self {
        Self { args, session }
    }

    /// Placement used when an experiment does not name one
    pub fn default_args() -> Inputs {
        let mut args = Inputs::new();
        args.insert("cluster".into(), "expanse".into());
        args.insert("partition".into(), "shared".into());
        args.insert("profile".into(), "grprsp-1".into());
        args
    }

    fn token(&self, operation: &str) -> Result<&str> {
        Ok(self.session.require_credential(operation)?.access_token())
    }

    /// Replace file references with gateway locators
    async fn stage(&self, value: &InputValue) -> Result<Value> {
        match value {
            InputValue::File { file } => Ok(Value::String(self.upload(file).await?)),
            InputValue::List(items) => {
                let mut staged = Vec::with_capacity(items.len());
                for item in items {
                    staged.push(match item.as_file() {
                        Some(file) => Value::String(self.upload(file).await?),
                        None => item.to_json(),
                    });
                }
                Ok(Value::Array(staged))
            }
            other => Ok(other.to_json()),
        }
    }
}

#[async_trait]
impl Backend for RemoteRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Remote
    }

    fn args(&self) -> &Inputs {
        &self.args
    }

    async fn upload(&self, local: &Path) -> Result<String> {
        let token = self.token("upload")?;
        let locator = self.session.gateway()?.upload(token, local).await?;
        debug!("Uploaded {} as {}", local.display(), locator);
        Ok(locator)
    }

    async fn execute(&self, name: &str, app_id: &str, inputs: &Inputs) -> Result<ExecutionRef> {
        let token = self.token("execute")?;
        let gateway = self.session.gateway()?;

        let mut staged = BTreeMap::new();
        for (key, value) in inputs {
            staged.insert(key.clone(), self.stage(value).await?);
        }

        let request = LaunchRequest {
            name: name.to_string(),
            app_id: app_id.to_string(),
            inputs: staged,
            args: self
                .args
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        };

        let id = gateway.launch(token, &request).await?;
        info!("Submitted {} ({}) as {}", name, app_id, id);
        Ok(ExecutionRef::new(id))
    }

    async fn status(&self, execution: &ExecutionRef) -> Result<ExecutionState> {
        let token = self.token("status")?;
        let label = self
            .session
            .gateway()?
            .status(token, execution.as_str())
            .await?;
        label.parse().map_err(|e: crate::state::UnknownState| ShuttleError::Backend {
            kind: RuntimeKind::Remote,
            message: e.to_string(),
        })
    }

    async fn signal(&self, execution: &ExecutionRef, signal: &str) -> Result<()> {
        let token = self.token("signal")?;
        self.session
            .gateway()?
            .cancel(token, execution.as_str(), signal)
            .await?;
        info!("Sent {} to {}", signal, execution);
        Ok(())
    }

    async fn list_files(&self, execution: &ExecutionRef) -> Result<Vec<String>> {
        let token = self.token("list files")?;
        Ok(self
            .session
            .gateway()?
            .list_files(token, execution.as_str())
            .await?)
    }

    async fn download(
        &self,
        execution: &ExecutionRef,
        remote_path: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        let token = self.token("download")?;
        Ok(self
            .session
            .gateway()?
            .download(token, execution.as_str(), remote_path, dest_dir)
            .await?)
    }
}
