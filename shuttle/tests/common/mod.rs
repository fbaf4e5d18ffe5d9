//! In-memory Gateway used by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shuttle::{Credential, Gateway, Inputs, Runtime, Session, Task};
use shuttle_gateway::{GatewayError, LaunchRequest, Result as GatewayResult};

#[derive(Default)]
struct FakeState {
    next_id: usize,
    names: HashMap<String, String>,
    launches: Vec<LaunchRequest>,
    uploads: Vec<PathBuf>,
    signals: Vec<(String, String)>,
    status_calls: Vec<String>,
    scripts: HashMap<String, VecDeque<String>>,
    fail_launch: HashSet<String>,
    fail_cancel: HashSet<String>,
    outputs: Vec<String>,
}

/// Records every call; behaviour is scripted per task name
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// States reported for `task`, in order; the last one repeats
    pub fn script(&self, task: &str, labels: &[&str]) {
        self.state.lock().unwrap().scripts.insert(
            task.to_string(),
            labels.iter().map(|l| l.to_string()).collect(),
        );
    }

    pub fn fail_launch_of(&self, task: &str) {
        self.state.lock().unwrap().fail_launch.insert(task.to_string());
    }

    pub fn fail_cancel_of(&self, task: &str) {
        self.state.lock().unwrap().fail_cancel.insert(task.to_string());
    }

    pub fn set_outputs(&self, files: &[&str]) {
        self.state.lock().unwrap().outputs = files.iter().map(|f| f.to_string()).collect();
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.state.lock().unwrap().launches.clone()
    }

    pub fn uploads(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().uploads.clone()
    }

    /// `(task name, signal)` pairs
    pub fn signals(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().signals.clone()
    }

    /// Task names, one per status query
    pub fn status_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().status_calls.clone()
    }

    fn name_of(state: &FakeState, experiment_id: &str) -> GatewayResult<String> {
        state
            .names
            .get(experiment_id)
            .cloned()
            .ok_or_else(|| GatewayError::Status {
                status: 404,
                body: format!("no experiment {}", experiment_id),
            })
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn upload(&self, token: &str, local: &Path) -> GatewayResult<String> {
        assert!(!token.is_empty());
        self.state.lock().unwrap().uploads.push(local.to_path_buf());
        let name = local.file_name().and_then(|n| n.to_str()).unwrap_or("blob");
        Ok(format!("gw://inputs/{}", name))
    }

    async fn launch(&self, token: &str, request: &LaunchRequest) -> GatewayResult<String> {
        assert!(!token.is_empty());
        let mut state = self.state.lock().unwrap();
        if state.fail_launch.contains(&request.name) {
            return Err(GatewayError::Status {
                status: 500,
                body: format!("launch of {} rejected", request.name),
            });
        }
        state.next_id += 1;
        let id = format!("exp-{}", state.next_id);
        state.names.insert(id.clone(), request.name.clone());
        state.launches.push(request.clone());
        Ok(id)
    }

    async fn status(&self, _token: &str, experiment_id: &str) -> GatewayResult<String> {
        let mut state = self.state.lock().unwrap();
        let name = Self::name_of(&state, experiment_id)?;
        state.status_calls.push(name.clone());
        let label = match state.scripts.get_mut(&name) {
            Some(script) if script.len() > 1 => script.pop_front(),
            Some(script) => script.front().cloned(),
            None => None,
        };
        Ok(label.unwrap_or_else(|| "COMPLETED".to_string()))
    }

    async fn cancel(&self, _token: &str, experiment_id: &str, signal: &str) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        let name = Self::name_of(&state, experiment_id)?;
        state.signals.push((name.clone(), signal.to_string()));
        if state.fail_cancel.contains(&name) {
            return Err(GatewayError::Status {
                status: 502,
                body: format!("cannot signal {}", name),
            });
        }
        Ok(())
    }

    async fn list_files(&self, _token: &str, experiment_id: &str) -> GatewayResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        Self::name_of(&state, experiment_id)?;
        Ok(state.outputs.clone())
    }

    async fn download(
        &self,
        _token: &str,
        experiment_id: &str,
        remote_path: &str,
        dest_dir: &Path,
    ) -> GatewayResult<PathBuf> {
        let name = {
            let state = self.state.lock().unwrap();
            Self::name_of(&state, experiment_id)?
        };
        let relative = shuttle_gateway::artifact_path(remote_path)
            .ok_or_else(|| GatewayError::Decode(format!("unusable remote path: {}", remote_path)))?;
        let local = dest_dir.join(relative);
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&local, format!("{} from {}", remote_path, name))?;
        Ok(local)
    }
}

pub fn logged_in_session(gateway: Arc<FakeGateway>) -> Session {
    Session::anonymous()
        .with_credential(Credential::new("test-token"))
        .with_gateway(gateway)
}

/// Tasks `t0..tn` sharing one remote runtime backed by `gateway`
pub fn remote_tasks(n: usize, session: &Session) -> Vec<Task> {
    let runtime = Arc::new(Runtime::remote(Inputs::new(), session));
    (0..n)
        .map(|i| Task::new(format!("t{}", i), "echo", Inputs::new(), runtime.clone()))
        .collect()
}
