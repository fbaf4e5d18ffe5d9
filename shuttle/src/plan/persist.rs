use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::Plan;
use crate::error::{Result, ShuttleError};
use crate::format::FileFormat;
use crate::inputs::Inputs;
use crate::runtime::{ExecutionRef, Runtime, RuntimeRecord, RuntimeSpec};
use crate::session::Session;
use crate::task::Task;

/// On-disk form of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFile {
    pub tasks: Vec<TaskRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub app_id: String,
    #[serde(default)]
    pub inputs: Inputs,
    pub runtime: RuntimeRecord,
    #[serde(default, alias = "ref", skip_serializing_if = "Option::is_none")]
    pub execution_ref: Option<ExecutionRef>,
}

impl Plan {
    pub fn to_file(&self) -> PlanFile {
        PlanFile {
            tasks: self
                .tasks
                .iter()
                .map(|task| TaskRecord {
                    name: task.name().to_string(),
                    app_id: task.app_id().to_string(),
                    inputs: task.inputs().clone(),
                    runtime: RuntimeRecord::from(&task.runtime().spec()),
                    execution_ref: task.execution_ref().cloned(),
                })
                .collect(),
        }
    }

    /// Rebuild a plan, constructing runtimes through `session`
    ///
    /// Tasks whose runtime records are identical share one runtime instance.
    pub fn from_file(file: PlanFile, session: &Session) -> Result<Plan> {
        let mut runtimes: Vec<(RuntimeSpec, Arc<Runtime>)> = Vec::new();
        let mut tasks = Vec::with_capacity(file.tasks.len());

        for (index, record) in file.tasks.into_iter().enumerate() {
            if record.name.is_empty() {
                return Err(ShuttleError::PlanFormat(format!("task {} has no name", index)));
            }
            let spec = record.runtime.into_spec()?;
            let runtime = match runtimes.iter().find(|(known, _)| *known == spec) {
                Some((_, runtime)) => runtime.clone(),
                None => {
                    let runtime = Arc::new(Runtime::from_spec(spec.clone(), session)?);
                    runtimes.push((spec, runtime.clone()));
                    runtime
                }
            };
            tasks.push(
                Task::new(record.name, record.app_id, record.inputs, runtime)
                    .with_execution_ref(record.execution_ref),
            );
        }

        Ok(Plan::new(tasks))
    }

    /// Write the plan, including any execution references, to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        FileFormat::write(path, &self.to_file())?;
        info!("Plan with {} task(s) saved to {}", self.tasks.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path, session: &Session) -> Result<Plan> {
        let file: PlanFile = FileFormat::read(path)?;
        let plan = Plan::from_file(file, session)?;
        info!("Plan with {} task(s) loaded from {}", plan.len(), path.display());
        Ok(plan)
    }
}
