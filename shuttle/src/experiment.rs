//! Building plans from an application, shared inputs, replicas and sweeps

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ShuttleError};
use crate::format::FileFormat;
use crate::inputs::{InputValue, Inputs};
use crate::plan::Plan;
use crate::runtime::{Runtime, RuntimeRecord};
use crate::session::Session;
use crate::task::Task;

/// An application registered with the execution service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub app_id: String,
}

impl Application {
    pub fn new(name: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            app_id: app_id.into(),
        }
    }

    /// NAMD molecular dynamics
    pub fn namd(name: impl Into<String>) -> Self {
        Self::new(name, "namd")
    }
}

#[derive(Debug)]
struct PendingTask {
    name: String,
    inputs: Inputs,
    runtime: Arc<Runtime>,
}

/// Accumulates task variants for one application and turns them into a plan
#[derive(Debug)]
pub struct Experiment {
    application: Application,
    inputs: Inputs,
    runtime: Arc<Runtime>,
    pending: Vec<PendingTask>,
    replicas: usize,
    rng: StdRng,
}

impl Experiment {
    pub fn new(application: Application, default_runtime: Arc<Runtime>) -> Self {
        Self {
            application,
            inputs: Inputs::new(),
            runtime: default_runtime,
            pending: Vec::new(),
            replicas: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// NAMD experiment with its standard input files
    pub fn namd(
        name: impl Into<String>,
        default_runtime: Arc<Runtime>,
        config_file: impl Into<PathBuf>,
        pdb_file: impl Into<PathBuf>,
        psf_file: impl Into<PathBuf>,
        other_files: Vec<PathBuf>,
    ) -> Self {
        let mut inputs = Inputs::new();
        inputs.insert("config_file".into(), InputValue::file(config_file));
        inputs.insert("pdb_file".into(), InputValue::file(pdb_file));
        inputs.insert("psf_file".into(), InputValue::file(psf_file));
        inputs.insert(
            "other_files".into(),
            InputValue::List(other_files.into_iter().map(InputValue::file).collect()),
        );
        Self::new(Application::namd(name), default_runtime).with_inputs(inputs)
    }

    /// Replace the inputs every task receives
    pub fn with_inputs(mut self, inputs: Inputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<Runtime>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Make replica placement reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Add one task with the shared inputs
    ///
    /// The runtime is picked at random from `allowed`, or is the default
    /// runtime when `allowed` is empty.
    pub fn add_replica(&mut self, allowed: &[Arc<Runtime>]) -> &mut Self {
        let runtime = allowed
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| self.runtime.clone());
        self.replicas += 1;
        let name = format!("{}-replica-{}", self.application.name, self.replicas);
        debug!("Adding {} on {}", name, runtime);
        self.pending.push(PendingTask {
            name,
            inputs: Inputs::new(),
            runtime,
        });
        self
    }

    /// Add one task per point of the cartesian product of `space`
    ///
    /// Point values override shared inputs with the same name.
    pub fn add_sweep(
        &mut self,
        runtime: Option<Arc<Runtime>>,
        space: &BTreeMap<String, Vec<InputValue>>,
    ) -> &mut Self {
        let runtime = runtime.unwrap_or_else(|| self.runtime.clone());
        let points = cartesian_product(space);
        debug!("Adding sweep of {} point(s) on {}", points.len(), runtime);

        for point in points {
            let name = if point.is_empty() {
                format!("{}-sweep", self.application.name)
            } else {
                let label: Vec<String> = point.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                format!("{}-sweep-{}", self.application.name, label.join(","))
            };
            self.pending.push(PendingTask {
                name,
                inputs: point,
                runtime: runtime.clone(),
            });
        }
        self
    }

    /// Turn the accumulated variants into a plan
    ///
    /// An experiment with no variants yields a single replica on the
    /// default runtime.
    pub fn plan(mut self) -> Plan {
        if self.pending.is_empty() {
            self.add_replica(&[]);
        }

        let app_id = self.application.app_id;
        let shared = self.inputs;
        let tasks: Vec<Task> = self
            .pending
            .into_iter()
            .map(|pending| {
                let mut inputs = shared.clone();
                inputs.extend(pending.inputs);
                Task::new(pending.name, app_id.clone(), inputs, pending.runtime)
            })
            .collect();

        info!("Planned {} task(s) for {}", tasks.len(), app_id);
        Plan::new(tasks)
    }
}

/// Every combination of one value per key, in key order
///
/// An empty space has exactly one (empty) point; a key with no values
/// makes the product empty.
fn cartesian_product(space: &BTreeMap<String, Vec<InputValue>>) -> Vec<Inputs> {
    let mut points = vec![Inputs::new()];
    for (key, values) in space {
        let mut next = Vec::with_capacity(points.len() * values.len());
        for point in &points {
            for value in values {
                let mut extended = point.clone();
                extended.insert(key.clone(), value.clone());
                next.push(extended);
            }
        }
        points = next;
    }
    points
}

/// Experiment description read by `shuttle plan`
///
/// ```yaml
/// name: water-box
/// app_id: namd
/// inputs:
///   pdb_file: {file: input.pdb}
/// runtimes:
///   local: {kind: mock, args: {seed: 7}}
///   expanse: {kind: remote, args: {cluster: expanse}}
/// default_runtime: local
/// replicas:
///   - runtimes: [local, expanse]
///     count: 2
/// sweeps:
///   - space: {steps: [1000, 2000]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    pub name: String,
    pub app_id: String,
    #[serde(default)]
    pub inputs: Inputs,
    #[serde(default)]
    pub runtimes: BTreeMap<String, RuntimeRecord>,
    #[serde(default)]
    pub default_runtime: Option<String>,
    #[serde(default)]
    pub replicas: Vec<ReplicaDefinition>,
    #[serde(default)]
    pub sweeps: Vec<SweepDefinition>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaDefinition {
    /// Named runtimes to choose from; empty means the default runtime
    #[serde(default)]
    pub runtimes: Vec<String>,
    #[serde(default = "one")]
    pub count: usize,
}

fn one() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepDefinition {
    #[serde(default)]
    pub runtime: Option<String>,
    pub space: BTreeMap<String, Vec<InputValue>>,
}

impl ExperimentDefinition {
    pub fn load(path: &Path) -> Result<Self> {
        FileFormat::read(path)
    }

    /// Construct the named runtimes through `session` and assemble the experiment
    pub fn build(self, session: &Session) -> Result<Experiment> {
        let mut runtimes = BTreeMap::new();
        for (label, record) in self.runtimes {
            let runtime = Runtime::from_spec(record.into_spec()?, session)?;
            runtimes.insert(label, Arc::new(runtime));
        }

        let lookup = |label: &str| -> Result<Arc<Runtime>> {
            runtimes.get(label).cloned().ok_or_else(|| {
                ShuttleError::PlanFormat(format!("experiment refers to undefined runtime '{}'", label))
            })
        };

        let default_runtime = match (&self.default_runtime, runtimes.len()) {
            (Some(label), _) => lookup(label)?,
            (None, 0) => Arc::new(Runtime::mock()),
            (None, 1) => runtimes.values().next().cloned().ok_or_else(|| {
                ShuttleError::PlanFormat("experiment runtime table is empty".into())
            })?,
            (None, _) => {
                return Err(ShuttleError::PlanFormat(
                    "default_runtime is required when several runtimes are defined".into(),
                ))
            }
        };

        let mut experiment = Experiment::new(Application::new(self.name, self.app_id), default_runtime)
            .with_inputs(self.inputs);
        if let Some(seed) = self.seed {
            experiment = experiment.with_seed(seed);
        }

        for replica in &self.replicas {
            let allowed = replica
                .runtimes
                .iter()
                .map(|label| lookup(label.as_str()))
                .collect::<Result<Vec<_>>>()?;
            for _ in 0..replica.count {
                experiment.add_replica(&allowed);
            }
        }

        for sweep in &self.sweeps {
            let runtime = sweep.runtime.as_deref().map(lookup).transpose()?;
            experiment.add_sweep(runtime, &sweep.space);
        }

        Ok(experiment)
    }
}
