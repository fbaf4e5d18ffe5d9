//! Plan lifecycle: confirm, launch, monitor, stop and collect a set of tasks

mod persist;
mod progress;

pub use persist::{PlanFile, TaskRecord};
pub use progress::ProgressMonitor;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::console::Console;
use crate::error::{Result, ShuttleError};
use crate::runtime::ExecutionRef;
use crate::state::ExecutionState;
use crate::task::{Task, TaskSpec};

pub const CONFIRM_PROMPT: &str = "Here is the execution plan. continue? (Y/n) ";

/// How a plan fans out over its tasks
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Tasks handled at once during launch, polling, stop and collection.
    /// `1` processes tasks strictly in order.
    pub concurrency: usize,
    /// Draw progress bars while joining
    pub show_progress: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            show_progress: false,
        }
    }
}

/// Per-task result of the launch stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStatus {
    Launched(ExecutionRef),
    /// Held a reference before this run started; left untouched
    AlreadyLaunched(ExecutionRef),
    Failed(String),
    /// Not attempted because an earlier task failed
    Skipped,
}

impl LaunchStatus {
    pub fn execution_ref(&self) -> Option<&ExecutionRef> {
        match self {
            LaunchStatus::Launched(r) | LaunchStatus::AlreadyLaunched(r) => Some(r),
            _ => None,
        }
    }
}

/// Launch outcome of every task, in plan order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchReport {
    pub entries: Vec<LaunchStatus>,
}

impl LaunchReport {
    /// Indices of tasks that are running remotely after the launch stage
    pub fn running(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, status)| status.execution_ref().is_some())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn failed(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, status)| matches!(status, LaunchStatus::Failed(_)))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|s| s.execution_ref().is_some())
    }
}

impl fmt::Display for LaunchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, status) in self.entries.iter().enumerate() {
            match status {
                LaunchStatus::Launched(r) => writeln!(f, "[{}] launched {}", index, r)?,
                LaunchStatus::AlreadyLaunched(r) => writeln!(f, "[{}] already running {}", index, r)?,
                LaunchStatus::Failed(msg) => writeln!(f, "[{}] failed: {}", index, msg)?,
                LaunchStatus::Skipped => writeln!(f, "[{}] skipped", index)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Launched(LaunchReport),
    Aborted,
}

/// Result of [`Plan::join`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReport {
    /// Polling iterations performed
    pub polls: usize,
    /// Final observed state of each task
    pub states: Vec<ExecutionState>,
}

impl JoinReport {
    pub fn all_succeeded(&self) -> bool {
        self.states.iter().all(ExecutionState::is_success)
    }
}

/// An ordered collection of tasks driven through one lifecycle
#[derive(Debug, Default)]
pub struct Plan {
    tasks: Vec<Task>,
    options: ExecutionOptions,
}

impl Plan {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            options: ExecutionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn set_options(&mut self, options: ExecutionOptions) {
        self.options = options;
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether any task holds an execution reference
    pub fn is_launched(&self) -> bool {
        self.tasks.iter().any(Task::is_launched)
    }

    /// Append a task; only allowed before anything is launched
    pub fn push(&mut self, task: Task) -> Result<()> {
        if self.is_launched() {
            return Err(ShuttleError::Precondition(format!(
                "cannot add task {} to a plan that has already been launched",
                task.name()
            )));
        }
        self.tasks.push(task);
        Ok(())
    }

    pub fn specs(&self) -> Vec<TaskSpec> {
        self.tasks.iter().map(Task::spec).collect()
    }

    /// One line per task, in plan order
    pub fn describe(&self) -> String {
        self.tasks
            .iter()
            .enumerate()
            .map(|(index, task)| format!("[{}] {}", index, task))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn concurrency(&self) -> usize {
        self.options.concurrency.max(1)
    }

    fn require_launched(&self, operation: &str) -> Result<()> {
        match self.tasks.iter().position(|t| !t.is_launched()) {
            Some(index) => Err(ShuttleError::Precondition(format!(
                "cannot {}: task {} ({}) has not been launched",
                operation,
                index,
                self.tasks[index].name()
            ))),
            None => Ok(()),
        }
    }

    /// Prepare, confirm and launch every task
    ///
    /// With `silent` the confirmation prompt is skipped. Declining the
    /// prompt (or closing its input) returns [`RunOutcome::Aborted`] and
    /// launches nothing. Tasks already holding a reference are not
    /// relaunched, so a run can be repeated after a partial failure.
    pub async fn run(&mut self, silent: bool, console: &mut dyn Console) -> Result<RunOutcome> {
        self.prepare(console);

        match self.confirm(silent, console).await {
            Ok(()) => {}
            Err(ShuttleError::UserAborted) => {
                warn!("Execution was aborted by user");
                console.emit("Execution was aborted by user.");
                return Ok(RunOutcome::Aborted);
            }
            Err(e) => return Err(e),
        }

        console.emit("Launching execution plan...");
        let report = self.launch_all().await?;
        console.emit("Execution has started.");
        Ok(RunOutcome::Launched(report))
    }

    fn prepare(&self, console: &mut dyn Console) {
        info!("Preparing execution plan with {} task(s)", self.tasks.len());
        console.emit("Preparing execution plan...");
        for line in self.describe().lines() {
            console.emit(line);
        }
    }

    /// Fails with [`ShuttleError::UserAborted`] when the user declines
    async fn confirm(&self, silent: bool, console: &mut dyn Console) -> Result<()> {
        console.emit("Confirming execution plan...");
        if silent {
            debug!("Confirmation skipped");
            return Ok(());
        }

        loop {
            let Some(answer) = console.ask(CONFIRM_PROMPT).await? else {
                info!("Confirmation input closed");
                return Err(ShuttleError::UserAborted);
            };
            match answer.trim() {
                "" | "y" | "Y" | "yes" | "Yes" => return Ok(()),
                "n" | "N" | "no" | "No" => return Err(ShuttleError::UserAborted),
                other => debug!("Unrecognised answer {:?}, asking again", other),
            }
        }
    }

    async fn launch_all(&mut self) -> Result<LaunchReport> {
        let total = self.tasks.len();
        let concurrency = self.concurrency();
        info!("Launching {} task(s), concurrency {}", total, concurrency);

        let mut entries = Vec::with_capacity(total);
        let mut first_error: Option<(usize, ShuttleError)> = None;
        {
            let mut outcomes = stream::iter(self.tasks.iter_mut().map(|task| launch_one(task)))
                .buffered(concurrency);

            while let Some(outcome) = outcomes.next().await {
                let index = entries.len();
                match outcome {
                    Ok(status) => entries.push(status),
                    Err(e) => {
                        warn!("Task {} failed to launch: {}", index, e);
                        entries.push(LaunchStatus::Failed(e.to_string()));
                        if first_error.is_none() {
                            first_error = Some((index, e));
                        }
                        // Only sequential launches stop early; concurrent ones attempt every task
                        if concurrency == 1 {
                            break;
                        }
                    }
                }
            }
        }
        entries.resize(total, LaunchStatus::Skipped);
        let report = LaunchReport { entries };

        match first_error {
            Some((index, source)) => {
                warn!(
                    "Launch stopped: {} task(s) running, {} failed",
                    report.running().len(),
                    report.failed().len()
                );
                Err(ShuttleError::LaunchFailed {
                    index,
                    source: Box::new(source),
                    report,
                })
            }
            None => {
                info!("All {} task(s) launched", total);
                Ok(report)
            }
        }
    }

    /// Current state of every task, in plan order
    ///
    /// Tasks without an execution reference report `None`, so a plan left
    /// behind by a failed launch can still be inspected.
    pub async fn statuses(&self) -> Result<Vec<Option<ExecutionState>>> {
        stream::iter(self.tasks.iter().map(|task| async move {
            if task.is_launched() {
                task.status().await.map(Some)
            } else {
                Ok(None)
            }
        }))
        .buffered(self.concurrency())
        .try_collect()
        .await
    }

    async fn poll_states(&self) -> Result<Vec<ExecutionState>> {
        stream::iter(self.tasks.iter().map(Task::status))
            .buffered(self.concurrency())
            .try_collect()
            .await
    }

    /// Poll every task until all have reached a terminal state
    ///
    /// Every task is queried on each iteration, including ones already
    /// done; a task counts as done the first time it is seen terminal and
    /// stays done. Sleeps `poll_interval` between iterations.
    pub async fn join(&self, poll_interval: Duration) -> Result<JoinReport> {
        self.require_launched("join plan")?;
        if self.tasks.is_empty() {
            return Ok(JoinReport {
                polls: 0,
                states: Vec::new(),
            });
        }

        let names: Vec<&str> = self.tasks.iter().map(Task::name).collect();
        let monitor = ProgressMonitor::new(&names, self.options.show_progress);
        let mut done = vec![false; self.tasks.len()];
        let mut last: Vec<Option<ExecutionState>> = vec![None; self.tasks.len()];
        let mut polls = 0;

        info!("Waiting for {} task(s) to finish", self.tasks.len());
        loop {
            let states = self.poll_states().await?;
            polls += 1;

            for (index, state) in states.iter().copied().enumerate() {
                if let Some(previous) = last[index] {
                    if state < previous || (previous.is_terminal() && state != previous) {
                        warn!(
                            "Task {} ({}) moved from {} back to {}",
                            index, names[index], previous, state
                        );
                    }
                }
                last[index] = Some(state);
                monitor.update(index, state);

                if state.is_terminal() && !done[index] {
                    done[index] = true;
                    monitor.finish_task(index, state);
                    info!("Task {} ({}) finished: {}", index, names[index], state);
                }
            }

            let remaining = done.iter().filter(|d| !**d).count();
            if remaining == 0 {
                let report = JoinReport { polls, states };
                monitor.finish(report.all_succeeded());
                info!("All tasks finished after {} poll(s)", polls);
                return Ok(report);
            }

            debug!("{} task(s) still running, sleeping {:?}", remaining, poll_interval);
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Ask every task to terminate
    ///
    /// Every task is attempted even if some fail, so launched tasks are
    /// signalled even when others were never launched. The first failure in
    /// plan order is returned after all attempts; an unlaunched task fails
    /// with [`ShuttleError::Precondition`].
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping {} task(s)", self.tasks.len());

        let results: Vec<Result<()>> = stream::iter(self.tasks.iter().map(Task::stop))
            .buffered(self.concurrency())
            .collect()
            .await;

        let mut first_error = None;
        for (index, result) in results.into_iter().enumerate() {
            if let Err(e) = result {
                warn!("Failed to stop task {} ({}): {}", index, self.tasks[index].name(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Download every task's outputs into `dest/<index>-<name>/`
    ///
    /// Returns the local paths per task, in plan order. Fails before any
    /// download if some task was never launched.
    pub async fn collect_results(&self, dest: &Path) -> Result<Vec<Vec<PathBuf>>> {
        self.require_launched("collect results")?;
        info!("Collecting results of {} task(s) into {}", self.tasks.len(), dest.display());

        stream::iter(self.tasks.iter().enumerate().map(|(index, task)| async move {
            let dir = dest.join(task_dir_name(index, task.name()));
            let files = task.files().await?;
            let mut local = Vec::with_capacity(files.len());
            for remote in &files {
                local.push(task.download(remote, &dir).await?);
            }
            debug!("Task {} ({}): {} file(s)", index, task.name(), local.len());
            Ok::<_, ShuttleError>(local)
        }))
        .buffered(self.concurrency())
        .try_collect()
        .await
    }
}

async fn launch_one(task: &mut Task) -> Result<LaunchStatus> {
    if let Some(existing) = task.execution_ref() {
        info!("[{}] Already running as {}", task.name(), existing);
        return Ok(LaunchStatus::AlreadyLaunched(existing.clone()));
    }
    let execution = task.launch().await?;
    Ok(LaunchStatus::Launched(execution.clone()))
}

/// Directory name for one task's results
fn task_dir_name(index: usize, name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{}", index, safe)
}
