use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::state::ExecutionState;

/// Progress bars shown while a plan is joined
///
/// One bar per task, aligned with the plan's task order, plus an overall
/// bar counting tasks that reached a terminal state. When disabled every
/// bar is hidden and all calls are no-ops.
pub struct ProgressMonitor {
    overall: ProgressBar,
    task_bars: Vec<ProgressBar>,
    enabled: bool,
}

impl ProgressMonitor {
    pub fn new(task_names: &[&str], enabled: bool) -> Self {
        if !enabled {
            return Self {
                overall: ProgressBar::hidden(),
                task_bars: task_names.iter().map(|_| ProgressBar::hidden()).collect(),
                enabled: false,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(task_names.len() as u64));
        overall.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tasks done {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );
        overall.set_message("Waiting...");

        let task_style = ProgressStyle::default_bar()
            .template("  {prefix:<24} {bar:20.green/white} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let task_bars = task_names
            .iter()
            .map(|name| {
                let bar = multi.add(ProgressBar::new(ExecutionState::PROGRESS_STEPS));
                bar.set_style(task_style.clone());
                bar.set_prefix(name.to_string());
                bar.set_message(ExecutionState::Launched.as_str());
                bar
            })
            .collect();

        Self {
            overall,
            task_bars,
            enabled: true,
        }
    }

    /// Reflect the latest observed state of task `index`
    pub fn update(&self, index: usize, state: ExecutionState) {
        if !self.enabled {
            return;
        }
        if let Some(bar) = self.task_bars.get(index) {
            bar.set_position(state.progress());
            bar.set_message(state.as_str());
        }
    }

    /// Task `index` reached a terminal state; called once per task
    pub fn finish_task(&self, index: usize, state: ExecutionState) {
        if !self.enabled {
            return;
        }
        if let Some(bar) = self.task_bars.get(index) {
            let icon = if state.is_success() { "✅" } else { "❌" };
            bar.finish_with_message(format!("{} {}", icon, state));
        }
        self.overall.inc(1);
    }

    pub fn finish(&self, all_succeeded: bool) {
        if !self.enabled {
            return;
        }
        let msg = if all_succeeded {
            "✅ All tasks completed"
        } else {
            "❌ Some tasks did not complete"
        };
        self.overall.finish_with_message(msg);
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        for bar in &self.task_bars {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}
