use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::traits::{EventKind, EventSink, LifecycleEvent};

/// Terminal progress bars driven by lifecycle events.
///
/// One overall bar counts terminal tasks; each running task gets a spinner.
pub struct ProgressMonitor {
    enabled: bool,
    bars: Mutex<Bars>,
}

struct Bars {
    multi: MultiProgress,
    overall: ProgressBar,
    tasks: HashMap<String, ProgressBar>,
}

impl ProgressMonitor {
    /// Create a monitor. When `enabled` is false every event is ignored,
    /// which keeps machine-readable output clean.
    pub fn new(enabled: bool) -> Self {
        let multi = MultiProgress::new();
        let overall = if enabled {
            let bar = multi.add(ProgressBar::new(0));
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tasks ({percent}%) {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▓▒░  "),
            );
            bar.set_message("Starting...");
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            enabled,
            bars: Mutex::new(Bars {
                multi,
                overall,
                tasks: HashMap::new(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Bars {
    fn start_task(&mut self, task_id: &str, attempt: u32) {
        let bar = self
            .tasks
            .entry(task_id.to_string())
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("  {spinner:.green} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner())
                        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
                );
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            });
        if attempt > 1 {
            bar.set_message(format!("⏳ {task_id} (attempt {attempt})"));
        } else {
            bar.set_message(format!("⏳ {task_id}"));
        }
    }

    fn finish_task(&mut self, task_id: &str, icon: &str, detail: String) {
        if let Some(bar) = self.tasks.remove(task_id) {
            bar.finish_with_message(format!("{icon} {task_id} {detail}"));
        }
        self.overall.inc(1);
    }
}

impl EventSink for ProgressMonitor {
    fn name(&self) -> &str {
        "progress"
    }

    fn accept(&self, event: &LifecycleEvent) {
        if !self.enabled {
            return;
        }
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };

        match &event.kind {
            EventKind::PlanStart { total_tasks, .. } => {
                bars.overall.set_length(*total_tasks as u64);
                bars.overall.set_message(event.plan_id.clone());
            }
            EventKind::TaskDispatched { task_id, attempt } => bars.start_task(task_id, *attempt),
            EventKind::TaskRetrying { task_id, delay, .. } => {
                if let Some(bar) = bars.tasks.get(task_id) {
                    bar.set_message(format!("↻ {task_id} retry in {}ms", delay.as_millis()));
                }
            }
            EventKind::TaskSucceeded {
                task_id, duration, ..
            } => bars.finish_task(task_id, "✅", format!("({}ms)", duration.as_millis())),
            EventKind::TaskFailed { task_id, error, .. } => {
                bars.finish_task(task_id, "❌", format!("({})", error.kind))
            }
            EventKind::TaskSkipped { task_id, .. } => {
                bars.finish_task(task_id, "⏭", String::new())
            }
            EventKind::PlanCancelled { reason, .. } => {
                bars.overall.set_message(format!("stopping: {reason}"));
            }
            EventKind::PlanEnd { failed, skipped, .. } => {
                let msg = if failed + skipped == 0 {
                    "✅ All tasks completed".to_string()
                } else {
                    format!("⚠ {failed} failed, {skipped} skipped")
                };
                bars.overall.finish_with_message(msg);
            }
            EventKind::TaskReady { .. } => {}
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        if let Ok(bars) = self.bars.get_mut() {
            for (_, bar) in bars.tasks.drain() {
                bar.finish_and_clear();
            }
        }
    }
}
