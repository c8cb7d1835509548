use taskplan_core::api::{EventKind, EventSink, LifecycleEvent};

/// One human-readable line per lifecycle event on stdout.
pub struct TextRendererPlugin {
    ascii_only: bool,
    verbose: bool,
}

impl TextRendererPlugin {
    pub fn new(ascii_only: bool) -> Self {
        Self {
            ascii_only,
            verbose: false,
        }
    }

    /// Also print `task.ready` transitions.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn status_word(&self, success: bool) -> &'static str {
        match (success, self.ascii_only) {
            (true, true) => "OK",
            (true, false) => "SUCCESS",
            (false, true) => "FAIL",
            (false, false) => "FAILED",
        }
    }

    pub(crate) fn format_event(&self, event: &LifecycleEvent) -> Option<String> {
        let plan_id = &event.plan_id;
        let line = match &event.kind {
            EventKind::PlanStart {
                total_tasks,
                parallel_groups,
                max_concurrency,
            } => {
                let mut out = format!(
                    "PLAN START {} (tasks: {}, groups: {}, concurrency: {})",
                    plan_id,
                    total_tasks,
                    parallel_groups.len(),
                    max_concurrency
                );
                for (idx, group) in parallel_groups.iter().enumerate() {
                    out.push_str(&format!("\n  group {}: {}", idx, group.join(", ")));
                }
                out
            }
            EventKind::TaskReady { task_id } => {
                if !self.verbose {
                    return None;
                }
                format!("TASK READY {} (task {})", plan_id, task_id)
            }
            EventKind::TaskDispatched { task_id, attempt } => format!(
                "TASK START {} (task {}, attempt {})",
                plan_id, task_id, attempt
            ),
            EventKind::TaskRetrying {
                task_id,
                attempt,
                delay,
                error,
            } => format!(
                "TASK RETRY {} (task {}, attempt {}, delay {}ms): {}",
                plan_id,
                task_id,
                attempt,
                delay.as_millis(),
                error
            ),
            EventKind::TaskSucceeded {
                task_id,
                attempt,
                duration,
            } => format!(
                "TASK END {} (task {}, status {}, attempts {}, duration {}ms)",
                plan_id,
                task_id,
                self.status_word(true),
                attempt,
                duration.as_millis()
            ),
            EventKind::TaskFailed {
                task_id,
                attempt,
                duration,
                error,
            } => format!(
                "TASK END {} (task {}, status {}, attempts {}, duration {}ms): {}",
                plan_id,
                task_id,
                self.status_word(false),
                attempt,
                duration.as_millis(),
                error
            ),
            EventKind::TaskSkipped { task_id, reason } => {
                format!("TASK SKIP {} (task {}): {}", plan_id, task_id, reason)
            }
            EventKind::PlanCancelled { reason, running } => format!(
                "PLAN STOP {} (reason {}, running {})",
                plan_id, reason, running
            ),
            EventKind::PlanEnd {
                succeeded,
                failed,
                skipped,
                duration,
            } => format!(
                "PLAN END {} (succeeded {}, failed {}, skipped {}, duration {}ms)",
                plan_id,
                succeeded,
                failed,
                skipped,
                duration.as_millis()
            ),
        };
        Some(line)
    }
}

impl EventSink for TextRendererPlugin {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn accept(&self, event: &LifecycleEvent) {
        if let Some(line) = self.format_event(event) {
            println!("{}", line);
        }
    }
}
