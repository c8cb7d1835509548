use taskplan_core::api::{EventKind, EventSink, LifecycleEvent};
use serde_json::{json, Value};

/// Machine-readable event stream, one JSON object per line on stdout.
pub struct JsonlRendererPlugin {
    pretty_print: bool,
}

impl JsonlRendererPlugin {
    pub fn new(pretty_print: bool) -> Self {
        Self { pretty_print }
    }

    pub(crate) fn event_to_json(&self, event: &LifecycleEvent) -> Value {
        let metadata = match &event.kind {
            EventKind::PlanStart {
                total_tasks,
                parallel_groups,
                max_concurrency,
            } => json!({
                "total_tasks": total_tasks,
                "parallel_groups": parallel_groups,
                "max_concurrency": max_concurrency,
            }),
            EventKind::TaskReady { .. } => json!({}),
            EventKind::TaskDispatched { attempt, .. } => json!({ "attempt": attempt }),
            EventKind::TaskRetrying {
                attempt,
                delay,
                error,
                ..
            } => json!({
                "attempt": attempt,
                "delay_ms": delay.as_millis() as u64,
                "error": error,
            }),
            EventKind::TaskSucceeded {
                attempt, duration, ..
            } => json!({
                "attempt": attempt,
                "duration_ms": duration.as_millis() as u64,
            }),
            EventKind::TaskFailed {
                attempt,
                duration,
                error,
                ..
            } => json!({
                "attempt": attempt,
                "duration_ms": duration.as_millis() as u64,
                "error": error,
            }),
            EventKind::TaskSkipped { reason, .. } => json!({ "reason": reason }),
            EventKind::PlanCancelled { reason, running } => json!({
                "reason": reason,
                "running": running,
            }),
            EventKind::PlanEnd {
                succeeded,
                failed,
                skipped,
                duration,
            } => json!({
                "succeeded": succeeded,
                "failed": failed,
                "skipped": skipped,
                "duration_ms": duration.as_millis() as u64,
            }),
        };

        let mut value = json!({
            "v": 1,
            "event_type": event.kind.name(),
            "ts": event.ts.to_rfc3339(),
            "plan_id": event.plan_id,
            "metadata": metadata,
        });
        if let (Some(task_id), Some(obj)) = (event.kind.task_id(), value.as_object_mut()) {
            obj.insert("task_id".to_string(), Value::from(task_id));
        }
        value
    }
}

impl EventSink for JsonlRendererPlugin {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    fn accept(&self, event: &LifecycleEvent) {
        let value = self.event_to_json(event);
        if self.pretty_print {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".into()));
        } else {
            println!("{}", serde_json::to_string(&value).unwrap_or_else(|_| "{}".into()));
        }
    }
}
