use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;

use super::types::{
    AggregatedResult, ErrorKind, ExecutionPlan, FailureSummary, KeyResult, QualitySignal,
    TaskError, TaskOutcome, TaskStatus,
};

/// Turns an unordered outcome set into the ordered result handed to the next
/// phase.
///
/// Ordering follows the plan's `execution_order`, never completion time, so
/// the output is reproducible regardless of scheduling nondeterminism.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    plan_id: String,
    order: Vec<String>,
}

impl ResultAggregator {
    pub fn new(plan_id: impl Into<String>, order: Vec<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            order,
        }
    }

    pub fn for_plan(plan: &ExecutionPlan) -> Self {
        Self::new(plan.plan_id(), plan.execution_order().to_vec())
    }

    pub fn aggregate<I>(&self, outcomes: I) -> AggregatedResult
    where
        I: IntoIterator<Item = TaskOutcome>,
    {
        let mut by_id: HashMap<String, TaskOutcome> = HashMap::new();
        for outcome in outcomes {
            match by_id.get(&outcome.task_id) {
                Some(kept) if rank(kept.status) >= rank(outcome.status) => {}
                _ => {
                    by_id.insert(outcome.task_id.clone(), outcome);
                }
            }
        }

        let latest = by_id.values().map(|o| o.finished_at).max();

        let mut ordered = Vec::with_capacity(self.order.len().max(by_id.len()));
        for task_id in &self.order {
            let outcome = by_id.remove(task_id).unwrap_or_else(|| TaskOutcome {
                task_id: task_id.clone(),
                status: TaskStatus::Skipped,
                result: None,
                error: Some(TaskError::new(
                    ErrorKind::Internal,
                    "no outcome was recorded for this task",
                )),
                duration: Duration::ZERO,
                attempt_count: 0,
                started_at: None,
                finished_at: latest.unwrap_or_else(Utc::now),
            });
            ordered.push(outcome);
        }

        // Outcomes for ids outside the plan order go last, by id.
        let mut strays: Vec<TaskOutcome> = by_id.into_values().collect();
        strays.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        ordered.extend(strays);

        let count = |status: TaskStatus| ordered.iter().filter(|o| o.status == status).count();
        let succeeded = count(TaskStatus::Succeeded);
        let failed = count(TaskStatus::Failed);
        let skipped = count(TaskStatus::Skipped);
        let total_tasks = ordered.len();

        let quality = if total_tasks == 0 {
            QualitySignal::Empty
        } else if succeeded == total_tasks {
            QualitySignal::Complete
        } else if succeeded == 0 {
            QualitySignal::Failed
        } else {
            QualitySignal::Partial
        };

        let success_rate = if total_tasks == 0 {
            0.0
        } else {
            succeeded as f64 / total_tasks as f64
        };

        AggregatedResult {
            plan_id: self.plan_id.clone(),
            duration: plan_duration(&ordered),
            outcomes: ordered,
            total_tasks,
            succeeded,
            failed,
            skipped,
            success_rate,
            quality,
        }
    }
}

/// Terminal outcomes that actually ran win over skips recorded for the same id.
fn rank(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Succeeded | TaskStatus::Failed => 2,
        TaskStatus::Skipped => 1,
        _ => 0,
    }
}

/// Wall-clock from the first dispatch to the last terminal transition.
fn plan_duration(outcomes: &[TaskOutcome]) -> Duration {
    let Some(first_dispatch) = outcomes.iter().filter_map(|o| o.started_at).min() else {
        return Duration::ZERO;
    };
    outcomes
        .iter()
        .map(|o| o.finished_at)
        .max()
        .and_then(|last| (last - first_dispatch).to_std().ok())
        .unwrap_or_default()
}

/// Succeeded outcomes with their task descriptions, in result order.
pub fn key_results<'a>(
    result: &'a AggregatedResult,
    plan: &'a ExecutionPlan,
) -> Vec<KeyResult<'a>> {
    result
        .outcomes
        .iter()
        .filter(|o| o.status == TaskStatus::Succeeded)
        .map(|o| KeyResult {
            task_id: &o.task_id,
            description: plan
                .task(&o.task_id)
                .map(|t| t.description.as_str())
                .unwrap_or(""),
            result: o.result.as_ref(),
            duration: o.duration,
        })
        .collect()
}

/// Failed outcomes with their descriptions and error text, in result order.
pub fn failure_analysis<'a>(
    result: &'a AggregatedResult,
    plan: &'a ExecutionPlan,
) -> Vec<FailureSummary<'a>> {
    result
        .outcomes
        .iter()
        .filter(|o| o.status == TaskStatus::Failed)
        .map(|o| FailureSummary {
            task_id: &o.task_id,
            description: plan
                .task(&o.task_id)
                .map(|t| t.description.as_str())
                .unwrap_or(""),
            error: o
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown error".to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn outcome(id: &str, status: TaskStatus, start: Option<i64>, end: i64) -> TaskOutcome {
        TaskOutcome {
            task_id: id.to_string(),
            status,
            result: (status == TaskStatus::Succeeded).then(|| json!({ "id": id })),
            error: (status != TaskStatus::Succeeded)
                .then(|| TaskError::new(ErrorKind::Execution, "nope")),
            duration: Duration::from_millis(start.map_or(0, |s| (end - s) as u64)),
            attempt_count: u32::from(start.is_some()),
            started_at: start.map(at),
            finished_at: at(end),
        }
    }

    fn aggregator() -> ResultAggregator {
        ResultAggregator::new("p", vec!["a".into(), "b".into(), "c".into()])
    }

    #[test]
    fn orders_by_plan_not_completion() {
        let result = aggregator().aggregate(vec![
            outcome("c", TaskStatus::Succeeded, Some(0), 10),
            outcome("a", TaskStatus::Failed, Some(5), 50),
            outcome("b", TaskStatus::Skipped, None, 50),
        ]);

        let ids: Vec<_> = result.outcomes.iter().map(|o| o.task_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!((result.succeeded, result.failed, result.skipped), (1, 1, 1));
        assert_eq!(result.duration, Duration::from_millis(50));
        assert_eq!(result.quality, QualitySignal::Partial);
    }

    #[test]
    fn shuffled_input_gives_identical_result() {
        let base = vec![
            outcome("a", TaskStatus::Succeeded, Some(0), 10),
            outcome("b", TaskStatus::Succeeded, Some(10), 30),
            outcome("c", TaskStatus::Failed, Some(0), 25),
        ];
        let expected = aggregator().aggregate(base.clone());

        let mut rotated = base.clone();
        for _ in 0..base.len() {
            rotated.rotate_left(1);
            assert_eq!(aggregator().aggregate(rotated.clone()), expected);
        }
        let reversed: Vec<_> = base.into_iter().rev().collect();
        assert_eq!(aggregator().aggregate(reversed), expected);
    }

    #[test]
    fn reaggregation_is_idempotent() {
        let first = aggregator().aggregate(vec![
            outcome("b", TaskStatus::Succeeded, Some(3), 9),
            outcome("a", TaskStatus::Succeeded, Some(0), 3),
        ]);
        let second = aggregator().aggregate(first.outcomes.clone());
        assert_eq!(second, first);
    }

    #[test]
    fn missing_tasks_are_reported_not_dropped() {
        let result = aggregator().aggregate(vec![outcome("a", TaskStatus::Succeeded, Some(0), 4)]);
        assert_eq!(result.total_tasks, 3);
        let missing = result.outcome("c").unwrap();
        assert_eq!(missing.status, TaskStatus::Skipped);
        assert_eq!(missing.error.as_ref().map(|e| e.kind), Some(ErrorKind::Internal));
        assert_eq!(missing.finished_at, at(4));
    }

    #[test]
    fn duplicates_prefer_run_outcomes() {
        let result = aggregator().aggregate(vec![
            outcome("a", TaskStatus::Skipped, None, 1),
            outcome("a", TaskStatus::Failed, Some(0), 2),
            outcome("a", TaskStatus::Succeeded, Some(0), 3),
            outcome("b", TaskStatus::Succeeded, Some(0), 1),
            outcome("c", TaskStatus::Succeeded, Some(0), 1),
        ]);
        assert_eq!(result.total_tasks, 3);
        assert_eq!(result.status_of("a"), Some(TaskStatus::Failed));
    }

    #[test]
    fn all_failed_is_a_valid_result() {
        let result = aggregator().aggregate(vec![
            outcome("a", TaskStatus::Failed, Some(0), 1),
            outcome("b", TaskStatus::Skipped, None, 1),
            outcome("c", TaskStatus::Skipped, None, 1),
        ]);
        assert_eq!(result.quality, QualitySignal::Failed);
        assert_eq!(result.success_rate, 0.0);
    }

    #[test]
    fn empty_plan() {
        let result = ResultAggregator::new("p", Vec::new()).aggregate(Vec::new());
        assert_eq!(result.quality, QualitySignal::Empty);
        assert_eq!(result.duration, Duration::ZERO);
    }

    #[test]
    fn key_results_and_failure_analysis_use_descriptions() {
        use crate::executor::types::TaskDescriptor;

        let plan = ExecutionPlan::new(
            "p",
            vec![
                TaskDescriptor::new("a", "web_search").with_description("find sources"),
                TaskDescriptor::new("b", "text_processing").with_description("summarize"),
            ],
        )
        .unwrap();
        let result = ResultAggregator::for_plan(&plan).aggregate(vec![
            outcome("a", TaskStatus::Succeeded, Some(0), 5),
            outcome("b", TaskStatus::Failed, Some(5), 9),
        ]);

        let keys = key_results(&result, &plan);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].description, "find sources");
        assert_eq!(keys[0].result, Some(&json!({ "id": "a" })));

        let failures = failure_analysis(&result, &plan);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].task_id, "b");
        assert_eq!(failures[0].error, "execution: nope");
    }
}
