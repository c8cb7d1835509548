use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::policy::{FailureDecision, FailurePolicy};
use super::traits::{EventKind, EventSink, LifecycleEvent, ToolInvoker};
use super::types::{
    ErrorKind, ExecutionOpts, ExecutionPlan, Parameters, TaskDescriptor, TaskError, TaskOutcome,
    TaskStatus, DEFAULT_PRIORITY,
};

/// Ready-queue key: higher priority first, then earlier `execution_order`.
type ReadyKey = (Reverse<i32>, usize);

/// Per-attempt timeout: the configured timeout, stretched to twice the
/// task's own estimate when that is longer.
pub fn effective_timeout(task: &TaskDescriptor, task_timeout: Duration) -> Duration {
    task.estimated_duration
        .map_or(task_timeout, |estimate| {
            task_timeout.max(estimate.saturating_mul(2))
        })
}

/// Drives one plan to completion.
///
/// A single coordinating loop owns every status transition. Attempts run as
/// spawned tasks that only report back; the loop applies their results,
/// releases dependents and decides retries.
pub struct Scheduler<'a> {
    plan: &'a ExecutionPlan,
    opts: &'a ExecutionOpts,
    policy: &'a FailurePolicy,
    invoker: Arc<dyn ToolInvoker>,
    sinks: &'a [Arc<dyn EventSink>],
}

impl<'a> Scheduler<'a> {
    pub fn new(
        plan: &'a ExecutionPlan,
        opts: &'a ExecutionOpts,
        policy: &'a FailurePolicy,
        invoker: Arc<dyn ToolInvoker>,
        sinks: &'a [Arc<dyn EventSink>],
    ) -> Self {
        Self {
            plan,
            opts,
            policy,
            invoker,
            sinks,
        }
    }

    /// Run every task to a terminal status. Outcomes come back in
    /// `execution_order`, one per task.
    ///
    /// Firing `stop` cancels the run the same way the plan deadline does.
    #[tracing::instrument(
        name = "scheduler.run",
        skip_all,
        fields(plan_id = %self.plan.plan_id(), tasks = self.plan.len())
    )]
    pub async fn run(self, stop: CancellationToken) -> Vec<TaskOutcome> {
        let run = PlanRun::new(self);
        run.drive(stop).await
    }
}

struct Slot {
    status: TaskStatus,
    attempts: u32,
    /// Concurrency slot, held from dispatch until the coordinator records
    /// the attempt's report.
    permit: Option<OwnedSemaphorePermit>,
    first_dispatch: Option<(Instant, DateTime<Utc>)>,
    outcome: Option<TaskOutcome>,
}

struct AttemptReport {
    pos: usize,
    attempt: u32,
    result: Result<Value, TaskError>,
}

/// Mutable state of one run. Owned exclusively by the coordinating loop.
struct PlanRun<'a> {
    ctx: Scheduler<'a>,
    slots: Vec<Slot>,
    ready: BTreeSet<ReadyKey>,
    delayed: BinaryHeap<Reverse<(Instant, usize)>>,
    running: JoinSet<AttemptReport>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    halted: Option<ErrorKind>,
    grace_until: Option<Instant>,
    started: Instant,
}

impl<'a> PlanRun<'a> {
    fn new(ctx: Scheduler<'a>) -> Self {
        let slots = (0..ctx.plan.len())
            .map(|_| Slot {
                status: TaskStatus::Pending,
                attempts: 0,
                permit: None,
                first_dispatch: None,
                outcome: None,
            })
            .collect();
        let permits = Arc::new(Semaphore::new(ctx.opts.max_concurrency.max(1)));
        Self {
            ctx,
            slots,
            ready: BTreeSet::new(),
            delayed: BinaryHeap::new(),
            running: JoinSet::new(),
            permits,
            cancel: CancellationToken::new(),
            halted: None,
            grace_until: None,
            started: Instant::now(),
        }
    }

    async fn drive(mut self, stop: CancellationToken) -> Vec<TaskOutcome> {
        let plan = self.ctx.plan;
        self.emit(EventKind::PlanStart {
            total_tasks: plan.len(),
            parallel_groups: plan.parallel_groups().to_vec(),
            max_concurrency: self.ctx.opts.max_concurrency,
        });

        for pos in 0..plan.len() {
            if plan.dependencies(&plan.execution_order()[pos]).is_empty() {
                self.mark_ready(pos);
            }
        }

        let deadline = self.ctx.opts.plan_deadline.map(|d| self.started + d);

        loop {
            if self.halted.is_none() {
                if stop.is_cancelled() {
                    self.halt(ErrorKind::Cancelled);
                } else if deadline.is_some_and(|at| Instant::now() >= at) {
                    self.halt(ErrorKind::PlanTimeout);
                } else {
                    self.dispatch();
                }
            }

            let idle = self.ready.is_empty() && self.delayed.is_empty();
            if self.running.is_empty() && (idle || self.halted.is_some()) {
                break;
            }

            let next_retry = self.delayed.peek().map(|Reverse((at, _))| *at);
            let grace_until = self.grace_until;
            let active = self.halted.is_none();

            tokio::select! {
                biased;
                _ = stop.cancelled(), if active => self.halt(ErrorKind::Cancelled),
                _ = sleep_until(deadline), if active => self.halt(ErrorKind::PlanTimeout),
                _ = sleep_until(grace_until) => {
                    self.abandon_running().await;
                    break;
                }
                joined = self.running.join_next(), if !self.running.is_empty() => match joined {
                    Some(Ok(report)) => self.record(report),
                    Some(Err(err)) if !err.is_cancelled() => {
                        tracing::error!(error = %err, "attempt task ended abnormally");
                    }
                    _ => {}
                },
                _ = sleep_until(next_retry), if active => self.promote_due_retries(),
            }
        }

        self.finish()
    }

    /// Start as many ready tasks as free slots allow.
    fn dispatch(&mut self) {
        while let Some(&key) = self.ready.first() {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                break;
            };
            self.ready.remove(&key);
            self.launch(key.1, permit);
        }
    }

    fn launch(&mut self, pos: usize, permit: OwnedSemaphorePermit) {
        let plan = self.ctx.plan;
        let task_id = &plan.execution_order()[pos];
        let Some(task) = plan.task(task_id) else {
            self.finish_skipped(pos, TaskError::new(ErrorKind::Internal, "task missing from plan"));
            return;
        };

        let slot = &mut self.slots[pos];
        slot.status = TaskStatus::Running;
        slot.attempts += 1;
        slot.permit = Some(permit);
        if slot.first_dispatch.is_none() {
            slot.first_dispatch = Some((Instant::now(), Utc::now()));
        }
        let attempt = slot.attempts;

        let timeout = effective_timeout(task, self.ctx.opts.task_timeout);
        tracing::debug!(
            task_id = %task_id,
            tool = %task.tool_name,
            attempt,
            timeout_ms = timeout.as_millis() as u64,
            "dispatching task"
        );
        self.emit(EventKind::TaskDispatched {
            task_id: task_id.clone(),
            attempt,
        });

        self.running.spawn(run_attempt(
            pos,
            attempt,
            Arc::clone(&self.ctx.invoker),
            task.tool_name.clone(),
            task.parameters.clone(),
            self.cancel.child_token(),
            timeout,
        ));
    }

    fn record(&mut self, report: AttemptReport) {
        let AttemptReport {
            pos,
            attempt,
            result,
        } = report;
        if self.slots[pos].status != TaskStatus::Running {
            return;
        }
        self.slots[pos].permit = None;

        let error = match result {
            Ok(value) => {
                self.finish_succeeded(pos, attempt, value);
                return;
            }
            Err(error) => error,
        };

        let decision = match self.halted {
            None => self.ctx.policy.decide(&error, attempt),
            Some(_) => FailureDecision::Fail,
        };

        match decision {
            FailureDecision::Retry { delay } => {
                let task_id = self.task_id(pos).to_string();
                tracing::info!(
                    task_id = %task_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying task"
                );
                self.slots[pos].status = TaskStatus::Ready;
                self.delayed.push(Reverse((Instant::now() + delay, pos)));
                self.emit(EventKind::TaskRetrying {
                    task_id,
                    attempt,
                    delay,
                    error,
                });
            }
            FailureDecision::Fail => {
                self.finish_failed(pos, attempt, error);
                self.skip_dependents(pos);

                let failed = self.count(TaskStatus::Failed);
                if self.halted.is_none()
                    && !self.ctx.policy.should_continue(failed, self.slots.len())
                {
                    self.halt(ErrorKind::PlanAborted);
                }
            }
        }
    }

    fn promote_due_retries(&mut self) {
        let now = Instant::now();
        while let Some(Reverse((at, pos))) = self.delayed.peek().copied() {
            if at > now {
                break;
            }
            self.delayed.pop();
            if self.slots[pos].status == TaskStatus::Ready {
                let key = self.ready_key(pos);
                self.ready.insert(key);
            }
        }
    }

    /// Stop dispatching. Every task that has not started is skipped with
    /// `reason`. On cancellation or deadline, running attempts are signalled
    /// and given the grace period to finish.
    fn halt(&mut self, reason: ErrorKind) {
        if self.halted.is_some() {
            return;
        }
        self.halted = Some(reason);

        let running = self.count(TaskStatus::Running);
        tracing::warn!(reason = %reason, running, "halting plan");
        self.emit(EventKind::PlanCancelled { reason, running });

        let skip_error = match reason {
            ErrorKind::PlanTimeout => {
                TaskError::new(ErrorKind::PlanTimeout, "plan deadline reached before dispatch")
            }
            ErrorKind::PlanAborted => {
                TaskError::new(ErrorKind::PlanAborted, "plan aborted after too many failures")
            }
            _ => TaskError::cancelled("plan cancelled before dispatch"),
        };

        self.ready.clear();
        self.delayed.clear();
        for pos in 0..self.slots.len() {
            if matches!(
                self.slots[pos].status,
                TaskStatus::Pending | TaskStatus::Ready
            ) {
                self.finish_skipped(pos, skip_error.clone());
            }
        }

        if reason != ErrorKind::PlanAborted {
            self.cancel.cancel();
            self.grace_until = Some(Instant::now() + self.ctx.opts.cancel_grace);
        }
    }

    async fn abandon_running(&mut self) {
        self.running.shutdown().await;

        let grace = self.ctx.opts.cancel_grace;
        for pos in 0..self.slots.len() {
            if self.slots[pos].status == TaskStatus::Running {
                let attempt = self.slots[pos].attempts;
                let error = TaskError::cancelled(format!(
                    "did not stop within {}ms of cancellation",
                    grace.as_millis()
                ));
                self.finish_failed(pos, attempt, error);
            }
        }
    }

    /// Skip everything downstream of `root`, transitively.
    fn skip_dependents(&mut self, root: usize) {
        let plan = self.ctx.plan;
        let mut queue = VecDeque::from([root]);

        while let Some(pos) = queue.pop_front() {
            let task_id = &plan.execution_order()[pos];
            let status = self.slots[pos].status;
            for dependent in plan.dependents(task_id) {
                let Some(dep_pos) = plan.position(dependent) else {
                    continue;
                };
                if self.slots[dep_pos].status == TaskStatus::Pending {
                    self.finish_skipped(dep_pos, TaskError::dependency_failed(task_id, status));
                    queue.push_back(dep_pos);
                }
            }
        }
    }

    fn release_dependents(&mut self, pos: usize) {
        let plan = self.ctx.plan;
        for dependent in plan.dependents(&plan.execution_order()[pos]) {
            let Some(dep_pos) = plan.position(dependent) else {
                continue;
            };
            if self.slots[dep_pos].status != TaskStatus::Pending {
                continue;
            }
            let satisfied = plan.dependencies(dependent).iter().all(|dep| {
                plan.position(dep)
                    .is_some_and(|p| self.slots[p].status == TaskStatus::Succeeded)
            });
            if satisfied {
                self.mark_ready(dep_pos);
            }
        }
    }

    fn mark_ready(&mut self, pos: usize) {
        self.slots[pos].status = TaskStatus::Ready;
        let key = self.ready_key(pos);
        self.ready.insert(key);
        self.emit(EventKind::TaskReady {
            task_id: self.task_id(pos).to_string(),
        });
    }

    fn finish_succeeded(&mut self, pos: usize, attempt: u32, value: Value) {
        let duration = self.elapsed_since_dispatch(pos);
        let task_id = self.task_id(pos).to_string();
        tracing::info!(task_id = %task_id, attempt, duration_ms = duration.as_millis() as u64, "task succeeded");

        self.store(pos, TaskStatus::Succeeded, Some(value), None, duration);
        self.emit(EventKind::TaskSucceeded {
            task_id,
            attempt,
            duration,
        });
        if self.halted.is_none() {
            self.release_dependents(pos);
        }
    }

    fn finish_failed(&mut self, pos: usize, attempt: u32, error: TaskError) {
        let duration = self.elapsed_since_dispatch(pos);
        let task_id = self.task_id(pos).to_string();
        tracing::warn!(task_id = %task_id, attempt, error = %error, "task failed");

        self.store(pos, TaskStatus::Failed, None, Some(error.clone()), duration);
        self.emit(EventKind::TaskFailed {
            task_id,
            attempt,
            duration,
            error,
        });
    }

    fn finish_skipped(&mut self, pos: usize, reason: TaskError) {
        let duration = self.elapsed_since_dispatch(pos);
        let task_id = self.task_id(pos).to_string();
        tracing::info!(task_id = %task_id, reason = %reason, "task skipped");

        self.store(pos, TaskStatus::Skipped, None, Some(reason.clone()), duration);
        self.emit(EventKind::TaskSkipped { task_id, reason });
    }

    fn store(
        &mut self,
        pos: usize,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<TaskError>,
        duration: Duration,
    ) {
        let task_id = self.task_id(pos).to_string();
        let slot = &mut self.slots[pos];
        slot.status = status;
        slot.permit = None;
        slot.outcome = Some(TaskOutcome {
            task_id,
            status,
            result,
            error,
            duration,
            attempt_count: slot.attempts,
            started_at: slot.first_dispatch.map(|(_, wall)| wall),
            finished_at: Utc::now(),
        });
    }

    fn finish(mut self) -> Vec<TaskOutcome> {
        for pos in 0..self.slots.len() {
            if !self.slots[pos].status.is_terminal() {
                tracing::error!(task_id = %self.task_id(pos), status = %self.slots[pos].status, "task left without a terminal status");
                self.finish_skipped(
                    pos,
                    TaskError::new(ErrorKind::Internal, "scheduler stopped before the task ran"),
                );
            }
        }

        self.emit(EventKind::PlanEnd {
            succeeded: self.count(TaskStatus::Succeeded),
            failed: self.count(TaskStatus::Failed),
            skipped: self.count(TaskStatus::Skipped),
            duration: self.started.elapsed(),
        });

        self.slots
            .into_iter()
            .filter_map(|slot| slot.outcome)
            .collect()
    }

    fn emit(&self, kind: EventKind) {
        if self.ctx.sinks.is_empty() {
            return;
        }
        let event = LifecycleEvent {
            plan_id: self.ctx.plan.plan_id().to_string(),
            ts: Utc::now(),
            kind,
        };
        for sink in self.ctx.sinks {
            sink.accept(&event);
        }
    }

    fn task_id(&self, pos: usize) -> &'a str {
        let plan: &'a ExecutionPlan = self.ctx.plan;
        &plan.execution_order()[pos]
    }

    fn ready_key(&self, pos: usize) -> ReadyKey {
        let priority = self
            .ctx
            .plan
            .task(self.task_id(pos))
            .map_or(DEFAULT_PRIORITY, |t| t.priority);
        (Reverse(priority), pos)
    }

    fn elapsed_since_dispatch(&self, pos: usize) -> Duration {
        self.slots[pos]
            .first_dispatch
            .map_or(Duration::ZERO, |(at, _)| at.elapsed())
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.slots.iter().filter(|s| s.status == status).count()
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// One attempt: invoke the tool under a timeout and report back.
async fn run_attempt(
    pos: usize,
    attempt: u32,
    invoker: Arc<dyn ToolInvoker>,
    tool_name: String,
    parameters: Parameters,
    cancel: CancellationToken,
    timeout: Duration,
) -> AttemptReport {
    let call_cancel = cancel.clone();
    let call = tokio::spawn(async move {
        invoker
            .invoke(&tool_name, &parameters, call_cancel)
            .await
    });
    let _abort = AbortOnDrop(call.abort_handle());

    let result = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) if err.is_panic() => Err(TaskError::new(
            ErrorKind::Internal,
            "tool invocation panicked",
        )),
        Ok(Err(_)) => Err(TaskError::cancelled("tool invocation was aborted")),
        Err(_) => {
            cancel.cancel();
            Err(TaskError::timeout(timeout))
        }
    };

    AttemptReport {
        pos,
        attempt,
        result,
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_stretches_to_twice_the_estimate() {
        let base = Duration::from_secs(10);
        let plain = TaskDescriptor::new("a", "echo");
        assert_eq!(effective_timeout(&plain, base), base);

        let quick = plain.clone().with_estimated_duration(Duration::from_secs(3));
        assert_eq!(effective_timeout(&quick, base), base);

        let slow = plain.with_estimated_duration(Duration::from_secs(8));
        assert_eq!(effective_timeout(&slow, base), Duration::from_secs(16));
    }

    #[test]
    fn ready_keys_order_by_priority_then_position() {
        let mut ready: BTreeSet<ReadyKey> = BTreeSet::new();
        ready.insert((Reverse(2), 0));
        ready.insert((Reverse(4), 3));
        ready.insert((Reverse(2), 1));
        ready.insert((Reverse(4), 2));

        let order: Vec<usize> = ready.into_iter().map(|(_, pos)| pos).collect();
        assert_eq!(order, vec![2, 3, 0, 1]);
    }
}
