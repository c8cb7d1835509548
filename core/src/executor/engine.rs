use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;

use super::aggregate::ResultAggregator;
use super::policy::FailurePolicy;
use super::scheduler::Scheduler;
use super::traits::{EventSink, RetryStrategyPlugin, ToolInvoker};
use super::types::{AggregatedResult, ExecutionOpts, ExecutionPlan};

/// Execution engine for task plans.
///
/// Holds everything that stays fixed across runs: options, the tool invoker,
/// the failure policy and the event sinks. Each `execute` call schedules one
/// plan and aggregates its outcomes.
pub struct ExecutionEngine {
    opts: ExecutionOpts,
    invoker: Arc<dyn ToolInvoker>,
    policy: FailurePolicy,
    sinks: Vec<Arc<dyn EventSink>>,
}

pub struct ExecutionEngineBuilder {
    opts: ExecutionOpts,
    invoker: Arc<dyn ToolInvoker>,
    policy: FailurePolicy,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl ExecutionEngine {
    pub fn new(opts: ExecutionOpts, invoker: Arc<dyn ToolInvoker>) -> Self {
        Self::builder(opts, invoker).build()
    }

    pub fn builder(opts: ExecutionOpts, invoker: Arc<dyn ToolInvoker>) -> ExecutionEngineBuilder {
        ExecutionEngineBuilder::new(opts, invoker)
    }

    pub fn opts(&self) -> &ExecutionOpts {
        &self.opts
    }

    pub fn policy(&self) -> &FailurePolicy {
        &self.policy
    }

    /// Run `plan` to completion and aggregate its outcomes.
    ///
    /// Errors only for option sets or plans that cannot be run at all; task
    /// failures end up in the result.
    pub async fn execute(&self, plan: &ExecutionPlan) -> Result<AggregatedResult, ExecutorError> {
        self.execute_with_stop(plan, CancellationToken::new()).await
    }

    /// Like [`ExecutionEngine::execute`], but `stop` cancels the run early.
    #[tracing::instrument(
        name = "engine.execute",
        skip_all,
        fields(plan_id = %plan.plan_id(), tasks = plan.len())
    )]
    pub async fn execute_with_stop(
        &self,
        plan: &ExecutionPlan,
        stop: CancellationToken,
    ) -> Result<AggregatedResult, ExecutorError> {
        self.opts.validate()?;
        plan.check_size(self.opts.max_tasks)?;

        tracing::info!(
            max_concurrency = self.opts.max_concurrency,
            retry_strategy = %self.policy.strategy_name(),
            max_retries = self.policy.max_retries(),
            "executing plan"
        );

        let outcomes = Scheduler::new(
            plan,
            &self.opts,
            &self.policy,
            Arc::clone(&self.invoker),
            &self.sinks,
        )
        .run(stop)
        .await;

        let result = ResultAggregator::for_plan(plan).aggregate(outcomes);
        tracing::info!(
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            duration_ms = result.duration.as_millis() as u64,
            quality = ?result.quality,
            "plan finished"
        );
        Ok(result)
    }
}

impl ExecutionEngineBuilder {
    pub fn new(opts: ExecutionOpts, invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            opts,
            invoker,
            policy: FailurePolicy::default(),
            sinks: Vec::new(),
        }
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn retry_strategy(mut self, strategy: Arc<dyn RetryStrategyPlugin>) -> Self {
        self.policy = self.policy.with_strategy(strategy);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sinks(mut self, sinks: Vec<Arc<dyn EventSink>>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    pub fn build(self) -> ExecutionEngine {
        ExecutionEngine {
            opts: self.opts,
            invoker: self.invoker,
            policy: self.policy,
            sinks: self.sinks,
        }
    }
}

/// Run `plan` with default policy and no sinks.
pub async fn execute_plan(
    plan: &ExecutionPlan,
    opts: ExecutionOpts,
    invoker: Arc<dyn ToolInvoker>,
) -> Result<AggregatedResult, ExecutorError> {
    ExecutionEngine::new(opts, invoker).execute(plan).await
}
