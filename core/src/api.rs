//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `taskplan_core::api` instead of reaching into internal modules.

pub use crate::config::{
    get_taskplan_data_dir, load, load_default, load_from_path, AppConfig, FailureConfig, LoggingConfig,
    OutputConfig, RetryConfig, SchedulerConfig,
};
pub use crate::error::{CliError, ErrorCode, ExecutorError};
pub use crate::executor::traits::{
    EventKind, EventSink, ExponentialBackoff, LifecycleEvent, RetryStrategyPlugin, ToolInvoker,
};
pub use crate::executor::types::{
    AggregatedResult, ErrorKind, ExecutionOpts, ExecutionPlan, FailureSummary, KeyResult,
    Parameters, PlanSpec, QualitySignal, TaskDescriptor, TaskError, TaskOutcome, TaskStatus,
    DEFAULT_PRIORITY,
};
pub use crate::executor::{
    execute_plan, failure_analysis, key_results, ExecutionEngine, ExecutionEngineBuilder,
    FailureDecision, FailurePolicy, ProgressMonitor, ResultAggregator,
};
pub use crate::state::{AgentPhase, AgentState, PhaseOutcome, TaskExecutionPhase};
