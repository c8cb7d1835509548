//! Plan execution: DAG validation, dependency-aware scheduling and result
//! aggregation.
//!
//! # Architecture
//!
//! ```text
//! PlanSpec / Vec<TaskDescriptor>
//!   ↓
//! ExecutionPlan::new() → TaskGraph::validate(), topological_sort()
//!   ↓
//! ExecutionPlan { execution_order, parallel_groups, dependents }
//!   ↓
//! ExecutionEngine::execute() → Scheduler::run() → Vec<TaskOutcome>
//!   ↓
//! ResultAggregator::aggregate() → AggregatedResult
//! ```
//!
//! Tasks become ready as soon as all of their dependencies succeed; there is
//! no stage barrier. At most `max_concurrency` attempts run at once, and
//! every task ends SUCCEEDED, FAILED or SKIPPED.

mod aggregate;
mod engine;
mod graph;
mod policy;
mod progress;
mod scheduler;
pub mod traits;
pub mod types;

pub use aggregate::{failure_analysis, key_results, ResultAggregator};
pub use engine::{execute_plan, ExecutionEngine, ExecutionEngineBuilder};
pub use graph::TaskGraph;
pub use policy::{Classification, FailureClass, FailureDecision, FailurePolicy};
pub use progress::ProgressMonitor;
pub use scheduler::{effective_timeout, Scheduler};
pub use types::{AggregatedResult, ExecutionOpts, ExecutionPlan, TaskDescriptor, TaskOutcome};
