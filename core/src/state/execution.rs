use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;
use crate::executor::types::{AggregatedResult, ExecutionPlan, PlanSpec};
use crate::executor::ExecutionEngine;

use super::transitions::TransitionError;
use super::types::{AgentPhase, AgentState};

/// What the task execution phase produced.
#[derive(Debug, Clone)]
pub enum PhaseOutcome {
    /// The plan ran. Holds for partial and all-failed runs too.
    Executed(AggregatedResult),
    /// Nothing ran: the plan was malformed, or the engine refused it (bad
    /// options, too many tasks). Check [`ExecutorError::is_malformed_plan`].
    Rejected(ExecutorError),
}

impl PhaseOutcome {
    pub fn next_phase(&self) -> AgentPhase {
        match self {
            Self::Executed(_) => AgentPhase::ResultProcessing,
            Self::Rejected(_) => AgentPhase::ErrorHandling,
        }
    }

    pub fn result(&self) -> Option<&AggregatedResult> {
        match self {
            Self::Executed(result) => Some(result),
            Self::Rejected(_) => None,
        }
    }
}

/// Pipeline step that builds the plan, runs it and moves the agent on.
pub struct TaskExecutionPhase<'e> {
    engine: &'e ExecutionEngine,
}

impl<'e> TaskExecutionPhase<'e> {
    pub fn new(engine: &'e ExecutionEngine) -> Self {
        Self { engine }
    }

    /// Run `spec` for an agent currently in `TaskExecution`. On return the
    /// state has advanced to `ResultProcessing` or `ErrorHandling`.
    pub async fn run(
        &self,
        state: &mut AgentState,
        spec: PlanSpec,
        stop: CancellationToken,
    ) -> Result<PhaseOutcome, TransitionError> {
        if state.phase != AgentPhase::TaskExecution {
            return Err(TransitionError::UnexpectedPhase {
                expected: AgentPhase::TaskExecution,
                found: state.phase,
            });
        }

        let outcome = match ExecutionPlan::from_spec(spec) {
            Ok(plan) => match self.engine.execute_with_stop(&plan, stop).await {
                Ok(result) => PhaseOutcome::Executed(result),
                Err(err) => PhaseOutcome::Rejected(err),
            },
            Err(err) => PhaseOutcome::Rejected(err),
        };

        match &outcome {
            PhaseOutcome::Executed(_) => state.advance(AgentPhase::ResultProcessing)?,
            PhaseOutcome::Rejected(err) => {
                tracing::warn!(session_id = %state.session_id, error = %err, "plan rejected");
                state.record_error(err.to_string());
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::executor::traits::ToolInvoker;
    use crate::executor::types::{ExecutionOpts, Parameters, TaskError};

    struct Fails;

    #[async_trait]
    impl ToolInvoker for Fails {
        async fn invoke(
            &self,
            tool_name: &str,
            _parameters: &Parameters,
            _cancel: CancellationToken,
        ) -> Result<Value, TaskError> {
            Err(TaskError::unknown_tool(tool_name))
        }
    }

    fn engine() -> ExecutionEngine {
        ExecutionEngine::new(ExecutionOpts::default(), Arc::new(Fails))
    }

    fn state_at_execution() -> AgentState {
        let mut state = AgentState::new(Some("s".into()));
        for phase in [
            AgentPhase::IntentAnalysis,
            AgentPhase::PlanGeneration,
            AgentPhase::ToolInitialization,
            AgentPhase::TaskExecution,
        ] {
            state.advance(phase).unwrap();
        }
        state
    }

    fn spec(value: Value) -> PlanSpec {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn all_failed_plan_still_moves_to_result_processing() {
        let engine = engine();
        let mut state = state_at_execution();
        let outcome = TaskExecutionPhase::new(&engine)
            .run(
                &mut state,
                spec(json!({ "tasks": [{ "id": "a", "tool_name": "nope" }] })),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(state.phase, AgentPhase::ResultProcessing);
        assert_eq!(outcome.result().map(|r| r.failed), Some(1));
    }

    #[tokio::test]
    async fn cyclic_plan_goes_to_error_handling() {
        let engine = engine();
        let mut state = state_at_execution();
        let outcome = TaskExecutionPhase::new(&engine)
            .run(
                &mut state,
                spec(json!({ "tasks": [
                    { "id": "a", "tool_name": "echo", "dependencies": ["b"] },
                    { "id": "b", "tool_name": "echo", "dependencies": ["a"] }
                ] })),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            PhaseOutcome::Rejected(ExecutorError::CircularDependency(_))
        ));
        assert_eq!(state.phase, AgentPhase::ErrorHandling);
        assert_eq!(
            state.error_context.map(|c| c.phase),
            Some(AgentPhase::TaskExecution)
        );
    }

    #[tokio::test]
    async fn refuses_to_run_from_another_phase() {
        let engine = engine();
        let mut state = AgentState::new(None);
        let err = TaskExecutionPhase::new(&engine)
            .run(&mut state, spec(json!({ "tasks": [] })), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::UnexpectedPhase { .. }));
    }

    #[tokio::test]
    async fn engine_refusal_is_a_rejection_not_a_malformed_plan() {
        let engine = ExecutionEngine::new(
            ExecutionOpts::default().with_max_concurrency(0),
            Arc::new(Fails),
        );
        let mut state = state_at_execution();
        let outcome = TaskExecutionPhase::new(&engine)
            .run(
                &mut state,
                spec(json!({ "tasks": [{ "id": "a", "tool_name": "echo" }] })),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        match &outcome {
            PhaseOutcome::Rejected(err) => {
                assert_eq!(err, &ExecutorError::InvalidConcurrency(0));
                assert!(!err.is_malformed_plan());
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(outcome.next_phase(), AgentPhase::ErrorHandling);
        assert_eq!(state.phase, AgentPhase::ErrorHandling);
    }
}
