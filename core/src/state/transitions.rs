use thiserror::Error;

use super::types::AgentPhase;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid phase transition from {from} to {to}")]
    InvalidTransition { from: AgentPhase, to: AgentPhase },
    #[error("cannot leave terminal phase {state}")]
    FromTerminalState { state: AgentPhase },
    #[error("expected phase {expected}, found {found}")]
    UnexpectedPhase {
        expected: AgentPhase,
        found: AgentPhase,
    },
}

/// Transition rules of the agent pipeline.
pub struct StateTransition;

impl StateTransition {
    pub fn validate(from: AgentPhase, to: AgentPhase) -> Result<(), TransitionError> {
        if Self::is_terminal(from) {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = to == AgentPhase::ErrorHandling || Self::next_phase(from) == Some(to);
        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    pub fn next_phase(current: AgentPhase) -> Option<AgentPhase> {
        match current {
            AgentPhase::InputProcessing => Some(AgentPhase::IntentAnalysis),
            AgentPhase::IntentAnalysis => Some(AgentPhase::PlanGeneration),
            AgentPhase::PlanGeneration => Some(AgentPhase::ToolInitialization),
            AgentPhase::ToolInitialization => Some(AgentPhase::TaskExecution),
            AgentPhase::TaskExecution => Some(AgentPhase::ResultProcessing),
            AgentPhase::ResultProcessing => Some(AgentPhase::ResponseGeneration),
            AgentPhase::ResponseGeneration => Some(AgentPhase::Completed),
            AgentPhase::Completed | AgentPhase::ErrorHandling => None,
        }
    }

    pub fn is_terminal(phase: AgentPhase) -> bool {
        matches!(phase, AgentPhase::Completed | AgentPhase::ErrorHandling)
    }

    pub fn phase_description(phase: AgentPhase) -> &'static str {
        match phase {
            AgentPhase::InputProcessing => "Processing input",
            AgentPhase::IntentAnalysis => "Analyzing intent",
            AgentPhase::PlanGeneration => "Generating plan",
            AgentPhase::ToolInitialization => "Initializing tools",
            AgentPhase::TaskExecution => "Executing tasks",
            AgentPhase::ResultProcessing => "Processing results",
            AgentPhase::ResponseGeneration => "Generating response",
            AgentPhase::Completed => "Completed",
            AgentPhase::ErrorHandling => "Handling error",
        }
    }
}
