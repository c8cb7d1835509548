use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::transitions::{StateTransition, TransitionError};

/// Pipeline phase of one agent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    InputProcessing,
    IntentAnalysis,
    PlanGeneration,
    ToolInitialization,
    TaskExecution,
    ResultProcessing,
    ResponseGeneration,
    Completed,
    ErrorHandling,
}

impl AgentPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InputProcessing => "input_processing",
            Self::IntentAnalysis => "intent_analysis",
            Self::PlanGeneration => "plan_generation",
            Self::ToolInitialization => "tool_initialization",
            Self::TaskExecution => "task_execution",
            Self::ResultProcessing => "result_processing",
            Self::ResponseGeneration => "response_generation",
            Self::Completed => "completed",
            Self::ErrorHandling => "error_handling",
        }
    }
}

impl std::fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and why the pipeline fell into error handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub phase: AgentPhase,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-request pipeline state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub session_id: String,
    pub phase: AgentPhase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_context: Option<ErrorContext>,
}

impl AgentState {
    /// Fresh state in `InputProcessing`. A session id is generated when
    /// none is given.
    pub fn new(session_id: Option<String>) -> Self {
        let now = Utc::now();
        let session_id =
            session_id.unwrap_or_else(|| format!("session_{}", now.format("%Y%m%d_%H%M%S")));
        Self {
            session_id,
            phase: AgentPhase::InputProcessing,
            created_at: now,
            updated_at: now,
            error_context: None,
        }
    }

    /// Move to `to`, rejecting transitions the pipeline does not allow.
    pub fn advance(&mut self, to: AgentPhase) -> Result<(), TransitionError> {
        StateTransition::validate(self.phase, to)?;
        tracing::debug!(session_id = %self.session_id, from = %self.phase, to = %to, "phase transition");
        self.phase = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record `error` against the current phase and switch to error handling.
    pub fn record_error(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.error_context = Some(ErrorContext {
            phase: self.phase,
            error: error.into(),
            timestamp: now,
        });
        self.phase = AgentPhase::ErrorHandling;
        self.updated_at = now;
    }
}
