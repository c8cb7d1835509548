//! Agent pipeline phases.
//!
//! The agent moves through seven phases in a fixed order. Task execution is
//! the phase driven by this crate; [`TaskExecutionPhase`] runs the plan and
//! decides whether the pipeline continues with result processing or falls
//! into error handling.

pub mod execution;
pub mod transitions;
pub mod types;

pub use execution::{PhaseOutcome, TaskExecutionPhase};
pub use transitions::{StateTransition, TransitionError};
pub use types::{AgentPhase, AgentState, ErrorContext};
