//! Dependency-aware, bounded-parallel execution of agent task plans.
//!
//! Prefer importing from [`api`] over reaching into individual modules.

pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod state;
