//! Tool registry and the built-in demo tools.

pub mod builtin;
pub mod registry;

pub use builtin::{EchoTool, SleepTool};
pub use registry::{Tool, ToolRegistry};
