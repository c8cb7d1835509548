pub mod config;
pub mod error;
pub mod plan;
pub mod result;
pub mod task;

pub(crate) mod serde_ms;

pub use config::*;
pub use error::*;
pub use plan::*;
pub use result::*;
pub use task::*;
