pub mod invoker;
pub mod sink;
pub mod strategy;

pub use invoker::*;
pub use sink::*;
pub use strategy::*;
