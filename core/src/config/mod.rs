mod load;
mod types;

pub use load::{get_taskplan_data_dir, load, load_default, load_from_path};
pub use types::{
    AppConfig, FailureConfig, LoggingConfig, OutputConfig, RetryConfig, SchedulerConfig,
};
