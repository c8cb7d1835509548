use thiserror::Error;

use super::code::ErrorCode;
use super::executor::ExecutorError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("plan rejected: {0}")]
    Plan(#[from] ExecutorError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid plan file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Plan(e) => e.error_code(),
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Json(_) => ErrorCode::ParseError,
            Self::Command(_) | Self::Io(_) | Self::Anyhow(_) => ErrorCode::GeneralError,
        }
    }
}
