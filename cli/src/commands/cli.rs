use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Jsonl,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Jsonl => "jsonl",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "taskplan", version, about = "Run dependency-ordered task plans")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Read configuration from this file instead of the default locations.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Plan file (JSON). Use `-` to read from stdin.
    pub plan: PathBuf,

    /// Maximum number of tasks running at once.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-attempt timeout in milliseconds.
    #[arg(long)]
    pub task_timeout_ms: Option<u64>,

    /// Wall-clock budget for the whole plan in milliseconds.
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Retries allowed per task after its first attempt.
    #[arg(long)]
    pub max_retries: Option<u32>,

    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Pretty-print JSON output.
    #[arg(long, default_value_t = false)]
    pub pretty: bool,

    /// Show progress bars on stderr.
    #[arg(long, default_value_t = false)]
    pub progress: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ValidateArgs {
    /// Plan file (JSON). Use `-` to read from stdin.
    pub plan: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a plan and print its aggregated result.
    Run(RunArgs),
    /// Check a plan and print its execution order and parallel groups.
    Validate(ValidateArgs),
    /// Print the effective configuration as TOML.
    Config,
}
