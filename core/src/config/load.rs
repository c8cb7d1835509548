use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default taskplan data directory: ~/.taskplan
pub fn get_taskplan_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".taskplan"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let cfg = toml::from_str::<AppConfig>(&s)?;
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.taskplan/config.toml (highest)
    let data_dir = get_taskplan_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;

    Ok(cfg)
}

/// Load `path` when given, otherwise the default locations. Environment
/// overrides apply either way.
pub fn load(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => {
            let mut cfg = load_from_path(path)?;
            apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
            Ok(cfg)
        }
        None => load_default(),
    }
}

/// Environment variable overrides (Priority 0: highest)
fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = var("TASKPLAN_MAX_CONCURRENCY") {
        cfg.scheduler.max_concurrency = v
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("TASKPLAN_MAX_CONCURRENCY: {e}"))?;
    }
    if let Some(v) = var("TASKPLAN_MAX_RETRIES") {
        cfg.retry.max_retries = v
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("TASKPLAN_MAX_RETRIES: {e}"))?;
    }
    if let Some(v) = var("TASKPLAN_TASK_TIMEOUT_MS") {
        cfg.scheduler.task_timeout_ms = v
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("TASKPLAN_TASK_TIMEOUT_MS: {e}"))?;
    }
    if let Some(v) = var("TASKPLAN_LOG_LEVEL") {
        cfg.logging.level = v;
    }

    Ok(())
}
