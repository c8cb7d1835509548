use std::sync::Arc;

use anyhow::Result;

use taskplan_core::api::{
    AppConfig, EventSink, ExponentialBackoff, FailurePolicy, OutputConfig, RetryConfig,
    RetryStrategyPlugin,
};

use crate::executor::{JsonlRendererPlugin, LinearRetryPlugin, TextRendererPlugin};
use crate::tools::ToolRegistry;

pub fn build_retry_strategy(cfg: &RetryConfig) -> Result<Arc<dyn RetryStrategyPlugin>> {
    match cfg.strategy.as_str() {
        "exponential-backoff" | "exponential" => {
            Ok(Arc::new(ExponentialBackoff::from_config(cfg)))
        }
        "linear" => Ok(Arc::new(LinearRetryPlugin::new(cfg.clone()))),
        other => Err(anyhow::anyhow!("unknown retry strategy: {other}")),
    }
}

/// Failure policy from the `retry` and `failure` config sections, using the
/// configured backoff strategy.
pub fn build_policy(cfg: &AppConfig) -> Result<FailurePolicy> {
    let strategy = build_retry_strategy(&cfg.retry)?;
    Ok(FailurePolicy::from_config(&cfg.retry, &cfg.failure).with_strategy(strategy))
}

pub fn build_renderer(output: &OutputConfig) -> Arc<dyn EventSink> {
    match output.format.as_str() {
        "jsonl" => Arc::new(JsonlRendererPlugin::new(output.pretty_print)),
        // Anything other than jsonl behaves like text.
        _ => Arc::new(TextRendererPlugin::new(false)),
    }
}

pub fn build_tools() -> ToolRegistry {
    ToolRegistry::with_builtins()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_strategy_by_name() {
        let mut cfg = RetryConfig::default();
        assert_eq!(build_retry_strategy(&cfg).unwrap().name(), "exponential-backoff");

        cfg.strategy = "linear".to_string();
        assert_eq!(build_retry_strategy(&cfg).unwrap().name(), "linear");

        cfg.strategy = "fibonacci".to_string();
        assert!(build_retry_strategy(&cfg).is_err());
    }

    #[test]
    fn exponential_strategy_is_the_policy_default() {
        let cfg = AppConfig::default();
        let configured = build_retry_strategy(&cfg.retry).unwrap();
        let default_policy = FailurePolicy::new(&cfg.retry);
        assert_eq!(default_policy.strategy_name(), configured.name());

        let delays: Vec<u128> = (1..=6).map(|a| configured.next_delay(a).as_millis()).collect();
        assert_eq!(delays, vec![200, 400, 800, 1600, 3200, 5000]);
    }

    #[test]
    fn policy_uses_configured_strategy() {
        let mut cfg = AppConfig::default();
        cfg.retry.strategy = "linear".to_string();
        cfg.retry.max_retries = 1;
        let policy = build_policy(&cfg).unwrap();
        assert_eq!(policy.strategy_name(), "linear");
        assert_eq!(policy.max_retries(), 1);
    }

    #[test]
    fn renderer_follows_output_format() {
        let mut output = OutputConfig::default();
        assert_eq!(build_renderer(&output).name(), "text-renderer");
        output.format = "jsonl".to_string();
        assert_eq!(build_renderer(&output).name(), "jsonl-renderer");
    }
}
