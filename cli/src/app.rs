//! CLI application layer: merges config overrides, builds the engine and
//! renders the aggregated result.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use taskplan_core::api as core_api;
use taskplan_core::api::{
    AggregatedResult, AppConfig, CliError, EventSink, ExecutionEngine, ExecutionOpts,
    ExecutionPlan, PlanSpec, ProgressMonitor, QualitySignal, TaskStatus,
};
use taskplan_plugins::factory;
use tokio_util::sync::CancellationToken;

use crate::commands::cli::{OutputFormat, RunArgs, ValidateArgs};

/// Exit code when some tasks did not succeed.
pub const EXIT_PARTIAL: i32 = 3;
/// Exit code when no task succeeded.
pub const EXIT_FAILED: i32 = 4;

pub fn exit_code_for_result(result: &AggregatedResult) -> i32 {
    match result.quality {
        QualitySignal::Complete | QualitySignal::Empty => 0,
        QualitySignal::Partial => EXIT_PARTIAL,
        QualitySignal::Failed => EXIT_FAILED,
    }
}

/// Read and validate a plan file; `-` reads stdin.
pub fn read_plan(path: &Path) -> Result<ExecutionPlan, CliError> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    let spec = PlanSpec::from_json(&raw)?;
    Ok(ExecutionPlan::from_spec(spec)?)
}

/// CLI flags win over config values.
pub fn apply_run_overrides(cfg: &mut AppConfig, args: &RunArgs) {
    if let Some(c) = args.concurrency {
        cfg.scheduler.max_concurrency = c;
    }
    if let Some(ms) = args.task_timeout_ms {
        cfg.scheduler.task_timeout_ms = ms;
    }
    if let Some(ms) = args.deadline_ms {
        cfg.scheduler.plan_deadline_ms = Some(ms);
    }
    if let Some(r) = args.max_retries {
        cfg.retry.max_retries = r;
    }
    if let Some(format) = args.format {
        cfg.output.format = format.as_str().to_string();
    }
    if args.pretty {
        cfg.output.pretty_print = true;
    }
    if args.progress {
        cfg.output.progress_bar = true;
    }
}

#[tracing::instrument(name = "cli.run_plan", skip_all, fields(plan = %args.plan.display()))]
pub async fn run_plan(
    mut cfg: AppConfig,
    args: RunArgs,
    stop: CancellationToken,
) -> Result<i32, CliError> {
    apply_run_overrides(&mut cfg, &args);
    let plan = read_plan(&args.plan)?;

    let policy = factory::build_policy(&cfg).map_err(|e| CliError::Config(e.to_string()))?;
    let jsonl = cfg.output.format == OutputFormat::Jsonl.as_str();

    let sinks = build_sinks(&cfg);

    let engine = ExecutionEngine::builder(
        ExecutionOpts::from_config(&cfg.scheduler),
        Arc::new(factory::build_tools()),
    )
    .policy(policy)
    .sinks(sinks)
    .build();

    let result = engine.execute_with_stop(&plan, stop).await?;

    if jsonl {
        let line = json!({
            "v": 1,
            "event_type": "plan.result",
            "plan_id": result.plan_id,
            "result": result,
        });
        let text = if cfg.output.pretty_print {
            serde_json::to_string_pretty(&line)?
        } else {
            serde_json::to_string(&line)?
        };
        println!("{text}");
    } else {
        print!("{}", render_summary(&result, &plan));
    }

    Ok(exit_code_for_result(&result))
}

/// The renderer for the configured format, plus progress bars when asked for
/// on a text run. Lifecycle logging comes from the scheduler itself.
pub(crate) fn build_sinks(cfg: &AppConfig) -> Vec<Arc<dyn EventSink>> {
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![factory::build_renderer(&cfg.output)];
    if cfg.output.progress_bar && cfg.output.format != OutputFormat::Jsonl.as_str() {
        sinks.push(Arc::new(ProgressMonitor::new(atty::is(atty::Stream::Stderr))));
    }
    sinks
}

pub(crate) fn render_summary(result: &AggregatedResult, plan: &ExecutionPlan) -> String {
    let mut out = format!(
        "RESULT {} ({:?}): {}/{} succeeded ({:.1}%), {} failed, {} skipped, {}ms\n",
        result.plan_id,
        result.quality,
        result.succeeded,
        result.total_tasks,
        result.success_rate * 100.0,
        result.failed,
        result.skipped,
        result.duration.as_millis()
    );
    for key in core_api::key_results(result, plan) {
        let value = key
            .result
            .map(|v| v.to_string())
            .unwrap_or_else(|| "null".to_string());
        out.push_str(&format!("  ok   {} {}\n", key.task_id, value));
    }
    for failure in core_api::failure_analysis(result, plan) {
        out.push_str(&format!("  fail {} {}\n", failure.task_id, failure.error));
    }
    for outcome in result
        .outcomes
        .iter()
        .filter(|o| o.status == TaskStatus::Skipped)
    {
        let reason = outcome
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        out.push_str(&format!("  skip {} {}\n", outcome.task_id, reason));
    }
    out
}

pub fn validate_plan(args: ValidateArgs) -> Result<i32, CliError> {
    let plan = read_plan(&args.plan)?;
    println!("PLAN {} ({} tasks)", plan.plan_id(), plan.len());
    println!("  order: {}", plan.execution_order().join(" -> "));
    for (idx, group) in plan.parallel_groups().iter().enumerate() {
        println!("  group {}: {}", idx, group.join(", "));
    }
    Ok(0)
}

pub fn show_config(cfg: &AppConfig) -> Result<i32, CliError> {
    let text = toml::to_string_pretty(cfg).map_err(|e| CliError::Config(e.to_string()))?;
    print!("{text}");
    Ok(0)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::*;

    fn run_args(plan: PathBuf) -> RunArgs {
        RunArgs {
            plan,
            concurrency: None,
            task_timeout_ms: None,
            deadline_ms: None,
            max_retries: None,
            format: None,
            pretty: false,
            progress: false,
        }
    }

    fn plan_file(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{json}").unwrap();
        file
    }

    #[test]
    fn flags_override_config() {
        let mut cfg = AppConfig::default();
        let mut args = run_args(PathBuf::from("p.json"));
        args.concurrency = Some(2);
        args.deadline_ms = Some(900);
        args.format = Some(OutputFormat::Jsonl);
        apply_run_overrides(&mut cfg, &args);

        assert_eq!(cfg.scheduler.max_concurrency, 2);
        assert_eq!(cfg.scheduler.plan_deadline_ms, Some(900));
        assert_eq!(cfg.output.format, "jsonl");
        assert_eq!(cfg.retry.max_retries, 3);
    }

    #[test]
    fn sinks_follow_output_settings() {
        let names = |cfg: &AppConfig| -> Vec<String> {
            build_sinks(cfg).iter().map(|s| s.name().to_string()).collect()
        };

        let mut cfg = AppConfig::default();
        assert_eq!(names(&cfg), ["text-renderer"]);

        cfg.output.progress_bar = true;
        assert_eq!(names(&cfg), ["text-renderer", "progress"]);

        cfg.output.format = "jsonl".to_string();
        assert_eq!(names(&cfg), ["jsonl-renderer"]);
    }

    #[test]
    fn cyclic_plan_file_is_rejected() {
        let file = plan_file(
            r#"{"task_id":"p","subtasks":[
                {"id":"a","tool_name":"echo","dependencies":["b"]},
                {"id":"b","tool_name":"echo","dependencies":["a"]}]}"#,
        );
        let err = read_plan(file.path()).unwrap_err();
        assert!(matches!(err, CliError::Plan(_)));
    }

    #[tokio::test]
    async fn run_reports_partial_success() {
        let file = plan_file(
            r#"{"plan_id":"demo","tasks":[
                {"id":"a","tool_name":"echo","parameters":{"text":"hi"}},
                {"id":"b","tool_name":"teleport"},
                {"id":"c","tool_name":"echo","dependencies":["b"]}]}"#,
        );
        let code = run_plan(AppConfig::default(), run_args(file.path().to_path_buf()), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(code, EXIT_PARTIAL);
    }

    #[tokio::test]
    async fn summary_lists_each_outcome() {
        let plan = ExecutionPlan::from_spec(
            PlanSpec::from_json(
                r#"{"plan_id":"s","tasks":[
                    {"id":"a","tool_name":"echo"},
                    {"id":"b","tool_name":"nope"},
                    {"id":"c","tool_name":"echo","dependencies":["b"]}]}"#,
            )
            .unwrap(),
        )
        .unwrap();
        let engine = ExecutionEngine::new(
            ExecutionOpts::default(),
            Arc::new(factory::build_tools()),
        );
        let result = engine.execute(&plan).await.unwrap();

        let summary = render_summary(&result, &plan);
        assert!(summary.starts_with("RESULT s (Partial): 1/3 succeeded"));
        assert!(summary.contains("  ok   a "));
        assert!(summary.contains("  fail b unknown_tool"));
        assert!(summary.contains("  skip c dependency_failed"));
    }
}
