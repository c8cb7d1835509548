#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use taskplan_core::api::{
    ErrorKind, EventKind, EventSink, LifecycleEvent, Parameters, TaskDescriptor, TaskError,
    ToolInvoker,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Tool name every scripted task uses.
pub const SCRIPTED: &str = "scripted";

/// A task whose behaviour is looked up by id in a [`ScriptedInvoker`].
pub fn task(id: &str, deps: &[&str]) -> TaskDescriptor {
    TaskDescriptor::new(id, SCRIPTED)
        .with_parameter("task", json!(id))
        .with_dependencies(deps.iter().copied())
}

/// What one attempt of a scripted task does.
#[derive(Debug, Clone)]
pub enum Step {
    /// Succeed after the delay, or fail `Cancelled` if cancelled first.
    Ok(Duration),
    /// Fail with `kind` after the delay.
    Err(ErrorKind, Duration),
    /// Sleep for the delay without watching cancellation, then succeed.
    Stubborn(Duration),
    Panic,
}

impl Step {
    pub fn ok_after(ms: u64) -> Self {
        Self::Ok(Duration::from_millis(ms))
    }

    pub fn err(kind: ErrorKind) -> Self {
        Self::Err(kind, Duration::from_millis(10))
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub task_id: String,
    pub started: Instant,
    pub finished: Option<Instant>,
}

#[derive(Default)]
struct Log {
    calls: Vec<Call>,
}

/// Tool invoker driven by per-task scripts. Tasks without a script, or whose
/// script is used up, succeed after 10ms.
#[derive(Default)]
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    log: Mutex<Log>,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedInvoker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: &Arc<Self>, task_id: &str, steps: Vec<Step>) -> Arc<Self> {
        self.scripts
            .lock()
            .unwrap()
            .insert(task_id.to_string(), steps.into());
        Arc::clone(self)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn calls_for(&self, task_id: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.task_id == task_id)
            .collect()
    }

    /// Highest number of simultaneous invocations seen.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_step(&self, task_id: &str) -> Step {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(task_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Step::ok_after(10))
    }

    fn begin(&self, task_id: &str) -> usize {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let mut log = self.log.lock().unwrap();
        log.calls.push(Call {
            task_id: task_id.to_string(),
            started: Instant::now(),
            finished: None,
        });
        log.calls.len() - 1
    }

    fn end(&self, index: usize) {
        self.current.fetch_sub(1, Ordering::SeqCst);
        if let Some(call) = self.log.lock().unwrap().calls.get_mut(index) {
            call.finished = Some(Instant::now());
        }
    }
}

struct InFlight<'a> {
    invoker: &'a ScriptedInvoker,
    index: usize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.invoker.end(self.index);
    }
}

#[async_trait]
impl ToolInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        _tool_name: &str,
        parameters: &Parameters,
        cancel: CancellationToken,
    ) -> Result<Value, TaskError> {
        let task_id = parameters
            .get("task")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let step = self.next_step(&task_id);
        let _in_flight = InFlight {
            invoker: self,
            index: self.begin(&task_id),
        };

        match step {
            Step::Ok(delay) => tokio::select! {
                _ = cancel.cancelled() => Err(TaskError::cancelled("cancelled by scheduler")),
                _ = tokio::time::sleep(delay) => Ok(json!({ "task": task_id })),
            },
            Step::Err(kind, delay) => {
                tokio::time::sleep(delay).await;
                Err(TaskError::new(kind, format!("{task_id} failed")))
            }
            Step::Stubborn(delay) => {
                tokio::time::sleep(delay).await;
                Ok(json!({ "task": task_id }))
            }
            Step::Panic => panic!("scripted panic in {task_id}"),
        }
    }
}

/// Sink that keeps every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.kind.name()).collect()
    }

    /// Task ids in dispatch order, one entry per attempt.
    pub fn dispatched(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::TaskDispatched { task_id, .. } => Some(task_id),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().iter().filter(|n| **n == name).count()
    }
}

impl EventSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn accept(&self, event: &LifecycleEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Tracks how many tasks the scheduler reports as running: dispatched
/// attempts minus finished or retrying ones.
#[derive(Default)]
pub struct RunningGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl RunningGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

impl EventSink for RunningGauge {
    fn name(&self) -> &str {
        "running-gauge"
    }

    fn accept(&self, event: &LifecycleEvent) {
        match event.kind {
            EventKind::TaskDispatched { .. } => {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
            }
            EventKind::TaskSucceeded { .. }
            | EventKind::TaskFailed { .. }
            | EventKind::TaskRetrying { .. } => {
                self.current.fetch_sub(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}
