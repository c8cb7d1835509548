use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;
use crate::executor::graph::TaskGraph;

use super::task::TaskDescriptor;

/// Serialised plan as produced by plan generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSpec {
    /// Generated when absent.
    #[serde(default, alias = "task_id")]
    pub plan_id: Option<String>,

    #[serde(alias = "subtasks")]
    pub tasks: Vec<TaskDescriptor>,

    /// Optional topological hint; recomputed when absent.
    #[serde(default)]
    pub execution_order: Option<Vec<String>>,
}

impl PlanSpec {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A validated DAG of tasks plus its precomputed scheduling hints.
///
/// Built once per pipeline cycle and immutable afterwards. Run state lives in
/// the scheduler, never in the plan.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    plan_id: String,
    tasks: HashMap<String, TaskDescriptor>,
    execution_order: Vec<String>,
    parallel_groups: Vec<Vec<String>>,
    dependencies: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
    positions: HashMap<String, usize>,
}

impl ExecutionPlan {
    /// Validate `tasks` and compute `execution_order` and `parallel_groups`.
    pub fn new(
        plan_id: impl Into<String>,
        tasks: Vec<TaskDescriptor>,
    ) -> Result<Self, ExecutorError> {
        Self::build(plan_id.into(), tasks, None)
    }

    /// Like [`ExecutionPlan::new`], but keep a caller-supplied topological order.
    /// The hint must name every task exactly once and place each task after all
    /// of its dependencies.
    pub fn with_order_hint(
        plan_id: impl Into<String>,
        tasks: Vec<TaskDescriptor>,
        order: Vec<String>,
    ) -> Result<Self, ExecutorError> {
        Self::build(plan_id.into(), tasks, Some(order))
    }

    pub fn from_spec(spec: PlanSpec) -> Result<Self, ExecutorError> {
        let plan_id = spec.plan_id.filter(|id| !id.trim().is_empty()).unwrap_or_else(|| {
            let uuid = uuid::Uuid::new_v4().simple().to_string();
            format!("plan_{}", &uuid[..8])
        });
        Self::build(plan_id, spec.tasks, spec.execution_order)
    }

    fn build(
        plan_id: String,
        tasks: Vec<TaskDescriptor>,
        order_hint: Option<Vec<String>>,
    ) -> Result<Self, ExecutorError> {
        let graph = TaskGraph::from_tasks(&tasks)?;
        graph.validate()?;
        let parallel_groups = graph.topological_sort()?;

        let execution_order = match order_hint {
            Some(order) => {
                check_order_hint(&graph, &order)?;
                order
            }
            None => parallel_groups.iter().flatten().cloned().collect(),
        };

        let positions = execution_order
            .iter()
            .enumerate()
            .map(|(pos, id)| (id.clone(), pos))
            .collect();

        Ok(Self {
            plan_id,
            tasks: graph.nodes,
            execution_order,
            parallel_groups,
            dependencies: graph.edges,
            dependents: graph.reverse_edges,
            positions,
        })
    }

    /// Reject plans larger than `limit` tasks.
    pub fn check_size(&self, limit: usize) -> Result<(), ExecutorError> {
        if self.tasks.len() > limit {
            return Err(ExecutorError::TooManyTasks {
                count: self.tasks.len(),
                limit,
            });
        }
        Ok(())
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskDescriptor> {
        self.tasks.get(task_id)
    }

    pub fn tasks(&self) -> &HashMap<String, TaskDescriptor> {
        &self.tasks
    }

    /// Tasks in `execution_order`.
    pub fn ordered_tasks(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.execution_order
            .iter()
            .filter_map(|id| self.tasks.get(id))
    }

    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    pub fn parallel_groups(&self) -> &[Vec<String>] {
        &self.parallel_groups
    }

    /// De-duplicated dependencies of `task_id`.
    pub fn dependencies(&self, task_id: &str) -> &[String] {
        self.dependencies
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Direct dependents of `task_id`.
    pub fn dependents(&self, task_id: &str) -> &[String] {
        self.dependents
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Position of `task_id` in `execution_order`.
    pub fn position(&self, task_id: &str) -> Option<usize> {
        self.positions.get(task_id).copied()
    }
}

fn check_order_hint(
    graph: &TaskGraph<TaskDescriptor>,
    order: &[String],
) -> Result<(), ExecutorError> {
    if order.len() != graph.nodes.len() {
        return Err(ExecutorError::InvalidExecutionOrder(format!(
            "order names {} tasks, plan has {}",
            order.len(),
            graph.nodes.len()
        )));
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(order.len());
    for task_id in order {
        if !graph.nodes.contains_key(task_id) {
            return Err(ExecutorError::InvalidExecutionOrder(format!(
                "unknown task id '{task_id}'"
            )));
        }
        for dep in graph.edges.get(task_id).into_iter().flatten() {
            if !seen.contains(dep.as_str()) {
                return Err(ExecutorError::InvalidExecutionOrder(format!(
                    "'{task_id}' is ordered before its dependency '{dep}'"
                )));
            }
        }
        if !seen.insert(task_id.as_str()) {
            return Err(ExecutorError::InvalidExecutionOrder(format!(
                "task id '{task_id}' appears twice"
            )));
        }
    }

    Ok(())
}
