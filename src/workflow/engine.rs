// =============================================================================
// WorkflowEngine — C9
// =============================================================================
//
// Builds a graph from `WorkflowDefinition`, executes nodes sequentially or
// with parallel fan-out, and records per-execution state exactly per §4.6:
// node errors are accumulated, never abort the run; final state is never
// null (a node returning nothing retains the previous state).
// =============================================================================

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::domain::models::{ExecutionMode, ExecutionStatus, Workflow, WorkflowExecution};
use crate::domain::repository::Repository;

/// Mutable record threaded through node callbacks.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub workflow_id: uuid::Uuid,
    pub execution_id: uuid::Uuid,
    pub context: Value,
    pub results: HashMap<String, Value>,
    pub errors: Vec<String>,
}

pub type AgentFuture = Pin<Box<dyn Future<Output = WorkflowState> + Send>>;
pub type AgentFn = Arc<dyn Fn(WorkflowState) -> AgentFuture + Send + Sync>;

pub struct WorkflowEngine {
    agents: Mutex<HashMap<String, AgentFn>>,
    repo: Arc<dyn Repository>,
}

impl WorkflowEngine {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { agents: Mutex::new(HashMap::new()), repo }
    }

    pub fn register_agent(&self, name: impl Into<String>, agent: AgentFn) {
        self.agents.lock().insert(name.into(), agent);
    }

    fn resolve_agent(&self, name: &str) -> Option<AgentFn> {
        self.agents.lock().get(name).cloned()
    }

    pub async fn execute(&self, workflow: &Workflow, context: Value) -> WorkflowExecution {
        let mut execution = WorkflowExecution::new(workflow.id);
        let started = std::time::Instant::now();

        let mut state = WorkflowState {
            workflow_id: workflow.id,
            execution_id: execution.id,
            context,
            results: HashMap::new(),
            errors: Vec::new(),
        };

        state = match workflow.execution_mode {
            ExecutionMode::Sequential => self.run_sequential(workflow, state, &mut execution).await,
            ExecutionMode::Parallel => self.run_parallel(workflow, state, &mut execution).await,
        };

        execution.execution_time_ms = Some(started.elapsed().as_millis() as i64);
        execution.status = if state.errors.is_empty() { ExecutionStatus::Completed } else { ExecutionStatus::Failed };
        execution.progress = 100;
        execution.completed_at = Some(Utc::now());
        execution.errors = state.errors;
        execution.results = serde_json::to_value(&state.results).unwrap_or(Value::Null);

        self.repo.upsert_execution(execution.clone()).await;
        execution
    }

    async fn run_sequential(
        &self,
        workflow: &Workflow,
        mut state: WorkflowState,
        execution: &mut WorkflowExecution,
    ) -> WorkflowState {
        let def = &workflow.definition;
        let Some(entry) = def.nodes.iter().find(|n| n.is_entry) else {
            state.errors.push("no entry node defined".into());
            return state;
        };

        let mut current_id = entry.id.clone();
        loop {
            let Some(node) = def.nodes.iter().find(|n| n.id == current_id) else {
                state.errors.push(format!("node {current_id} not found"));
                break;
            };

            execution.current_node = Some(node.id.clone());
            state = self.run_node(node, state).await;

            if node.is_finish {
                break;
            }

            let Some(edge) = def.edges.iter().find(|e| e.from == current_id) else {
                break;
            };
            current_id = edge.to.clone();
        }
        state
    }

    /// Level-order ready-queue scheduler: a node becomes ready only once all
    /// of its incoming edges' sources have produced a result, so a join node
    /// fed by multiple branches (e.g. the `research` template's `"report"`)
    /// runs exactly once, over the merged results of every predecessor,
    /// rather than once per incoming branch (§4.6).
    async fn run_parallel(
        &self,
        workflow: &Workflow,
        mut state: WorkflowState,
        execution: &mut WorkflowExecution,
    ) -> WorkflowState {
        let def = &workflow.definition;
        let Some(entry) = def.nodes.iter().find(|n| n.is_entry) else {
            state.errors.push("no entry node defined".into());
            return state;
        };

        let in_degree: HashMap<&str, usize> =
            def.nodes.iter().map(|n| (n.id.as_str(), def.edges.iter().filter(|e| e.to == n.id).count())).collect();
        let mut arrived: HashMap<&str, usize> = HashMap::new();
        let mut ready: Vec<&str> = vec![entry.id.as_str()];
        let mut finished = false;

        while !ready.is_empty() && !finished {
            let batch = std::mem::take(&mut ready);
            let outputs = futures_util::future::join_all(batch.iter().map(|id| {
                let node = def.nodes.iter().find(|n| n.id == *id).expect("ready node id exists in definition");
                let branch_state = state.clone();
                async move { (*id, self.run_node(node, branch_state).await) }
            }))
            .await;

            for (id, output) in outputs {
                state.results.extend(output.results);
                state.errors.extend(output.errors);
                execution.current_node = Some(id.to_string());

                let node = def.nodes.iter().find(|n| n.id == id).expect("ready node id exists in definition");
                if node.is_finish {
                    finished = true;
                    continue;
                }
                for edge in def.edges.iter().filter(|e| e.from == id) {
                    let count = arrived.entry(edge.to.as_str()).or_insert(0);
                    *count += 1;
                    if *count >= *in_degree.get(edge.to.as_str()).unwrap_or(&1) {
                        ready.push(edge.to.as_str());
                    }
                }
            }
        }
        state
    }

    async fn run_node(
        &self,
        node: &crate::domain::models::WorkflowNode,
        state: WorkflowState,
    ) -> WorkflowState {
        match node.node_type.as_str() {
            "agent" => {
                let agent_name = node.agent.clone().unwrap_or_default();
                match self.resolve_agent(&agent_name) {
                    Some(agent) => agent(state).await,
                    None => state,
                }
            }
            "tool" | "condition" => state,
            other => {
                warn!(node_type = other, node_id = %node.id, "unknown node type, treating as identity");
                state
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{WorkflowDefinition, WorkflowEdge, WorkflowNode};
    use crate::domain::repository::InMemoryRepository;
    use uuid::Uuid;

    fn workflow(definition: WorkflowDefinition, mode: ExecutionMode) -> Workflow {
        Workflow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "test".into(),
            workflow_type: "research".into(),
            definition,
            execution_mode: mode,
            cron_schedule: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn sequential_run_marks_completed_with_no_errors() {
        let repo = Arc::new(InMemoryRepository::new());
        let engine = WorkflowEngine::new(repo);
        engine.register_agent(
            "step_one",
            Arc::new(|mut state: WorkflowState| {
                Box::pin(async move {
                    state.results.insert("step_one".into(), Value::from(true));
                    state
                }) as AgentFuture
            }),
        );

        let definition = WorkflowDefinition {
            nodes: vec![
                WorkflowNode { id: "start".into(), node_type: "agent".into(), agent: Some("step_one".into()), is_entry: true, is_finish: false },
                WorkflowNode { id: "end".into(), node_type: "condition".into(), agent: None, is_entry: false, is_finish: true },
            ],
            edges: vec![WorkflowEdge { from: "start".into(), to: "end".into() }],
        };
        let workflow = workflow(definition, ExecutionMode::Sequential);

        let execution = engine.execute(&workflow, Value::Null).await;
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.progress, 100);
        assert!(execution.completed_at.is_some());
    }

    #[tokio::test]
    async fn node_error_is_accumulated_not_fatal() {
        let repo = Arc::new(InMemoryRepository::new());
        let engine = WorkflowEngine::new(repo);

        let definition = WorkflowDefinition {
            nodes: vec![WorkflowNode {
                id: "start".into(),
                node_type: "agent".into(),
                agent: Some("missing_agent".into()),
                is_entry: true,
                is_finish: true,
            }],
            edges: vec![],
        };
        let workflow = workflow(definition, ExecutionMode::Sequential);

        let execution = engine.execute(&workflow, Value::Null).await;
        // Unknown agent name resolves to identity per §4.6, not an error.
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn missing_entry_node_fails_with_error() {
        let repo = Arc::new(InMemoryRepository::new());
        let engine = WorkflowEngine::new(repo);
        let workflow = workflow(WorkflowDefinition::default(), ExecutionMode::Sequential);

        let execution = engine.execute(&workflow, Value::Null).await;
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(!execution.errors.is_empty());
    }

    #[tokio::test]
    async fn join_node_runs_once_after_both_branches_complete() {
        use crate::workflow::templates::WorkflowTemplate;

        let repo = Arc::new(InMemoryRepository::new());
        let engine = WorkflowEngine::new(repo);
        let report_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        engine.register_agent(
            "gather_context",
            Arc::new(|mut state: WorkflowState| Box::pin(async move { state.results.insert("gather".into(), Value::from(true)); state }) as AgentFuture),
        );
        engine.register_agent(
            "summarize_news",
            Arc::new(|mut state: WorkflowState| Box::pin(async move { state.results.insert("news".into(), Value::from(true)); state }) as AgentFuture),
        );
        engine.register_agent(
            "summarize_financials",
            Arc::new(|mut state: WorkflowState| Box::pin(async move { state.results.insert("financials".into(), Value::from(true)); state }) as AgentFuture),
        );
        let counter = report_calls.clone();
        engine.register_agent(
            "compose_report",
            Arc::new(move |mut state: WorkflowState| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    state.results.insert(
                        "report".into(),
                        Value::from(state.results.contains_key("news") && state.results.contains_key("financials")),
                    );
                    state
                }) as AgentFuture
            }),
        );

        let definition = WorkflowTemplate::Research.definition();
        let workflow = workflow(definition, ExecutionMode::Parallel);

        let execution = engine.execute(&workflow, Value::Null).await;

        assert_eq!(report_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(execution.status, ExecutionStatus::Completed);
        let results: HashMap<String, Value> = serde_json::from_value(execution.results).unwrap();
        assert_eq!(results.get("report"), Some(&Value::from(true)));
    }
}
