// =============================================================================
// Built-in workflow templates
// =============================================================================
//
// Named, not implemented as real trading/LLM logic — agent internals beyond
// identity/registered-callable dispatch are out of scope. These give
// `POST`-from-template workflow creation a concrete graph to construct
// against, grounded in `agentic_orchestrator.py`'s
// `create_workflow_from_template`/`list_templates`.
// =============================================================================

use crate::domain::models::{ExecutionMode, WorkflowDefinition, WorkflowEdge, WorkflowNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowTemplate {
    PriceAlert,
    Research,
    Rebalancing,
}

impl WorkflowTemplate {
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "price_alert" => Some(Self::PriceAlert),
            "research" => Some(Self::Research),
            "rebalancing" => Some(Self::Rebalancing),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PriceAlert => "price_alert",
            Self::Research => "research",
            Self::Rebalancing => "rebalancing",
        }
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        match self {
            Self::Research => ExecutionMode::Parallel,
            _ => ExecutionMode::Sequential,
        }
    }

    pub fn definition(&self) -> WorkflowDefinition {
        match self {
            Self::PriceAlert => WorkflowDefinition {
                nodes: vec![
                    WorkflowNode { id: "check_price".into(), node_type: "agent".into(), agent: Some("check_price".into()), is_entry: true, is_finish: false },
                    WorkflowNode { id: "notify".into(), node_type: "agent".into(), agent: Some("notify_user".into()), is_entry: false, is_finish: true },
                ],
                edges: vec![WorkflowEdge { from: "check_price".into(), to: "notify".into() }],
            },
            Self::Research => WorkflowDefinition {
                nodes: vec![
                    WorkflowNode { id: "gather".into(), node_type: "agent".into(), agent: Some("gather_context".into()), is_entry: true, is_finish: false },
                    WorkflowNode { id: "news".into(), node_type: "agent".into(), agent: Some("summarize_news".into()), is_entry: false, is_finish: false },
                    WorkflowNode { id: "financials".into(), node_type: "agent".into(), agent: Some("summarize_financials".into()), is_entry: false, is_finish: false },
                    WorkflowNode { id: "report".into(), node_type: "agent".into(), agent: Some("compose_report".into()), is_entry: false, is_finish: true },
                ],
                edges: vec![
                    WorkflowEdge { from: "gather".into(), to: "news".into() },
                    WorkflowEdge { from: "gather".into(), to: "financials".into() },
                    WorkflowEdge { from: "news".into(), to: "report".into() },
                    WorkflowEdge { from: "financials".into(), to: "report".into() },
                ],
            },
            Self::Rebalancing => WorkflowDefinition {
                nodes: vec![
                    WorkflowNode { id: "analyze".into(), node_type: "agent".into(), agent: Some("analyze_portfolio".into()), is_entry: true, is_finish: false },
                    WorkflowNode { id: "propose".into(), node_type: "agent".into(), agent: Some("propose_trades".into()), is_entry: false, is_finish: true },
                ],
                edges: vec![WorkflowEdge { from: "analyze".into(), to: "propose".into() }],
            },
        }
    }
}

pub fn list_templates() -> Vec<&'static str> {
    vec!["price_alert", "research", "rebalancing"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_name_round_trips() {
        for name in list_templates() {
            let template = WorkflowTemplate::by_name(name).unwrap();
            assert_eq!(template.name(), name);
        }
    }

    #[test]
    fn research_definition_has_parallel_branches() {
        let def = WorkflowTemplate::Research.definition();
        let from_gather = def.edges.iter().filter(|e| e.from == "gather").count();
        assert_eq!(from_gather, 2);
    }
}
