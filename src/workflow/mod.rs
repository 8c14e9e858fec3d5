pub mod engine;
pub mod scheduler;
pub mod templates;

pub use engine::{AgentFn, AgentFuture, WorkflowEngine, WorkflowState};
pub use scheduler::WorkflowScheduler;
pub use templates::{list_templates, WorkflowTemplate};
