// =============================================================================
// Data model — §3
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_verifier: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockPosition {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub ticker: String,
    pub quantity: f64,
    pub purchase_price: f64,
    pub purchase_date: NaiveDate,
}

impl StockPosition {
    /// Invariant: ticker is always upper-cased on write.
    pub fn new(
        portfolio_id: Uuid,
        ticker: &str,
        quantity: f64,
        purchase_price: f64,
        purchase_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            portfolio_id,
            ticker: ticker.to_uppercase(),
            quantity,
            purchase_price,
            purchase_date,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    InApp,
    Email,
    Push,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ticker: String,
    pub condition: AlertCondition,
    pub target_price: f64,
    pub channels: Vec<NotificationChannel>,
    pub is_active: bool,
    pub triggered_at: Option<DateTime<Utc>>,
}

impl PriceAlert {
    pub fn condition_met(&self, current_price: f64) -> bool {
        match self.condition {
            AlertCondition::Above => current_price >= self.target_price,
            AlertCondition::Below => current_price <= self.target_price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub payload: Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub is_entry: bool,
    #[serde(default)]
    pub is_finish: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowDefinition {
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub workflow_type: String,
    pub definition: WorkflowDefinition,
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub cron_schedule: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub progress: u8,
    pub current_node: Option<String>,
    #[serde(default)]
    pub results: Value,
    #[serde(default)]
    pub errors: Vec<String>,
    pub execution_time_ms: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    pub fn new(workflow_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: ExecutionStatus::Running,
            progress: 0,
            current_node: None,
            results: Value::Object(Default::default()),
            errors: Vec::new(),
            execution_time_ms: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}
