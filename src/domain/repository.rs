// =============================================================================
// Repository — the out-of-scope ORM's interface, not its internals
// =============================================================================
//
// SQL migrations and ORM mapping are explicitly out of scope (spec.md §1).
// This trait is the minimal surface AlertMonitor, WorkflowEngine, and the
// notification/alert HTTP routes need against "the database"; the in-memory
// implementation honors the transactional/idempotency invariants of §5 so
// the rest of the crate can be exercised without a real Postgres instance.
// =============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::models::{Notification, PriceAlert, Workflow, WorkflowExecution};

#[async_trait]
pub trait Repository: Send + Sync {
    async fn active_alerts(&self) -> Vec<PriceAlert>;
    async fn get_alert(&self, id: Uuid) -> Option<PriceAlert>;
    async fn insert_alert(&self, alert: PriceAlert);
    async fn delete_alert(&self, id: Uuid);

    /// Atomically mark an alert triggered. Idempotent: re-triggering an
    /// already-inactive alert is a no-op (`WHERE is_active = true`).
    /// Returns `true` if this call performed the transition.
    async fn trigger_alert_atomic(&self, id: Uuid, at: DateTime<Utc>) -> bool;

    async fn insert_notification(&self, notification: Notification);
    async fn notifications_for_user(&self, user_id: Uuid, unread_only: bool, limit: usize) -> Vec<Notification>;
    async fn notifications_since(&self, user_id: Uuid, notification_type: &str, since: DateTime<Utc>) -> usize;
    async fn mark_notification_read(&self, id: Uuid) -> bool;

    async fn insert_workflow(&self, workflow: Workflow);
    async fn get_workflow(&self, id: Uuid) -> Option<Workflow>;
    async fn user_workflows(&self, user_id: Uuid) -> Vec<Workflow>;
    async fn set_workflow_active(&self, id: Uuid, active: bool);

    async fn upsert_execution(&self, execution: WorkflowExecution);
    async fn get_execution(&self, id: Uuid) -> Option<WorkflowExecution>;
}

#[derive(Default)]
struct Store {
    alerts: HashMap<Uuid, PriceAlert>,
    notifications: HashMap<Uuid, Notification>,
    workflows: HashMap<Uuid, Workflow>,
    executions: HashMap<Uuid, WorkflowExecution>,
}

#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn active_alerts(&self) -> Vec<PriceAlert> {
        self.store.lock().alerts.values().filter(|a| a.is_active).cloned().collect()
    }

    async fn get_alert(&self, id: Uuid) -> Option<PriceAlert> {
        self.store.lock().alerts.get(&id).cloned()
    }

    async fn insert_alert(&self, alert: PriceAlert) {
        self.store.lock().alerts.insert(alert.id, alert);
    }

    async fn delete_alert(&self, id: Uuid) {
        self.store.lock().alerts.remove(&id);
    }

    async fn trigger_alert_atomic(&self, id: Uuid, at: DateTime<Utc>) -> bool {
        let mut store = self.store.lock();
        match store.alerts.get_mut(&id) {
            Some(alert) if alert.is_active => {
                alert.is_active = false;
                alert.triggered_at = Some(at);
                true
            }
            _ => false,
        }
    }

    async fn insert_notification(&self, notification: Notification) {
        self.store.lock().notifications.insert(notification.id, notification);
    }

    async fn notifications_for_user(&self, user_id: Uuid, unread_only: bool, limit: usize) -> Vec<Notification> {
        let store = self.store.lock();
        let mut items: Vec<Notification> = store
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        items.sort_by_key(|n| std::cmp::Reverse(n.created_at));
        items.truncate(limit);
        items
    }

    async fn notifications_since(&self, user_id: Uuid, notification_type: &str, since: DateTime<Utc>) -> usize {
        self.store
            .lock()
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && n.notification_type == notification_type && n.created_at >= since)
            .count()
    }

    async fn mark_notification_read(&self, id: Uuid) -> bool {
        let mut store = self.store.lock();
        match store.notifications.get_mut(&id) {
            Some(n) => {
                n.is_read = true;
                true
            }
            None => false,
        }
    }

    async fn insert_workflow(&self, workflow: Workflow) {
        self.store.lock().workflows.insert(workflow.id, workflow);
    }

    async fn get_workflow(&self, id: Uuid) -> Option<Workflow> {
        self.store.lock().workflows.get(&id).cloned()
    }

    async fn user_workflows(&self, user_id: Uuid) -> Vec<Workflow> {
        self.store.lock().workflows.values().filter(|w| w.user_id == user_id).cloned().collect()
    }

    async fn set_workflow_active(&self, id: Uuid, active: bool) {
        if let Some(w) = self.store.lock().workflows.get_mut(&id) {
            w.is_active = active;
        }
    }

    async fn upsert_execution(&self, execution: WorkflowExecution) {
        self.store.lock().executions.insert(execution.id, execution);
    }

    async fn get_execution(&self, id: Uuid) -> Option<WorkflowExecution> {
        self.store.lock().executions.get(&id).cloned()
    }
}

/// Default anti-fatigue window, matching §4.8.
pub const ANTI_FATIGUE_WINDOW: Duration = Duration::minutes(15);
pub const ANTI_FATIGUE_MAX_PER_WINDOW: usize = 5;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AlertCondition;

    fn sample_alert(user_id: Uuid) -> PriceAlert {
        PriceAlert {
            id: Uuid::new_v4(),
            user_id,
            ticker: "AAPL".into(),
            condition: AlertCondition::Above,
            target_price: 100.0,
            channels: vec![],
            is_active: true,
            triggered_at: None,
        }
    }

    #[tokio::test]
    async fn trigger_is_idempotent() {
        let repo = InMemoryRepository::new();
        let alert = sample_alert(Uuid::new_v4());
        let id = alert.id;
        repo.insert_alert(alert).await;

        assert!(repo.trigger_alert_atomic(id, Utc::now()).await);
        assert!(!repo.trigger_alert_atomic(id, Utc::now()).await);

        let reread = repo.get_alert(id).await.unwrap();
        assert!(!reread.is_active);
        assert!(reread.triggered_at.is_some());
    }
}
