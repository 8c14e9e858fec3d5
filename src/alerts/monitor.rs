// =============================================================================
// AlertMonitor — C10
// =============================================================================
//
// Poll loop: read active alerts, batch-fetch current prices, evaluate,
// trigger with anti-fatigue notification throttling, exactly per §4.8.
// Trigger always deactivates the alert and stamps `triggered_at`; only the
// notification creation is gated by the anti-fatigue check.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures_util::FutureExt;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{Notification, PriceAlert};
use crate::domain::repository::Repository;
use crate::rpc::response::StockPrice;
use crate::services::StockDataService;
use crate::ws::WsRegistry;

const PRICE_ALERT_NOTIFICATION_TYPE: &str = "price_alert";

pub struct AlertMonitor {
    repo: Arc<dyn Repository>,
    stock_data: Arc<StockDataService>,
    ws_registry: Arc<WsRegistry>,
    anti_fatigue_window: Duration,
    anti_fatigue_max: usize,
}

impl AlertMonitor {
    pub fn new(
        repo: Arc<dyn Repository>,
        stock_data: Arc<StockDataService>,
        ws_registry: Arc<WsRegistry>,
        anti_fatigue_window: Duration,
        anti_fatigue_max: usize,
    ) -> Self {
        Self { repo, stock_data, ws_registry, anti_fatigue_window, anti_fatigue_max }
    }

    /// One evaluation pass: read active alerts, batch-fetch, evaluate, trigger.
    pub async fn evaluate_once(&self) {
        let alerts = self.repo.active_alerts().await;
        if alerts.is_empty() {
            return;
        }

        let tickers: Vec<String> = alerts.iter().map(|a| a.ticker.clone()).collect::<HashSet<_>>().into_iter().collect();
        let prices = self.stock_data.get_batch_prices(&tickers).await;

        for alert in &alerts {
            let Some(price) = prices.get(&alert.ticker) else { continue };
            if alert.condition_met(price.price) {
                self.trigger(alert, price).await;
            }
        }
    }

    async fn trigger(&self, alert: &PriceAlert, price: &StockPrice) {
        let now = Utc::now();
        let triggered = self.repo.trigger_alert_atomic(alert.id, now).await;
        if !triggered {
            return;
        }

        let since = now - self.anti_fatigue_window;
        let recent_count = self.repo.notifications_since(alert.user_id, PRICE_ALERT_NOTIFICATION_TYPE, since).await;
        if recent_count >= self.anti_fatigue_max {
            info!(user_id = %alert.user_id, ticker = %alert.ticker, "alert triggered but notification suppressed by anti-fatigue window");
            return;
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: alert.user_id,
            notification_type: PRICE_ALERT_NOTIFICATION_TYPE.to_string(),
            title: format!("{} price alert triggered", alert.ticker),
            message: format!("{} is now {:.2} ({})", alert.ticker, price.price, alert.condition_label()),
            payload: json!({
                "alert_id": alert.id,
                "ticker": alert.ticker,
                "target_price": alert.target_price,
                "current_price": price.price,
                "channels": alert.channels,
            }),
            is_read: false,
            created_at: now,
        };

        self.repo.insert_notification(notification.clone()).await;
        self.ws_registry.send_notification_to_user(alert.user_id, &notification);
        info!(user_id = %alert.user_id, ticker = %alert.ticker, "alert triggered and notification delivered");
    }

    /// Runs `evaluate_once` on a fixed interval until the process shuts down.
    pub async fn run(self: Arc<Self>, poll_interval: std::time::Duration) {
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            interval.tick().await;
            if let Err(e) = std::panic::AssertUnwindSafe(self.evaluate_once()).catch_unwind().await {
                warn!(?e, "alert evaluation pass panicked, continuing");
            }
        }
    }
}

impl PriceAlert {
    fn condition_label(&self) -> &'static str {
        match self.condition {
            crate::domain::models::AlertCondition::Above => "above target",
            crate::domain::models::AlertCondition::Below => "below target",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::domain::models::{AlertCondition, NotificationChannel};
    use crate::domain::repository::InMemoryRepository;
    use crate::rpc::{RpcClient, RpcClientConfig};

    fn alert(user_id: Uuid, ticker: &str, target: f64) -> PriceAlert {
        PriceAlert {
            id: Uuid::new_v4(),
            user_id,
            ticker: ticker.to_string(),
            condition: AlertCondition::Above,
            target_price: target,
            channels: vec![NotificationChannel::InApp],
            is_active: true,
            triggered_at: None,
        }
    }

    fn monitor() -> (Arc<InMemoryRepository>, AlertMonitor) {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = Arc::new(InMemoryCacheStore::new());
        let rpc = Arc::new(RpcClient::new(RpcClientConfig::new("http://localhost:0")));
        let stock_data = Arc::new(StockDataService::new(cache, rpc));
        let ws_registry = Arc::new(WsRegistry::new());
        let m = AlertMonitor::new(repo.clone(), stock_data, ws_registry, Duration::minutes(15), 5);
        (repo, m)
    }

    #[tokio::test]
    async fn trigger_deactivates_alert_and_gates_on_anti_fatigue() {
        let (repo, monitor) = monitor();
        let user_id = Uuid::new_v4();
        let a = alert(user_id, "AAPL", 100.0);
        let id = a.id;
        repo.insert_alert(a.clone()).await;

        let price = StockPrice { ticker: "AAPL".into(), price: 150.0, change: 0.0, change_percent: 0.0, volume: 0, timestamp: Utc::now() };
        monitor.trigger(&a, &price).await;

        let reread = repo.get_alert(id).await.unwrap();
        assert!(!reread.is_active);
        assert!(reread.triggered_at.is_some());

        let notifications = repo.notifications_for_user(user_id, false, 10).await;
        assert_eq!(notifications.len(), 1);
    }

    #[tokio::test]
    async fn anti_fatigue_suppresses_beyond_max() {
        let (repo, monitor) = monitor();
        let user_id = Uuid::new_v4();
        let price = StockPrice { ticker: "AAPL".into(), price: 150.0, change: 0.0, change_percent: 0.0, volume: 0, timestamp: Utc::now() };

        for i in 0..6 {
            let mut a = alert(user_id, "AAPL", 100.0);
            a.id = Uuid::new_v4();
            repo.insert_alert(a.clone()).await;
            monitor.trigger(&a, &price).await;
            let _ = i;
        }

        let notifications = repo.notifications_for_user(user_id, false, 100).await;
        assert_eq!(notifications.len(), 5);
    }
}
