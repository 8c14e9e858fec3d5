// =============================================================================
// WsRegistry — connection registry + subscription fan-out (C8)
// =============================================================================
//
// Generalized from the teacher's single-connection push loop (`api::ws`) to a
// multi-connection subscription registry. Index mutation happens under one
// `parking_lot::Mutex`; a snapshot of subscriber ids is taken under the lock
// and sends happen after release, per §4.7.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::domain::models::Notification;
use crate::rpc::response::StockPrice;

pub struct WsConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscribed_tickers: HashSet<String>,
    pub connected_at: chrono::DateTime<Utc>,
    sender: UnboundedSender<Message>,
}

#[derive(Default)]
struct Indexes {
    connections: HashMap<Uuid, WsConnection>,
    user_connections: HashMap<Uuid, HashSet<Uuid>>,
    ticker_subscriptions: HashMap<String, HashSet<Uuid>>,
}

pub struct WsRegistry {
    indexes: Mutex<Indexes>,
    total_connects: AtomicU64,
}

impl Default for WsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WsRegistry {
    pub fn new() -> Self {
        Self { indexes: Mutex::new(Indexes::default()), total_connects: AtomicU64::new(0) }
    }

    pub fn connect(&self, id: Uuid, user_id: Uuid, sender: UnboundedSender<Message>) {
        let mut idx = self.indexes.lock();
        idx.connections.insert(
            id,
            WsConnection { id, user_id, subscribed_tickers: HashSet::new(), connected_at: Utc::now(), sender },
        );
        idx.user_connections.entry(user_id).or_default().insert(id);
        self.total_connects.fetch_add(1, Ordering::Relaxed);
    }

    /// Idempotent: disconnecting an unknown id is a no-op.
    pub fn disconnect(&self, id: Uuid) {
        let mut idx = self.indexes.lock();
        let Some(conn) = idx.connections.remove(&id) else { return };

        for ticker in &conn.subscribed_tickers {
            if let Some(subs) = idx.ticker_subscriptions.get_mut(ticker) {
                subs.remove(&id);
                if subs.is_empty() {
                    idx.ticker_subscriptions.remove(ticker);
                }
            }
        }

        if let Some(conns) = idx.user_connections.get_mut(&conn.user_id) {
            conns.remove(&id);
            if conns.is_empty() {
                idx.user_connections.remove(&conn.user_id);
            }
        }
    }

    pub fn subscribe(&self, id: Uuid, tickers: &[String]) {
        let normalized: Vec<String> = tickers.iter().map(|t| t.to_uppercase()).collect();
        let sender = {
            let mut idx = self.indexes.lock();
            let Some(conn) = idx.connections.get_mut(&id) else { return };
            for ticker in &normalized {
                conn.subscribed_tickers.insert(ticker.clone());
            }
            for ticker in &normalized {
                idx.ticker_subscriptions.entry(ticker.clone()).or_default().insert(id);
            }
            idx.connections.get(&id).map(|c| c.sender.clone())
        };
        if let Some(sender) = sender {
            let payload = json!({
                "type": "subscription_confirmed",
                "tickers": normalized,
                "timestamp": Utc::now(),
            });
            let _ = sender.send(Message::Text(payload.to_string()));
        }
    }

    pub fn unsubscribe(&self, id: Uuid, tickers: &[String]) {
        let normalized: Vec<String> = tickers.iter().map(|t| t.to_uppercase()).collect();
        let sender = {
            let mut idx = self.indexes.lock();
            let Some(conn) = idx.connections.get_mut(&id) else { return };
            for ticker in &normalized {
                conn.subscribed_tickers.remove(ticker);
            }
            for ticker in &normalized {
                if let Some(subs) = idx.ticker_subscriptions.get_mut(ticker) {
                    subs.remove(&id);
                    if subs.is_empty() {
                        idx.ticker_subscriptions.remove(ticker);
                    }
                }
            }
            idx.connections.get(&id).map(|c| c.sender.clone())
        };
        if let Some(sender) = sender {
            let payload = json!({
                "type": "unsubscription_confirmed",
                "tickers": normalized,
                "timestamp": Utc::now(),
            });
            let _ = sender.send(Message::Text(payload.to_string()));
        }
    }

    /// Returns the number of connections the update was successfully handed
    /// to. Connections whose send fails are disconnected and not counted.
    pub fn broadcast_price_update(&self, ticker: &str, price: &StockPrice) -> usize {
        let ticker = ticker.to_uppercase();
        let subscribers: Vec<(Uuid, UnboundedSender<Message>)> = {
            let idx = self.indexes.lock();
            idx.ticker_subscriptions
                .get(&ticker)
                .into_iter()
                .flatten()
                .filter_map(|id| idx.connections.get(id).map(|c| (*id, c.sender.clone())))
                .collect()
        };

        let payload = json!({
            "type": "price_update",
            "ticker": ticker,
            "price": price.price,
            "change": price.change,
            "changePercent": price.change_percent,
            "volume": price.volume,
            "timestamp": Utc::now(),
        });
        self.deliver(subscribers, &payload)
    }

    pub fn send_notification_to_user(&self, user_id: Uuid, notification: &Notification) -> usize {
        let subscribers: Vec<(Uuid, UnboundedSender<Message>)> = {
            let idx = self.indexes.lock();
            idx.user_connections
                .get(&user_id)
                .into_iter()
                .flatten()
                .filter_map(|id| idx.connections.get(id).map(|c| (*id, c.sender.clone())))
                .collect()
        };

        let payload = json!({
            "type": "notification",
            "notification": notification,
            "timestamp": Utc::now(),
        });
        self.deliver(subscribers, &payload)
    }

    fn deliver(&self, subscribers: Vec<(Uuid, UnboundedSender<Message>)>, payload: &serde_json::Value) -> usize {
        let text = payload.to_string();
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sender) in subscribers {
            if sender.send(Message::Text(text.clone())).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }
        for id in dead {
            self.disconnect(id);
        }
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.indexes.lock().connections.len()
    }
}

pub type SharedWsRegistry = Arc<WsRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_price() -> StockPrice {
        StockPrice { ticker: "AAPL".into(), price: 150.0, change: 1.0, change_percent: 0.6, volume: 100, timestamp: Utc::now() }
    }

    #[test]
    fn subscribe_then_broadcast_delivers_and_confirms() {
        let registry = WsRegistry::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        registry.connect(conn_id, Uuid::new_v4(), tx);
        registry.subscribe(conn_id, &["aapl".to_string()]);

        let delivered = registry.broadcast_price_update("AAPL", &sample_price());
        assert_eq!(delivered, 1);

        let confirm = rx.try_recv().unwrap();
        assert!(matches!(confirm, Message::Text(_)));
        let update = rx.try_recv().unwrap();
        assert!(matches!(update, Message::Text(_)));
    }

    #[test]
    fn disconnect_is_idempotent_and_cleans_indexes() {
        let registry = WsRegistry::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        registry.connect(conn_id, user_id, tx);
        registry.subscribe(conn_id, &["AAPL".to_string()]);

        registry.disconnect(conn_id);
        registry.disconnect(conn_id);

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.broadcast_price_update("AAPL", &sample_price()), 0);
    }

    #[test]
    fn dead_connection_is_pruned_and_not_counted() {
        let registry = WsRegistry::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        registry.connect(conn_id, Uuid::new_v4(), tx);
        registry.subscribe(conn_id, &["AAPL".to_string()]);
        drop(rx);

        let delivered = registry.broadcast_price_update("AAPL", &sample_price());
        assert_eq!(delivered, 0);
        assert_eq!(registry.connection_count(), 0);
    }
}
