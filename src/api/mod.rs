// =============================================================================
// AppState — shared state for the HTTP + WebSocket adapters
// =============================================================================
//
// Ties the service layer together behind a single `Arc`, mirroring the
// teacher's `app_state::AppState` role (one struct every handler takes via
// `State<Arc<AppState>>`), generalized from a single trading engine to the
// five services + registry + workflow runtime this spec describes.
// =============================================================================

pub mod auth;
pub mod rest;

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::domain::repository::Repository;
use crate::services::{MarketOverviewService, NewsService, StockDataService};
use crate::workflow::{WorkflowEngine, WorkflowScheduler};
use crate::ws::SharedWsRegistry;

pub struct AppState {
    pub config: ServiceConfig,
    pub repo: Arc<dyn Repository>,
    pub stock_data: Arc<StockDataService>,
    pub news: Arc<NewsService>,
    pub market_overview: Arc<MarketOverviewService>,
    pub ws_registry: SharedWsRegistry,
    pub workflow_engine: Arc<WorkflowEngine>,
    pub workflow_scheduler: Arc<WorkflowScheduler>,
}
