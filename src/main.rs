// =============================================================================
// Market Data Service — Main Entry Point
// =============================================================================

mod alerts;
mod api;
mod cache;
mod config;
mod domain;
mod error;
mod rpc;
mod services;
mod workflow;
mod ws;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::alerts::AlertMonitor;
use crate::api::AppState;
use crate::cache::{CacheStore, InMemoryCacheStore, RedisCacheStore};
use crate::config::ServiceConfig;
use crate::domain::repository::InMemoryRepository;
use crate::rpc::{RpcClient, RpcClientConfig};
use crate::services::{MarketOverviewService, NewsService, StockDataService};
use crate::workflow::{WorkflowEngine, WorkflowScheduler};
use crate::ws::WsRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Market Data Service — Starting Up               ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    // ── 1. Configuration ──────────────────────────────────────────────
    let config_path = std::env::var("MARKET_SERVICE_CONFIG").unwrap_or_else(|_| "service_config.json".into());
    let config = ServiceConfig::load(&config_path);

    // ── 2. Cache store ────────────────────────────────────────────────
    let cache: Arc<dyn CacheStore> = match &config.cache_url {
        Some(url) => match RedisCacheStore::connect(url).await {
            Ok(store) => {
                info!("connected to Redis cache store");
                Arc::new(store)
            }
            Err(e) => {
                warn!(error = %e, "failed to connect to Redis, falling back to in-memory cache");
                Arc::new(InMemoryCacheStore::new())
            }
        },
        None => {
            info!("REDIS_URL not set, using in-memory cache store");
            Arc::new(InMemoryCacheStore::new())
        }
    };

    // ── 3. RPC clients, one per downstream tool server ───────────────
    let stock_data_rpc = build_rpc_client(&config, &config.stock_data_server);
    let news_rpc = build_rpc_client(&config, &config.news_server);
    let market_data_rpc = build_rpc_client(&config, &config.market_data_server);

    // ── 4. Domain repository ──────────────────────────────────────────
    let repo = Arc::new(InMemoryRepository::new());

    // ── 5. Service layer ───────────────────────────────────────────────
    let stock_data = Arc::new(StockDataService::new(cache.clone(), stock_data_rpc));
    let news = Arc::new(NewsService::new(cache.clone(), news_rpc));
    let market_overview = Arc::new(MarketOverviewService::new(cache.clone(), market_data_rpc, news.clone()));

    // ── 6. WebSocket registry ──────────────────────────────────────────
    let ws_registry = Arc::new(WsRegistry::new());

    // ── 7. Workflow engine + scheduler ─────────────────────────────────
    let workflow_engine = Arc::new(WorkflowEngine::new(repo.clone()));
    let workflow_scheduler = Arc::new(WorkflowScheduler::new(workflow_engine.clone(), repo.clone()).await?);

    let state = Arc::new(AppState {
        config: config.clone(),
        repo: repo.clone(),
        stock_data: stock_data.clone(),
        news: news.clone(),
        market_overview,
        ws_registry: ws_registry.clone(),
        workflow_engine,
        workflow_scheduler,
    });

    // ── 8. Alert monitor loop ──────────────────────────────────────────
    let monitor = Arc::new(AlertMonitor::new(
        repo,
        stock_data,
        ws_registry,
        chrono::Duration::seconds(config.anti_fatigue_window_secs),
        config.anti_fatigue_max_per_window,
    ));
    tokio::spawn(monitor.run(std::time::Duration::from_secs(config.alert_poll_interval_secs)));

    // ── 9. HTTP + WebSocket server ─────────────────────────────────────
    let bind_addr = state.config.bind_addr.clone();
    let app = api::rest::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "market data service listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server failed");
        }
    });

    info!("all subsystems running. press Ctrl+C to stop.");

    // ── 10. Graceful shutdown ───────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");
    info!("market data service shut down complete.");
    Ok(())
}

fn build_rpc_client(config: &ServiceConfig, server: &config::ToolServerConfig) -> rpc::SharedRpcClient {
    let rpc_config = RpcClientConfig {
        base_url: server.base_url.clone(),
        token: server.token.clone(),
        pool_size: server.pool_size,
        request_timeout: config.request_timeout(),
        retry: config.retry.clone(),
        circuit_breaker: config.circuit_breaker.clone(),
    };
    Arc::new(RpcClient::new(rpc_config))
}
