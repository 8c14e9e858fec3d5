// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Routes per §6. Read endpoints are public; alert/notification/workflow
// mutations require a Bearer token via `AuthBearer`. Per-route rate limiting
// is applied per remote address via `tower_governor`, sized per §6's table.
// CORS mirrors the teacher's permissive development configuration.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::api::auth::AuthBearer;
use crate::api::AppState;
use crate::domain::models::{AlertCondition, Notification, NotificationChannel, PriceAlert, Workflow};
use crate::domain::validation::{validate_search_query, validate_ticker};
use crate::error::{ServiceError, ServiceResult};
use crate::rpc::response::{CompanyInfo, FinancialMetrics, StockPrice};
use crate::workflow::templates::WorkflowTemplate;

fn per_minute_governor(requests_per_min: u32) -> GovernorLayer<tower_governor::key_extractor::PeerIpKeyExtractor, governor::middleware::NoOpMiddleware> {
    let period = Duration::from_millis(60_000 / requests_per_min.max(1) as u64);
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .period(period)
            .burst_size(requests_per_min.max(1))
            .finish()
            .expect("valid governor config"),
    );
    GovernorLayer { config }
}

pub fn router(state: Arc<AppState>) -> Router {
    let limits = state.config.rate_limits.clone();

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let stock_detail_route = Router::new()
        .route("/api/stocks/:ticker", get(stock_detail))
        .route("/api/stocks/:ticker/price", get(stock_price))
        .layer(per_minute_governor(limits.price_per_min));

    let historical = Router::new()
        .route("/api/stocks/:ticker/historical", get(stock_historical))
        .layer(per_minute_governor(limits.historical_per_min));

    let company_metrics = Router::new()
        .route("/api/stocks/:ticker/company", get(stock_company))
        .route("/api/stocks/:ticker/metrics", get(stock_metrics))
        .route("/api/stocks/prices/batch", post(stock_prices_batch))
        .layer(per_minute_governor(limits.price_per_min));

    let search = Router::new().route("/api/stocks/search", get(stock_search)).layer(per_minute_governor(limits.search_per_min));

    let market_overview_route = Router::new()
        .route("/api/market/overview", get(market_overview))
        .layer(per_minute_governor(limits.market_overview_per_min));

    let market_misc = Router::new()
        .route("/api/market/trending", get(market_trending))
        .route("/api/market/sectors", get(market_sectors))
        .route("/api/market/indices", get(market_indices));

    let alerts_read = Router::new().route("/api/alerts", get(list_alerts));

    let alerts_write = Router::new()
        .route("/api/alerts", post(create_alert))
        .route("/api/alerts/:id", put(update_alert))
        .route("/api/alerts/:id", delete(delete_alert))
        .layer(per_minute_governor(limits.alert_write_per_min));

    let notifications = Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/:id/read", put(mark_notification_read))
        .layer(per_minute_governor(limits.notifications_list_per_min));

    let workflows_read = Router::new()
        .route("/api/workflows/templates", get(workflow_templates))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/:id", get(get_workflow))
        .route("/api/workflows/executions/:id", get(get_execution));

    let workflows_write = Router::new()
        .route("/api/workflows", post(create_workflow))
        .route("/api/workflows/:id/execute", post(execute_workflow))
        .route("/api/workflows/:id/schedule", post(schedule_workflow))
        .route("/api/workflows/:id/schedule", delete(cancel_workflow_schedule));

    Router::new()
        .merge(stock_detail_route)
        .merge(historical)
        .merge(company_metrics)
        .merge(search)
        .merge(market_overview_route)
        .merge(market_misc)
        .merge(alerts_read)
        .merge(alerts_write)
        .merge(notifications)
        .merge(workflows_read)
        .merge(workflows_write)
        .route("/ws", get(crate::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Stocks
// =============================================================================

#[derive(Serialize)]
struct StockDetail {
    price: StockPrice,
    #[serde(skip_serializing_if = "Option::is_none")]
    company: Option<CompanyInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<FinancialMetrics>,
}

fn parse_ticker(raw: &str) -> ServiceResult<String> {
    validate_ticker(raw).map_err(ServiceError::validation)
}

async fn stock_detail(State(state): State<Arc<AppState>>, Path(ticker): Path<String>) -> impl IntoResponse {
    run(async move {
        let ticker = parse_ticker(&ticker)?;
        let price = state.stock_data.get_current_price(&ticker).await?;
        let company = state.stock_data.get_company_info(&ticker).await.ok();
        let metrics = state.stock_data.get_financial_metrics(&ticker).await.ok();
        Ok(Json(StockDetail { price, company, metrics }))
    })
    .await
}

async fn stock_price(State(state): State<Arc<AppState>>, Path(ticker): Path<String>) -> impl IntoResponse {
    run(async move {
        let ticker = parse_ticker(&ticker)?;
        let price = state.stock_data.get_current_price(&ticker).await?;
        Ok(Json(price))
    })
    .await
}

#[derive(Deserialize)]
struct HistoricalQuery {
    start_date: String,
    end_date: String,
}

async fn stock_historical(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(q): Query<HistoricalQuery>,
) -> impl IntoResponse {
    run(async move {
        let ticker = parse_ticker(&ticker)?;
        let points = state.stock_data.get_historical_data(&ticker, &q.start_date, &q.end_date).await?;
        Ok(Json(points))
    })
    .await
}

async fn stock_company(State(state): State<Arc<AppState>>, Path(ticker): Path<String>) -> impl IntoResponse {
    run(async move {
        let ticker = parse_ticker(&ticker)?;
        let info = state.stock_data.get_company_info(&ticker).await?;
        Ok(Json(info))
    })
    .await
}

async fn stock_metrics(State(state): State<Arc<AppState>>, Path(ticker): Path<String>) -> impl IntoResponse {
    run(async move {
        let ticker = parse_ticker(&ticker)?;
        let metrics = state.stock_data.get_financial_metrics(&ticker).await?;
        Ok(Json(metrics))
    })
    .await
}

#[derive(Deserialize)]
struct BatchPricesRequest {
    tickers: Vec<String>,
}

async fn stock_prices_batch(State(state): State<Arc<AppState>>, Json(req): Json<BatchPricesRequest>) -> impl IntoResponse {
    run(async move {
        let tickers: Vec<String> =
            req.tickers.iter().map(|t| parse_ticker(t)).collect::<Result<Vec<_>, _>>()?;
        let prices = state.stock_data.get_batch_prices(&tickers).await;
        Ok(Json(prices))
    })
    .await
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

async fn stock_search(State(state): State<Arc<AppState>>, Query(q): Query<SearchQuery>) -> impl IntoResponse {
    run(async move {
        let query = validate_search_query(&q.q).map_err(ServiceError::validation)?;
        let results = state.stock_data.search_stocks(&query, q.limit).await?;
        Ok(Json(results))
    })
    .await
}

// =============================================================================
// Market
// =============================================================================

#[derive(Deserialize)]
struct MarketOverviewQuery {
    #[serde(default)]
    include_sectors: bool,
}

async fn market_overview(State(state): State<Arc<AppState>>, Query(q): Query<MarketOverviewQuery>) -> impl IntoResponse {
    run(async move {
        let overview = state.market_overview.get_overview(q.include_sectors).await?;
        Ok(Json(overview))
    })
    .await
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn market_trending(State(state): State<Arc<AppState>>, Query(q): Query<LimitQuery>) -> impl IntoResponse {
    run(async move {
        let mut trending = state.market_overview.get_trending_tickers().await?;
        if let Some(limit) = q.limit {
            trending.truncate(limit);
        }
        Ok(Json(trending))
    })
    .await
}

async fn market_sectors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run(async move {
        let sectors = state.market_overview.get_sector_performance().await?;
        Ok(Json(sectors))
    })
    .await
}

async fn market_indices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run(async move {
        let indices = state.market_overview.get_indices().await?;
        Ok(Json(indices))
    })
    .await
}

// =============================================================================
// Alerts
// =============================================================================

#[derive(Deserialize)]
struct UserScopedQuery {
    user_id: Uuid,
}

async fn list_alerts(State(state): State<Arc<AppState>>, Query(q): Query<UserScopedQuery>) -> impl IntoResponse {
    run(async move {
        let alerts: Vec<PriceAlert> =
            state.repo.active_alerts().await.into_iter().filter(|a| a.user_id == q.user_id).collect();
        Ok(Json(alerts))
    })
    .await
}

#[derive(Deserialize)]
struct CreateAlertRequest {
    user_id: Uuid,
    ticker: String,
    condition: AlertCondition,
    target_price: f64,
    #[serde(default)]
    channels: Vec<NotificationChannel>,
}

async fn create_alert(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAlertRequest>,
) -> impl IntoResponse {
    let result = async move {
        let ticker = parse_ticker(&req.ticker)?;
        let alert = PriceAlert {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            ticker,
            condition: req.condition,
            target_price: req.target_price,
            channels: req.channels,
            is_active: true,
            triggered_at: None,
        };
        state.repo.insert_alert(alert.clone()).await;
        Ok::<_, ServiceError>(Json(alert))
    }
    .await;

    match result {
        Ok(body) => (StatusCode::CREATED, body).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
struct UpdateAlertRequest {
    #[serde(default)]
    target_price: Option<f64>,
    #[serde(default)]
    is_active: Option<bool>,
}

async fn update_alert(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAlertRequest>,
) -> impl IntoResponse {
    run(async move {
        let mut alert = state.repo.get_alert(id).await.ok_or_else(|| ServiceError::not_found(format!("alert {id}")))?;
        if let Some(target_price) = req.target_price {
            alert.target_price = target_price;
        }
        if let Some(is_active) = req.is_active {
            alert.is_active = is_active;
        }
        state.repo.insert_alert(alert.clone()).await;
        Ok(Json(alert))
    })
    .await
}

async fn delete_alert(_auth: AuthBearer, State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> impl IntoResponse {
    state.repo.delete_alert(id).await;
    StatusCode::NO_CONTENT
}

// =============================================================================
// Notifications
// =============================================================================

#[derive(Deserialize)]
struct NotificationsQuery {
    user_id: Uuid,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    unread_only: bool,
}

async fn list_notifications(State(state): State<Arc<AppState>>, Query(q): Query<NotificationsQuery>) -> impl IntoResponse {
    let notifications: Vec<Notification> =
        state.repo.notifications_for_user(q.user_id, q.unread_only, q.limit.unwrap_or(50)).await;
    Json(notifications)
}

async fn mark_notification_read(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if state.repo.mark_notification_read(id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        ServiceError::not_found(format!("notification {id}")).into_response()
    }
}

// =============================================================================
// Workflows
// =============================================================================

async fn workflow_templates() -> impl IntoResponse {
    Json(crate::workflow::list_templates())
}

async fn list_workflows(State(state): State<Arc<AppState>>, Query(q): Query<UserScopedQuery>) -> impl IntoResponse {
    Json(state.repo.user_workflows(q.user_id).await)
}

async fn get_workflow(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> impl IntoResponse {
    run(async move {
        let workflow = state.repo.get_workflow(id).await.ok_or_else(|| ServiceError::not_found(format!("workflow {id}")))?;
        Ok(Json(workflow))
    })
    .await
}

async fn get_execution(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> impl IntoResponse {
    run(async move {
        let execution = state.repo.get_execution(id).await.ok_or_else(|| ServiceError::not_found(format!("execution {id}")))?;
        Ok(Json(execution))
    })
    .await
}

#[derive(Deserialize)]
struct CreateWorkflowRequest {
    user_id: Uuid,
    name: String,
    template: String,
}

async fn create_workflow(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateWorkflowRequest>,
) -> impl IntoResponse {
    let result = async move {
        let template = WorkflowTemplate::by_name(&req.template)
            .ok_or_else(|| ServiceError::validation(format!("unknown workflow template: {}", req.template)))?;
        let workflow = Workflow {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            name: req.name,
            workflow_type: template.name().to_string(),
            definition: template.definition(),
            execution_mode: template.execution_mode(),
            cron_schedule: None,
            is_active: true,
        };
        state.repo.insert_workflow(workflow.clone()).await;
        Ok::<_, ServiceError>(Json(workflow))
    }
    .await;

    match result {
        Ok(body) => (StatusCode::CREATED, body).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn execute_workflow(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(context): Json<serde_json::Value>,
) -> impl IntoResponse {
    run(async move {
        let workflow = state.repo.get_workflow(id).await.ok_or_else(|| ServiceError::not_found(format!("workflow {id}")))?;
        let execution = state.workflow_engine.execute(&workflow, context).await;
        Ok(Json(execution))
    })
    .await
}

#[derive(Deserialize)]
struct ScheduleWorkflowRequest {
    cron_expr: String,
    #[serde(default)]
    context: serde_json::Value,
}

async fn schedule_workflow(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ScheduleWorkflowRequest>,
) -> impl IntoResponse {
    run(async move {
        state.repo.get_workflow(id).await.ok_or_else(|| ServiceError::not_found(format!("workflow {id}")))?;
        state
            .workflow_scheduler
            .schedule_workflow(id, &req.cron_expr, req.context)
            .await
            .map_err(|e| ServiceError::validation(format!("invalid cron expression: {e}")))?;
        Ok(Json(serde_json::json!({ "scheduled": true })))
    })
    .await
}

async fn cancel_workflow_schedule(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    state.workflow_scheduler.cancel_workflow(id).await;
    StatusCode::NO_CONTENT
}

// =============================================================================
// Helpers
// =============================================================================

/// Runs a fallible handler body and converts `Err` into the typed error
/// response, keeping the success path's `Json<T>` type intact.
async fn run<T, F>(fut: F) -> axum::response::Response
where
    T: Serialize,
    F: std::future::Future<Output = ServiceResult<Json<T>>>,
{
    match fut.await {
        Ok(json) => json.into_response(),
        Err(e) => e.into_response(),
    }
}
