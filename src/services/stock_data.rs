// =============================================================================
// StockDataService — C5
// =============================================================================
//
// Sits between HTTP handlers and RpcClient, enforcing per-resource TTLs and
// stale-on-error fallback (§4.4). Grounded in the teacher's `BinanceClient`
// wrapper methods (cache-then-RPC shape) generalized from a single price feed
// to the five resources below.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::json;
use tracing::warn;

use crate::cache::CacheStore;
use crate::error::{ServiceError, ServiceResult};
use crate::rpc::response::{
    self, CompanyInfo, FinancialMetrics, HistoricalDataPoint, StockPrice, StockSearchResult,
};
use crate::rpc::{RpcError, SharedRpcClient};

const PRICE_TTL_SECS: u64 = 60;
const HISTORICAL_TTL_SECS: u64 = 60 * 60;
const SEARCH_TTL_SECS: u64 = 15 * 60;
const COMPANY_TTL_SECS: u64 = 24 * 60 * 60;
const METRICS_TTL_SECS: u64 = 60 * 60;

fn price_key(ticker: &str) -> String {
    format!("stock:price:{ticker}")
}

fn historical_key(ticker: &str, start: &str, end: &str) -> String {
    format!("stock:historical:{ticker}:{start}:{end}")
}

fn search_key(query_lower: &str) -> String {
    format!("stock:search:{query_lower}")
}

fn company_key(ticker: &str) -> String {
    format!("stock:company:{ticker}")
}

fn metrics_key(ticker: &str) -> String {
    format!("stock:metrics:{ticker}")
}

pub struct StockDataService {
    cache: Arc<dyn CacheStore>,
    rpc: SharedRpcClient,
}

impl StockDataService {
    pub fn new(cache: Arc<dyn CacheStore>, rpc: SharedRpcClient) -> Self {
        Self { cache, rpc }
    }

    pub async fn get_current_price(&self, ticker: &str) -> ServiceResult<StockPrice> {
        let key = price_key(ticker);

        if let Some(cached) = self.cache.get(&key).await.unwrap_or(None) {
            if let Ok(price) = serde_json::from_str::<StockPrice>(&cached) {
                return Ok(price);
            }
        }

        match self.fetch_price(ticker).await {
            Ok(price) => {
                let serialized = serde_json::to_string(&price).unwrap_or_default();
                let _ = self.cache.setex_with_fallback(&key, PRICE_TTL_SECS, &serialized).await;
                Ok(price)
            }
            Err(err) => {
                warn!(ticker, error = %err, "price fetch failed, attempting stale read");
                if let Some(stale) = self.cache.get_stale(&key).await.unwrap_or(None) {
                    if let Ok(price) = serde_json::from_str::<StockPrice>(&stale) {
                        return Ok(price);
                    }
                }
                Err(ServiceError::unavailable(format!("price unavailable for {ticker}")))
            }
        }
    }

    async fn fetch_price(&self, ticker: &str) -> Result<StockPrice, RpcError> {
        let data = self.rpc.execute("get_stock_price", json!({ "ticker": ticker })).await?;
        StockPrice::from_data(ticker, &data)
    }

    /// Fan out concurrently; tickers whose individual call failed are omitted
    /// rather than failing the whole batch (§4.4).
    pub async fn get_batch_prices(&self, tickers: &[String]) -> HashMap<String, StockPrice> {
        let futures = tickers.iter().map(|t| self.get_current_price(t));
        let results = join_all(futures).await;
        tickers
            .iter()
            .cloned()
            .zip(results)
            .filter_map(|(ticker, result)| result.ok().map(|price| (ticker, price)))
            .collect()
    }

    pub async fn get_historical_data(
        &self,
        ticker: &str,
        start: &str,
        end: &str,
    ) -> ServiceResult<Vec<HistoricalDataPoint>> {
        let key = historical_key(ticker, start, end);
        if let Some(cached) = self.cache.get(&key).await.unwrap_or(None) {
            if let Ok(points) = serde_json::from_str::<Vec<HistoricalDataPoint>>(&cached) {
                return Ok(points);
            }
        }

        let data = self
            .rpc
            .execute("get_historical_data", json!({ "ticker": ticker, "start": start, "end": end }))
            .await
            .map_err(|e| ServiceError::unavailable(e.to_string()))?;
        let points = response::parse_historical(&data).map_err(|e| ServiceError::validation(e.to_string()))?;

        let serialized = serde_json::to_string(&points).unwrap_or_default();
        let _ = self.cache.setex(&key, HISTORICAL_TTL_SECS, &serialized).await;
        Ok(points)
    }

    pub async fn search_stocks(&self, query: &str, limit: Option<usize>) -> ServiceResult<Vec<StockSearchResult>> {
        let query_lower = query.to_lowercase();
        let key = search_key(&query_lower);
        let cacheable = query_lower.len() >= 3;

        if cacheable {
            if let Some(cached) = self.cache.get(&key).await.unwrap_or(None) {
                if let Ok(results) = serde_json::from_str::<Vec<StockSearchResult>>(&cached) {
                    return Ok(Self::apply_limit(results, limit));
                }
            }
        }

        let data = self
            .rpc
            .execute("search_stocks", json!({ "query": query }))
            .await
            .map_err(|e| ServiceError::unavailable(e.to_string()))?;
        let mut results = response::parse_search_results(&data).map_err(|e| ServiceError::validation(e.to_string()))?;
        Self::rerank(&mut results, &query_lower);

        if cacheable && !results.is_empty() {
            let serialized = serde_json::to_string(&results).unwrap_or_default();
            let _ = self.cache.setex(&key, SEARCH_TTL_SECS, &serialized).await;
        }

        Ok(Self::apply_limit(results, limit))
    }

    fn rerank(results: &mut [StockSearchResult], query_lower: &str) {
        for result in results.iter_mut() {
            let ticker_lower = result.ticker.to_lowercase();
            result.relevance_score = if ticker_lower == query_lower {
                3.0
            } else if ticker_lower.starts_with(query_lower) {
                2.0
            } else {
                1.0
            };
        }
        results.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());
    }

    fn apply_limit(mut results: Vec<StockSearchResult>, limit: Option<usize>) -> Vec<StockSearchResult> {
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        results
    }

    pub async fn get_company_info(&self, ticker: &str) -> ServiceResult<CompanyInfo> {
        let key = company_key(ticker);
        if let Some(cached) = self.cache.get(&key).await.unwrap_or(None) {
            if let Ok(info) = serde_json::from_str::<CompanyInfo>(&cached) {
                return Ok(info);
            }
        }

        let data = self
            .rpc
            .execute("get_company_info", json!({ "ticker": ticker }))
            .await
            .map_err(|e| ServiceError::unavailable(e.to_string()))?;
        let info = CompanyInfo::from_data(&data).map_err(|e| ServiceError::validation(e.to_string()))?;

        let serialized = serde_json::to_string(&info).unwrap_or_default();
        let _ = self.cache.setex(&key, COMPANY_TTL_SECS, &serialized).await;
        Ok(info)
    }

    pub async fn get_financial_metrics(&self, ticker: &str) -> ServiceResult<FinancialMetrics> {
        let key = metrics_key(ticker);
        if let Some(cached) = self.cache.get(&key).await.unwrap_or(None) {
            if let Ok(metrics) = serde_json::from_str::<FinancialMetrics>(&cached) {
                return Ok(metrics);
            }
        }

        let data = self
            .rpc
            .execute("get_financial_metrics", json!({ "ticker": ticker }))
            .await
            .map_err(|e| ServiceError::unavailable(e.to_string()))?;
        let metrics = FinancialMetrics::from_data(ticker, &data);

        let serialized = serde_json::to_string(&metrics).unwrap_or_default();
        let _ = self.cache.setex(&key, METRICS_TTL_SECS, &serialized).await;
        Ok(metrics)
    }

    pub async fn invalidate(&self, ticker: &str) {
        let _ = self.cache.delete(&price_key(ticker)).await;
        let _ = self.cache.delete(&company_key(ticker)).await;
        let _ = self.cache.delete(&metrics_key(ticker)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::response::StockSearchResult;

    fn search_result(ticker: &str) -> StockSearchResult {
        StockSearchResult {
            ticker: ticker.to_string(),
            company_name: String::new(),
            exchange: String::new(),
            relevance_score: 0.0,
        }
    }

    #[test]
    fn rerank_favors_exact_over_prefix_over_fuzzy() {
        let mut results = vec![search_result("AAPLX"), search_result("AA"), search_result("AAPL")];
        StockDataService::rerank(&mut results, "aapl");
        assert_eq!(results[0].ticker, "AAPL");
        assert_eq!(results[0].relevance_score, 3.0);
    }

    #[test]
    fn limit_applies_after_rerank() {
        let results = vec![search_result("A"), search_result("B"), search_result("C")];
        let limited = StockDataService::apply_limit(results, Some(2));
        assert_eq!(limited.len(), 2);
    }
}
