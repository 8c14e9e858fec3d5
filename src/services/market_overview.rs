// =============================================================================
// MarketOverviewService — C7
// =============================================================================
//
// Composite artifact cached under `market:overview` for 15 min; sector
// heatmap is excluded from the cached payload (§4.5). Sentiment aggregation
// is the six-step algorithm of §4.5, grounded line-for-line in
// `market_overview_service.py::_calculate_market_sentiment`.
// =============================================================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::cache::CacheStore;
use crate::error::ServiceResult;
use crate::rpc::response::{self, MarketIndex, NewsArticle, SectorPerformance, TrendingTicker};
use crate::rpc::SharedRpcClient;
use crate::services::sentiment::{label_for_score, SentimentLabel, SentimentScore};

use super::news::NewsService;

const OVERVIEW_TTL_SECS: u64 = 15 * 60;
const OVERVIEW_KEY: &str = "market:overview";
const INDICES_TTL_SECS: u64 = 60;
const SECTORS_TTL_SECS: u64 = 15 * 60;
const TRENDING_TTL_SECS: u64 = 15 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOverview {
    pub headlines: Vec<NewsArticle>,
    pub sentiment: SentimentScore,
    pub trending: Vec<TrendingTicker>,
    pub indices: Vec<MarketIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_heatmap: Option<Vec<SectorPerformance>>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

pub struct MarketOverviewService {
    cache: Arc<dyn CacheStore>,
    rpc: SharedRpcClient,
    news: Arc<NewsService>,
}

impl MarketOverviewService {
    pub fn new(cache: Arc<dyn CacheStore>, rpc: SharedRpcClient, news: Arc<NewsService>) -> Self {
        Self { cache, rpc, news }
    }

    /// `include_sector_heatmap` is a caller-side switch, never a cache-state
    /// decision: the heatmap is always fetched fresh and never persisted in
    /// the cached overview payload.
    pub async fn get_overview(&self, include_sector_heatmap: bool) -> ServiceResult<MarketOverview> {
        let mut overview = if let Some(cached) = self.cache.get(OVERVIEW_KEY).await.unwrap_or(None) {
            serde_json::from_str::<MarketOverview>(&cached).ok()
        } else {
            None
        };

        if overview.is_none() {
            overview = Some(self.assemble_overview().await?);
            if let Some(ref built) = overview {
                let serialized = serde_json::to_string(built).unwrap_or_default();
                let _ = self.cache.setex(OVERVIEW_KEY, OVERVIEW_TTL_SECS, &serialized).await;
            }
        }

        let mut overview = overview.expect("assembled above");
        if include_sector_heatmap {
            overview.sector_heatmap = self.get_sector_performance().await.ok();
        } else {
            overview.sector_heatmap = None;
        }
        Ok(overview)
    }

    async fn assemble_overview(&self) -> ServiceResult<MarketOverview> {
        let headlines = self.news.get_market_news(None).await?;
        let indices = self.get_indices().await?;

        let trending = match self.get_trending_tickers().await {
            Ok(t) => t,
            Err(err) => {
                warn!(error = %err, "trending ticker fetch failed, omitting from overview");
                Vec::new()
            }
        };

        let sentiment = aggregate_sentiment(&headlines, &indices);

        Ok(MarketOverview {
            headlines,
            sentiment,
            trending,
            indices,
            sector_heatmap: None,
            last_updated: chrono::Utc::now(),
        })
    }

    pub async fn get_indices(&self) -> ServiceResult<Vec<MarketIndex>> {
        let key = "market:indices";
        if let Some(cached) = self.cache.get(key).await.unwrap_or(None) {
            if let Ok(indices) = serde_json::from_str::<Vec<MarketIndex>>(&cached) {
                return Ok(indices);
            }
        }
        let data = self
            .rpc
            .execute("get_market_indices", json!({}))
            .await
            .map_err(|e| crate::error::ServiceError::unavailable(e.to_string()))?;
        let indices = response::parse_indices(&data).map_err(|e| crate::error::ServiceError::validation(e.to_string()))?;
        let serialized = serde_json::to_string(&indices).unwrap_or_default();
        let _ = self.cache.setex(key, INDICES_TTL_SECS, &serialized).await;
        Ok(indices)
    }

    pub async fn get_sector_performance(&self) -> ServiceResult<Vec<SectorPerformance>> {
        let key = "market:sectors";
        if let Some(cached) = self.cache.get(key).await.unwrap_or(None) {
            if let Ok(sectors) = serde_json::from_str::<Vec<SectorPerformance>>(&cached) {
                return Ok(sectors);
            }
        }
        let data = self
            .rpc
            .execute("get_sector_performance", json!({}))
            .await
            .map_err(|e| crate::error::ServiceError::unavailable(e.to_string()))?;
        let sectors = response::parse_sectors(&data).map_err(|e| crate::error::ServiceError::validation(e.to_string()))?;
        let serialized = serde_json::to_string(&sectors).unwrap_or_default();
        let _ = self.cache.setex(key, SECTORS_TTL_SECS, &serialized).await;
        Ok(sectors)
    }

    pub async fn get_trending_tickers(&self) -> ServiceResult<Vec<TrendingTicker>> {
        let key = "market:trending";
        if let Some(cached) = self.cache.get(key).await.unwrap_or(None) {
            if let Ok(trending) = serde_json::from_str::<Vec<TrendingTicker>>(&cached) {
                return Ok(trending);
            }
        }
        let data = self
            .rpc
            .execute("get_trending_tickers", json!({}))
            .await
            .map_err(|e| crate::error::ServiceError::unavailable(e.to_string()))?;
        let trending = response::parse_trending(&data).map_err(|e| crate::error::ServiceError::validation(e.to_string()))?;
        let serialized = serde_json::to_string(&trending).unwrap_or_default();
        let _ = self.cache.setex(key, TRENDING_TTL_SECS, &serialized).await;
        Ok(trending)
    }
}

/// Six-step market sentiment aggregation (§4.5).
pub fn aggregate_sentiment(articles: &[NewsArticle], indices: &[MarketIndex]) -> SentimentScore {
    let scored: Vec<SentimentScore> = articles
        .iter()
        .map(|a| a.sentiment.unwrap_or_else(|| crate::services::sentiment::score_text(&a.headline)))
        .collect();

    if scored.is_empty() {
        return SentimentScore { label: SentimentLabel::Neutral, score: 0.0, confidence: 0.0 };
    }

    let confidence_sum: f64 = scored.iter().map(|s| s.confidence).sum();
    let (mut score, mut confidence) = if confidence_sum > 0.0 {
        let weighted_score = scored.iter().map(|s| s.score * s.confidence).sum::<f64>() / confidence_sum;
        let mean_confidence = confidence_sum / scored.len() as f64;
        (weighted_score, mean_confidence)
    } else {
        (0.0, 0.0)
    };

    if !indices.is_empty() {
        let avg_market_percent = indices.iter().map(|i| i.change_percent).sum::<f64>() / indices.len() as f64;
        let news_bucket = label_for_score(score);
        // Market-direction bucketing uses the raw percent change against the same
        // neutral threshold as sentiment score (matching the original's hardcoded
        // 0.1 cutoff on `avg_market_change`, not the -1..1-scaled signal).
        let market_bucket = label_for_score(avg_market_percent);

        let news_nonneutral = news_bucket != SentimentLabel::Neutral;
        let market_nonneutral = market_bucket != SentimentLabel::Neutral;

        if news_nonneutral && market_nonneutral {
            if news_bucket == market_bucket {
                let boost = (score.abs().min((avg_market_percent / 100.0).abs()) * 2.0).min(0.20);
                confidence = (confidence + boost).min(1.0);
                score = 0.85 * score + 0.15 * (avg_market_percent / 100.0);
            } else {
                let penalty = (score.abs() * 0.5).min(0.10);
                confidence = (confidence - penalty).max(0.0);
            }
        }
    }

    SentimentScore { label: label_for_score(score), score, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article_with_sentiment(score: f64, confidence: f64) -> NewsArticle {
        NewsArticle {
            id: uuid::Uuid::new_v4().to_string(),
            headline: String::new(),
            source: String::new(),
            url: String::new(),
            published_at: Utc::now(),
            summary: String::new(),
            sentiment: Some(SentimentScore { label: label_for_score(score), score, confidence }),
        }
    }

    fn index(change_percent: f64) -> MarketIndex {
        MarketIndex {
            name: "S&P 500".into(),
            symbol: "SPX".into(),
            value: 0.0,
            change: 0.0,
            change_percent,
        }
    }

    #[test]
    fn aligned_positive_boosts_confidence_and_nudges_score() {
        let articles = vec![article_with_sentiment(0.3, 0.6)];
        let indices = vec![index(1.1), index(0.7)];
        let result = aggregate_sentiment(&articles, &indices);
        assert_eq!(result.label, SentimentLabel::Positive);
        assert!(result.confidence > 0.6);
    }

    #[test]
    fn misaligned_buckets_reduce_confidence() {
        let articles = vec![article_with_sentiment(0.3, 0.6)];
        let indices = vec![index(-1.0), index(-0.8)];
        let result = aggregate_sentiment(&articles, &indices);
        assert!(result.confidence < 0.6);
    }

    #[test]
    fn empty_articles_yield_neutral_zero_confidence() {
        let result = aggregate_sentiment(&[], &[]);
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert_eq!(result.confidence, 0.0);
    }
}
