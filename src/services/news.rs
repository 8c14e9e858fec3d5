// =============================================================================
// NewsService — C6
// =============================================================================
//
// Per-ticker and market-wide news, deduplicated by normalized headline and
// annotated with sentiment, exactly per §4.5.
// =============================================================================

use std::sync::Arc;

use serde_json::json;

use crate::cache::CacheStore;
use crate::error::{ServiceError, ServiceResult};
use crate::rpc::response::{self, NewsArticle};
use crate::rpc::SharedRpcClient;

use super::sentiment;

const NEWS_TTL_SECS: u64 = 15 * 60;
const DEFAULT_NEWS_LIMIT: usize = 20;

fn ticker_news_key(ticker: &str) -> String {
    format!("news:ticker:{ticker}")
}

fn market_news_key() -> &'static str {
    "news:market"
}

pub struct NewsService {
    cache: Arc<dyn CacheStore>,
    rpc: SharedRpcClient,
}

impl NewsService {
    pub fn new(cache: Arc<dyn CacheStore>, rpc: SharedRpcClient) -> Self {
        Self { cache, rpc }
    }

    pub async fn get_ticker_news(&self, ticker: &str, limit: Option<usize>) -> ServiceResult<Vec<NewsArticle>> {
        let limit = limit.unwrap_or(DEFAULT_NEWS_LIMIT);
        self.get_news(&ticker_news_key(ticker), "get_stock_news", json!({ "ticker": ticker, "limit": limit })).await
    }

    pub async fn get_market_news(&self, limit: Option<usize>) -> ServiceResult<Vec<NewsArticle>> {
        let limit = limit.unwrap_or(DEFAULT_NEWS_LIMIT);
        self.get_news(market_news_key(), "get_market_news", json!({ "limit": limit })).await
    }

    async fn get_news(&self, key: &str, tool: &str, params: serde_json::Value) -> ServiceResult<Vec<NewsArticle>> {
        if let Some(cached) = self.cache.get(key).await.unwrap_or(None) {
            if let Ok(articles) = serde_json::from_str::<Vec<NewsArticle>>(&cached) {
                return Ok(articles);
            }
        }

        let data = self
            .rpc
            .execute(tool, params)
            .await
            .map_err(|e| ServiceError::unavailable(e.to_string()))?;
        let articles = response::parse_news(&data).map_err(|e| ServiceError::validation(e.to_string()))?;
        let articles = annotate_and_dedupe(articles);

        let serialized = serde_json::to_string(&articles).unwrap_or_default();
        let _ = self.cache.setex(key, NEWS_TTL_SECS, &serialized).await;
        Ok(articles)
    }
}

/// Normalize to lowercase + trim + collapse inner whitespace; keep the first
/// article seen for each distinct normalized headline, then attach sentiment.
pub fn annotate_and_dedupe(articles: Vec<NewsArticle>) -> Vec<NewsArticle> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(articles.len());
    for mut article in articles {
        let normalized = normalize_headline(&article.headline);
        if !seen.insert(normalized) {
            continue;
        }
        if article.sentiment.is_none() {
            let text = format!("{} {}", article.headline, article.summary);
            article.sentiment = Some(sentiment::score_text(&text));
        }
        out.push(article);
    }
    out
}

fn normalize_headline(headline: &str) -> String {
    headline.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(headline: &str) -> NewsArticle {
        NewsArticle {
            id: uuid::Uuid::new_v4().to_string(),
            headline: headline.to_string(),
            source: "wire".into(),
            url: String::new(),
            published_at: Utc::now(),
            summary: String::new(),
            sentiment: None,
        }
    }

    #[test]
    fn dedupes_by_normalized_headline() {
        let articles = vec![
            article("Apple   beats estimates"),
            article("apple beats estimates"),
            article("Different headline"),
        ];
        let deduped = annotate_and_dedupe(articles);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn attaches_sentiment_when_missing() {
        let deduped = annotate_and_dedupe(vec![article("Shares surge on record profit")]);
        assert!(deduped[0].sentiment.is_some());
    }
}
