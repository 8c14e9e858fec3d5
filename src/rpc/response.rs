// =============================================================================
// RPC envelope and per-tool decoders
// =============================================================================
//
// Downstream tool servers speak schemaless JSON (`{success, data, error}`).
// Decoders here pin each tool's response shape and resolve the camelCase /
// snake_case aliasing §6 requires on read.
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transport-level failure classification the retry layer relies on.
#[derive(Debug, thiserror::Error, Clone)]
pub enum RpcError {
    #[error("connection error calling {tool}: {message}")]
    Connection { tool: String, message: String },

    #[error("circuit open for {tool}")]
    CircuitOpen { tool: String },

    #[error("tool error calling {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("validation error decoding response from {tool}: {message}")]
    Validation { tool: String, message: String },
}

impl RpcError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Connection { .. })
    }
}

/// Envelope returned by every `/tools/{name}` call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<String>,
}

fn field<'a>(v: &'a Value, snake: &str, camel: &str) -> Option<&'a Value> {
    v.get(snake).or_else(|| v.get(camel))
}

fn parse_timestamp(v: &Value, snake: &str, camel: &str) -> DateTime<Utc> {
    field(v, snake, camel)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockPrice {
    pub ticker: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

impl StockPrice {
    pub fn from_data(ticker: &str, data: &Value) -> Result<Self, RpcError> {
        let err = |msg: &str| RpcError::Validation {
            tool: "get_stock_price".into(),
            message: msg.into(),
        };
        let price = field(data, "price", "price").and_then(Value::as_f64).ok_or_else(|| err("missing price"))?;
        if price < 0.0 {
            return Err(err("price must be non-negative"));
        }
        let volume = field(data, "volume", "volume").and_then(Value::as_u64).unwrap_or(0);
        Ok(StockPrice {
            ticker: ticker.to_string(),
            price,
            change: field(data, "change", "change").and_then(Value::as_f64).unwrap_or(0.0),
            change_percent: field(data, "change_percent", "changePercent").and_then(Value::as_f64).unwrap_or(0.0),
            volume,
            timestamp: parse_timestamp(data, "timestamp", "timestamp"),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalDataPoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

pub fn parse_historical(data: &Value) -> Result<Vec<HistoricalDataPoint>, RpcError> {
    let err = |msg: &str| RpcError::Validation {
        tool: "get_historical_data".into(),
        message: msg.into(),
    };
    let arr = data.as_array().ok_or_else(|| err("expected array"))?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        let date_str = item.get("date").and_then(Value::as_str).ok_or_else(|| err("missing date"))?;
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|_| err("bad date format"))?;
        let close = item.get("close").and_then(Value::as_f64).ok_or_else(|| err("missing close"))?;
        if close < 0.0 {
            return Err(err("close must be non-negative"));
        }
        out.push(HistoricalDataPoint {
            date,
            open: item.get("open").and_then(Value::as_f64).unwrap_or(0.0),
            high: item.get("high").and_then(Value::as_f64).unwrap_or(0.0),
            low: item.get("low").and_then(Value::as_f64).unwrap_or(0.0),
            close,
            volume: item.get("volume").and_then(Value::as_u64).unwrap_or(0),
        });
    }
    out.sort_by_key(|p| p.date);
    Ok(out)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub industry: String,
    pub market_cap: f64,
    pub description: String,
}

impl CompanyInfo {
    pub fn from_data(data: &Value) -> Result<Self, RpcError> {
        let err = |msg: &str| RpcError::Validation { tool: "get_company_info".into(), message: msg.into() };
        Ok(CompanyInfo {
            ticker: field(data, "ticker", "ticker").and_then(Value::as_str).ok_or_else(|| err("missing ticker"))?.to_string(),
            name: field(data, "name", "name").and_then(Value::as_str).unwrap_or_default().to_string(),
            sector: field(data, "sector", "sector").and_then(Value::as_str).unwrap_or_default().to_string(),
            industry: field(data, "industry", "industry").and_then(Value::as_str).unwrap_or_default().to_string(),
            market_cap: field(data, "market_cap", "marketCap").and_then(Value::as_f64).unwrap_or(0.0),
            description: field(data, "description", "description").and_then(Value::as_str).unwrap_or_default().to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub ticker: String,
    pub pe_ratio: Option<f64>,
    pub eps: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub beta: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
}

impl FinancialMetrics {
    pub fn from_data(ticker: &str, data: &Value) -> Self {
        FinancialMetrics {
            ticker: ticker.to_string(),
            pe_ratio: field(data, "pe_ratio", "peRatio").and_then(Value::as_f64),
            eps: field(data, "eps", "eps").and_then(Value::as_f64),
            dividend_yield: field(data, "dividend_yield", "dividendYield").and_then(Value::as_f64),
            beta: field(data, "beta", "beta").and_then(Value::as_f64),
            fifty_two_week_high: field(data, "fifty_two_week_high", "fiftyTwoWeekHigh").and_then(Value::as_f64),
            fifty_two_week_low: field(data, "fifty_two_week_low", "fiftyTwoWeekLow").and_then(Value::as_f64),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSearchResult {
    pub ticker: String,
    pub company_name: String,
    pub exchange: String,
    #[serde(default)]
    pub relevance_score: f64,
}

pub fn parse_search_results(data: &Value) -> Result<Vec<StockSearchResult>, RpcError> {
    let err = |msg: &str| RpcError::Validation { tool: "search_stocks".into(), message: msg.into() };
    let arr = data.as_array().ok_or_else(|| err("expected array"))?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        out.push(StockSearchResult {
            ticker: field(item, "ticker", "ticker").and_then(Value::as_str).ok_or_else(|| err("missing ticker"))?.to_string(),
            company_name: field(item, "company_name", "companyName").and_then(Value::as_str).unwrap_or_default().to_string(),
            exchange: field(item, "exchange", "exchange").and_then(Value::as_str).unwrap_or_default().to_string(),
            relevance_score: 0.0,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketIndex {
    pub name: String,
    pub symbol: String,
    pub value: f64,
    pub change: f64,
    pub change_percent: f64,
}

pub fn parse_indices(data: &Value) -> Result<Vec<MarketIndex>, RpcError> {
    let err = |msg: &str| RpcError::Validation { tool: "get_market_indices".into(), message: msg.into() };
    let arr = data.as_array().ok_or_else(|| err("expected array"))?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        out.push(MarketIndex {
            name: field(item, "name", "name").and_then(Value::as_str).unwrap_or_default().to_string(),
            symbol: field(item, "symbol", "symbol").and_then(Value::as_str).unwrap_or_default().to_string(),
            value: field(item, "value", "value").and_then(Value::as_f64).unwrap_or(0.0),
            change: field(item, "change", "change").and_then(Value::as_f64).unwrap_or(0.0),
            change_percent: field(item, "change_percent", "changePercent").and_then(Value::as_f64).unwrap_or(0.0),
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub headline: String,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<crate::services::sentiment::SentimentScore>,
}

pub fn parse_news(data: &Value) -> Result<Vec<NewsArticle>, RpcError> {
    let err = |msg: &str| RpcError::Validation { tool: "get_stock_news".into(), message: msg.into() };
    let arr = data.as_array().ok_or_else(|| err("expected array"))?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        out.push(NewsArticle {
            id: field(item, "id", "id").and_then(Value::as_str).unwrap_or_default().to_string(),
            headline: field(item, "headline", "headline").and_then(Value::as_str).unwrap_or_default().to_string(),
            source: field(item, "source", "source").and_then(Value::as_str).unwrap_or_default().to_string(),
            url: field(item, "url", "url").and_then(Value::as_str).unwrap_or_default().to_string(),
            published_at: parse_timestamp(item, "published_at", "publishedAt"),
            summary: field(item, "summary", "summary").and_then(Value::as_str).unwrap_or_default().to_string(),
            sentiment: None,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingTicker {
    pub ticker: String,
    pub company_name: String,
    pub news_count: u64,
    pub reason: String,
    pub price: Option<f64>,
    pub change_percent: Option<f64>,
    pub volume: Option<u64>,
}

pub fn parse_trending(data: &Value) -> Result<Vec<TrendingTicker>, RpcError> {
    let err = |msg: &str| RpcError::Validation { tool: "get_trending_tickers".into(), message: msg.into() };
    let arr = data.as_array().ok_or_else(|| err("expected array"))?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        out.push(TrendingTicker {
            ticker: field(item, "ticker", "ticker").and_then(Value::as_str).ok_or_else(|| err("missing ticker"))?.to_string(),
            company_name: field(item, "company_name", "companyName").and_then(Value::as_str).unwrap_or_default().to_string(),
            news_count: field(item, "news_count", "newsCount").and_then(Value::as_u64).unwrap_or(0),
            reason: field(item, "reason", "reason").and_then(Value::as_str).unwrap_or_default().to_string(),
            price: field(item, "price", "price").and_then(Value::as_f64),
            change_percent: field(item, "change_percent", "changePercent").and_then(Value::as_f64),
            volume: field(item, "volume", "volume").and_then(Value::as_u64),
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorPerformance {
    pub sector: String,
    pub change_percent: f64,
    pub top_performers: Vec<String>,
    pub bottom_performers: Vec<String>,
}

pub fn parse_sectors(data: &Value) -> Result<Vec<SectorPerformance>, RpcError> {
    let err = |msg: &str| RpcError::Validation { tool: "get_sector_performance".into(), message: msg.into() };
    let arr = data.as_array().ok_or_else(|| err("expected array"))?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        out.push(SectorPerformance {
            sector: item.get("sector").and_then(Value::as_str).unwrap_or_default().to_string(),
            change_percent: item.get("change_percent").and_then(Value::as_f64).unwrap_or(0.0),
            top_performers: item
                .get("top_performers")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
            bottom_performers: item
                .get("bottom_performers")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stock_price_accepts_camel_case() {
        let data = json!({"price": 150.25, "changePercent": 1.2, "volume": 1000, "timestamp": "2024-01-01T00:00:00Z"});
        let price = StockPrice::from_data("AAPL", &data).unwrap();
        assert_eq!(price.change_percent, 1.2);
    }

    #[test]
    fn stock_price_rejects_negative_price() {
        let data = json!({"price": -1.0});
        assert!(StockPrice::from_data("AAPL", &data).is_err());
    }

    #[test]
    fn historical_sorts_ascending() {
        let data = json!([
            {"date": "2024-01-03", "close": 3.0},
            {"date": "2024-01-01", "close": 1.0},
            {"date": "2024-01-02", "close": 2.0},
        ]);
        let points = parse_historical(&data).unwrap();
        assert!(points.windows(2).all(|w| w[0].date < w[1].date));
    }
}
