// =============================================================================
// RpcClient — HTTP client to a single downstream "tool server"
// =============================================================================
//
// One instance per downstream server (stock-data, news, market-data). Owns a
// keep-alive reqwest pool, signs requests with an optional bearer token, and
// wraps every call in a CircuitBreaker + Retrier. Mirrors the construction
// style of the teacher's `BinanceClient` (builder with default headers, a
// single shared `reqwest::Client`, `#[instrument]`-worthy logging).
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitOpenError};
use super::response::{RpcError, RpcResponse};
use super::retry::{execute_with_retry, RetryConfig};

#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub pool_size: usize,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl RpcClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            pool_size: 10,
            request_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// HTTP client to one downstream tool server.
pub struct RpcClient {
    config: RpcClientConfig,
    client: reqwest::Client,
    breaker: CircuitBreaker,
    connected: Mutex<bool>,
    tools_cache: OnceCell<Vec<ToolDescriptor>>,
}

impl RpcClient {
    pub fn new(config: RpcClientConfig) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            if let Ok(val) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(reqwest::header::AUTHORIZATION, val);
            }
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(config.pool_size / 2)
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build reqwest client");

        let breaker = CircuitBreaker::new(config.circuit_breaker.clone());

        Self {
            config,
            client,
            breaker,
            connected: Mutex::new(false),
            tools_cache: OnceCell::new(),
        }
    }

    /// Warm the pool and verify liveness with `GET /`.
    pub async fn connect(&self) -> Result<(), RpcError> {
        if *self.connected.lock() {
            return Ok(());
        }
        let url = self.config.base_url.clone();
        self.client.get(&url).send().await.map_err(|e| RpcError::Connection {
            tool: "connect".into(),
            message: e.to_string(),
        })?;
        *self.connected.lock() = true;
        debug!(base_url = %self.config.base_url, "rpc client connected");
        Ok(())
    }

    pub fn disconnect(&self) {
        *self.connected.lock() = false;
    }

    /// List available tools, cached in-memory after first success.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, RpcError> {
        if let Some(cached) = self.tools_cache.get() {
            return Ok(cached.clone());
        }

        let url = format!("{}/tools", self.config.base_url);
        let resp = self.client.get(&url).send().await.map_err(|e| RpcError::Connection {
            tool: "list_tools".into(),
            message: e.to_string(),
        })?;
        let body: Value = resp.json().await.map_err(|e| RpcError::Validation {
            tool: "list_tools".into(),
            message: e.to_string(),
        })?;

        let tools: Vec<ToolDescriptor> = body
            .get("tools")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| {
                        let name = t.get("name")?.as_str()?.to_string();
                        let description = t.get("description").and_then(Value::as_str).map(String::from);
                        Some(ToolDescriptor { name, description })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let _ = self.tools_cache.set(tools.clone());
        Ok(tools)
    }

    /// Execute `tool` with `params`, guarded by the circuit breaker and retry
    /// policy. This is the one entry point services call.
    #[instrument(skip(self, params), fields(tool = %tool))]
    pub async fn execute(&self, tool: &str, params: Value) -> Result<Value, RpcError> {
        let breaker_result = self
            .breaker
            .execute(|| async {
                execute_with_retry(
                    &self.config.retry,
                    || self.execute_once(tool, &params),
                    RpcError::is_retryable,
                    None,
                )
                .await
                .map_err(|exhausted| exhausted.last_error)
            })
            .await;

        match breaker_result {
            Err(CircuitOpenError) => Err(RpcError::CircuitOpen { tool: tool.to_string() }),
            Ok(inner) => inner,
        }
    }

    async fn execute_once(&self, tool: &str, params: &Value) -> Result<Value, RpcError> {
        let url = format!("{}/tools/{}", self.config.base_url, tool);

        let resp = self.client.post(&url).json(params).send().await.map_err(|e| {
            if e.is_timeout() {
                RpcError::Connection { tool: tool.to_string(), message: format!("timeout: {e}") }
            } else {
                RpcError::Connection { tool: tool.to_string(), message: e.to_string() }
            }
        })?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(RpcError::Connection {
                tool: tool.to_string(),
                message: format!("server error {status}"),
            });
        }
        if status.is_client_error() {
            return Err(RpcError::Tool {
                tool: tool.to_string(),
                message: format!("client error {status}"),
            });
        }

        let envelope: RpcResponse = resp.json().await.map_err(|e| RpcError::Validation {
            tool: tool.to_string(),
            message: format!("decode error: {e}"),
        })?;

        if !envelope.success {
            return Err(RpcError::Tool {
                tool: tool.to_string(),
                message: envelope.error.unwrap_or_else(|| "unknown error".into()),
            });
        }

        Ok(envelope.data)
    }

    pub fn circuit_stats(&self) -> super::circuit_breaker::CircuitStats {
        self.breaker.stats()
    }
}

pub type SharedRpcClient = Arc<RpcClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_are_sane() {
        let config = RpcClientConfig::new("http://localhost:9000");
        assert_eq!(config.pool_size, 10);
        assert!(config.retry.max_attempts > 0);
    }
}
