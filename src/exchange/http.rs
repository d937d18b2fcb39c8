//! HMAC-signed REST exchange adapter: circuit breaker, token-bucket rate
//! limiter, bounded exponential-backoff retry — the pattern this codebase
//! has always used for its exchange integrations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::common::{CircuitBreaker, CircuitBreakerConfig, RateLimiter, RateLimiterConfig};
use crate::error::ExchangeError;
use crate::types::{AccountSnapshot, PositionSnapshot, Side};

use super::auth::Credentials;
use super::{ExchangeAdapter, LiveOrder, OrderQuery, OrderStatus};

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub symbol: String,
    pub max_retries: u32,
    pub timeout: Duration,
    pub rate_limiter: RateLimiterConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl HttpClientConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, requests_per_second: usize) -> Self {
        self.rate_limiter = self.rate_limiter.with_rate(requests_per_second);
        self
    }

    pub fn with_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker = self.circuit_breaker.with_failure_threshold(threshold);
        self
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example-exchange.com".to_string(),
            symbol: "BTCINR".to_string(),
            max_retries: 3,
            timeout: Duration::from_secs(5),
            rate_limiter: RateLimiterConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

pub struct HttpExchangeAdapter {
    credentials: Credentials,
    config: HttpClientConfig,
    http: Client,
    circuit_breaker: Arc<Mutex<CircuitBreaker>>,
    rate_limiter: RateLimiter,
}

impl HttpExchangeAdapter {
    pub fn new(credentials: Credentials, config: HttpClientConfig) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .build()
            .expect("failed to build HTTP client");

        Self {
            credentials,
            circuit_breaker: Arc::new(Mutex::new(CircuitBreaker::new(config.circuit_breaker.clone()))),
            rate_limiter: RateLimiter::new(config.rate_limiter.clone()),
            config,
            http,
        }
    }

    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, ExchangeError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ExchangeError>>,
    {
        {
            let mut cb = self.circuit_breaker.lock().await;
            if !cb.can_attempt() {
                return Err(ExchangeError::Transient("circuit breaker open".to_string()));
            }
        }

        self.rate_limiter.acquire().await;

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(2u64.pow(attempt - 1));
                debug!(delay_ms = delay.as_millis() as u64, "retrying exchange call");
                sleep(delay).await;
            }

            match operation().await {
                Ok(result) => {
                    self.circuit_breaker.lock().await.record_success();
                    return Ok(result);
                }
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "transient exchange error");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        self.circuit_breaker.lock().await.record_failure();
        Err(last_error.unwrap_or(ExchangeError::Transient("retries exhausted".to_string())))
    }

    async fn authenticated_post<T, R>(&self, endpoint: &str, body: &T) -> Result<R, ExchangeError>
    where
        T: Serialize,
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let json_body =
            serde_json::to_string(body).map_err(|e| ExchangeError::Transient(e.to_string()))?;
        let signature = self.credentials.sign(&json_body);

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-AUTH-APIKEY", &self.credentials.api_key)
            .header("X-AUTH-SIGNATURE", signature)
            .body(json_body)
            .send()
            .await
            .map_err(|e| ExchangeError::Transient(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::Transient(e.to_string()))?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExchangeError::RateLimited);
        }
        if status.is_server_error() {
            return Err(ExchangeError::Transient(format!("{status}: {text}")));
        }
        if !status.is_success() {
            return Err(classify_rejection(status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| ExchangeError::Transient(e.to_string()))
    }
}

fn classify_rejection(status: u16, body: &str) -> ExchangeError {
    let lower = body.to_lowercase();
    if lower.contains("insufficient") {
        ExchangeError::InsufficientBalance
    } else if lower.contains("precision") {
        ExchangeError::PrecisionViolation
    } else if lower.contains("duplicate") {
        ExchangeError::DuplicateClientOrderId
    } else if status == 404 {
        ExchangeError::NotFound
    } else {
        ExchangeError::Transient(format!("{status}: {body}"))
    }
}

#[derive(Serialize)]
struct PlaceOrderRequest<'a> {
    market: &'a str,
    side: &'static str,
    order_type: &'static str,
    price: f64,
    quantity: f64,
    client_order_id: &'a str,
}

#[derive(Deserialize)]
struct PlaceOrderResponse {
    order_id: String,
}

#[derive(Serialize)]
struct CancelOrderRequest<'a> {
    order_id: &'a str,
}

#[derive(Deserialize)]
struct OrderStatusResponse {
    status: String,
    filled_quantity: f64,
    avg_price: f64,
}

#[derive(Deserialize)]
struct OpenOrderResponse {
    id: String,
    client_order_id: String,
    side: String,
    price: f64,
    total_quantity: f64,
    remaining_quantity: f64,
    status: String,
}

#[derive(Deserialize)]
struct BalanceResponse {
    equity: f64,
    cash: f64,
    unrealized_pnl: f64,
}

#[derive(Deserialize)]
struct PositionResponse {
    long_qty: f64,
    short_qty: f64,
    avg_entry_price: f64,
}

fn parse_status(s: &str) -> OrderStatus {
    match s {
        "open" => OrderStatus::Open,
        "partially_filled" | "partial" => OrderStatus::Partial,
        "filled" => OrderStatus::Filled,
        "cancelled" | "canceled" => OrderStatus::Cancelled,
        "rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    }
}

#[async_trait]
impl ExchangeAdapter for HttpExchangeAdapter {
    async fn place_limit_order(
        &self,
        side: Side,
        price: f64,
        qty: f64,
        client_order_id: &str,
    ) -> Result<String, ExchangeError> {
        let market = self.config.symbol.clone();
        self.execute_with_retry(|| {
            let req = PlaceOrderRequest {
                market: &market,
                side: match side {
                    Side::Buy => "buy",
                    Side::Sell => "sell",
                },
                order_type: "limit_order",
                price,
                quantity: qty,
                client_order_id,
            };
            async move {
                let resp: PlaceOrderResponse =
                    self.authenticated_post("/orders/create", &req).await?;
                Ok(resp.order_id)
            }
        })
        .await
    }

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<(), ExchangeError> {
        self.execute_with_retry(|| {
            let req = CancelOrderRequest {
                order_id: exchange_order_id,
            };
            async move {
                let _: serde_json::Value = self.authenticated_post("/orders/cancel", &req).await?;
                Ok(())
            }
        })
        .await
    }

    async fn query_order(&self, exchange_order_id: &str) -> Result<OrderQuery, ExchangeError> {
        self.execute_with_retry(|| {
            let req = CancelOrderRequest {
                order_id: exchange_order_id,
            };
            async move {
                let resp: OrderStatusResponse =
                    self.authenticated_post("/orders/status", &req).await?;
                Ok(OrderQuery {
                    status: parse_status(&resp.status),
                    filled_qty: resp.filled_quantity,
                    avg_fill_price: resp.avg_price,
                })
            }
        })
        .await
    }

    async fn list_open_orders(&self) -> Result<Vec<LiveOrder>, ExchangeError> {
        let market = self.config.symbol.clone();
        self.execute_with_retry(|| {
            let req = serde_json::json!({ "market": market });
            async move {
                let resp: Vec<OpenOrderResponse> =
                    self.authenticated_post("/orders/active", &req).await?;
                Ok(resp
                    .into_iter()
                    .map(|o| LiveOrder {
                        client_order_id: o.client_order_id,
                        exchange_order_id: o.id,
                        side: if o.side == "buy" { Side::Buy } else { Side::Sell },
                        price: o.price,
                        qty: o.total_quantity,
                        filled_qty: o.total_quantity - o.remaining_quantity,
                        status: parse_status(&o.status),
                    })
                    .collect())
            }
        })
        .await
    }

    async fn get_position(&self) -> Result<PositionSnapshot, ExchangeError> {
        let market = self.config.symbol.clone();
        self.execute_with_retry(|| {
            let req = serde_json::json!({ "market": market });
            async move {
                let resp: PositionResponse = self.authenticated_post("/positions", &req).await?;
                Ok(PositionSnapshot {
                    long_qty: resp.long_qty,
                    short_qty: resp.short_qty,
                    avg_entry_price: resp.avg_entry_price,
                })
            }
        })
        .await
    }

    async fn get_account(&self) -> Result<AccountSnapshot, ExchangeError> {
        self.execute_with_retry(|| {
            let req = serde_json::json!({});
            async move {
                let resp: BalanceResponse = self.authenticated_post("/users/balances", &req).await?;
                Ok(AccountSnapshot {
                    equity: resp.equity,
                    cash: resp.cash,
                    unrealized_pnl: resp.unrealized_pnl,
                })
            }
        })
        .await
    }

    async fn ensure_one_way_mode(&self) -> Result<(), ExchangeError> {
        self.execute_with_retry(|| {
            let req = serde_json::json!({ "mode": "one_way" });
            async move {
                let _: serde_json::Value =
                    self.authenticated_post("/positions/mode", &req).await?;
                Ok(())
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_rejection_reasons() {
        assert_eq!(
            classify_rejection(400, "insufficient balance"),
            ExchangeError::InsufficientBalance
        );
        assert_eq!(
            classify_rejection(400, "duplicate client order id"),
            ExchangeError::DuplicateClientOrderId
        );
        assert_eq!(classify_rejection(404, "not found"), ExchangeError::NotFound);
    }
}
