//! REST client for the event exchange.
//!
//! The `ExchangeClient` trait is the surface the trading core consumes;
//! `RestExchangeClient` is the production implementation. Paper trading is
//! the same client pointed at the exchange's paper base URL.
//!
//! Retry policy: transport errors and 5xx responses retry with exponential
//! backoff (base 500 ms, cap 4 s, 3 attempts). 4xx never retries; 401/403
//! map to auth errors, which pause the order path upstream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use tempest_common::{CoreError, TokenBucket};

use crate::auth::RequestSigner;
use crate::types::{
    ApiMarket, ApiQuote, CancelAck, ExchangeFill, ExchangeOrder, ExchangePosition,
    MarketsResponse, OrderAck, PlaceOrderRequest,
};

const API_PREFIX: &str = "/trade-api/v2";
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(4);

/// The exchange surface consumed by the trading core.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Contracts in a series settling on `event_date`.
    async fn list_markets(
        &self,
        series: &str,
        event_date: NaiveDate,
    ) -> Result<Vec<ApiMarket>, CoreError>;

    /// Best-of-book quote for one contract.
    async fn get_orderbook(&self, ticker: &str) -> Result<ApiQuote, CoreError>;

    /// Submit a limit order. The `client_order_id` enables exchange-side
    /// de-duplication.
    async fn place_order(&self, request: PlaceOrderRequest) -> Result<OrderAck, CoreError>;

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<CancelAck, CoreError>;

    async fn list_open_orders(&self) -> Result<Vec<ExchangeOrder>, CoreError>;

    async fn list_positions(&self) -> Result<Vec<ExchangePosition>, CoreError>;

    /// Fills strictly after `since`, oldest first.
    async fn list_fills(&self, since: DateTime<Utc>) -> Result<Vec<ExchangeFill>, CoreError>;
}

/// Configuration for the REST client.
#[derive(Debug, Clone)]
pub struct RestClientConfig {
    /// Base URL; the paper endpoint is a different host, same paths.
    pub base_url: String,
    /// Hard per-call timeout.
    pub timeout: Duration,
    /// Requests per second.
    pub rate_limit: f64,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example-exchange.com".to_string(),
            timeout: Duration::from_secs(10),
            rate_limit: 10.0,
        }
    }
}

/// Production REST implementation.
pub struct RestExchangeClient {
    http: Client,
    base_url: String,
    signer: RequestSigner,
    limiter: Arc<TokenBucket>,
}

impl RestExchangeClient {
    pub fn new(config: RestClientConfig, signer: RequestSigner) -> Result<Self, CoreError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CoreError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            signer,
            limiter: Arc::new(TokenBucket::new("exchange", config.rate_limit)),
        })
    }

    /// Issue a request with the standard retry policy and parse the body.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Result<T, CoreError> {
        let url = match query {
            Some(q) => format!("{}{}?{}", self.base_url, path, q),
            None => format!("{}{}", self.base_url, path),
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.limiter.acquire().await;

            // The signature covers timestamp, method, and path (no query).
            let headers =
                self.signer
                    .headers(method.as_str(), path, Utc::now().timestamp_millis())?;

            let mut req = self.http.request(method.clone(), &url).headers(headers);
            if let Some(ref b) = body {
                req = req.json(b);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<T>().await.map_err(|e| {
                            CoreError::DataValidation(format!("{} {}: {}", method, path, e))
                        });
                    }

                    let code = status.as_u16();
                    if code == 401 || code == 403 {
                        return Err(CoreError::Auth(format!("{} {}: {}", method, path, code)));
                    }
                    if status.is_server_error() {
                        if attempt < MAX_ATTEMPTS {
                            let backoff = backoff_delay(attempt);
                            warn!(%method, path, code, attempt, "server error, retrying");
                            tokio::time::sleep(backoff).await;
                            continue;
                        }
                        return Err(CoreError::TransientNetwork(format!(
                            "{} {}: {} after {} attempts",
                            method, path, code, attempt
                        )));
                    }

                    let text = resp.text().await.unwrap_or_default();
                    return Err(CoreError::PermanentApi {
                        status: code,
                        message: text,
                    });
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < MAX_ATTEMPTS => {
                    let backoff = backoff_delay(attempt);
                    warn!(%method, path, attempt, error = %e, "transport error, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Exponential backoff: 500 ms, 1 s, 2 s, ... capped at 4 s.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE * 2u32.saturating_pow(attempt.saturating_sub(1));
    exp.min(BACKOFF_CAP)
}

#[derive(Debug, Deserialize)]
struct OrdersResponse {
    orders: Vec<ExchangeOrder>,
}

#[derive(Debug, Deserialize)]
struct PositionsResponse {
    positions: Vec<ExchangePosition>,
}

#[derive(Debug, Deserialize)]
struct FillsResponse {
    fills: Vec<ExchangeFill>,
}

#[async_trait]
impl ExchangeClient for RestExchangeClient {
    async fn list_markets(
        &self,
        series: &str,
        event_date: NaiveDate,
    ) -> Result<Vec<ApiMarket>, CoreError> {
        let query = format!(
            "series_ticker={}&event_date={}&status=open",
            series,
            event_date.format("%Y-%m-%d")
        );
        let resp: MarketsResponse = self
            .request(Method::GET, &format!("{}/markets", API_PREFIX), Some(&query), None)
            .await?;
        debug!(series, count = resp.markets.len(), "listed markets");
        Ok(resp.markets)
    }

    async fn get_orderbook(&self, ticker: &str) -> Result<ApiQuote, CoreError> {
        self.request(
            Method::GET,
            &format!("{}/markets/{}/orderbook", API_PREFIX, ticker),
            None,
            None,
        )
        .await
    }

    async fn place_order(&self, request: PlaceOrderRequest) -> Result<OrderAck, CoreError> {
        let body = serde_json::to_value(&request)
            .map_err(|e| CoreError::DataValidation(format!("order encode: {}", e)))?;
        self.request(Method::POST, &format!("{}/orders", API_PREFIX), None, Some(body))
            .await
    }

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<CancelAck, CoreError> {
        self.request(
            Method::DELETE,
            &format!("{}/orders/{}", API_PREFIX, exchange_order_id),
            None,
            None,
        )
        .await
    }

    async fn list_open_orders(&self) -> Result<Vec<ExchangeOrder>, CoreError> {
        let resp: OrdersResponse = self
            .request(
                Method::GET,
                &format!("{}/orders", API_PREFIX),
                Some("status=open"),
                None,
            )
            .await?;
        Ok(resp.orders)
    }

    async fn list_positions(&self) -> Result<Vec<ExchangePosition>, CoreError> {
        let resp: PositionsResponse = self
            .request(Method::GET, &format!("{}/positions", API_PREFIX), None, None)
            .await?;
        Ok(resp.positions)
    }

    async fn list_fills(&self, since: DateTime<Utc>) -> Result<Vec<ExchangeFill>, CoreError> {
        let query = format!("min_ts={}", since.timestamp_millis());
        let resp: FillsResponse = self
            .request(Method::GET, &format!("{}/fills", API_PREFIX), Some(&query), None)
            .await?;
        Ok(resp.fills)
    }
}
