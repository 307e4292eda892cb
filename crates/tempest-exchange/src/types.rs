//! Wire types for the event-exchange REST API.
//!
//! Prices on the wire are integer cents (1..=99). Missing orderbook sides
//! come back as `null` and stay `None` here; the market provider treats
//! such markets as ineligible.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A listed contract from the markets endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMarket {
    pub ticker: String,
    pub series_ticker: String,
    /// Temperature cutoff defining YES (°F).
    pub strike: f64,
    /// "above" or "below".
    pub direction: String,
    /// Local settlement date, ISO `YYYY-MM-DD`.
    pub event_date: String,
    /// "open", "closed", or "settled".
    pub status: String,
    pub close_time: DateTime<Utc>,
    pub yes_bid: Option<i64>,
    pub yes_ask: Option<i64>,
    pub no_bid: Option<i64>,
    pub no_ask: Option<i64>,
    #[serde(default)]
    pub volume: i64,
    #[serde(default)]
    pub open_interest: i64,
}

impl ApiMarket {
    pub fn is_open(&self) -> bool {
        self.status == "open"
    }
}

/// Response wrapper for the markets listing.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketsResponse {
    pub markets: Vec<ApiMarket>,
}

/// Best-of-book quote for one contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiQuote {
    pub ticker: String,
    pub yes_bid: Option<i64>,
    pub yes_ask: Option<i64>,
    pub no_bid: Option<i64>,
    pub no_ask: Option<i64>,
    #[serde(default)]
    pub volume: i64,
    #[serde(default)]
    pub open_interest: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Acknowledgement for a submitted order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderAck {
    pub exchange_order_id: String,
    pub client_order_id: String,
    /// "resting", "filled", "partial", or "rejected".
    pub status: String,
    #[serde(default)]
    pub filled_quantity: i64,
}

/// Acknowledgement for a cancellation.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelAck {
    pub exchange_order_id: String,
    /// Quantity that remained unfilled at cancel time.
    #[serde(default)]
    pub canceled_quantity: i64,
}

/// An open order as the exchange sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub exchange_order_id: String,
    /// Our idempotency handle; absent for orders placed out-of-band.
    pub client_order_id: Option<String>,
    pub ticker: String,
    /// "yes" or "no".
    pub side: String,
    pub quantity: i64,
    pub remaining_quantity: i64,
    pub price_cents: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A position as the exchange sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub ticker: String,
    pub side: String,
    pub quantity: i64,
    pub avg_price_cents: f64,
}

/// A fill event from the fills endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeFill {
    pub fill_id: String,
    pub exchange_order_id: String,
    pub client_order_id: Option<String>,
    pub ticker: String,
    pub side: String,
    pub quantity: i64,
    pub price_cents: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub fees: Decimal,
    pub filled_at: DateTime<Utc>,
}

/// Request body for order placement. Limit orders only.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderRequest {
    pub client_order_id: String,
    pub ticker: String,
    pub side: String,
    pub quantity: i64,
    pub limit_price_cents: i64,
    /// Always "limit"; the engine never sends market orders.
    pub order_type: &'static str,
}

impl PlaceOrderRequest {
    pub fn limit(
        client_order_id: String,
        ticker: String,
        side: String,
        quantity: i64,
        limit_price_cents: i64,
    ) -> Self {
        Self {
            client_order_id,
            ticker,
            side,
            quantity,
            limit_price_cents,
            order_type: "limit",
        }
    }
}
