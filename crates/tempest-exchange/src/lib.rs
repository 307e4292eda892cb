//! REST client for the regulated event-market exchange.
//!
//! This crate contains:
//! - The `ExchangeClient` trait consumed by the trading core
//! - The production REST implementation with signing, rate limiting, and
//!   bounded retries (5xx only)
//! - Wire types for markets, quotes, orders, fills, and positions

pub mod auth;
pub mod client;
pub mod types;

pub use auth::{Credentials, RequestSigner};
pub use client::{ExchangeClient, RestClientConfig, RestExchangeClient};
pub use types::{
    ApiMarket, ApiQuote, CancelAck, ExchangeFill, ExchangeOrder, ExchangePosition,
    MarketsResponse, OrderAck, PlaceOrderRequest,
};
