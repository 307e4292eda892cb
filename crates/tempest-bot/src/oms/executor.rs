//! Order execution abstraction.
//!
//! The OMS hands finished orders to an `Executor`:
//! - `ShadowExecutor` never touches the exchange; it simulates an
//!   immediate fill at the ask.
//! - `ExchangeExecutor` submits limit orders to the paper or live
//!   endpoint through the exchange client. Live construction requires the
//!   explicit startup confirmation flag.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use tempest_common::{CoreError, Mode, OrderStatus};
use tempest_exchange::{ExchangeClient, PlaceOrderRequest};

use super::order::Order;

/// Result of handing an order to an executor.
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    Accepted {
        exchange_order_id: Option<String>,
        status: OrderStatus,
        filled_quantity: i64,
        fill_price_cents: Option<i64>,
    },
    Rejected {
        reason: String,
    },
}

/// Submits and cancels concrete orders.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Submit a limit order. `market_ask` is the current ask for the
    /// order's side, used by simulated fills.
    async fn submit(
        &self,
        order: &Order,
        market_ask: Option<i64>,
    ) -> Result<ExecutionResult, CoreError>;

    async fn cancel(&self, order: &Order) -> Result<(), CoreError>;
}

/// Shadow mode: no orders leave the process; fills simulate at the ask.
#[derive(Debug, Default)]
pub struct ShadowExecutor;

impl ShadowExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for ShadowExecutor {
    async fn submit(
        &self,
        order: &Order,
        market_ask: Option<i64>,
    ) -> Result<ExecutionResult, CoreError> {
        let fill_price = market_ask.unwrap_or(order.limit_price_cents);
        info!(
            ticker = %order.ticker,
            side = %order.side,
            quantity = order.quantity,
            price = fill_price,
            "shadow fill"
        );
        Ok(ExecutionResult::Accepted {
            exchange_order_id: Some(format!("shadow-{}", Uuid::new_v4())),
            status: OrderStatus::Filled,
            filled_quantity: order.quantity,
            fill_price_cents: Some(fill_price),
        })
    }

    async fn cancel(&self, _order: &Order) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Paper/live execution through the exchange client.
pub struct ExchangeExecutor {
    client: Arc<dyn ExchangeClient>,
    mode: Mode,
}

impl ExchangeExecutor {
    /// Live mode refuses to construct without the startup confirmation
    /// flag; there is no later override.
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        mode: Mode,
        confirm_live: bool,
    ) -> Result<Self, CoreError> {
        if mode == Mode::Live && !confirm_live {
            return Err(CoreError::Config(
                "live mode requires --confirm-live at startup".into(),
            ));
        }
        Ok(Self { client, mode })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn map_ack_status(status: &str) -> OrderStatus {
        match status {
            "filled" => OrderStatus::Filled,
            "partial" => OrderStatus::Partial,
            "rejected" => OrderStatus::Rejected,
            // Anything else rests on the book.
            _ => OrderStatus::Resting,
        }
    }
}

#[async_trait]
impl Executor for ExchangeExecutor {
    async fn submit(
        &self,
        order: &Order,
        _market_ask: Option<i64>,
    ) -> Result<ExecutionResult, CoreError> {
        let request = PlaceOrderRequest::limit(
            order.client_order_id.clone(),
            order.ticker.clone(),
            order.side.as_str().to_lowercase(),
            order.quantity,
            order.limit_price_cents,
        );

        let started = Utc::now();
        let ack = self.client.place_order(request).await?;
        info!(
            ticker = %order.ticker,
            exchange_order_id = %ack.exchange_order_id,
            status = %ack.status,
            latency_ms = (Utc::now() - started).num_milliseconds(),
            mode = %self.mode,
            "order submitted"
        );

        let status = Self::map_ack_status(&ack.status);
        if status == OrderStatus::Rejected {
            return Ok(ExecutionResult::Rejected {
                reason: format!("exchange rejected {}", ack.exchange_order_id),
            });
        }
        Ok(ExecutionResult::Accepted {
            exchange_order_id: Some(ack.exchange_order_id),
            status,
            filled_quantity: ack.filled_quantity,
            fill_price_cents: None,
        })
    }

    async fn cancel(&self, order: &Order) -> Result<(), CoreError> {
        let exchange_id = order.exchange_order_id.as_deref().ok_or_else(|| {
            CoreError::DataValidation(format!(
                "{}: cancel without exchange order id",
                order.client_order_id
            ))
        })?;
        self.client.cancel_order(exchange_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempest_common::Outcome;

    fn order() -> Order {
        Order::new(
            "k".repeat(64),
            1,
            "HIGHNYC-26FEB10-B70".into(),
            "NYC".into(),
            Outcome::Yes,
            10,
            71,
            71,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_shadow_fills_at_ask() {
        let executor = ShadowExecutor::new();
        let result = executor.submit(&order(), Some(48)).await.unwrap();
        match result {
            ExecutionResult::Accepted {
                status,
                filled_quantity,
                fill_price_cents,
                exchange_order_id,
            } => {
                assert_eq!(status, OrderStatus::Filled);
                assert_eq!(filled_quantity, 10);
                assert_eq!(fill_price_cents, Some(48));
                assert!(exchange_order_id.unwrap().starts_with("shadow-"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shadow_falls_back_to_limit_price() {
        let executor = ShadowExecutor::new();
        let result = executor.submit(&order(), None).await.unwrap();
        match result {
            ExecutionResult::Accepted {
                fill_price_cents, ..
            } => assert_eq!(fill_price_cents, Some(71)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ack_status_mapping() {
        assert_eq!(ExchangeExecutor::map_ack_status("filled"), OrderStatus::Filled);
        assert_eq!(ExchangeExecutor::map_ack_status("partial"), OrderStatus::Partial);
        assert_eq!(ExchangeExecutor::map_ack_status("rejected"), OrderStatus::Rejected);
        assert_eq!(ExchangeExecutor::map_ack_status("resting"), OrderStatus::Resting);
        assert_eq!(ExchangeExecutor::map_ack_status("queued"), OrderStatus::Resting);
    }
}
