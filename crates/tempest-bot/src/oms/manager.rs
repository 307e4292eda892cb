//! Order management: idempotent submission, cancel/replace policy, and
//! the single-writer order table.
//!
//! All mutations of the order table go through `Oms` methods; readers get
//! snapshots. For a given (intent_key, version) there is at most one
//! order, and a cycle that finds an existing active order for an intent
//! returns it instead of placing another.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, warn};

use tempest_common::{CoreError, OrderStatus};

use super::executor::{ExecutionResult, Executor};
use super::intent::Intent;
use super::order::Order;
use crate::config::OmsSettings;

/// What the strategy/risk pipeline wants placed.
#[derive(Debug, Clone)]
pub struct OrderPlan {
    pub intent: Intent,
    pub quantity: i64,
    pub limit_price_cents: i64,
    /// Current ask for the chosen side, for simulated fills.
    pub market_ask: Option<i64>,
}

/// Outcome of a submission attempt.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// A new order was placed (it may already be filled in shadow mode).
    Placed(Order),
    /// An active order for the intent already exists; nothing was placed.
    Existing(Order),
    /// The executor or exchange rejected the order.
    Rejected(Order, String),
}

impl SubmitOutcome {
    pub fn order(&self) -> &Order {
        match self {
            SubmitOutcome::Placed(o) => o,
            SubmitOutcome::Existing(o) => o,
            SubmitOutcome::Rejected(o, _) => o,
        }
    }

    pub fn is_placed(&self) -> bool {
        matches!(self, SubmitOutcome::Placed(_))
    }
}

/// Outcome of a cancel/replace attempt.
#[derive(Debug, Clone)]
pub enum ReplaceOutcome {
    Replaced(Order),
    /// Throttled by the reprice interval.
    TooSoon,
    /// The new price would exceed the chase bound.
    ChaseBoundExceeded,
    NoActiveOrder,
}

/// The order management system.
pub struct Oms {
    executor: Arc<dyn Executor>,
    settings: OmsSettings,
    /// Orders keyed by client_order_id.
    orders: DashMap<String, Order>,
    /// Latest client_order_id per intent_key.
    latest: DashMap<String, String>,
    /// Last cancel/replace time per intent_key.
    last_reprice: DashMap<String, DateTime<Utc>>,
}

impl Oms {
    pub fn new(executor: Arc<dyn Executor>, settings: OmsSettings) -> Self {
        Self {
            executor,
            settings,
            orders: DashMap::new(),
            latest: DashMap::new(),
            last_reprice: DashMap::new(),
        }
    }

    /// Rehydrate the table from previously persisted orders (startup).
    pub fn insert_existing(&self, order: Order) {
        self.latest
            .insert(order.intent_key.clone(), order.client_order_id.clone());
        self.orders.insert(order.client_order_id.clone(), order);
    }

    /// The latest order for an intent, if any.
    pub fn latest_order(&self, intent_key: &str) -> Option<Order> {
        let client_id = self.latest.get(intent_key)?.clone();
        self.orders.get(&client_id).map(|o| o.clone())
    }

    /// The latest order for an intent, if it is still active.
    pub fn active_order(&self, intent_key: &str) -> Option<Order> {
        self.latest_order(intent_key).filter(|o| o.is_active())
    }

    pub fn get_by_client_id(&self, client_order_id: &str) -> Option<Order> {
        self.orders.get(client_order_id).map(|o| o.clone())
    }

    pub fn orders_snapshot(&self) -> Vec<Order> {
        self.orders.iter().map(|e| e.value().clone()).collect()
    }

    pub fn active_orders(&self) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|e| e.value().is_active())
            .map(|e| e.value().clone())
            .collect()
    }

    /// Submit an order for an intent, idempotently. Submitting the same
    /// intent twice in one cycle yields exactly one order.
    pub async fn submit(&self, plan: OrderPlan, now: DateTime<Utc>) -> Result<SubmitOutcome, CoreError> {
        let intent_key = plan.intent.key();

        if let Some(existing) = self.active_order(&intent_key) {
            info!(
                intent = %short(&intent_key),
                client_order_id = %existing.client_order_id,
                status = %existing.status,
                "intent already has an active order"
            );
            return Ok(SubmitOutcome::Existing(existing));
        }

        // Version continues from any prior (canceled/rejected) attempt.
        let (version, original_price) = match self.latest_order(&intent_key) {
            Some(prior) => (prior.version + 1, prior.original_price_cents),
            None => (1, plan.limit_price_cents),
        };

        let mut order = Order::new(
            intent_key.clone(),
            version,
            plan.intent.ticker.clone(),
            plan.intent.city_code.clone(),
            plan.intent.side,
            plan.quantity,
            plan.limit_price_cents,
            original_price,
            now,
        );

        match self.executor.submit(&order, plan.market_ask).await {
            Ok(ExecutionResult::Accepted {
                exchange_order_id,
                status,
                filled_quantity,
                fill_price_cents: _,
            }) => {
                order.exchange_order_id = exchange_order_id;
                order.transition(OrderStatus::Submitted, now)?;
                match status {
                    OrderStatus::Filled => {
                        order.apply_fill(order.quantity, now)?;
                    }
                    OrderStatus::Partial if filled_quantity > 0 => {
                        order.apply_fill(filled_quantity, now)?;
                    }
                    OrderStatus::Resting => {
                        order.transition(OrderStatus::Resting, now)?;
                    }
                    _ => {}
                }
                self.store(order.clone());
                Ok(SubmitOutcome::Placed(order))
            }
            Ok(ExecutionResult::Rejected { reason }) => {
                order.transition(OrderStatus::Rejected, now)?;
                self.store(order.clone());
                warn!(
                    intent = %short(&intent_key),
                    reason = %reason,
                    "order rejected"
                );
                Ok(SubmitOutcome::Rejected(order, reason))
            }
            Err(e) => {
                // The submission never reached an ack; record the attempt
                // as rejected locally and surface the error.
                let _ = order.transition(OrderStatus::Rejected, now);
                self.store(order);
                Err(e)
            }
        }
    }

    /// Cancel and re-place the active order for an intent at a new price.
    /// Throttled by `reprice_interval` and bounded by `max_chase_cents`
    /// cumulative movement from the original price.
    pub async fn cancel_replace(
        &self,
        intent_key: &str,
        new_price_cents: i64,
        market_ask: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ReplaceOutcome, CoreError> {
        let Some(active) = self.active_order(intent_key) else {
            return Ok(ReplaceOutcome::NoActiveOrder);
        };

        if let Some(last) = self.last_reprice.get(intent_key) {
            let elapsed = now - *last;
            let interval = chrono::Duration::from_std(self.settings.reprice_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(120));
            if elapsed < interval {
                return Ok(ReplaceOutcome::TooSoon);
            }
        }

        let chase = (new_price_cents - active.original_price_cents).abs();
        if chase > self.settings.max_chase_cents {
            return Ok(ReplaceOutcome::ChaseBoundExceeded);
        }

        self.cancel(intent_key, now).await?;
        self.last_reprice.insert(intent_key.to_string(), now);

        let mut order = Order::new(
            active.intent_key.clone(),
            active.version + 1,
            active.ticker.clone(),
            active.city_code.clone(),
            active.side,
            active.remaining_quantity(),
            new_price_cents,
            active.original_price_cents,
            now,
        );

        match self.executor.submit(&order, market_ask).await {
            Ok(ExecutionResult::Accepted {
                exchange_order_id,
                status,
                filled_quantity,
                ..
            }) => {
                order.exchange_order_id = exchange_order_id;
                order.transition(OrderStatus::Submitted, now)?;
                match status {
                    OrderStatus::Filled => order.apply_fill(order.quantity, now)?,
                    OrderStatus::Partial if filled_quantity > 0 => {
                        order.apply_fill(filled_quantity, now)?
                    }
                    OrderStatus::Resting => order.transition(OrderStatus::Resting, now)?,
                    _ => {}
                }
                self.store(order.clone());
                Ok(ReplaceOutcome::Replaced(order))
            }
            Ok(ExecutionResult::Rejected { .. }) => {
                order.transition(OrderStatus::Rejected, now)?;
                self.store(order.clone());
                Ok(ReplaceOutcome::Replaced(order))
            }
            Err(e) => {
                let _ = order.transition(OrderStatus::Rejected, now);
                self.store(order);
                Err(e)
            }
        }
    }

    /// Cancel the active order for an intent, if any.
    pub async fn cancel(&self, intent_key: &str, now: DateTime<Utc>) -> Result<(), CoreError> {
        let Some(mut active) = self.active_order(intent_key) else {
            return Ok(());
        };
        if active.exchange_order_id.is_some() {
            self.executor.cancel(&active).await?;
        }
        active.transition(OrderStatus::Canceled, now)?;
        self.store(active);
        Ok(())
    }

    /// Apply a reconciliation-sourced status to an order by client id.
    /// Invalid transitions are logged and skipped — never fatal.
    pub fn apply_status(
        &self,
        client_order_id: &str,
        next: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, CoreError> {
        let Some(mut entry) = self.orders.get_mut(client_order_id) else {
            return Ok(None);
        };
        if entry.status == next {
            return Ok(Some(entry.clone()));
        }
        entry.transition(next, now)?;
        Ok(Some(entry.clone()))
    }

    /// Fold a reconciliation-sourced fill into an order by client id.
    pub fn apply_fill(
        &self,
        client_order_id: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, CoreError> {
        let Some(mut entry) = self.orders.get_mut(client_order_id) else {
            return Ok(None);
        };
        entry.apply_fill(quantity, now)?;
        Ok(Some(entry.clone()))
    }

    fn store(&self, order: Order) {
        self.latest
            .insert(order.intent_key.clone(), order.client_order_id.clone());
        self.orders.insert(order.client_order_id.clone(), order);
    }
}

fn short(key: &str) -> &str {
    &key[..key.len().min(12)]
}
