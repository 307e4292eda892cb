//! Order domain type with validated state transitions.
//!
//! An order is one concrete attempt to realize an intent. Status changes
//! go through `transition`, which enforces the state machine: an invalid
//! edge returns `InvalidTransition` and leaves the order untouched.

use chrono::{DateTime, Utc};

use tempest_common::{CoreError, OrderRecord, OrderStatus, Outcome};

use super::intent::client_order_id;

/// One concrete attempt to realize an intent.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub intent_key: String,
    /// Increments when an intent is re-placed after a cancel.
    pub version: u32,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub ticker: String,
    pub city_code: String,
    pub side: Outcome,
    pub quantity: i64,
    pub filled_quantity: i64,
    pub limit_price_cents: i64,
    /// Price of version 1; cancel/replace may not chase further than
    /// `max_chase_cents` from here.
    pub original_price_cents: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        intent_key: String,
        version: u32,
        ticker: String,
        city_code: String,
        side: Outcome,
        quantity: i64,
        limit_price_cents: i64,
        original_price_cents: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let client_id = client_order_id(&intent_key, version);
        Self {
            intent_key,
            version,
            client_order_id: client_id,
            exchange_order_id: None,
            ticker,
            city_code,
            side,
            quantity,
            filled_quantity: 0,
            limit_price_cents,
            original_price_cents,
            status: OrderStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a validated status transition. Invalid edges fail without
    /// mutating the order.
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Fold in a fill of `quantity` contracts, transitioning to PARTIAL or
    /// FILLED as appropriate.
    pub fn apply_fill(&mut self, quantity: i64, now: DateTime<Utc>) -> Result<(), CoreError> {
        let new_filled = self.filled_quantity + quantity;
        let next = if new_filled >= self.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::Partial
        };
        // A second partial while already PARTIAL is not an edge.
        if next == OrderStatus::Partial && self.status == OrderStatus::Partial {
            self.updated_at = now;
        } else {
            self.transition(next, now)?;
        }
        self.filled_quantity = new_filled;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn remaining_quantity(&self) -> i64 {
        (self.quantity - self.filled_quantity).max(0)
    }

    /// Rehydrate from a persisted row. Fill progress is not persisted on
    /// the order row; reconciliation restores it from fills.
    pub fn from_record(record: &OrderRecord) -> Self {
        Self {
            intent_key: record.intent_key.clone(),
            version: record.intent_version,
            client_order_id: record.client_order_id.clone(),
            exchange_order_id: record.exchange_order_id.clone(),
            ticker: record.ticker.clone(),
            city_code: record.city_code.clone(),
            side: record.side,
            quantity: record.quantity,
            filled_quantity: 0,
            limit_price_cents: record.limit_price_cents,
            original_price_cents: record.limit_price_cents,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    /// The persisted row for the order's current state.
    pub fn to_record(&self) -> OrderRecord {
        OrderRecord {
            intent_key: self.intent_key.clone(),
            intent_version: self.version,
            client_order_id: self.client_order_id.clone(),
            exchange_order_id: self.exchange_order_id.clone(),
            ticker: self.ticker.clone(),
            city_code: self.city_code.clone(),
            side: self.side,
            quantity: self.quantity,
            limit_price_cents: self.limit_price_cents,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
