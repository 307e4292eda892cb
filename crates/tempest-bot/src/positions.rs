//! Position bookkeeping and exposure aggregation.
//!
//! `PositionBook` folds fills into per-(market, side) positions. Exposure
//! helpers aggregate open dollars by city and cluster; the risk engine
//! consumes them through the combined position list the loop assembles
//! (persisted positions plus the in-cycle accumulator).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use tempest_common::{cities, Cluster, FillRecord, Outcome, PositionRecord};

/// Builds an open-position entry for an order admitted this cycle, so
/// later sizing decisions in the same cycle see it.
pub fn position_from_order(
    ticker: &str,
    city_code: &str,
    side: Outcome,
    quantity: i64,
    limit_price_cents: i64,
    now: DateTime<Utc>,
) -> PositionRecord {
    PositionRecord {
        ticker: ticker.to_string(),
        city_code: city_code.to_string(),
        side,
        quantity_open: quantity,
        avg_entry_cents: limit_price_cents as f64,
        avg_exit_cents: None,
        realized_pnl: Decimal::ZERO,
        status: "OPEN".to_string(),
        opened_at: now,
        closed_at: None,
    }
}

/// Open dollars in one city across the given positions.
pub fn city_exposure(positions: &[PositionRecord], city_code: &str) -> Decimal {
    positions
        .iter()
        .filter(|p| p.city_code == city_code)
        .map(|p| p.exposure_dollars())
        .sum()
}

/// Open dollars in one cluster across the given positions. Positions for
/// unknown cities contribute nothing.
pub fn cluster_exposure(positions: &[PositionRecord], cluster: Cluster) -> Decimal {
    positions
        .iter()
        .filter(|p| {
            cities::get(&p.city_code)
                .map(|c| c.cluster == cluster)
                .unwrap_or(false)
        })
        .map(|p| p.exposure_dollars())
        .sum()
}

/// Per-(ticker, side) position aggregation.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: HashMap<(String, Outcome), PositionRecord>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate from persisted records (startup reconciliation).
    pub fn from_records(records: Vec<PositionRecord>) -> Self {
        let mut book = Self::new();
        for record in records {
            book.positions
                .insert((record.ticker.clone(), record.side), record);
        }
        book
    }

    /// Fold a buy fill into the book, creating or extending the position
    /// with a weighted average entry price. Returns the updated record.
    pub fn apply_fill(&mut self, fill: &FillRecord) -> PositionRecord {
        let key = (fill.ticker.clone(), fill.side);
        let position = self
            .positions
            .entry(key)
            .and_modify(|p| {
                let prev_qty = p.quantity_open;
                let new_qty = prev_qty + fill.quantity;
                if new_qty > 0 {
                    p.avg_entry_cents = (p.avg_entry_cents * prev_qty as f64
                        + fill.price_cents as f64 * fill.quantity as f64)
                        / new_qty as f64;
                }
                p.quantity_open = new_qty;
            })
            .or_insert_with(|| PositionRecord {
                ticker: fill.ticker.clone(),
                city_code: fill.city_code.clone(),
                side: fill.side,
                quantity_open: fill.quantity,
                avg_entry_cents: fill.price_cents as f64,
                avg_exit_cents: None,
                realized_pnl: Decimal::ZERO,
                status: "OPEN".to_string(),
                opened_at: fill.filled_at,
                closed_at: None,
            });
        position.clone()
    }

    /// Close a position at settlement. A winning side pays 100c per
    /// contract; a losing side pays 0.
    pub fn settle(
        &mut self,
        ticker: &str,
        side: Outcome,
        side_won: bool,
        settled_at: DateTime<Utc>,
    ) -> Option<PositionRecord> {
        let position = self.positions.get_mut(&(ticker.to_string(), side))?;
        if !position.is_open() {
            return Some(position.clone());
        }

        let exit_cents = if side_won { 100.0 } else { 0.0 };
        let qty = Decimal::from(position.quantity_open);
        let entry =
            Decimal::try_from(position.avg_entry_cents).unwrap_or(Decimal::ZERO);
        let exit = Decimal::try_from(exit_cents).unwrap_or(Decimal::ZERO);
        position.realized_pnl += qty * (exit - entry) / Decimal::ONE_HUNDRED;
        position.avg_exit_cents = Some(exit_cents);
        position.quantity_open = 0;
        position.status = "CLOSED".to_string();
        position.closed_at = Some(settled_at);
        Some(position.clone())
    }

    pub fn get(&self, ticker: &str, side: Outcome) -> Option<&PositionRecord> {
        self.positions.get(&(ticker.to_string(), side))
    }

    pub fn open_positions(&self) -> Vec<PositionRecord> {
        self.positions
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<PositionRecord> {
        self.positions.values().cloned().collect()
    }

    /// Realized pnl across all positions closed on the given UTC day.
    pub fn realized_pnl_on(&self, day: chrono::NaiveDate) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.closed_at.map(|t| t.date_naive()) == Some(day))
            .map(|p| p.realized_pnl)
            .sum()
    }

    /// Unrealized pnl marking each open position at the provided YES mid
    /// (cents) per ticker. Positions without a mark contribute nothing.
    pub fn unrealized_pnl(&self, marks: &HashMap<String, f64>) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.is_open())
            .filter_map(|p| {
                let yes_mid = *marks.get(&p.ticker)?;
                let mark = match p.side {
                    Outcome::Yes => yes_mid,
                    Outcome::No => 100.0 - yes_mid,
                };
                let qty = Decimal::from(p.quantity_open);
                let entry = Decimal::try_from(p.avg_entry_cents).ok()?;
                let mark = Decimal::try_from(mark).ok()?;
                Some(qty * (mark - entry) / Decimal::ONE_HUNDRED)
            })
            .sum()
    }
}
