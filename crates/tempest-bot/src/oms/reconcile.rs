//! Reconciliation: replaying exchange-authoritative facts into local state.
//!
//! Two forms:
//! - Startup: compare the exchange's open orders against the local table
//!   by client_order_id. Unknown exchange orders import as orphans under a
//!   synthetic intent; local actives missing from the exchange close as
//!   stale. Any mismatch raises the operator alert and, from the CLI
//!   `reconcile` command, exit code 2.
//! - In-cycle: fetch fills since the last cursor, walk each through the
//!   order state machine, build fill rows, update positions, advance the
//!   cursor. Runs at the start of every cycle, before risk checks.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use tempest_common::{CoreError, FillRecord, OrderStatus, Outcome};
use tempest_exchange::{ExchangeClient, ExchangeFill, ExchangeOrder};

use super::intent::import_key;
use super::manager::Oms;
use super::order::Order;
use crate::positions::PositionBook;

/// Result of startup reconciliation.
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    /// Exchange orders matched to local records.
    pub matched: usize,
    /// Exchange orders with no local record, imported as orphans.
    pub imported_orphans: Vec<String>,
    /// Local active orders absent from the exchange, closed as stale.
    pub closed_stale: Vec<String>,
}

impl StartupReport {
    /// Any orphan or stale order is a mismatch worth an operator look.
    pub fn has_mismatch(&self) -> bool {
        !self.imported_orphans.is_empty() || !self.closed_stale.is_empty()
    }
}

/// Result of an in-cycle fill sync.
#[derive(Debug, Clone, Default)]
pub struct FillSyncReport {
    pub fills: Vec<FillRecord>,
    /// Fills whose client_order_id matched nothing locally.
    pub orphaned_fills: usize,
    /// Orders that reached a terminal fill state this sync.
    pub filled_orders: Vec<String>,
    pub new_cursor: Option<DateTime<Utc>>,
}

/// Reconcile local orders against the exchange's open orders at startup.
pub async fn startup_reconcile(
    oms: &Oms,
    exchange: &dyn ExchangeClient,
    now: DateTime<Utc>,
) -> Result<StartupReport, CoreError> {
    let open_orders = exchange.list_open_orders().await?;
    let mut report = StartupReport::default();

    for exchange_order in &open_orders {
        match exchange_order
            .client_order_id
            .as_deref()
            .and_then(|id| oms.get_by_client_id(id))
        {
            Some(local) => {
                report.matched += 1;
                // The exchange says it rests; bring a lagging local
                // record forward. Invalid edges are logged, not fatal.
                if local.status == OrderStatus::Submitted {
                    if let Err(e) =
                        oms.apply_status(&local.client_order_id, OrderStatus::Resting, now)
                    {
                        error!(client_order_id = %local.client_order_id, error = %e,
                            "startup status sync failed");
                    }
                }
            }
            None => {
                let order = import_orphan(exchange_order, now);
                warn!(
                    exchange_order_id = %exchange_order.exchange_order_id,
                    ticker = %exchange_order.ticker,
                    "importing orphan exchange order"
                );
                report
                    .imported_orphans
                    .push(exchange_order.exchange_order_id.clone());
                oms.insert_existing(order);
            }
        }
    }

    // Local actives the exchange no longer knows: close as stale.
    let exchange_ids: Vec<&str> = open_orders
        .iter()
        .filter_map(|o| o.client_order_id.as_deref())
        .collect();
    for local in oms.active_orders() {
        // NEW orders were never submitted; the exchange cannot know them.
        if local.status == OrderStatus::New {
            continue;
        }
        if !exchange_ids.contains(&local.client_order_id.as_str()) {
            info!(
                client_order_id = %local.client_order_id,
                "local order missing on exchange, closing as RECONCILE_STALE"
            );
            if let Err(e) = oms.apply_status(&local.client_order_id, OrderStatus::Canceled, now) {
                error!(client_order_id = %local.client_order_id, error = %e,
                    "stale close failed");
                continue;
            }
            report.closed_stale.push(local.client_order_id);
        }
    }

    if report.has_mismatch() {
        warn!(
            orphans = report.imported_orphans.len(),
            stale = report.closed_stale.len(),
            "reconciliation mismatch, operator attention required"
        );
    }

    Ok(report)
}

/// Build the local record for an orphan exchange order: RESTING, under a
/// synthetic intent derived from the exchange order id. No cancel is
/// issued — the order may be legitimate manual activity.
fn import_orphan(exchange_order: &ExchangeOrder, now: DateTime<Utc>) -> Order {
    let side = Outcome::from_str(&exchange_order.side).unwrap_or(Outcome::Yes);
    let mut order = Order::new(
        import_key(&exchange_order.exchange_order_id),
        1,
        exchange_order.ticker.clone(),
        city_from_ticker(&exchange_order.ticker),
        side,
        exchange_order.quantity,
        exchange_order.price_cents,
        exchange_order.price_cents,
        exchange_order.created_at,
    );
    order.exchange_order_id = Some(exchange_order.exchange_order_id.clone());
    order.filled_quantity = exchange_order.quantity - exchange_order.remaining_quantity;
    // NEW -> SUBMITTED -> RESTING is the only valid path to a resting
    // import; both edges are in the valid set.
    let _ = order.transition(OrderStatus::Submitted, now);
    let _ = order.transition(OrderStatus::Resting, now);
    order
}

/// Best-effort city extraction from `HIGH<CITY>-...` tickers.
fn city_from_ticker(ticker: &str) -> String {
    ticker
        .strip_prefix("HIGH")
        .and_then(|rest| rest.get(..3))
        .unwrap_or("UNK")
        .to_string()
}

/// Fetch fills since `cursor` and replay them into orders and positions.
/// Mandatory at the start of every cycle.
pub async fn reconcile_fills(
    oms: &Oms,
    exchange: &dyn ExchangeClient,
    book: &mut PositionBook,
    cursor: DateTime<Utc>,
) -> Result<FillSyncReport, CoreError> {
    let fills = exchange.list_fills(cursor).await?;
    let mut report = FillSyncReport::default();

    for fill in fills {
        let record = match apply_one_fill(oms, &fill) {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(
                    exchange_order_id = %fill.exchange_order_id,
                    ticker = %fill.ticker,
                    "orphaned fill: no matching local order"
                );
                report.orphaned_fills += 1;
                advance(&mut report.new_cursor, fill.filled_at);
                continue;
            }
            Err(e) => {
                // A state-machine violation is a programming error: log,
                // record, skip the order. Never crash the loop.
                error!(
                    exchange_order_id = %fill.exchange_order_id,
                    error = %e,
                    "fill replay failed"
                );
                advance(&mut report.new_cursor, fill.filled_at);
                continue;
            }
        };

        book.apply_fill(&record);
        if let Some(client_id) = fill.client_order_id.as_deref() {
            if let Some(order) = oms.get_by_client_id(client_id) {
                if order.status == OrderStatus::Filled {
                    report.filled_orders.push(client_id.to_string());
                }
            }
        }
        advance(&mut report.new_cursor, record.filled_at);
        report.fills.push(record);
    }

    if !report.fills.is_empty() || report.orphaned_fills > 0 {
        info!(
            fills = report.fills.len(),
            orphans = report.orphaned_fills,
            "fill reconciliation complete"
        );
    }

    Ok(report)
}

/// Replay one exchange fill into the order table. Returns the fill row,
/// or `None` when no local order matches.
fn apply_one_fill(oms: &Oms, fill: &ExchangeFill) -> Result<Option<FillRecord>, CoreError> {
    let Some(client_id) = fill.client_order_id.as_deref() else {
        return Ok(None);
    };
    let Some(order) = oms.get_by_client_id(client_id) else {
        return Ok(None);
    };

    oms.apply_fill(client_id, fill.quantity, fill.filled_at)?;

    Ok(Some(FillRecord {
        client_order_id: client_id.to_string(),
        ticker: fill.ticker.clone(),
        city_code: order.city_code.clone(),
        side: Outcome::from_str(&fill.side).unwrap_or(order.side),
        filled_at: fill.filled_at,
        quantity: fill.quantity,
        price_cents: fill.price_cents,
        fees: fill.fees,
        realized_pnl: None,
    }))
}

fn advance(cursor: &mut Option<DateTime<Utc>>, at: DateTime<Utc>) {
    match cursor {
        Some(current) if *current >= at => {}
        _ => *cursor = Some(at),
    }
}
