//! Daily analytics rollups.
//!
//! Pure aggregation over the day's fills and signals, persisted into
//! ReplacingMergeTree tables keyed by day. Recomputing any day from
//! scratch produces the same rows as incremental recomputation — the
//! compute functions are deterministic in their inputs.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::info;

use tempest_common::{
    Action, CityDailyRollup, CoreError, EquityPoint, FillRecord, Repository, SignalRecord,
    StrategyDailyRollup,
};

/// Per-city aggregates for one day.
pub fn city_rollups(
    fills: &[FillRecord],
    day: NaiveDate,
    computed_at: DateTime<Utc>,
) -> Vec<CityDailyRollup> {
    let mut by_city: std::collections::BTreeMap<String, CityDailyRollup> =
        std::collections::BTreeMap::new();
    let day_str = day.format("%Y-%m-%d").to_string();

    for fill in fills {
        let entry = by_city
            .entry(fill.city_code.clone())
            .or_insert_with(|| CityDailyRollup {
                city_code: fill.city_code.clone(),
                day: day_str.clone(),
                trade_count: 0,
                volume_dollars: Decimal::ZERO,
                realized_pnl: Decimal::ZERO,
                win_count: 0,
                loss_count: 0,
                computed_at,
            });
        entry.trade_count += 1;
        entry.volume_dollars +=
            Decimal::from(fill.quantity) * Decimal::from(fill.price_cents) / Decimal::ONE_HUNDRED;
        if let Some(pnl) = fill.realized_pnl {
            entry.realized_pnl += pnl;
            if pnl >= Decimal::ZERO {
                entry.win_count += 1;
            } else {
                entry.loss_count += 1;
            }
        }
    }

    by_city.into_values().collect()
}

/// Per-strategy aggregates for one day.
pub fn strategy_rollups(
    signals: &[SignalRecord],
    fills: &[FillRecord],
    day: NaiveDate,
    computed_at: DateTime<Utc>,
) -> Vec<StrategyDailyRollup> {
    let mut by_strategy: std::collections::BTreeMap<String, (u64, u64, f64)> =
        std::collections::BTreeMap::new();

    for signal in signals {
        let entry = by_strategy
            .entry(signal.strategy_name.clone())
            .or_insert((0, 0, 0.0));
        entry.0 += 1;
        if signal.action == Action::Buy {
            entry.1 += 1;
            entry.2 += signal.edge;
        }
    }

    let realized_total: Decimal = fills.iter().filter_map(|f| f.realized_pnl).sum();
    let day_str = day.format("%Y-%m-%d").to_string();

    by_strategy
        .into_iter()
        .map(
            |(strategy_name, (signal_count, trade_count, edge_sum))| StrategyDailyRollup {
                strategy_name,
                day: day_str.clone(),
                signal_count,
                trade_count,
                avg_realized_edge: if trade_count > 0 {
                    edge_sum / trade_count as f64
                } else {
                    0.0
                },
                realized_pnl: realized_total,
                computed_at,
            },
        )
        .collect()
}

/// One equity-curve point from the day's realized and marked pnl.
pub fn equity_point(
    day: NaiveDate,
    bankroll_baseline: Decimal,
    cumulative_realized: Decimal,
    unrealized: Decimal,
    prev_high_water: Decimal,
    computed_at: DateTime<Utc>,
) -> EquityPoint {
    let equity = bankroll_baseline + cumulative_realized + unrealized;
    let high_water_mark = prev_high_water.max(equity);
    EquityPoint {
        day: day.format("%Y-%m-%d").to_string(),
        bankroll_baseline,
        realized_pnl: cumulative_realized,
        unrealized_pnl: unrealized,
        equity,
        high_water_mark,
        drawdown: high_water_mark - equity,
        computed_at,
    }
}

/// Repository-backed rollup runner.
pub struct Rollups {
    repo: Repository,
    bankroll: Decimal,
}

impl Rollups {
    pub fn new(repo: Repository, bankroll: Decimal) -> Self {
        Self { repo, bankroll }
    }

    /// Recompute and persist every aggregate for one day.
    pub async fn recompute_day(&self, day: NaiveDate) -> Result<(), CoreError> {
        let from = day
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .ok_or_else(|| CoreError::DataValidation(format!("bad day {}", day)))?;
        let to = from + chrono::Duration::days(1);

        let fills = self.repo.fetch_fills_between(from, to).await?;
        let signals = self.repo.fetch_signals_between(from, to).await?;
        let computed_at = Utc::now();

        let cities = city_rollups(&fills, day, computed_at);
        let strategies = strategy_rollups(&signals, &fills, day, computed_at);
        let realized: Decimal = fills.iter().filter_map(|f| f.realized_pnl).sum();
        let equity = equity_point(
            day,
            self.bankroll,
            realized,
            Decimal::ZERO,
            self.bankroll,
            computed_at,
        );

        self.repo.upsert_city_daily(&cities).await?;
        self.repo.upsert_strategy_daily(&strategies).await?;
        self.repo
            .upsert_equity_points(std::slice::from_ref(&equity))
            .await?;

        info!(
            %day,
            cities = cities.len(),
            strategies = strategies.len(),
            "rollups recomputed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempest_common::Outcome;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
    }

    fn fill(city: &str, qty: i64, price: i64, pnl: Option<Decimal>) -> FillRecord {
        FillRecord {
            client_order_id: "abc#1".into(),
            ticker: format!("HIGH{}-26FEB10-B70", city),
            city_code: city.into(),
            side: Outcome::Yes,
            filled_at: day().and_hms_opt(15, 0, 0).unwrap().and_utc(),
            quantity: qty,
            price_cents: price,
            fees: Decimal::ZERO,
            realized_pnl: pnl,
        }
    }

    fn signal(strategy: &str, action: Action, edge: f64) -> SignalRecord {
        SignalRecord {
            city_code: "NYC".into(),
            ticker: "HIGHNYC-26FEB10-B70".into(),
            strategy_name: strategy.into(),
            p_yes_model: 0.7,
            uncertainty: 0.2,
            p_yes_market: Some(0.5),
            edge,
            action,
            side: Some(Outcome::Yes),
            max_price_cents: Some(67),
            reasons: "EDGE_POSITIVE".into(),
            created_at: day().and_hms_opt(14, 0, 0).unwrap().and_utc(),
        }
    }

    #[test]
    fn test_city_rollup_aggregates() {
        let fills = vec![
            fill("NYC", 10, 50, Some(dec!(5))),
            fill("NYC", 20, 40, Some(dec!(-3))),
            fill("CHI", 5, 60, None),
        ];
        let rollups = city_rollups(&fills, day(), Utc::now());
        assert_eq!(rollups.len(), 2);

        let chi = &rollups[0];
        assert_eq!(chi.city_code, "CHI");
        assert_eq!(chi.trade_count, 1);
        assert_eq!(chi.volume_dollars, dec!(3));
        assert_eq!(chi.win_count + chi.loss_count, 0);

        let nyc = &rollups[1];
        assert_eq!(nyc.trade_count, 2);
        assert_eq!(nyc.volume_dollars, dec!(13)); // $5 + $8
        assert_eq!(nyc.realized_pnl, dec!(2));
        assert_eq!(nyc.win_count, 1);
        assert_eq!(nyc.loss_count, 1);
    }

    #[test]
    fn test_city_rollup_idempotent() {
        let fills = vec![fill("NYC", 10, 50, Some(dec!(5)))];
        let t = Utc::now();
        let a = city_rollups(&fills, day(), t);
        let b = city_rollups(&fills, day(), t);
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].trade_count, b[0].trade_count);
        assert_eq!(a[0].volume_dollars, b[0].volume_dollars);
        assert_eq!(a[0].realized_pnl, b[0].realized_pnl);
    }

    #[test]
    fn test_strategy_rollup_counts_and_edge() {
        let signals = vec![
            signal("daily_high_temp", Action::Buy, 0.10),
            signal("daily_high_temp", Action::Buy, 0.06),
            signal("daily_high_temp", Action::Hold, 0.01),
        ];
        let fills = vec![fill("NYC", 10, 50, Some(dec!(4)))];
        let rollups = strategy_rollups(&signals, &fills, day(), Utc::now());
        assert_eq!(rollups.len(), 1);
        let r = &rollups[0];
        assert_eq!(r.signal_count, 3);
        assert_eq!(r.trade_count, 2);
        assert!((r.avg_realized_edge - 0.08).abs() < 1e-9);
        assert_eq!(r.realized_pnl, dec!(4));
    }

    #[test]
    fn test_strategy_rollup_no_trades() {
        let signals = vec![signal("daily_high_temp", Action::Hold, 0.0)];
        let rollups = strategy_rollups(&signals, &[], day(), Utc::now());
        assert_eq!(rollups[0].trade_count, 0);
        assert_eq!(rollups[0].avg_realized_edge, 0.0);
    }

    #[test]
    fn test_equity_point_drawdown() {
        let point = equity_point(
            day(),
            dec!(1000),
            dec!(-50),
            dec!(-10),
            dec!(1020),
            Utc::now(),
        );
        assert_eq!(point.equity, dec!(940));
        assert_eq!(point.high_water_mark, dec!(1020));
        assert_eq!(point.drawdown, dec!(80));
    }

    #[test]
    fn test_equity_point_new_high() {
        let point = equity_point(day(), dec!(1000), dec!(60), dec!(0), dec!(1020), Utc::now());
        assert_eq!(point.equity, dec!(1060));
        assert_eq!(point.high_water_mark, dec!(1060));
        assert_eq!(point.drawdown, dec!(0));
    }
}
