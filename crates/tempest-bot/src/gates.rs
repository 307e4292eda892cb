//! Pre-trade execution-quality gates.
//!
//! Three stateless checks run in a fixed order with short-circuiting:
//! spread, liquidity, minimum edge. Each failure names its reason; the
//! loop matches on the outcome instead of catching exceptions.

use serde::{Deserialize, Serialize};

use tempest_common::MarketSnapshot;

use crate::config::GateSettings;
use crate::strategy::Signal;

/// Why a gate refused the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateReason {
    SpreadWide,
    LowLiquidity,
    InsufficientEdge,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::SpreadWide => "SPREAD_WIDE",
            GateReason::LowLiquidity => "LOW_LIQUIDITY",
            GateReason::InsufficientEdge => "INSUFFICIENT_EDGE",
        }
    }
}

impl std::fmt::Display for GateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the gate chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Admitted,
    Refused(GateReason),
}

impl GateOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, GateOutcome::Admitted)
    }
}

/// Spread gate: `yes_ask - yes_bid <= spread_max_cents`. An unquoted side
/// fails the gate.
pub fn check_spread(market: &MarketSnapshot, spread_max_cents: i64) -> bool {
    match market.yes_spread() {
        Some(spread) => spread <= spread_max_cents,
        None => false,
    }
}

/// Liquidity gate: `min(volume, open_interest) >= liquidity_min` and
/// `open_interest >= liquidity_min * min_liquidity_multiple`.
pub fn check_liquidity(
    market: &MarketSnapshot,
    liquidity_min: i64,
    min_liquidity_multiple: f64,
) -> bool {
    let floor = market.volume.min(market.open_interest);
    if floor < liquidity_min {
        return false;
    }
    (market.open_interest as f64) >= (liquidity_min as f64) * min_liquidity_multiple
}

/// Minimum-edge gate: `|edge| >= min_edge_after_costs`.
pub fn check_min_edge(signal: &Signal, min_edge_after_costs: f64) -> bool {
    signal.edge.abs() >= min_edge_after_costs
}

/// Run all gates in order, stopping at the first refusal.
pub fn check_all(
    signal: &Signal,
    market: &MarketSnapshot,
    settings: &GateSettings,
    min_edge_after_costs: f64,
) -> GateOutcome {
    if !check_spread(market, settings.spread_max_cents) {
        return GateOutcome::Refused(GateReason::SpreadWide);
    }
    if !check_liquidity(market, settings.liquidity_min, settings.min_liquidity_multiple) {
        return GateOutcome::Refused(GateReason::LowLiquidity);
    }
    if !check_min_edge(signal, min_edge_after_costs) {
        return GateOutcome::Refused(GateReason::InsufficientEdge);
    }
    GateOutcome::Admitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempest_common::{Action, Direction, Outcome, ReasonCode};

    fn settings() -> GateSettings {
        GateSettings {
            spread_max_cents: 4,
            liquidity_min: 500,
            min_liquidity_multiple: 5.0,
        }
    }

    fn market(yes_bid: i64, yes_ask: i64, volume: i64, open_interest: i64) -> MarketSnapshot {
        MarketSnapshot {
            ticker: "HIGHNYC-26FEB10-B70".into(),
            city_code: "NYC".into(),
            threshold_f: 70.0,
            direction: Direction::Above,
            event_date: "2026-02-10".into(),
            yes_bid: Some(yes_bid),
            yes_ask: Some(yes_ask),
            no_bid: Some(100 - yes_ask),
            no_ask: Some(100 - yes_bid),
            volume,
            open_interest,
            close_time: Utc.with_ymd_and_hms(2026, 2, 11, 4, 0, 0).unwrap(),
            captured_at: Utc::now(),
        }
    }

    fn signal(edge: f64) -> Signal {
        Signal {
            city_code: "NYC".into(),
            ticker: "HIGHNYC-26FEB10-B70".into(),
            strategy_name: "daily_high_temp",
            p_yes_model: 0.75,
            uncertainty: 0.2,
            p_yes_market: Some(0.465),
            edge,
            action: Action::Buy,
            side: Some(Outcome::Yes),
            max_price_cents: Some(71),
            size_hint: 40,
            reasons: vec![ReasonCode::EdgePositive],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_all_gates_pass() {
        let outcome = check_all(&signal(0.28), &market(45, 48, 1200, 3000), &settings(), 0.03);
        assert_eq!(outcome, GateOutcome::Admitted);
    }

    #[test]
    fn test_spread_boundary_inclusive() {
        // spread == max passes.
        assert!(check_spread(&market(45, 49, 1200, 3000), 4));
        // max + 1 fails.
        assert!(!check_spread(&market(45, 50, 1200, 3000), 4));
    }

    #[test]
    fn test_spread_missing_side_fails() {
        let mut m = market(45, 48, 1200, 3000);
        m.yes_ask = None;
        assert!(!check_spread(&m, 4));
    }

    #[test]
    fn test_liquidity_floor() {
        // min(volume, oi) must reach liquidity_min.
        assert!(check_liquidity(&market(45, 48, 500, 2500), 500, 5.0));
        assert!(!check_liquidity(&market(45, 48, 499, 2500), 500, 5.0));
    }

    #[test]
    fn test_liquidity_open_interest_multiple() {
        // oi must be >= 500 * 5 = 2500 even when the floor passes.
        assert!(!check_liquidity(&market(45, 48, 3000, 2499), 500, 5.0));
        assert!(check_liquidity(&market(45, 48, 3000, 2500), 500, 5.0));
    }

    #[test]
    fn test_edge_boundary() {
        // Exactly at minimum passes.
        assert!(check_min_edge(&signal(0.03), 0.03));
        // One ten-thousandth below fails.
        assert!(!check_min_edge(&signal(0.0299), 0.03));
        // Absolute value: negative edges count too.
        assert!(check_min_edge(&signal(-0.05), 0.03));
    }

    #[test]
    fn test_short_circuit_order() {
        // Wide spread reported even when liquidity and edge also fail.
        let outcome = check_all(&signal(0.001), &market(40, 60, 10, 10), &settings(), 0.03);
        assert_eq!(outcome, GateOutcome::Refused(GateReason::SpreadWide));

        // Spread ok, liquidity reported before edge.
        let outcome = check_all(&signal(0.001), &market(45, 48, 10, 10), &settings(), 0.03);
        assert_eq!(outcome, GateOutcome::Refused(GateReason::LowLiquidity));

        // Spread and liquidity ok, edge reported last.
        let outcome = check_all(&signal(0.001), &market(45, 48, 1200, 3000), &settings(), 0.03);
        assert_eq!(outcome, GateOutcome::Refused(GateReason::InsufficientEdge));
    }
}
