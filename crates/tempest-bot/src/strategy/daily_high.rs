//! Daily-high temperature strategy.
//!
//! Models the next-day high as a Gaussian centered on the forecast with the
//! forecast's standard deviation, compares the tail probability against the
//! market's implied probability, and buys the favorable side when the edge
//! survives the uncertainty and executable-price checks.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::distribution::{ContinuousCDF, Normal};

use tempest_common::{Action, Direction, MarketSnapshot, Outcome, ReasonCode, WeatherSnapshot};

use super::{Signal, Strategy};

/// Divisor normalizing forecast stddev into uncertainty. 15 keeps stddevs
/// up to 4.5 °F below a max_uncertainty of 0.30.
const UNCERTAINTY_DIVISOR: f64 = 15.0;

/// Strategy parameters, all sourced from configuration.
#[derive(Debug, Clone)]
pub struct StrategyParams {
    /// Minimum edge after costs (fraction).
    pub min_edge_after_costs: f64,
    /// Maximum normalized uncertainty.
    pub max_uncertainty: f64,
    /// Bankroll for the sizing hint.
    pub bankroll: Decimal,
    /// Per-trade risk fraction for the sizing hint.
    pub max_trade_risk_pct: Decimal,
    /// Hard cap on contracts per trade.
    pub max_contracts: i64,
}

/// Daily-high temperature strategy over ABOVE/BELOW threshold contracts.
#[derive(Debug, Clone)]
pub struct DailyHighTempStrategy {
    params: StrategyParams,
}

impl DailyHighTempStrategy {
    pub const NAME: &'static str = "daily_high_temp";

    pub fn new(params: StrategyParams) -> Self {
        Self { params }
    }

    /// P(daily high >= threshold) under N(forecast, stddev^2).
    ///
    /// Returns `None` when the distribution is degenerate (stddev <= 0 or
    /// non-finite inputs); callers must HOLD in that case.
    fn threshold_probability(forecast: f64, stddev: f64, threshold: f64) -> Option<f64> {
        if stddev <= 0.0 {
            return None;
        }
        let dist = Normal::new(forecast, stddev).ok()?;
        Some(1.0 - dist.cdf(threshold))
    }

    /// Sizing hint: dollars at risk scaled by confidence, floored into
    /// contracts at the limit price, clamped to the per-trade contract cap.
    fn size_hint(&self, uncertainty: f64, price_cents: i64) -> i64 {
        if price_cents <= 0 {
            return 0;
        }
        let confidence = 1.0 - uncertainty / self.params.max_uncertainty;
        let confidence = Decimal::try_from(confidence.clamp(0.0, 1.0)).unwrap_or(Decimal::ZERO);
        let dollars = self.params.bankroll * self.params.max_trade_risk_pct * confidence;
        let price_dollars = Decimal::from(price_cents) / Decimal::ONE_HUNDRED;
        let quantity = (dollars / price_dollars).floor().to_i64().unwrap_or(0);
        quantity.min(self.params.max_contracts)
    }

    fn hold(
        &self,
        weather: &WeatherSnapshot,
        market: &MarketSnapshot,
        p_yes_model: f64,
        uncertainty: f64,
        p_yes_market: Option<f64>,
        edge: f64,
        reasons: Vec<ReasonCode>,
    ) -> Signal {
        Signal {
            city_code: market.city_code.clone(),
            ticker: market.ticker.clone(),
            strategy_name: Self::NAME,
            p_yes_model,
            uncertainty,
            p_yes_market,
            edge,
            action: Action::Hold,
            side: None,
            max_price_cents: None,
            size_hint: 0,
            reasons,
            created_at: market.captured_at.max(weather.captured_at),
        }
    }
}

impl Strategy for DailyHighTempStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&self, weather: &WeatherSnapshot, market: &MarketSnapshot) -> Signal {
        let p = &self.params;

        // Stale weather never trades; the signal is still written for audit.
        if weather.stale {
            return self.hold(weather, market, 0.5, 1.0, None, 0.0, vec![ReasonCode::StaleWeather]);
        }

        let p_above = match Self::threshold_probability(
            weather.forecast_high_f,
            weather.forecast_stddev_f,
            market.threshold_f,
        ) {
            Some(p) => p,
            None => {
                return self.hold(
                    weather,
                    market,
                    0.5,
                    p.max_uncertainty,
                    None,
                    0.0,
                    vec![ReasonCode::HighUncertainty],
                );
            }
        };

        let p_yes_model = match market.direction {
            Direction::Above => p_above,
            Direction::Below => 1.0 - p_above,
        };

        let raw_uncertainty = weather.forecast_stddev_f / UNCERTAINTY_DIVISOR;
        let uncertainty = raw_uncertainty.min(p.max_uncertainty);

        if raw_uncertainty > p.max_uncertainty {
            return self.hold(
                weather,
                market,
                p_yes_model,
                p.max_uncertainty,
                None,
                0.0,
                vec![ReasonCode::HighUncertainty],
            );
        }

        let (yes_mid, no_mid) = match (market.yes_mid(), market.no_mid()) {
            (Some(y), Some(n)) => (y, n),
            _ => {
                // Missing sides make the market ineligible upstream; hold
                // defensively if one slips through.
                return self.hold(
                    weather,
                    market,
                    p_yes_model,
                    uncertainty,
                    None,
                    0.0,
                    vec![ReasonCode::HoldDefault],
                );
            }
        };

        let p_yes_market = yes_mid / 100.0;
        let edge_yes = p_yes_model - p_yes_market;

        // Prefer YES when its edge is positive; otherwise price the NO side
        // against its own mid.
        let (side, side_p_model, side_edge) = if edge_yes > 0.0 {
            (Outcome::Yes, p_yes_model, edge_yes)
        } else {
            let p_no_model = 1.0 - p_yes_model;
            (Outcome::No, p_no_model, p_no_model - no_mid / 100.0)
        };

        if side_edge < p.min_edge_after_costs {
            let reason = if side_edge <= 0.0 {
                ReasonCode::EdgeNegative
            } else {
                ReasonCode::BelowMinEdge
            };
            return self.hold(
                weather,
                market,
                p_yes_model,
                uncertainty,
                Some(p_yes_market),
                side_edge,
                vec![reason],
            );
        }

        // Limit price: the model probability less the required edge.
        let max_price_cents = (100.0 * (side_p_model - p.min_edge_after_costs)).floor() as i64;

        // The side must be executable at or below the ceiling.
        let ask = market.ask_for(side);
        match ask {
            Some(ask) if ask <= max_price_cents => {}
            _ => {
                return self.hold(
                    weather,
                    market,
                    p_yes_model,
                    uncertainty,
                    Some(p_yes_market),
                    side_edge,
                    vec![ReasonCode::BelowMinEdge],
                );
            }
        }

        let size_hint = self.size_hint(uncertainty, max_price_cents);

        Signal {
            city_code: market.city_code.clone(),
            ticker: market.ticker.clone(),
            strategy_name: Self::NAME,
            p_yes_model,
            uncertainty,
            p_yes_market: Some(p_yes_market),
            edge: side_edge,
            action: Action::Buy,
            side: Some(side),
            max_price_cents: Some(max_price_cents),
            size_hint,
            reasons: vec![ReasonCode::EdgePositive],
            created_at: market.captured_at.max(weather.captured_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn params() -> StrategyParams {
        StrategyParams {
            min_edge_after_costs: 0.03,
            max_uncertainty: 0.30,
            bankroll: dec!(5000),
            max_trade_risk_pct: dec!(0.02),
            max_contracts: 95,
        }
    }

    fn weather(high: f64, stddev: f64, stale: bool) -> WeatherSnapshot {
        let t = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        WeatherSnapshot {
            city_code: "NYC".into(),
            captured_at: t,
            forecast_high_f: high,
            forecast_stddev_f: stddev,
            observed_temp_f: Some(60.0),
            forecast_issued_at: t,
            observed_at: Some(t),
            stale,
        }
    }

    fn market(threshold: f64, yes_bid: i64, yes_ask: i64) -> MarketSnapshot {
        MarketSnapshot {
            ticker: "HIGHNYC-26FEB10-B70".into(),
            city_code: "NYC".into(),
            threshold_f: threshold,
            direction: Direction::Above,
            event_date: "2026-02-10".into(),
            yes_bid: Some(yes_bid),
            yes_ask: Some(yes_ask),
            no_bid: Some(100 - yes_ask),
            no_ask: Some(100 - yes_bid),
            volume: 1200,
            open_interest: 3000,
            close_time: Utc.with_ymd_and_hms(2026, 2, 11, 4, 0, 0).unwrap(),
            captured_at: Utc.with_ymd_and_hms(2026, 2, 10, 12, 5, 0).unwrap(),
        }
    }

    // S1: forecast 72, sigma 3, threshold 70, yes 45/48.
    #[test]
    fn test_happy_path_buys_yes_at_71() {
        let strategy = DailyHighTempStrategy::new(params());
        let signal = strategy.evaluate(&weather(72.0, 3.0, false), &market(70.0, 45, 48));

        assert!((signal.p_yes_model - 0.7475).abs() < 0.001);
        assert_eq!(signal.p_yes_market, Some(0.465));
        assert!((signal.edge - 0.2825).abs() < 0.001);
        assert_eq!(signal.action, Action::Buy);
        assert_eq!(signal.side, Some(Outcome::Yes));
        assert_eq!(signal.max_price_cents, Some(71));
        assert_eq!(signal.reasons, vec![ReasonCode::EdgePositive]);
        // uncertainty 0.2 -> confidence 1/3 -> $33.33 at 71c -> 46 contracts.
        assert_eq!(signal.size_hint, 46);
    }

    #[test]
    fn test_deterministic() {
        let strategy = DailyHighTempStrategy::new(params());
        let w = weather(72.0, 3.0, false);
        let m = market(70.0, 45, 48);
        let a = strategy.evaluate(&w, &m);
        let b = strategy.evaluate(&w, &m);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_stddev_holds_high_uncertainty() {
        let strategy = DailyHighTempStrategy::new(params());
        let signal = strategy.evaluate(&weather(72.0, 0.0, false), &market(70.0, 45, 48));
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.reasons, vec![ReasonCode::HighUncertainty]);
        assert_eq!(signal.p_yes_model, 0.5);
    }

    #[test]
    fn test_negative_stddev_holds() {
        let strategy = DailyHighTempStrategy::new(params());
        let signal = strategy.evaluate(&weather(72.0, -1.0, false), &market(70.0, 45, 48));
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.reasons, vec![ReasonCode::HighUncertainty]);
    }

    #[test]
    fn test_excess_uncertainty_holds() {
        let strategy = DailyHighTempStrategy::new(params());
        // sigma 6 -> 6/15 = 0.4 > 0.30.
        let signal = strategy.evaluate(&weather(72.0, 6.0, false), &market(70.0, 45, 48));
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.reasons, vec![ReasonCode::HighUncertainty]);
    }

    #[test]
    fn test_stale_weather_holds_with_reason() {
        let strategy = DailyHighTempStrategy::new(params());
        let signal = strategy.evaluate(&weather(72.0, 3.0, true), &market(70.0, 45, 48));
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.reasons, vec![ReasonCode::StaleWeather]);
    }

    #[test]
    fn test_below_direction_flips_probability() {
        let strategy = DailyHighTempStrategy::new(params());
        let mut m = market(70.0, 19, 22);
        m.direction = Direction::Below;
        let signal = strategy.evaluate(&weather(72.0, 3.0, false), &m);
        // P(below 70) = 1 - 0.7475 = 0.2525; market at 0.205 -> buy YES.
        assert!((signal.p_yes_model - 0.2525).abs() < 0.001);
        assert_eq!(signal.action, Action::Buy);
        assert_eq!(signal.side, Some(Outcome::Yes));
    }

    #[test]
    fn test_prefers_no_when_model_below_market() {
        let strategy = DailyHighTempStrategy::new(params());
        // Model ~0.369 for threshold 73; YES priced at 0.465, so the NO
        // side (model 0.631, mid 0.535) carries the edge.
        let signal = strategy.evaluate(&weather(72.0, 3.0, false), &market(73.0, 45, 48));
        assert_eq!(signal.action, Action::Buy);
        assert_eq!(signal.side, Some(Outcome::No));
        assert!(signal.edge > 0.03);
    }

    #[test]
    fn test_ask_above_price_ceiling_holds() {
        let strategy = DailyHighTempStrategy::new(params());
        // p_model ~ 0.7475 -> ceiling 71; mid 71.5 leaves edge ~0.0325
        // above min, but the 72c ask is not executable under the ceiling.
        let mut m = market(70.0, 71, 72);
        m.yes_bid = Some(71);
        m.yes_ask = Some(72);
        let signal = strategy.evaluate(&weather(72.0, 3.0, false), &m);
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.reasons, vec![ReasonCode::BelowMinEdge]);
    }

    #[test]
    fn test_edge_just_below_minimum_fails() {
        let strategy = DailyHighTempStrategy::new(params());
        // yes mid such that edge = 0.0299-ish: p_model 0.7475, mid 71.8.
        let mut m = market(70.0, 71, 72);
        m.yes_bid = Some(71);
        m.yes_ask = Some(73);
        // mid 72 -> edge 0.0275 < 0.03.
        let signal = strategy.evaluate(&weather(72.0, 3.0, false), &m);
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.reasons, vec![ReasonCode::BelowMinEdge]);
    }

    #[test]
    fn test_negative_both_sides_holds_edge_negative() {
        let strategy = DailyHighTempStrategy::new(params());
        // Model ~0.5 at threshold 72; market also at ~0.5 both sides.
        let mut m = market(72.0, 49, 51);
        m.no_bid = Some(49);
        m.no_ask = Some(51);
        let signal = strategy.evaluate(&weather(72.0, 3.0, false), &m);
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.reasons, vec![ReasonCode::EdgeNegative]);
    }

    #[test]
    fn test_missing_quote_holds_default() {
        let strategy = DailyHighTempStrategy::new(params());
        let mut m = market(70.0, 45, 48);
        m.no_ask = None;
        let signal = strategy.evaluate(&weather(72.0, 3.0, false), &m);
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.reasons, vec![ReasonCode::HoldDefault]);
    }

    #[test]
    fn test_size_hint_capped_at_max_contracts() {
        let strategy = DailyHighTempStrategy::new(StrategyParams {
            bankroll: dec!(1000000),
            ..params()
        });
        let signal = strategy.evaluate(&weather(72.0, 3.0, false), &market(70.0, 45, 48));
        assert_eq!(signal.size_hint, 95);
    }

    #[test]
    fn test_never_emits_spread_reason() {
        // The strategy's reason set excludes execution-quality codes by
        // construction; assert the closed set stays closed.
        let strategy = DailyHighTempStrategy::new(params());
        for (high, stddev, stale) in [(72.0, 3.0, false), (72.0, 0.0, false), (72.0, 3.0, true)] {
            let signal = strategy.evaluate(&weather(high, stddev, stale), &market(70.0, 45, 48));
            for reason in &signal.reasons {
                assert!(matches!(
                    reason,
                    ReasonCode::EdgePositive
                        | ReasonCode::EdgeNegative
                        | ReasonCode::HighUncertainty
                        | ReasonCode::BelowMinEdge
                        | ReasonCode::HoldDefault
                        | ReasonCode::StaleWeather
                ));
            }
        }
    }

    #[test]
    fn test_signal_record_roundtrip_fields() {
        let strategy = DailyHighTempStrategy::new(params());
        let signal = strategy.evaluate(&weather(72.0, 3.0, false), &market(70.0, 45, 48));
        let record = signal.to_record();
        assert_eq!(record.strategy_name, "daily_high_temp");
        assert_eq!(record.reasons, "EDGE_POSITIVE");
        assert_eq!(record.max_price_cents, Some(71));
    }
}
