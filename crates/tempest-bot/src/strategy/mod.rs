//! Strategy abstraction and signal type.
//!
//! A strategy has exactly one capability: map a (weather, market) pair to a
//! `Signal`. Strategies are pure — identical inputs (including
//! configuration) must produce identical outputs, which is why signals are
//! stamped with the market snapshot's capture time rather than the clock.

pub mod daily_high;

use chrono::{DateTime, Utc};

use tempest_common::{
    Action, MarketSnapshot, Outcome, ReasonCode, SignalRecord, WeatherSnapshot,
};

pub use daily_high::{DailyHighTempStrategy, StrategyParams};

/// A trading signal for one contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub city_code: String,
    pub ticker: String,
    pub strategy_name: &'static str,
    /// Model probability of YES, in [0, 1].
    pub p_yes_model: f64,
    /// Normalized forecast uncertainty, in [0, max_uncertainty].
    pub uncertainty: f64,
    /// Market implied probability of YES, if quotable.
    pub p_yes_market: Option<f64>,
    /// Signed edge for the chosen side (positive = favorable).
    pub edge: f64,
    pub action: Action,
    pub side: Option<Outcome>,
    /// Price ceiling in cents for the chosen side.
    pub max_price_cents: Option<i64>,
    /// Suggested contract count before risk sizing.
    pub size_hint: i64,
    /// Ordered reason codes from the closed set.
    pub reasons: Vec<ReasonCode>,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn is_actionable(&self) -> bool {
        self.action == Action::Buy && self.side.is_some() && self.size_hint > 0
    }

    /// Convert to the persisted audit row.
    pub fn to_record(&self) -> SignalRecord {
        SignalRecord {
            city_code: self.city_code.clone(),
            ticker: self.ticker.clone(),
            strategy_name: self.strategy_name.to_string(),
            p_yes_model: self.p_yes_model,
            uncertainty: self.uncertainty,
            p_yes_market: self.p_yes_market,
            edge: self.edge,
            action: self.action,
            side: self.side,
            max_price_cents: self.max_price_cents,
            reasons: self
                .reasons
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(","),
            created_at: self.created_at,
        }
    }
}

/// The sole strategy capability: evaluate one market against one weather
/// snapshot.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, weather: &WeatherSnapshot, market: &MarketSnapshot) -> Signal;
}
