//! Risk engine: sizing against bankroll-denominated caps.
//!
//! Every dollar limit derives from the configured bankroll and ratio
//! fields; the engine carries no defaults of its own. Sizing applies the
//! per-trade cap first, then reduces quantity to fit remaining city and
//! cluster headroom given the positions the loop passes in — which MUST
//! include the in-cycle accumulator, never an empty list mid-cycle.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use tempest_common::{cities, Cluster, CoreError, Outcome, PositionRecord};

use crate::config::RiskSettings;
use crate::positions::{city_exposure, cluster_exposure};
use crate::strategy::Signal;

/// Which cap bound a refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapKind {
    PerTrade,
    City,
    Cluster,
}

impl CapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapKind::PerTrade => "per_trade",
            CapKind::City => "city",
            CapKind::Cluster => "cluster",
        }
    }
}

/// Sizing outcome: either a concrete order size or a structured refusal
/// naming the binding cap and the exposure that bound it.
#[derive(Debug, Clone, PartialEq)]
pub enum SizeDecision {
    Admitted {
        quantity: i64,
        limit_price_cents: i64,
    },
    Refused {
        cap: CapKind,
        current_exposure: Decimal,
        limit: Decimal,
    },
}

impl SizeDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, SizeDecision::Admitted { .. })
    }
}

/// Dollar caps derived once from configuration.
#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub bankroll: Decimal,
    pub per_trade_cap: Decimal,
    pub city_cap: Decimal,
    pub cluster_cap: Decimal,
    pub daily_loss_cap: Decimal,
    pub max_contracts: i64,
}

impl RiskLimits {
    pub fn from_settings(settings: &RiskSettings) -> Self {
        Self {
            bankroll: settings.bankroll,
            per_trade_cap: settings.bankroll * settings.max_trade_risk_pct,
            city_cap: settings.bankroll * settings.max_city_exposure_pct,
            cluster_cap: settings.bankroll * settings.max_cluster_exposure_pct,
            daily_loss_cap: settings.bankroll * settings.max_daily_loss_pct,
            max_contracts: settings.max_contracts_per_trade,
        }
    }
}

/// The sizing engine.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    limits: RiskLimits,
}

impl RiskEngine {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn daily_loss_cap(&self) -> Decimal {
        self.limits.daily_loss_cap
    }

    /// Size an actionable signal against current positions (persisted plus
    /// in-cycle accumulator).
    pub fn size(
        &self,
        signal: &Signal,
        positions: &[PositionRecord],
    ) -> Result<SizeDecision, CoreError> {
        let price_cents = signal.max_price_cents.ok_or_else(|| {
            CoreError::DataValidation(format!("{}: signal has no price", signal.ticker))
        })?;
        if price_cents <= 0 || price_cents >= 100 {
            return Err(CoreError::DataValidation(format!(
                "{}: price {}c out of range",
                signal.ticker, price_cents
            )));
        }
        let _side: Outcome = signal.side.ok_or_else(|| {
            CoreError::DataValidation(format!("{}: signal has no side", signal.ticker))
        })?;

        let price_dollars = Decimal::from(price_cents) / Decimal::ONE_HUNDRED;

        // Per-trade cap first.
        let per_trade_qty = contracts_within(self.limits.per_trade_cap, price_dollars);
        if per_trade_qty < 1 {
            return Ok(SizeDecision::Refused {
                cap: CapKind::PerTrade,
                current_exposure: Decimal::ZERO,
                limit: self.limits.per_trade_cap,
            });
        }

        // City headroom.
        let city_used = city_exposure(positions, &signal.city_code);
        let city_headroom = self.limits.city_cap - city_used;
        let city_qty = contracts_within(city_headroom, price_dollars);
        if city_qty < 1 {
            return Ok(SizeDecision::Refused {
                cap: CapKind::City,
                current_exposure: city_used,
                limit: self.limits.city_cap,
            });
        }

        // Cluster headroom.
        let cluster = self.cluster_of(&signal.city_code)?;
        let cluster_used = cluster_exposure(positions, cluster);
        let cluster_headroom = self.limits.cluster_cap - cluster_used;
        let cluster_qty = contracts_within(cluster_headroom, price_dollars);
        if cluster_qty < 1 {
            return Ok(SizeDecision::Refused {
                cap: CapKind::Cluster,
                current_exposure: cluster_used,
                limit: self.limits.cluster_cap,
            });
        }

        let quantity = signal
            .size_hint
            .min(per_trade_qty)
            .min(city_qty)
            .min(cluster_qty)
            .min(self.limits.max_contracts);

        if quantity < 1 {
            // A positive hint was already admitted by every cap, so the
            // hint itself was zero.
            return Ok(SizeDecision::Refused {
                cap: CapKind::PerTrade,
                current_exposure: Decimal::ZERO,
                limit: self.limits.per_trade_cap,
            });
        }

        Ok(SizeDecision::Admitted {
            quantity,
            limit_price_cents: price_cents,
        })
    }

    fn cluster_of(&self, city_code: &str) -> Result<Cluster, CoreError> {
        cities::get(city_code)
            .map(|c| c.cluster)
            .ok_or_else(|| CoreError::DataValidation(format!("unknown city: {}", city_code)))
    }
}

/// How many contracts fit inside `budget` dollars at `price` per contract.
fn contracts_within(budget: Decimal, price_dollars: Decimal) -> i64 {
    if budget <= Decimal::ZERO || price_dollars <= Decimal::ZERO {
        return 0;
    }
    (budget / price_dollars).floor().to_i64().unwrap_or(0)
}
