//! Shared domain types for the Tempest trading engine.
//!
//! CRITICAL: All dollar amounts use `rust_decimal::Decimal` and all contract
//! prices are integer cents (1..=99). NEVER use f64 for financial math.
//! Temperatures are plain f64 — they are model inputs, not money.

use chrono::{DateTime, NaiveDate, Utc};
use clickhouse::Row;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Contract outcome side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Yes => "YES",
            Outcome::No => "NO",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "YES" => Ok(Outcome::Yes),
            "NO" => Ok(Outcome::No),
            _ => Err(format!("Unknown outcome: {}", s)),
        }
    }
}

/// Strategy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// Direction of a temperature threshold contract: YES pays when the daily
/// high settles above (or below) the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Above,
    Below,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Above => write!(f, "ABOVE"),
            Direction::Below => write!(f, "BELOW"),
        }
    }
}

/// Trading mode determines where orders go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Signals computed and persisted, no orders submitted, fills simulated
    /// at the ask.
    #[default]
    Shadow,
    /// Orders submitted against the exchange's paper endpoint.
    Paper,
    /// Production endpoint. Requires explicit startup confirmation.
    Live,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Shadow => "shadow",
            Mode::Paper => "paper",
            Mode::Live => "live",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shadow" => Ok(Mode::Shadow),
            "paper" => Ok(Mode::Paper),
            "live" => Ok(Mode::Live),
            _ => Err(format!("Unknown trading mode: {}", s)),
        }
    }
}

/// Geographic correlation cluster for exposure limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cluster {
    #[serde(rename = "NE")]
    NorthEast,
    #[serde(rename = "SE")]
    SouthEast,
    Midwest,
    Mountain,
    West,
}

impl Cluster {
    pub const ALL: [Cluster; 5] = [
        Cluster::NorthEast,
        Cluster::SouthEast,
        Cluster::Midwest,
        Cluster::Mountain,
        Cluster::West,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::NorthEast => "NE",
            Cluster::SouthEast => "SE",
            Cluster::Midwest => "Midwest",
            Cluster::Mountain => "Mountain",
            Cluster::West => "West",
        }
    }
}

impl std::fmt::Display for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order lifecycle states.
///
/// Valid transitions:
///
/// ```text
/// NEW        -> SUBMITTED, REJECTED
/// SUBMITTED  -> RESTING, PARTIAL, FILLED, REJECTED, CANCELED
/// RESTING    -> PARTIAL, FILLED, CANCELED
/// PARTIAL    -> FILLED, CANCELED
/// FILLED     -> CLOSED
/// ```
///
/// `CANCELED`, `REJECTED`, and `CLOSED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Submitted,
    Resting,
    Partial,
    Filled,
    Canceled,
    Rejected,
    Closed,
}

impl OrderStatus {
    /// Whether the state machine permits `self -> next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (New, Submitted)
                | (New, Rejected)
                | (Submitted, Resting)
                | (Submitted, Partial)
                | (Submitted, Filled)
                | (Submitted, Rejected)
                | (Submitted, Canceled)
                | (Resting, Partial)
                | (Resting, Filled)
                | (Resting, Canceled)
                | (Partial, Filled)
                | (Partial, Canceled)
                | (Filled, Closed)
        )
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Closed
        )
    }

    /// An order that may still rest on or reach the book.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::New
                | OrderStatus::Submitted
                | OrderStatus::Resting
                | OrderStatus::Partial
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Resting => "RESTING",
            OrderStatus::Partial => "PARTIAL",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reason codes emitted by strategies. Closed set; execution-quality
/// reasons (spread, liquidity) belong to the gates, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    EdgePositive,
    EdgeNegative,
    HighUncertainty,
    BelowMinEdge,
    HoldDefault,
    StaleWeather,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::EdgePositive => "EDGE_POSITIVE",
            ReasonCode::EdgeNegative => "EDGE_NEGATIVE",
            ReasonCode::HighUncertainty => "HIGH_UNCERTAINTY",
            ReasonCode::BelowMinEdge => "BELOW_MIN_EDGE",
            ReasonCode::HoldDefault => "HOLD_DEFAULT",
            ReasonCode::StaleWeather => "STALE_WEATHER",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Risk event classification for boundary-hitting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskEventType {
    DailyLossHit,
    CityCapHit,
    ClusterCapHit,
    TradeCapHit,
    RejectBurst,
    StaleWeather,
}

impl RiskEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskEventType::DailyLossHit => "DAILY_LOSS_HIT",
            RiskEventType::CityCapHit => "CITY_CAP_HIT",
            RiskEventType::ClusterCapHit => "CLUSTER_CAP_HIT",
            RiskEventType::TradeCapHit => "TRADE_CAP_HIT",
            RiskEventType::RejectBurst => "REJECT_BURST",
            RiskEventType::StaleWeather => "STALE_WEATHER",
        }
    }
}

impl std::fmt::Display for RiskEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// System components tracked by the health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Trader,
    ExchangeApi,
    WeatherApi,
    Database,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Trader => "trader",
            Component::ExchangeApi => "exchange_api",
            Component::WeatherApi => "weather_api",
            Component::Database => "database",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Component health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    Ok,
    Degraded,
    Down,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Ok => write!(f, "OK"),
            HealthState::Degraded => write!(f, "DEGRADED"),
            HealthState::Down => write!(f, "DOWN"),
        }
    }
}

// ============================================================================
// Persisted rows (ops namespace)
// ============================================================================

/// One weather fetch for one city.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct WeatherSnapshot {
    /// 3-letter city code.
    pub city_code: String,
    /// When this snapshot was captured.
    pub captured_at: DateTime<Utc>,
    /// Forecasted daily high (°F).
    pub forecast_high_f: f64,
    /// Forecast standard deviation (°F, >= 0).
    pub forecast_stddev_f: f64,
    /// Latest observed temperature (°F), if an observation was available.
    pub observed_temp_f: Option<f64>,
    /// When the source issued the forecast.
    pub forecast_issued_at: DateTime<Utc>,
    /// When the observation was taken, if any.
    pub observed_at: Option<DateTime<Utc>>,
    /// Snapshot is too old to trade on. A stale snapshot skips the city
    /// for the cycle.
    pub stale: bool,
}

impl WeatherSnapshot {
    /// Age of the snapshot relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.captured_at
    }
}

/// One orderbook quote for one contract.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct MarketSnapshot {
    /// Exchange ticker, e.g. `HIGHNYC-26FEB10-B70`.
    pub ticker: String,
    pub city_code: String,
    /// Temperature cutoff defining YES (°F).
    pub threshold_f: f64,
    pub direction: Direction,
    /// Local settlement date, ISO `YYYY-MM-DD`.
    pub event_date: String,
    /// Best bid/ask per side in cents (1..=99). A missing side makes the
    /// market ineligible.
    pub yes_bid: Option<i64>,
    pub yes_ask: Option<i64>,
    pub no_bid: Option<i64>,
    pub no_ask: Option<i64>,
    pub volume: i64,
    pub open_interest: i64,
    pub close_time: DateTime<Utc>,
    pub captured_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Settlement date parsed from the ISO field.
    pub fn event_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.event_date, "%Y-%m-%d").ok()
    }

    /// YES mid price in cents, if both sides are quoted.
    pub fn yes_mid(&self) -> Option<f64> {
        match (self.yes_bid, self.yes_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) as f64 / 2.0),
            _ => None,
        }
    }

    /// NO mid price in cents, if both sides are quoted.
    pub fn no_mid(&self) -> Option<f64> {
        match (self.no_bid, self.no_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) as f64 / 2.0),
            _ => None,
        }
    }

    /// YES spread in cents, if both sides are quoted.
    pub fn yes_spread(&self) -> Option<i64> {
        match (self.yes_bid, self.yes_ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Ask for the given side, if quoted.
    pub fn ask_for(&self, side: Outcome) -> Option<i64> {
        match side {
            Outcome::Yes => self.yes_ask,
            Outcome::No => self.no_ask,
        }
    }

    /// Both sides must be quoted for the market to be tradable.
    pub fn is_quotable(&self) -> bool {
        self.yes_bid.is_some()
            && self.yes_ask.is_some()
            && self.no_bid.is_some()
            && self.no_ask.is_some()
    }
}

/// A persisted strategy signal (audit trail; written even for HOLDs).
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct SignalRecord {
    pub city_code: String,
    pub ticker: String,
    pub strategy_name: String,
    /// Model probability of YES, in [0, 1].
    pub p_yes_model: f64,
    /// Normalized forecast uncertainty.
    pub uncertainty: f64,
    /// Market implied probability of YES, if quotable.
    pub p_yes_market: Option<f64>,
    /// Signed model-minus-market edge for the chosen side.
    pub edge: f64,
    pub action: Action,
    pub side: Option<Outcome>,
    /// Price ceiling in cents for the chosen side.
    pub max_price_cents: Option<i64>,
    /// Ordered reason codes, comma-joined.
    pub reasons: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted order.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct OrderRecord {
    pub intent_key: String,
    pub intent_version: u32,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub ticker: String,
    pub city_code: String,
    pub side: Outcome,
    pub quantity: i64,
    pub limit_price_cents: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Dollars at risk if the order fills completely.
    pub fn notional_dollars(&self) -> Decimal {
        Decimal::from(self.quantity) * Decimal::from(self.limit_price_cents)
            / Decimal::ONE_HUNDRED
    }
}

/// One exchange fill event.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct FillRecord {
    /// Local client order id the fill matched (`intent_key#version`).
    pub client_order_id: String,
    pub ticker: String,
    pub city_code: String,
    pub side: Outcome,
    pub filled_at: DateTime<Utc>,
    pub quantity: i64,
    pub price_cents: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub fees: Decimal,
    /// Set when the position closes.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub realized_pnl: Option<Decimal>,
}

/// Aggregated position per (market, side).
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct PositionRecord {
    pub ticker: String,
    pub city_code: String,
    pub side: Outcome,
    pub quantity_open: i64,
    pub avg_entry_cents: f64,
    pub avg_exit_cents: Option<f64>,
    #[serde(with = "rust_decimal::serde::str")]
    pub realized_pnl: Decimal,
    /// "OPEN" or "CLOSED".
    pub status: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl PositionRecord {
    pub fn is_open(&self) -> bool {
        self.status == "OPEN"
    }

    /// Dollars currently at risk in this position.
    pub fn exposure_dollars(&self) -> Decimal {
        if !self.is_open() {
            return Decimal::ZERO;
        }
        Decimal::from(self.quantity_open)
            * Decimal::try_from(self.avg_entry_cents).unwrap_or(Decimal::ZERO)
            / Decimal::ONE_HUNDRED
    }
}

/// Audit row for boundary-hitting risk decisions.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct RiskEventRecord {
    pub event_type: RiskEventType,
    pub severity: Severity,
    /// Related city, when applicable.
    pub city_code: Option<String>,
    /// Free-form JSON payload describing the boundary.
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// Latest health status per component.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct HealthRecord {
    pub component: Component,
    pub status: HealthState,
    pub last_ok: DateTime<Utc>,
    pub checked_at: DateTime<Utc>,
    pub message: Option<String>,
}

/// Reconciliation cursor: fills are fetched strictly after this point.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct ReconcileCursor {
    pub name: String,
    pub position: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Persisted rows (analytics namespace)
// ============================================================================

/// Per-city daily rollup. Derivable, idempotent, recomputable.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct CityDailyRollup {
    pub city_code: String,
    /// ISO `YYYY-MM-DD`.
    pub day: String,
    pub trade_count: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume_dollars: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub realized_pnl: Decimal,
    pub win_count: u64,
    pub loss_count: u64,
    pub computed_at: DateTime<Utc>,
}

impl CityDailyRollup {
    /// Win rate in [0, 1]; zero when no closed trades.
    pub fn win_rate(&self) -> f64 {
        let total = self.win_count + self.loss_count;
        if total == 0 {
            return 0.0;
        }
        self.win_count as f64 / total as f64
    }
}

/// Per-strategy daily rollup.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct StrategyDailyRollup {
    pub strategy_name: String,
    pub day: String,
    pub signal_count: u64,
    pub trade_count: u64,
    /// Mean signed edge across signals that traded.
    pub avg_realized_edge: f64,
    #[serde(with = "rust_decimal::serde::str")]
    pub realized_pnl: Decimal,
    pub computed_at: DateTime<Utc>,
}

/// One point on the equity curve.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct EquityPoint {
    pub day: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub bankroll_baseline: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub realized_pnl: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub unrealized_pnl: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub equity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high_water_mark: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub drawdown: Decimal,
    pub computed_at: DateTime<Utc>,
}

/// Delayed, redacted projection of a fill. The only surface external
/// read-only clients may touch. Carries no order identifiers, intent
/// keys, or raw payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Row)]
pub struct PublicTrade {
    pub city_code: String,
    pub ticker: String,
    pub side: Outcome,
    /// Rounded down to the minute.
    pub filled_at: DateTime<Utc>,
    pub quantity: i64,
    pub price_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_outcome_opposite() {
        assert_eq!(Outcome::Yes.opposite(), Outcome::No);
        assert_eq!(Outcome::No.opposite(), Outcome::Yes);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("shadow".parse::<Mode>(), Ok(Mode::Shadow));
        assert_eq!("PAPER".parse::<Mode>(), Ok(Mode::Paper));
        assert_eq!("Live".parse::<Mode>(), Ok(Mode::Live));
        assert!("demo".parse::<Mode>().is_err());
    }

    #[test]
    fn test_order_status_valid_transitions() {
        use OrderStatus::*;
        assert!(New.can_transition_to(Submitted));
        assert!(New.can_transition_to(Rejected));
        assert!(Submitted.can_transition_to(Resting));
        assert!(Submitted.can_transition_to(Partial));
        assert!(Submitted.can_transition_to(Filled));
        assert!(Submitted.can_transition_to(Canceled));
        assert!(Resting.can_transition_to(Filled));
        assert!(Partial.can_transition_to(Filled));
        assert!(Partial.can_transition_to(Canceled));
        assert!(Filled.can_transition_to(Closed));
    }

    #[test]
    fn test_order_status_invalid_transitions() {
        use OrderStatus::*;
        assert!(!New.can_transition_to(Filled));
        assert!(!New.can_transition_to(Resting));
        assert!(!Resting.can_transition_to(Submitted));
        assert!(!Resting.can_transition_to(Rejected));
        assert!(!Filled.can_transition_to(Canceled));
        assert!(!Canceled.can_transition_to(Submitted));
        assert!(!Rejected.can_transition_to(New));
        assert!(!Closed.can_transition_to(Filled));
        // No self-loops.
        for s in [New, Submitted, Resting, Partial, Filled, Canceled, Rejected, Closed] {
            assert!(!s.can_transition_to(s), "{} should not loop", s);
        }
    }

    #[test]
    fn test_order_status_terminal_states_accept_nothing() {
        use OrderStatus::*;
        let all = [New, Submitted, Resting, Partial, Filled, Canceled, Rejected, Closed];
        for terminal in [Canceled, Rejected, Closed] {
            assert!(terminal.is_terminal());
            for next in all {
                assert!(
                    !terminal.can_transition_to(next),
                    "{} -> {} should be invalid",
                    terminal,
                    next
                );
            }
        }
    }

    #[test]
    fn test_order_status_active() {
        assert!(OrderStatus::New.is_active());
        assert!(OrderStatus::Resting.is_active());
        assert!(OrderStatus::Partial.is_active());
        assert!(!OrderStatus::Filled.is_active());
        assert!(!OrderStatus::Canceled.is_active());
    }

    #[test]
    fn test_market_snapshot_mids_and_spread() {
        let snap = sample_market();
        assert_eq!(snap.yes_mid(), Some(46.5));
        assert_eq!(snap.no_mid(), Some(53.5));
        assert_eq!(snap.yes_spread(), Some(3));
        assert!(snap.is_quotable());
    }

    #[test]
    fn test_market_snapshot_missing_side() {
        let mut snap = sample_market();
        snap.no_ask = None;
        assert!(!snap.is_quotable());
        assert_eq!(snap.no_mid(), None);
        assert_eq!(snap.yes_mid(), Some(46.5));
    }

    #[test]
    fn test_market_snapshot_event_date() {
        let snap = sample_market();
        assert_eq!(
            snap.event_date(),
            Some(NaiveDate::from_ymd_opt(2026, 2, 10).unwrap())
        );
    }

    #[test]
    fn test_order_record_notional() {
        let order = OrderRecord {
            intent_key: "abc".into(),
            intent_version: 1,
            client_order_id: "abc#1".into(),
            exchange_order_id: None,
            ticker: "HIGHNYC-26FEB10-B70".into(),
            city_code: "NYC".into(),
            side: Outcome::Yes,
            quantity: 20,
            limit_price_cents: 71,
            status: OrderStatus::New,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(order.notional_dollars(), Decimal::new(142, 1)); // $14.20
    }

    #[test]
    fn test_position_exposure() {
        let mut pos = PositionRecord {
            ticker: "HIGHNYC-26FEB10-B70".into(),
            city_code: "NYC".into(),
            side: Outcome::Yes,
            quantity_open: 50,
            avg_entry_cents: 50.0,
            avg_exit_cents: None,
            realized_pnl: Decimal::ZERO,
            status: "OPEN".into(),
            opened_at: Utc::now(),
            closed_at: None,
        };
        assert_eq!(pos.exposure_dollars(), Decimal::new(25, 0));

        pos.status = "CLOSED".into();
        assert_eq!(pos.exposure_dollars(), Decimal::ZERO);
    }

    #[test]
    fn test_rollup_win_rate() {
        let mut rollup = CityDailyRollup {
            city_code: "NYC".into(),
            day: "2026-02-10".into(),
            trade_count: 4,
            volume_dollars: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            win_count: 3,
            loss_count: 1,
            computed_at: Utc::now(),
        };
        assert!((rollup.win_rate() - 0.75).abs() < f64::EPSILON);

        rollup.win_count = 0;
        rollup.loss_count = 0;
        assert_eq!(rollup.win_rate(), 0.0);
    }

    #[test]
    fn test_reason_code_strings() {
        assert_eq!(ReasonCode::HighUncertainty.to_string(), "HIGH_UNCERTAINTY");
        assert_eq!(ReasonCode::StaleWeather.to_string(), "STALE_WEATHER");
        assert_eq!(RiskEventType::DailyLossHit.to_string(), "DAILY_LOSS_HIT");
    }

    fn sample_market() -> MarketSnapshot {
        MarketSnapshot {
            ticker: "HIGHNYC-26FEB10-B70".into(),
            city_code: "NYC".into(),
            threshold_f: 70.0,
            direction: Direction::Above,
            event_date: "2026-02-10".into(),
            yes_bid: Some(45),
            yes_ask: Some(48),
            no_bid: Some(52),
            no_ask: Some(55),
            volume: 1200,
            open_interest: 3000,
            close_time: Utc.with_ymd_and_hms(2026, 2, 11, 4, 0, 0).unwrap(),
            captured_at: Utc::now(),
        }
    }
}
