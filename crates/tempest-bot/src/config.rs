//! Configuration for the trading engine.
//!
//! Loaded from a TOML file with environment variable overrides for
//! credentials and endpoints. Ratios are parsed from percent fields in the
//! file into `Decimal` fractions. Credentials come only from the
//! environment and are never written back or logged.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use tempest_common::{Mode, RepoConfig};

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Trading mode: shadow, paper, live.
    pub mode: Mode,

    /// Logging level.
    pub log_level: String,

    /// Repository (ClickHouse) configuration.
    pub repo: RepoConfig,

    /// Bankroll and risk ratios.
    pub risk: RiskSettings,

    /// Execution-quality gate thresholds.
    pub gates: GateSettings,

    /// Strategy parameters.
    pub strategy: StrategySettings,

    /// Cycle timing and concurrency.
    pub timing: TimingSettings,

    /// Order management parameters.
    pub oms: OmsSettings,

    /// Public read model parameters.
    pub public: PublicSettings,

    /// Exchange endpoints and credentials.
    pub exchange: ExchangeSettings,

    /// Weather service endpoints.
    pub weather: WeatherSettings,
}

/// Bankroll-denominated risk configuration. The risk engine derives every
/// dollar cap from these fields; it has no internal defaults.
#[derive(Debug, Clone)]
pub struct RiskSettings {
    /// Bankroll in dollars.
    pub bankroll: Decimal,
    /// Per-trade cap as a fraction of bankroll.
    pub max_trade_risk_pct: Decimal,
    /// Per-city exposure cap as a fraction of bankroll.
    pub max_city_exposure_pct: Decimal,
    /// Per-cluster exposure cap as a fraction of bankroll.
    pub max_cluster_exposure_pct: Decimal,
    /// Daily loss circuit-breaker threshold as a fraction of bankroll.
    pub max_daily_loss_pct: Decimal,
    /// Hard cap on contracts per trade, applied after dollar sizing.
    pub max_contracts_per_trade: i64,
    /// Rejection-burst window.
    pub reject_window: Duration,
    /// Rejections within the window that trip the breaker.
    pub reject_burst_limit: usize,
}

/// Execution-quality gates.
#[derive(Debug, Clone)]
pub struct GateSettings {
    /// Maximum acceptable spread in cents (inclusive).
    pub spread_max_cents: i64,
    /// Minimum of volume and open interest.
    pub liquidity_min: i64,
    /// Open interest must be at least `liquidity_min * this`.
    pub min_liquidity_multiple: f64,
}

/// Strategy parameters.
#[derive(Debug, Clone)]
pub struct StrategySettings {
    /// Minimum absolute edge after costs (fraction, e.g. 0.03).
    pub min_edge_after_costs: f64,
    /// Maximum normalized uncertainty before HOLD.
    pub max_uncertainty: f64,
}

/// Cycle timing and concurrency.
#[derive(Debug, Clone)]
pub struct TimingSettings {
    pub cycle_interval: Duration,
    pub error_sleep: Duration,
    /// Overall per-cycle network budget.
    pub cycle_budget: Duration,
    /// Hard timeout per network call.
    pub call_timeout: Duration,
    /// Bounded city fan-out.
    pub city_workers: usize,
    pub weather_cache_ttl: Duration,
    /// Source data older than this marks the snapshot stale.
    pub weather_stale_ceiling: Duration,
}

/// Order management parameters.
#[derive(Debug, Clone)]
pub struct OmsSettings {
    /// Minimum time between cancel/replace attempts per intent.
    pub reprice_interval: Duration,
    /// Maximum cumulative price movement from the original order.
    pub max_chase_cents: i64,
}

/// Public read model parameters.
#[derive(Debug, Clone)]
pub struct PublicSettings {
    /// Delay before a fill becomes publicly visible.
    pub delay: Duration,
}

/// Exchange endpoints and credentials. Key material only from env.
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    pub live_url: String,
    pub paper_url: String,
    pub rate_limit_rps: f64,
    pub api_key_id: Option<String>,
    pub signing_secret: Option<String>,
}

/// Weather service endpoints.
#[derive(Debug, Clone)]
pub struct WeatherSettings {
    pub base_url: String,
    pub rate_limit_rps: f64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Shadow,
            log_level: "info".to_string(),
            repo: RepoConfig::default(),
            risk: RiskSettings {
                bankroll: Decimal::new(500000, 2), // $5,000.00
                max_trade_risk_pct: Decimal::new(2, 2),
                max_city_exposure_pct: Decimal::new(3, 2),
                max_cluster_exposure_pct: Decimal::new(5, 2),
                max_daily_loss_pct: Decimal::new(5, 2),
                max_contracts_per_trade: 95,
                reject_window: Duration::from_secs(15 * 60),
                reject_burst_limit: 5,
            },
            gates: GateSettings {
                spread_max_cents: 4,
                liquidity_min: 500,
                min_liquidity_multiple: 5.0,
            },
            strategy: StrategySettings {
                min_edge_after_costs: 0.03,
                max_uncertainty: 0.30,
            },
            timing: TimingSettings {
                cycle_interval: Duration::from_secs(60),
                error_sleep: Duration::from_secs(5),
                cycle_budget: Duration::from_secs(30),
                call_timeout: Duration::from_secs(10),
                city_workers: 10,
                weather_cache_ttl: Duration::from_secs(300),
                weather_stale_ceiling: Duration::from_secs(1800),
            },
            oms: OmsSettings {
                reprice_interval: Duration::from_secs(120),
                max_chase_cents: 5,
            },
            public: PublicSettings {
                delay: Duration::from_secs(3600),
            },
            exchange: ExchangeSettings {
                live_url: "https://api.example-exchange.com".to_string(),
                paper_url: "https://paper-api.example-exchange.com".to_string(),
                rate_limit_rps: 10.0,
                api_key_id: None,
                signing_secret: None,
            },
            weather: WeatherSettings {
                base_url: "https://api.weather.gov".to_string(),
                rate_limit_rps: 1.0,
            },
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Ok(Self::from(file))
    }

    /// Apply environment variable overrides for sensitive values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("EXCHANGE_API_KEY_ID") {
            self.exchange.api_key_id = Some(key);
        }
        if let Ok(secret) = std::env::var("EXCHANGE_SIGNING_SECRET") {
            self.exchange.signing_secret = Some(secret);
        }
        if let Ok(url) = std::env::var("CLICKHOUSE_URL") {
            self.repo.url = url;
        }
        if let Ok(user) = std::env::var("CLICKHOUSE_USER") {
            self.repo.user = Some(user);
        }
        if let Ok(pass) = std::env::var("CLICKHOUSE_PASSWORD") {
            self.repo.password = Some(pass);
        }
    }

    /// Base URL matching the configured mode. Shadow mode still reads
    /// market data, which comes from the paper endpoint.
    pub fn exchange_base_url(&self) -> &str {
        match self.mode {
            Mode::Live => &self.exchange.live_url,
            Mode::Paper | Mode::Shadow => &self.exchange.paper_url,
        }
    }

    /// Validate configuration; invalid configs exit with code 1.
    pub fn validate(&self) -> Result<()> {
        if self.mode == Mode::Live {
            if self.exchange.api_key_id.is_none() {
                bail!("Live mode requires EXCHANGE_API_KEY_ID");
            }
            if self.exchange.signing_secret.is_none() {
                bail!("Live mode requires EXCHANGE_SIGNING_SECRET");
            }
        }

        if self.risk.bankroll <= Decimal::ZERO {
            bail!("bankroll must be positive");
        }
        for (name, ratio) in [
            ("max_trade_risk_pct", self.risk.max_trade_risk_pct),
            ("max_city_exposure_pct", self.risk.max_city_exposure_pct),
            ("max_cluster_exposure_pct", self.risk.max_cluster_exposure_pct),
            ("max_daily_loss_pct", self.risk.max_daily_loss_pct),
        ] {
            if ratio <= Decimal::ZERO || ratio > Decimal::ONE {
                bail!("{} must be in (0, 1]", name);
            }
        }
        if self.risk.max_trade_risk_pct > self.risk.max_city_exposure_pct {
            bail!("max_trade_risk_pct cannot exceed max_city_exposure_pct");
        }
        if self.risk.max_city_exposure_pct > self.risk.max_cluster_exposure_pct {
            bail!("max_city_exposure_pct cannot exceed max_cluster_exposure_pct");
        }
        if self.risk.max_contracts_per_trade < 1 {
            bail!("max_contracts_per_trade must be at least 1");
        }

        if self.gates.spread_max_cents < 1 {
            bail!("spread_max_cents must be at least 1");
        }
        if self.gates.min_liquidity_multiple < 1.0 {
            bail!("min_liquidity_multiple must be at least 1.0");
        }
        if !(0.0..=1.0).contains(&self.strategy.min_edge_after_costs) {
            bail!("min_edge_after_costs must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.strategy.max_uncertainty)
            || self.strategy.max_uncertainty == 0.0
        {
            bail!("max_uncertainty must be in (0, 1]");
        }

        if self.timing.cycle_interval < Duration::from_secs(10) {
            bail!("cycle_interval_sec must be at least 10");
        }
        if self.timing.city_workers == 0 {
            bail!("city_workers must be at least 1");
        }

        Ok(())
    }
}

// ============================================================================
// TOML deserialization structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    clickhouse: ClickHouseToml,
    #[serde(default)]
    risk: RiskToml,
    #[serde(default)]
    gates: GatesToml,
    #[serde(default)]
    strategy: StrategyToml,
    #[serde(default)]
    timing: TimingToml,
    #[serde(default)]
    oms: OmsToml,
    #[serde(default)]
    public: PublicToml,
    #[serde(default)]
    exchange: ExchangeToml,
    #[serde(default)]
    weather: WeatherToml,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    mode: String,
    log_level: String,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            mode: "shadow".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ClickHouseToml {
    url: String,
    database: String,
    max_rows: u64,
    max_bytes: u64,
    period_secs: u64,
}

impl Default for ClickHouseToml {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "tempest".to_string(),
            max_rows: 10_000,
            max_bytes: 10 * 1024 * 1024,
            period_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RiskToml {
    bankroll: f64,
    max_trade_risk_pct: f64,
    max_city_exposure_pct: f64,
    max_cluster_exposure_pct: f64,
    max_daily_loss_pct: f64,
    max_contracts_per_trade: i64,
    reject_window_minutes: u64,
    reject_burst_limit: usize,
}

impl Default for RiskToml {
    fn default() -> Self {
        Self {
            bankroll: 5000.0,
            max_trade_risk_pct: 0.02,
            max_city_exposure_pct: 0.03,
            max_cluster_exposure_pct: 0.05,
            max_daily_loss_pct: 0.05,
            max_contracts_per_trade: 95,
            reject_window_minutes: 15,
            reject_burst_limit: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GatesToml {
    spread_max_cents: i64,
    liquidity_min: i64,
    min_liquidity_multiple: f64,
}

impl Default for GatesToml {
    fn default() -> Self {
        Self {
            spread_max_cents: 4,
            liquidity_min: 500,
            min_liquidity_multiple: 5.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct StrategyToml {
    min_edge_after_costs: f64,
    max_uncertainty: f64,
}

impl Default for StrategyToml {
    fn default() -> Self {
        Self {
            min_edge_after_costs: 0.03,
            max_uncertainty: 0.30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct TimingToml {
    cycle_interval_sec: u64,
    error_sleep_sec: u64,
    cycle_budget_sec: u64,
    call_timeout_sec: u64,
    city_workers: usize,
    weather_cache_ttl_sec: u64,
    weather_stale_ceiling_sec: u64,
}

impl Default for TimingToml {
    fn default() -> Self {
        Self {
            cycle_interval_sec: 60,
            error_sleep_sec: 5,
            cycle_budget_sec: 30,
            call_timeout_sec: 10,
            city_workers: 10,
            weather_cache_ttl_sec: 300,
            weather_stale_ceiling_sec: 1800,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct OmsToml {
    reprice_interval_sec: u64,
    max_chase_cents: i64,
}

impl Default for OmsToml {
    fn default() -> Self {
        Self {
            reprice_interval_sec: 120,
            max_chase_cents: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PublicToml {
    public_delay_sec: u64,
}

impl Default for PublicToml {
    fn default() -> Self {
        Self {
            public_delay_sec: 3600,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ExchangeToml {
    live_url: String,
    paper_url: String,
    rate_limit_rps: f64,
}

impl Default for ExchangeToml {
    fn default() -> Self {
        Self {
            live_url: "https://api.example-exchange.com".to_string(),
            paper_url: "https://paper-api.example-exchange.com".to_string(),
            rate_limit_rps: 10.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct WeatherToml {
    base_url: String,
    rate_limit_rps: f64,
}

impl Default for WeatherToml {
    fn default() -> Self {
        Self {
            base_url: "https://api.weather.gov".to_string(),
            rate_limit_rps: 1.0,
        }
    }
}

/// Convert f64 config ratio to Decimal (e.g., 0.02).
fn ratio_to_decimal(val: f64) -> Decimal {
    Decimal::try_from(val).unwrap_or(Decimal::ZERO)
}

impl From<TomlConfig> for BotConfig {
    fn from(toml: TomlConfig) -> Self {
        Self {
            mode: toml.general.mode.parse().unwrap_or(Mode::Shadow),
            log_level: toml.general.log_level,
            repo: RepoConfig {
                url: toml.clickhouse.url,
                database: toml.clickhouse.database,
                user: None,
                password: None,
                max_rows: toml.clickhouse.max_rows,
                max_bytes: toml.clickhouse.max_bytes,
                commit_period: Duration::from_secs(toml.clickhouse.period_secs),
            },
            risk: RiskSettings {
                bankroll: ratio_to_decimal(toml.risk.bankroll),
                max_trade_risk_pct: ratio_to_decimal(toml.risk.max_trade_risk_pct),
                max_city_exposure_pct: ratio_to_decimal(toml.risk.max_city_exposure_pct),
                max_cluster_exposure_pct: ratio_to_decimal(toml.risk.max_cluster_exposure_pct),
                max_daily_loss_pct: ratio_to_decimal(toml.risk.max_daily_loss_pct),
                max_contracts_per_trade: toml.risk.max_contracts_per_trade,
                reject_window: Duration::from_secs(toml.risk.reject_window_minutes * 60),
                reject_burst_limit: toml.risk.reject_burst_limit,
            },
            gates: GateSettings {
                spread_max_cents: toml.gates.spread_max_cents,
                liquidity_min: toml.gates.liquidity_min,
                min_liquidity_multiple: toml.gates.min_liquidity_multiple,
            },
            strategy: StrategySettings {
                min_edge_after_costs: toml.strategy.min_edge_after_costs,
                max_uncertainty: toml.strategy.max_uncertainty,
            },
            timing: TimingSettings {
                cycle_interval: Duration::from_secs(toml.timing.cycle_interval_sec),
                error_sleep: Duration::from_secs(toml.timing.error_sleep_sec),
                cycle_budget: Duration::from_secs(toml.timing.cycle_budget_sec),
                call_timeout: Duration::from_secs(toml.timing.call_timeout_sec),
                city_workers: toml.timing.city_workers,
                weather_cache_ttl: Duration::from_secs(toml.timing.weather_cache_ttl_sec),
                weather_stale_ceiling: Duration::from_secs(
                    toml.timing.weather_stale_ceiling_sec,
                ),
            },
            oms: OmsSettings {
                reprice_interval: Duration::from_secs(toml.oms.reprice_interval_sec),
                max_chase_cents: toml.oms.max_chase_cents,
            },
            public: PublicSettings {
                delay: Duration::from_secs(toml.public.public_delay_sec),
            },
            exchange: ExchangeSettings {
                live_url: toml.exchange.live_url,
                paper_url: toml.exchange.paper_url,
                rate_limit_rps: toml.exchange.rate_limit_rps,
                api_key_id: None,    // Always from env
                signing_secret: None, // Always from env
            },
            weather: WeatherSettings {
                base_url: toml.weather.base_url,
                rate_limit_rps: toml.weather.rate_limit_rps,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = BotConfig::default();
        assert_eq!(config.mode, Mode::Shadow);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [general]
            mode = "paper"
            log_level = "debug"

            [clickhouse]
            url = "http://db:8123"

            [risk]
            bankroll = 992.10
            max_daily_loss_pct = 0.05

            [gates]
            spread_max_cents = 3

            [public]
            public_delay_sec = 300
        "#;

        let config = BotConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.mode, Mode::Paper);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.repo.url, "http://db:8123");
        assert_eq!(config.risk.bankroll, dec!(992.10));
        assert_eq!(config.gates.spread_max_cents, 3);
        assert_eq!(config.public.delay, Duration::from_secs(300));
        // Untouched sections keep defaults.
        assert_eq!(config.gates.liquidity_min, 500);
        assert_eq!(config.strategy.max_uncertainty, 0.30);
    }

    #[test]
    fn test_validate_live_requires_credentials() {
        let mut config = BotConfig::default();
        config.mode = Mode::Live;
        assert!(config.validate().is_err());

        config.exchange.api_key_id = Some("key".into());
        config.exchange.signing_secret = Some("secret".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_ratio_bounds() {
        let mut config = BotConfig::default();
        config.risk.max_daily_loss_pct = Decimal::ZERO;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.risk.max_trade_risk_pct = dec!(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_cap_ordering() {
        let mut config = BotConfig::default();
        config.risk.max_trade_risk_pct = dec!(0.04); // > city cap 0.03
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.risk.max_city_exposure_pct = dec!(0.06); // > cluster cap 0.05
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_exchange_base_url_by_mode() {
        let mut config = BotConfig::default();
        assert_eq!(config.exchange_base_url(), config.exchange.paper_url);
        config.mode = Mode::Live;
        assert_eq!(config.exchange_base_url(), config.exchange.live_url);
    }

    #[test]
    fn test_validate_cycle_interval_floor() {
        let mut config = BotConfig::default();
        config.timing.cycle_interval = Duration::from_secs(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_window_minutes() {
        let config = BotConfig::default();
        assert_eq!(config.risk.reject_window, Duration::from_secs(900));
        assert_eq!(config.risk.reject_burst_limit, 5);
    }
}
