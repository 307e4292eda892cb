//! End-to-end shadow-mode cycle tests against in-process fakes.
//!
//! A mock weather source and mock exchange drive the full per-cycle
//! chain: fetch → evaluate → gate → size → place, plus startup
//! reconciliation scenarios.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal_macros::dec;

use tempest_common::{cities, CoreError, OrderStatus, WeatherSnapshot};
use tempest_exchange::{
    ApiMarket, ApiQuote, CancelAck, ExchangeClient, ExchangeFill, ExchangeOrder,
    ExchangePosition, OrderAck, PlaceOrderRequest,
};

use tempest_bot::config::BotConfig;
use tempest_bot::markets::MarketProvider;
use tempest_bot::oms::{startup_reconcile, Oms, ShadowExecutor};
use tempest_bot::risk::{RiskEngine, RiskLimits};
use tempest_bot::strategy::{DailyHighTempStrategy, StrategyParams};
use tempest_bot::trader::{LoopDeps, TradingLoop};
use tempest_bot::weather::WeatherSource;

// ============================================================================
// Fakes
// ============================================================================

struct FakeWeather {
    snapshots: HashMap<String, WeatherSnapshot>,
}

impl FakeWeather {
    fn with_city(city: &str, high: f64, stddev: f64, stale: bool) -> Self {
        let mut snapshots = HashMap::new();
        snapshots.insert(city.to_string(), snapshot(city, high, stddev, stale));
        Self { snapshots }
    }
}

fn snapshot(city: &str, high: f64, stddev: f64, stale: bool) -> WeatherSnapshot {
    let now = Utc::now();
    WeatherSnapshot {
        city_code: city.to_string(),
        captured_at: now,
        forecast_high_f: high,
        forecast_stddev_f: stddev,
        observed_temp_f: Some(high - 8.0),
        forecast_issued_at: now,
        observed_at: Some(now),
        stale,
    }
}

#[async_trait]
impl WeatherSource for FakeWeather {
    async fn get(&self, city_code: &str) -> Result<WeatherSnapshot, CoreError> {
        self.snapshots
            .get(city_code)
            .cloned()
            .ok_or_else(|| CoreError::StaleData(format!("{}: no weather", city_code)))
    }
}

#[derive(Default)]
struct FakeExchange {
    markets: Vec<ApiMarket>,
    quotes: HashMap<String, ApiQuote>,
    open_orders: Vec<ExchangeOrder>,
    placed: Mutex<Vec<PlaceOrderRequest>>,
}

#[async_trait]
impl ExchangeClient for FakeExchange {
    async fn list_markets(
        &self,
        series: &str,
        _event_date: NaiveDate,
    ) -> Result<Vec<ApiMarket>, CoreError> {
        Ok(self
            .markets
            .iter()
            .filter(|m| m.series_ticker == series)
            .cloned()
            .collect())
    }

    async fn get_orderbook(&self, ticker: &str) -> Result<ApiQuote, CoreError> {
        self.quotes
            .get(ticker)
            .cloned()
            .ok_or_else(|| CoreError::DataValidation(format!("no quote for {}", ticker)))
    }

    async fn place_order(&self, request: PlaceOrderRequest) -> Result<OrderAck, CoreError> {
        let client_order_id = request.client_order_id.clone();
        self.placed.lock().push(request);
        Ok(OrderAck {
            exchange_order_id: format!("x-{}", self.placed.lock().len()),
            client_order_id,
            status: "resting".to_string(),
            filled_quantity: 0,
        })
    }

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<CancelAck, CoreError> {
        Ok(CancelAck {
            exchange_order_id: exchange_order_id.to_string(),
            canceled_quantity: 0,
        })
    }

    async fn list_open_orders(&self) -> Result<Vec<ExchangeOrder>, CoreError> {
        Ok(self.open_orders.clone())
    }

    async fn list_positions(&self) -> Result<Vec<ExchangePosition>, CoreError> {
        Ok(vec![])
    }

    async fn list_fills(&self, _since: DateTime<Utc>) -> Result<Vec<ExchangeFill>, CoreError> {
        Ok(vec![])
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn nyc_market(now: DateTime<Utc>) -> (ApiMarket, ApiQuote) {
    let event_date = cities::get("NYC")
        .unwrap()
        .local_date(now)
        .format("%Y-%m-%d")
        .to_string();
    let market = ApiMarket {
        ticker: "HIGHNYC-B70".to_string(),
        series_ticker: "HIGHNYC".to_string(),
        strike: 70.0,
        direction: "above".to_string(),
        event_date,
        status: "open".to_string(),
        close_time: now + chrono::Duration::hours(12),
        yes_bid: Some(45),
        yes_ask: Some(48),
        no_bid: Some(52),
        no_ask: Some(55),
        volume: 1200,
        open_interest: 3000,
    };
    let quote = ApiQuote {
        ticker: market.ticker.clone(),
        yes_bid: Some(45),
        yes_ask: Some(48),
        no_bid: Some(52),
        no_ask: Some(55),
        volume: 1200,
        open_interest: 3000,
        last_updated: Some(now),
    };
    (market, quote)
}

fn build_loop(weather: FakeWeather, exchange: FakeExchange) -> (TradingLoop, Arc<Oms>) {
    let config = BotConfig::default(); // shadow mode, $5,000 bankroll
    let exchange: Arc<dyn ExchangeClient> = Arc::new(exchange);

    let strategy = Arc::new(DailyHighTempStrategy::new(StrategyParams {
        min_edge_after_costs: config.strategy.min_edge_after_costs,
        max_uncertainty: config.strategy.max_uncertainty,
        bankroll: config.risk.bankroll,
        max_trade_risk_pct: config.risk.max_trade_risk_pct,
        max_contracts: config.risk.max_contracts_per_trade,
    }));
    let oms = Arc::new(Oms::new(Arc::new(ShadowExecutor::new()), config.oms.clone()));
    let risk = RiskEngine::new(RiskLimits::from_settings(&config.risk));

    let deps = LoopDeps {
        weather: Arc::new(weather),
        markets: Arc::new(MarketProvider::new(Arc::clone(&exchange))),
        exchange,
        strategy,
        oms: Arc::clone(&oms),
        repo: None,
    };
    (TradingLoop::new(config, deps, risk), oms)
}

// ============================================================================
// Scenarios
// ============================================================================

// Happy path: forecast 72 / sigma 3 against a 70-threshold market priced
// 45/48 produces one shadow-filled BUY YES order at 71 cents.
#[tokio::test]
async fn test_happy_path_places_one_order() {
    let now = Utc::now();
    let (market, quote) = nyc_market(now);
    let mut exchange = FakeExchange::default();
    exchange.markets.push(market);
    exchange.quotes.insert(quote.ticker.clone(), quote);

    let weather = FakeWeather::with_city("NYC", 72.0, 3.0, false);
    let (trading_loop, oms) = build_loop(weather, exchange);

    let result = trading_loop.run_cycle().await.unwrap();
    assert_eq!(result.orders_placed, 1);
    assert_eq!(result.gates_passed, 1);
    assert_eq!(result.signals_generated, 1);
    assert!(!result.breaker_tripped);

    let orders = oms.orders_snapshot();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.limit_price_cents, 71);
    assert_eq!(order.status, OrderStatus::Filled); // shadow fill at ask
    assert_eq!(order.quantity, 46);
}

// A second cycle for the same intent places nothing new while the first
// order is active, and the intent key is deterministic.
#[tokio::test]
async fn test_second_cycle_is_idempotent_for_resting_orders() {
    let now = Utc::now();
    let (market, quote) = nyc_market(now);
    let mut exchange = FakeExchange::default();
    exchange.markets.push(market);
    exchange.quotes.insert(quote.ticker.clone(), quote);

    let weather = FakeWeather::with_city("NYC", 72.0, 3.0, false);
    let (trading_loop, oms) = build_loop(weather, exchange);

    trading_loop.run_cycle().await.unwrap();
    let first_orders = oms.orders_snapshot();
    assert_eq!(first_orders.len(), 1);

    // Shadow fills are terminal, so the second cycle re-places under a
    // bumped version — same intent key, one order per version.
    trading_loop.run_cycle().await.unwrap();
    let second_orders = oms.orders_snapshot();
    assert_eq!(second_orders.len(), 2);
    assert_eq!(second_orders[0].intent_key, second_orders[1].intent_key);
    let versions: Vec<u32> = {
        let mut v: Vec<u32> = second_orders.iter().map(|o| o.version).collect();
        v.sort();
        v
    };
    assert_eq!(versions, vec![1, 2]);
}

// S2: stale weather skips trading for the city but the audit signal is
// still generated; a stale-weather risk event is recorded.
#[tokio::test]
async fn test_stale_weather_skips_city() {
    let now = Utc::now();
    let (market, quote) = nyc_market(now);
    let mut exchange = FakeExchange::default();
    exchange.markets.push(market);
    exchange.quotes.insert(quote.ticker.clone(), quote);

    let weather = FakeWeather::with_city("NYC", 72.0, 3.0, true);
    let (trading_loop, oms) = build_loop(weather, exchange);

    let result = trading_loop.run_cycle().await.unwrap();
    assert_eq!(result.cities_skipped_stale, 1);
    assert_eq!(result.signals_generated, 1); // audit HOLD still written
    assert_eq!(result.orders_placed, 0);
    assert!(oms.orders_snapshot().is_empty());
}

// S4: a tripped daily-loss breaker suppresses every order while signals
// keep flowing.
#[tokio::test]
async fn test_daily_loss_trip_blocks_orders() {
    let now = Utc::now();
    let (market, quote) = nyc_market(now);
    let mut exchange = FakeExchange::default();
    exchange.markets.push(market);
    exchange.quotes.insert(quote.ticker.clone(), quote);

    let weather = FakeWeather::with_city("NYC", 72.0, 3.0, false);
    let (trading_loop, oms) = build_loop(weather, exchange);

    // Latch the breaker: realized -40, unrealized -12 against cap 49.61.
    let breaker = trading_loop.breaker();
    breaker.check_daily_loss(dec!(-40), dec!(-12), dec!(49.61), now);

    let result = trading_loop.run_cycle().await.unwrap();
    assert!(result.breaker_tripped);
    assert_eq!(result.orders_placed, 0);
    assert_eq!(result.signals_generated, 1);
    assert!(oms.orders_snapshot().is_empty());
}

// Unquotable markets never reach the order path.
#[tokio::test]
async fn test_missing_quote_side_is_ineligible() {
    let now = Utc::now();
    let (market, mut quote) = nyc_market(now);
    quote.no_ask = None;
    let mut exchange = FakeExchange::default();
    exchange.markets.push(market);
    exchange.quotes.insert(quote.ticker.clone(), quote);

    let weather = FakeWeather::with_city("NYC", 72.0, 3.0, false);
    let (trading_loop, oms) = build_loop(weather, exchange);

    let result = trading_loop.run_cycle().await.unwrap();
    assert_eq!(result.orders_placed, 0);
    assert!(oms.orders_snapshot().is_empty());
}

// S5: an exchange order unknown locally imports as a RESTING orphan under
// a synthetic intent; no cancel is issued.
#[tokio::test]
async fn test_startup_reconciliation_imports_orphan() {
    let mut exchange = FakeExchange::default();
    exchange.open_orders.push(ExchangeOrder {
        exchange_order_id: "x-orphan".to_string(),
        client_order_id: None,
        ticker: "HIGHDEN-B55".to_string(),
        side: "yes".to_string(),
        quantity: 25,
        remaining_quantity: 25,
        price_cents: 40,
        status: "open".to_string(),
        created_at: Utc::now(),
    });

    let config = BotConfig::default();
    let oms = Oms::new(Arc::new(ShadowExecutor::new()), config.oms);

    let report = startup_reconcile(&oms, &exchange, Utc::now()).await.unwrap();
    assert!(report.has_mismatch());
    assert_eq!(report.imported_orphans, vec!["x-orphan".to_string()]);

    let orders = oms.orders_snapshot();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Resting);
    assert_eq!(orders[0].exchange_order_id.as_deref(), Some("x-orphan"));
    // No cancel went to the exchange.
    assert!(exchange.placed.lock().is_empty());
}

// Local active orders missing from the exchange close as stale.
#[tokio::test]
async fn test_startup_reconciliation_closes_stale_local() {
    let exchange = FakeExchange::default();
    let config = BotConfig::default();
    let oms = Oms::new(Arc::new(ShadowExecutor::new()), config.oms);

    let now = Utc::now();
    let mut order = tempest_bot::Order::new(
        "a".repeat(64),
        1,
        "HIGHNYC-B70".to_string(),
        "NYC".to_string(),
        tempest_common::Outcome::Yes,
        10,
        71,
        71,
        now,
    );
    order.transition(OrderStatus::Submitted, now).unwrap();
    order.transition(OrderStatus::Resting, now).unwrap();
    let client_id = order.client_order_id.clone();
    oms.insert_existing(order);

    let report = startup_reconcile(&oms, &exchange, now).await.unwrap();
    assert_eq!(report.closed_stale, vec![client_id.clone()]);
    assert_eq!(
        oms.get_by_client_id(&client_id).unwrap().status,
        OrderStatus::Canceled
    );
}
