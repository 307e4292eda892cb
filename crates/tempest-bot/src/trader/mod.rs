//! The trading loop: periodic composition of reconciliation, breaker
//! checks, and the per-city fetch → evaluate → gate → size → place chain.
//!
//! One cycle:
//! 1. Reconcile fills since the last cursor (mandatory, before risk).
//! 2. Check the daily-loss and rejection-burst breakers; if tripped the
//!    trading stage is skipped, snapshots are still persisted.
//! 3. Fan out per city on a bounded worker pool. A city's steps run in
//!    fixed order; across cities execution is unordered but every sizing
//!    decision observes the shared in-cycle exposure accumulator.
//! 4. Sleep until the next tick; errors degrade health and back off.
//!
//! Shutdown is cooperative: a watch channel checked between cycles and at
//! suspension points. In-flight submissions finish before exit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use tempest_common::{
    cities, Component, CoreError, FillRecord, Mode, Outcome, PositionRecord, ReconcileCursor,
    Repository, RiskEventRecord, RiskEventType, Severity,
};
use tempest_exchange::ExchangeClient;

use crate::config::BotConfig;
use crate::gates::{self, GateOutcome};
use crate::health::HealthMonitor;
use crate::markets::MarketProvider;
use crate::oms::{reconcile_fills, Intent, Oms, OrderPlan, SubmitOutcome};
use crate::positions::{position_from_order, PositionBook};
use crate::risk::{CapKind, CircuitBreaker, LossCheck, RiskEngine, SizeDecision};
use crate::strategy::Strategy;
use crate::weather::WeatherSource;

const FILL_CURSOR: &str = "fills";

/// Everything the loop composes. Trait objects at the seams so tests can
/// substitute in-process fakes.
pub struct LoopDeps {
    pub weather: Arc<dyn WeatherSource>,
    pub markets: Arc<MarketProvider>,
    pub exchange: Arc<dyn ExchangeClient>,
    pub strategy: Arc<dyn Strategy>,
    pub oms: Arc<Oms>,
    pub repo: Option<Repository>,
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleResult {
    pub cities_processed: usize,
    pub cities_skipped_stale: usize,
    pub markets_evaluated: usize,
    pub signals_generated: usize,
    pub gates_passed: usize,
    pub orders_placed: usize,
    pub risk_refusals: usize,
    pub breaker_tripped: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
struct CityStats {
    skipped_stale: bool,
    markets_evaluated: usize,
    signals_generated: usize,
    gates_passed: usize,
    orders_placed: usize,
    risk_refusals: usize,
    errors: Vec<String>,
}

/// The orchestrator.
pub struct TradingLoop {
    config: BotConfig,
    deps: LoopDeps,
    risk: RiskEngine,
    breaker: Arc<CircuitBreaker>,
    health: Arc<HealthMonitor>,
    book: Mutex<PositionBook>,
    fill_cursor: Mutex<DateTime<Utc>>,
    /// Latest YES mid per ticker, for unrealized pnl marks.
    marks: Arc<Mutex<std::collections::HashMap<String, f64>>>,
}

impl TradingLoop {
    pub fn new(config: BotConfig, deps: LoopDeps, risk: RiskEngine) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            config.risk.reject_window,
            config.risk.reject_burst_limit,
        ));
        Self {
            config,
            deps,
            risk,
            breaker,
            health: Arc::new(HealthMonitor::new()),
            book: Mutex::new(PositionBook::new()),
            fill_cursor: Mutex::new(Utc::now() - chrono::Duration::days(1)),
            marks: Arc::new(Mutex::new(std::collections::HashMap::new())),
        }
    }

    pub fn health(&self) -> Arc<HealthMonitor> {
        Arc::clone(&self.health)
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }

    /// Rehydrate book and cursor from the repository at startup.
    pub async fn restore_state(&self) -> Result<(), CoreError> {
        let Some(repo) = &self.deps.repo else {
            return Ok(());
        };
        let positions = repo.fetch_open_positions().await?;
        *self.book.lock().await = PositionBook::from_records(positions);

        if let Some(cursor) = repo.fetch_cursor(FILL_CURSOR).await? {
            *self.fill_cursor.lock().await = cursor.position;
        }

        for record in repo.fetch_active_orders().await? {
            self.deps
                .oms
                .insert_existing(crate::oms::Order::from_record(&record));
        }
        Ok(())
    }

    /// Run until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), CoreError> {
        info!(mode = %self.config.mode, "trading loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Utc::now();
            match tokio::time::timeout(self.config.timing.cycle_budget, self.run_cycle()).await {
                Ok(Ok(result)) => {
                    info!(
                        duration_ms = (Utc::now() - started).num_milliseconds(),
                        cities = result.cities_processed,
                        signals = result.signals_generated,
                        orders = result.orders_placed,
                        refusals = result.risk_refusals,
                        tripped = result.breaker_tripped,
                        "cycle complete"
                    );
                    self.health.ok(Component::Trader, Utc::now());
                }
                Ok(Err(e)) if e.is_fatal() => {
                    error!(error = %e, "fatal error, halting loop");
                    return Err(e);
                }
                Ok(Err(e)) => {
                    error!(error = %e, "cycle failed");
                    self.health
                        .degraded(Component::Trader, e.to_string(), Utc::now());
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.timing.error_sleep) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }
                Err(_) => {
                    warn!("cycle exceeded budget");
                    self.health
                        .degraded(Component::Trader, "cycle budget exceeded", Utc::now());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.timing.cycle_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("trading loop stopped");
        Ok(())
    }

    /// One full cycle.
    pub async fn run_cycle(&self) -> Result<CycleResult, CoreError> {
        let now = Utc::now();
        let mut result = CycleResult::default();

        // Step 1: fill reconciliation, before any risk decision.
        if let Err(e) = self.sync_fills(now).await {
            match &e {
                CoreError::Auth(_) => {
                    self.health
                        .down(Component::ExchangeApi, e.to_string(), now);
                }
                CoreError::TransientNetwork(_) => {
                    self.health
                        .degraded(Component::ExchangeApi, e.to_string(), now);
                }
                _ => return Err(e),
            }
            result.errors.push(e.to_string());
        } else {
            self.health.ok(Component::ExchangeApi, now);
        }

        // Step 2: circuit breakers.
        let trading_allowed = self.check_breakers(now, &mut result).await?;

        // Step 3: per-city fan-out.
        let accumulator: Arc<Mutex<Vec<PositionRecord>>> = {
            let book = self.book.lock().await;
            Arc::new(Mutex::new(book.open_positions()))
        };
        let semaphore = Arc::new(Semaphore::new(self.config.timing.city_workers));
        let mut tasks: JoinSet<(String, CityStats)> = JoinSet::new();

        for city in cities::CITIES.iter() {
            let semaphore = Arc::clone(&semaphore);
            let ctx = self.city_ctx(Arc::clone(&accumulator), trading_allowed);
            let code = city.code.to_string();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (code, CityStats::default());
                };
                let stats = ctx.run_city(&code).await;
                (code, stats)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((city, stats)) => {
                    result.cities_processed += 1;
                    if stats.skipped_stale {
                        result.cities_skipped_stale += 1;
                    }
                    result.markets_evaluated += stats.markets_evaluated;
                    result.signals_generated += stats.signals_generated;
                    result.gates_passed += stats.gates_passed;
                    result.orders_placed += stats.orders_placed;
                    result.risk_refusals += stats.risk_refusals;
                    for err in stats.errors {
                        result.errors.push(format!("{}: {}", city, err));
                    }
                }
                Err(e) => result.errors.push(format!("worker panic: {}", e)),
            }
        }

        // Persist health snapshot.
        if let Some(repo) = &self.deps.repo {
            if let Err(e) = repo.upsert_health(&self.health.snapshot()).await {
                warn!(error = %e, "health persist failed");
            }
        }

        Ok(result)
    }

    /// Fetch fills since the cursor, replay them, persist, advance.
    async fn sync_fills(&self, now: DateTime<Utc>) -> Result<(), CoreError> {
        let cursor = *self.fill_cursor.lock().await;
        let mut book = self.book.lock().await;
        let report =
            reconcile_fills(&*self.deps.oms, &*self.deps.exchange, &mut book, cursor).await?;
        drop(book);

        if let Some(repo) = &self.deps.repo {
            if !report.fills.is_empty() {
                repo.insert_fills(&report.fills).await?;
                let records: Vec<_> = self
                    .deps
                    .oms
                    .orders_snapshot()
                    .iter()
                    .map(|o| o.to_record())
                    .collect();
                repo.upsert_orders(&records).await?;
                let book = self.book.lock().await;
                repo.upsert_positions(&book.all()).await?;
            }
            if let Some(position) = report.new_cursor {
                repo.save_cursor(&ReconcileCursor {
                    name: FILL_CURSOR.to_string(),
                    position,
                    updated_at: now,
                })
                .await?;
            }
        }
        if let Some(position) = report.new_cursor {
            *self.fill_cursor.lock().await = position;
        }
        Ok(())
    }

    /// Evaluate both breakers; returns whether trading may proceed.
    async fn check_breakers(
        &self,
        now: DateTime<Utc>,
        result: &mut CycleResult,
    ) -> Result<bool, CoreError> {
        let (realized, unrealized) = {
            let book = self.book.lock().await;
            let marks = self.marks.lock().await;
            (
                book.realized_pnl_on(now.date_naive()),
                book.unrealized_pnl(&marks),
            )
        };

        let mut allowed = true;

        if self
            .breaker
            .check_daily_loss(realized, unrealized, self.risk.daily_loss_cap(), now)
            == LossCheck::Tripped
        {
            result.breaker_tripped = true;
            allowed = false;
            self.persist_risk_event(RiskEventRecord {
                event_type: RiskEventType::DailyLossHit,
                severity: Severity::Critical,
                city_code: None,
                payload: format!(
                    "{{\"realized\":\"{}\",\"unrealized\":\"{}\",\"cap\":\"{}\"}}",
                    realized,
                    unrealized,
                    self.risk.daily_loss_cap()
                ),
                created_at: now,
            })
            .await;
        }

        if self.breaker.rejection_burst(now) {
            result.breaker_tripped = true;
            allowed = false;
            self.persist_risk_event(RiskEventRecord {
                event_type: RiskEventType::RejectBurst,
                severity: Severity::Critical,
                city_code: None,
                payload: "{\"window_minutes\":15}".to_string(),
                created_at: now,
            })
            .await;
        }

        if self.health.order_path_paused() {
            allowed = false;
        }

        Ok(allowed)
    }

    async fn persist_risk_event(&self, event: RiskEventRecord) {
        if let Some(repo) = &self.deps.repo {
            if let Err(e) = repo.insert_risk_events(std::slice::from_ref(&event)).await {
                warn!(error = %e, "risk event persist failed");
            }
        }
    }

    fn city_ctx(
        &self,
        accumulator: Arc<Mutex<Vec<PositionRecord>>>,
        trading_allowed: bool,
    ) -> Arc<CityCtx> {
        Arc::new(CityCtx {
            config: self.config.clone(),
            weather: Arc::clone(&self.deps.weather),
            markets: Arc::clone(&self.deps.markets),
            strategy: Arc::clone(&self.deps.strategy),
            oms: Arc::clone(&self.deps.oms),
            repo: self.deps.repo.clone(),
            risk: self.risk.clone(),
            breaker: Arc::clone(&self.breaker),
            health: Arc::clone(&self.health),
            accumulator,
            marks: Arc::clone(&self.marks),
            trading_allowed,
        })
    }
}

/// Per-cycle context shared by the city workers.
struct CityCtx {
    config: BotConfig,
    weather: Arc<dyn WeatherSource>,
    markets: Arc<MarketProvider>,
    strategy: Arc<dyn Strategy>,
    oms: Arc<Oms>,
    repo: Option<Repository>,
    risk: RiskEngine,
    breaker: Arc<CircuitBreaker>,
    health: Arc<HealthMonitor>,
    accumulator: Arc<Mutex<Vec<PositionRecord>>>,
    marks: Arc<Mutex<std::collections::HashMap<String, f64>>>,
    trading_allowed: bool,
}

impl CityCtx {
    /// Fixed per-city order: fetch → evaluate → gate → size → place.
    async fn run_city(&self, city_code: &str) -> CityStats {
        let mut stats = CityStats::default();
        let now = Utc::now();

        // Weather first; a stale snapshot skips trading for the city but
        // signals are still evaluated and persisted for audit.
        let weather = match self.weather.get(city_code).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(city = city_code, error = %e, "weather unavailable, skipping city");
                self.health
                    .degraded(Component::WeatherApi, e.to_string(), now);
                stats.errors.push(e.to_string());
                return stats;
            }
        };
        self.health.ok(Component::WeatherApi, now);
        self.persist_weather(&weather).await;

        if weather.stale {
            stats.skipped_stale = true;
            self.persist_risk_event(RiskEventRecord {
                event_type: RiskEventType::StaleWeather,
                severity: Severity::Warning,
                city_code: Some(city_code.to_string()),
                payload: format!(
                    "{{\"captured_at\":\"{}\",\"forecast_issued_at\":\"{}\"}}",
                    weather.captured_at, weather.forecast_issued_at
                ),
                created_at: now,
            })
            .await;
        }

        // Candidate markets for the city's local event date.
        let event_date = match cities::get(city_code) {
            Some(city) => city.local_date(now),
            None => return stats,
        };
        let tickers = match self.markets.list_active(city_code, event_date).await {
            Ok(tickers) => tickers,
            Err(e) => {
                stats.errors.push(e.to_string());
                return stats;
            }
        };

        for ticker in tickers {
            let market = match self.markets.quote(city_code, &ticker).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    stats.errors.push(format!("{}: {}", ticker, e));
                    continue;
                }
            };
            stats.markets_evaluated += 1;
            self.persist_market(&market).await;
            if let Some(mid) = market.yes_mid() {
                self.marks.lock().await.insert(market.ticker.clone(), mid);
            }

            let signal = self.strategy.evaluate(&weather, &market);
            stats.signals_generated += 1;
            self.persist_signal(&signal).await;

            let gate_outcome = gates::check_all(
                &signal,
                &market,
                &self.config.gates,
                self.config.strategy.min_edge_after_costs,
            );

            // Resting orders for this contract are managed every cycle,
            // even when no new placement happens.
            self.manage_existing(&signal, &market, city_code, &ticker, event_date, gate_outcome, now)
                .await;

            if weather.stale || !self.trading_allowed || !signal.is_actionable() {
                continue;
            }
            if !market.is_quotable() {
                continue;
            }

            match gate_outcome {
                GateOutcome::Admitted => stats.gates_passed += 1,
                GateOutcome::Refused(reason) => {
                    info!(ticker = %ticker, reason = %reason, "gate refused");
                    continue;
                }
            }

            let side = signal.side.unwrap_or(Outcome::Yes);

            // Size and reserve under the shared accumulator lock so every
            // concurrent sizing decision observes all placements already
            // admitted this cycle. The lock is released before the
            // submission I/O; a failed submission releases its
            // reservation.
            let reservation = {
                let mut accumulator = self.accumulator.lock().await;
                let decision = match self.risk.size(&signal, &accumulator) {
                    Ok(decision) => decision,
                    Err(e) => {
                        stats.errors.push(format!("{}: {}", ticker, e));
                        continue;
                    }
                };
                match decision {
                    SizeDecision::Admitted {
                        quantity,
                        limit_price_cents,
                    } => {
                        let reservation = position_from_order(
                            &ticker,
                            city_code,
                            side,
                            quantity,
                            limit_price_cents,
                            now,
                        );
                        accumulator.push(reservation.clone());
                        Ok((quantity, limit_price_cents, reservation))
                    }
                    SizeDecision::Refused {
                        cap,
                        current_exposure,
                        limit,
                    } => Err((cap, current_exposure, limit)),
                }
            };

            let (quantity, limit_price_cents, reservation) = match reservation {
                Ok(admitted) => admitted,
                Err((cap, current_exposure, limit)) => {
                    stats.risk_refusals += 1;
                    self.persist_risk_event(RiskEventRecord {
                        event_type: match cap {
                            CapKind::PerTrade => RiskEventType::TradeCapHit,
                            CapKind::City => RiskEventType::CityCapHit,
                            CapKind::Cluster => RiskEventType::ClusterCapHit,
                        },
                        severity: Severity::Warning,
                        city_code: Some(city_code.to_string()),
                        payload: format!(
                            "{{\"ticker\":\"{}\",\"exposure\":\"{}\",\"limit\":\"{}\"}}",
                            ticker, current_exposure, limit
                        ),
                        created_at: now,
                    })
                    .await;
                    continue;
                }
            };

            let plan = OrderPlan {
                intent: Intent::new(
                    city_code,
                    ticker.clone(),
                    side,
                    self.strategy.name(),
                    event_date,
                ),
                quantity,
                limit_price_cents,
                market_ask: market.ask_for(side),
            };

            match self.oms.submit(plan, now).await {
                Ok(SubmitOutcome::Placed(order)) => {
                    stats.orders_placed += 1;
                    self.persist_order(&order).await;
                    if self.config.mode == Mode::Shadow
                        && order.status == tempest_common::OrderStatus::Filled
                    {
                        self.record_shadow_fill(&order, market.ask_for(side), now).await;
                    }
                }
                Ok(SubmitOutcome::Existing(_)) => {
                    // Nothing new was placed; the reservation was
                    // premature.
                    self.release_reservation(&reservation).await;
                }
                Ok(SubmitOutcome::Rejected(order, reason)) => {
                    self.release_reservation(&reservation).await;
                    self.breaker.record_rejection(now);
                    self.persist_order(&order).await;
                    warn!(ticker = %order.ticker, reason = %reason, "order rejected");
                }
                Err(e) => {
                    self.release_reservation(&reservation).await;
                    self.breaker.record_rejection(now);
                    stats.errors.push(format!("{}: {}", ticker, e));
                    if matches!(e, CoreError::Auth(_)) {
                        self.health.down(Component::ExchangeApi, e.to_string(), now);
                    }
                }
            }
        }

        stats
    }

    /// Per-cycle care of resting orders on this contract: pull orders
    /// whose execution quality fell out of gate, and reprice (bounded,
    /// throttled) when the signal's ceiling moved.
    async fn manage_existing(
        &self,
        signal: &crate::strategy::Signal,
        market: &tempest_common::MarketSnapshot,
        city_code: &str,
        ticker: &str,
        event_date: chrono::NaiveDate,
        gate_outcome: GateOutcome,
        now: DateTime<Utc>,
    ) {
        let quality_failed = matches!(
            gate_outcome,
            GateOutcome::Refused(crate::gates::GateReason::SpreadWide)
                | GateOutcome::Refused(crate::gates::GateReason::LowLiquidity)
        );

        for side in [Outcome::Yes, Outcome::No] {
            let key = Intent::new(
                city_code,
                ticker.to_string(),
                side,
                self.strategy.name(),
                event_date,
            )
            .key();
            let Some(active) = self.oms.active_order(&key) else {
                continue;
            };

            if quality_failed {
                info!(ticker, side = %side, "pulling resting order: execution quality out of gate");
                if let Err(e) = self.oms.cancel(&key, now).await {
                    warn!(ticker, error = %e, "cancel failed");
                } else if let Some(order) = self.oms.latest_order(&key) {
                    self.persist_order(&order).await;
                }
                continue;
            }

            // Repricing places a replacement order, so it respects the
            // trading gate the same way new placements do.
            if !self.trading_allowed || !signal.is_actionable() || signal.side != Some(side) {
                continue;
            }
            let Some(price) = signal.max_price_cents else {
                continue;
            };
            if price == active.limit_price_cents {
                continue;
            }
            match self
                .oms
                .cancel_replace(&key, price, market.ask_for(side), now)
                .await
            {
                Ok(crate::oms::ReplaceOutcome::Replaced(order)) => {
                    info!(ticker, from = active.limit_price_cents, to = price, "repriced");
                    self.persist_order(&order).await;
                }
                Ok(_) => {}
                Err(e) => warn!(ticker, error = %e, "cancel/replace failed"),
            }
        }
    }

    /// Remove an exposure reservation whose submission did not stick.
    async fn release_reservation(&self, reservation: &PositionRecord) {
        let mut accumulator = self.accumulator.lock().await;
        if let Some(index) = accumulator.iter().position(|p| {
            p.ticker == reservation.ticker
                && p.side == reservation.side
                && p.quantity_open == reservation.quantity_open
                && p.opened_at == reservation.opened_at
        }) {
            accumulator.remove(index);
        }
    }

    /// Shadow fills never reach the exchange, so the loop writes the
    /// simulated fill row itself (priced at the ask, like the executor).
    async fn record_shadow_fill(
        &self,
        order: &crate::oms::Order,
        ask: Option<i64>,
        now: DateTime<Utc>,
    ) {
        let fill = FillRecord {
            client_order_id: order.client_order_id.clone(),
            ticker: order.ticker.clone(),
            city_code: order.city_code.clone(),
            side: order.side,
            filled_at: now,
            quantity: order.quantity,
            price_cents: ask.unwrap_or(order.limit_price_cents),
            fees: Decimal::ZERO,
            realized_pnl: None,
        };
        if let Some(repo) = &self.repo {
            if let Err(e) = repo.insert_fills(std::slice::from_ref(&fill)).await {
                warn!(error = %e, "shadow fill persist failed");
            }
        }
    }

    async fn persist_weather(&self, snapshot: &tempest_common::WeatherSnapshot) {
        if let Some(repo) = &self.repo {
            if let Err(e) = repo.insert_weather(std::slice::from_ref(snapshot)).await {
                warn!(error = %e, "weather persist failed");
            }
        }
    }

    async fn persist_market(&self, snapshot: &tempest_common::MarketSnapshot) {
        if let Some(repo) = &self.repo {
            if let Err(e) = repo.insert_markets(std::slice::from_ref(snapshot)).await {
                warn!(error = %e, "market persist failed");
            }
        }
    }

    async fn persist_signal(&self, signal: &crate::strategy::Signal) {
        if let Some(repo) = &self.repo {
            let record = signal.to_record();
            if let Err(e) = repo.insert_signals(std::slice::from_ref(&record)).await {
                warn!(error = %e, "signal persist failed");
            }
        }
    }

    async fn persist_order(&self, order: &crate::oms::Order) {
        if let Some(repo) = &self.repo {
            let record = order.to_record();
            if let Err(e) = repo.upsert_orders(std::slice::from_ref(&record)).await {
                warn!(error = %e, "order persist failed");
            }
        }
    }

    async fn persist_risk_event(&self, event: RiskEventRecord) {
        if let Some(repo) = &self.repo {
            if let Err(e) = repo.insert_risk_events(std::slice::from_ref(&event)).await {
                warn!(error = %e, "risk event persist failed");
            }
        }
    }
}
