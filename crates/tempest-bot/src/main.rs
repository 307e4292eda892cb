//! Tempest trading engine binary.
//!
//! Usage:
//!   tempest run [--mode <MODE>] [--confirm-live]
//!   tempest reconcile
//!   tempest rollups [--day YYYY-MM-DD]
//!
//! Exit codes: 0 normal shutdown, 1 configuration error,
//! 2 reconciliation mismatch, 3 fatal exchange-auth failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tempest_common::error::{EXIT_CONFIG, EXIT_FATAL, EXIT_OK, EXIT_RECONCILE_MISMATCH};
use tempest_common::{CoreError, Mode, Repository};
use tempest_exchange::{Credentials, ExchangeClient, RequestSigner, RestClientConfig, RestExchangeClient};

use tempest_bot::analytics::{PublicReadModel, Rollups};
use tempest_bot::config::BotConfig;
use tempest_bot::markets::MarketProvider;
use tempest_bot::oms::{startup_reconcile, ExchangeExecutor, Executor, Oms, Order, ShadowExecutor};
use tempest_bot::risk::{RiskEngine, RiskLimits};
use tempest_bot::strategy::{DailyHighTempStrategy, StrategyParams};
use tempest_bot::trader::{LoopDeps, TradingLoop};
use tempest_bot::weather::{NwsWeatherProvider, WeatherClient, WeatherSource};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "tempest")]
#[command(about = "Weather event-market trading engine")]
#[command(version)]
struct Cli {
    /// Config file path.
    #[arg(short, long, default_value = "config/tempest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the trading loop.
    Run {
        /// Trading mode: shadow, paper, live.
        #[arg(long)]
        mode: Option<String>,

        /// Required acknowledgement before any live submission.
        #[arg(long)]
        confirm_live: bool,
    },
    /// One-shot startup reconciliation against the exchange.
    Reconcile,
    /// Regenerate analytics aggregates.
    Rollups {
        /// Day to recompute (YYYY-MM-DD); defaults to today (UTC).
        #[arg(long)]
        day: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: failed to load .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        match BotConfig::from_file(&cli.config) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Configuration error: {:#}", e);
                return ExitCode::from(EXIT_CONFIG);
            }
        }
    } else {
        eprintln!(
            "Config file not found at {:?}, using defaults",
            cli.config
        );
        BotConfig::default()
    };
    config.apply_env_overrides();

    if let Err(e) = init_logging(&config.log_level) {
        eprintln!("Logging init failed: {:#}", e);
        return ExitCode::from(EXIT_CONFIG);
    }

    let code = match cli.command {
        Command::Run { mode, confirm_live } => cmd_run(config, mode, confirm_live).await,
        Command::Reconcile => cmd_reconcile(config).await,
        Command::Rollups { day } => cmd_rollups(config, day).await,
    };
    ExitCode::from(code)
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;
    Ok(())
}

async fn cmd_run(mut config: BotConfig, mode: Option<String>, confirm_live: bool) -> u8 {
    if let Some(mode) = mode {
        match mode.parse::<Mode>() {
            Ok(mode) => config.mode = mode,
            Err(e) => {
                error!("{}", e);
                return EXIT_CONFIG;
            }
        }
    }
    if let Err(e) = config.validate() {
        error!("configuration invalid: {:#}", e);
        return EXIT_CONFIG;
    }
    info!(mode = %config.mode, bankroll = %config.risk.bankroll, "starting tempest");

    let repo = connect_repo(&config).await;
    let exchange = match build_exchange(&config) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "exchange client init failed");
            return e.exit_code();
        }
    };

    let executor: Arc<dyn Executor> = match config.mode {
        Mode::Shadow => Arc::new(ShadowExecutor::new()),
        Mode::Paper | Mode::Live => {
            match ExchangeExecutor::new(Arc::clone(&exchange), config.mode, confirm_live) {
                Ok(executor) => Arc::new(executor),
                Err(e) => {
                    error!(error = %e, "executor init failed");
                    return EXIT_CONFIG;
                }
            }
        }
    };

    let weather: Arc<dyn WeatherSource> = match WeatherClient::new(
        &config.weather.base_url,
        config.weather.rate_limit_rps,
        config.timing.call_timeout,
    ) {
        Ok(client) => Arc::new(NwsWeatherProvider::new(
            client,
            config.timing.weather_cache_ttl,
            config.timing.weather_stale_ceiling,
        )),
        Err(e) => {
            error!(error = %e, "weather client init failed");
            return EXIT_CONFIG;
        }
    };

    let strategy = Arc::new(DailyHighTempStrategy::new(StrategyParams {
        min_edge_after_costs: config.strategy.min_edge_after_costs,
        max_uncertainty: config.strategy.max_uncertainty,
        bankroll: config.risk.bankroll,
        max_trade_risk_pct: config.risk.max_trade_risk_pct,
        max_contracts: config.risk.max_contracts_per_trade,
    }));
    let oms = Arc::new(Oms::new(executor, config.oms.clone()));
    let risk = RiskEngine::new(RiskLimits::from_settings(&config.risk));
    let markets = Arc::new(MarketProvider::new(Arc::clone(&exchange)));

    let deps = LoopDeps {
        weather,
        markets,
        exchange: Arc::clone(&exchange),
        strategy,
        oms: Arc::clone(&oms),
        repo,
    };
    let trading_loop = TradingLoop::new(config, deps, risk);

    if let Err(e) = trading_loop.restore_state().await {
        error!(error = %e, "state restore failed");
        return EXIT_FATAL;
    }

    // Startup reconciliation: mismatches alert but do not stop the run.
    match startup_reconcile(&oms, &*exchange, Utc::now()).await {
        Ok(report) if report.has_mismatch() => {
            warn!(
                orphans = report.imported_orphans.len(),
                stale = report.closed_stale.len(),
                "startup reconciliation found mismatches"
            );
        }
        Ok(_) => info!("startup reconciliation clean"),
        Err(CoreError::Auth(e)) => {
            error!(error = %e, "exchange authentication failed");
            return EXIT_FATAL;
        }
        Err(e) => warn!(error = %e, "startup reconciliation failed"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown().await {
            error!(error = %e, "shutdown handler error");
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    match trading_loop.run(shutdown_rx).await {
        Ok(()) => EXIT_OK,
        Err(e) => {
            error!(error = %e, "trading loop halted");
            e.exit_code()
        }
    }
}

async fn cmd_reconcile(config: BotConfig) -> u8 {
    let repo = connect_repo(&config).await;
    let exchange = match build_exchange(&config) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "exchange client init failed");
            return e.exit_code();
        }
    };

    let oms = Oms::new(Arc::new(ShadowExecutor::new()), config.oms.clone());
    if let Some(repo) = &repo {
        match repo.fetch_active_orders().await {
            Ok(records) => {
                for record in records {
                    oms.insert_existing(Order::from_record(&record));
                }
            }
            Err(e) => {
                error!(error = %e, "failed to load local orders");
                return EXIT_FATAL;
            }
        }
    }

    match startup_reconcile(&oms, &*exchange, Utc::now()).await {
        Ok(report) => {
            info!(
                matched = report.matched,
                orphans = report.imported_orphans.len(),
                stale = report.closed_stale.len(),
                "reconciliation complete"
            );
            if let Some(repo) = &repo {
                let records: Vec<_> =
                    oms.orders_snapshot().iter().map(|o| o.to_record()).collect();
                if let Err(e) = repo.upsert_orders(&records).await {
                    error!(error = %e, "failed to persist reconciled orders");
                    return EXIT_FATAL;
                }
            }
            if report.has_mismatch() {
                EXIT_RECONCILE_MISMATCH
            } else {
                EXIT_OK
            }
        }
        Err(CoreError::Auth(e)) => {
            error!(error = %e, "exchange authentication failed");
            EXIT_FATAL
        }
        Err(e) => {
            error!(error = %e, "reconciliation failed");
            e.exit_code()
        }
    }
}

async fn cmd_rollups(config: BotConfig, day: Option<String>) -> u8 {
    let Some(repo) = connect_repo(&config).await else {
        error!("rollups require a reachable database");
        return EXIT_FATAL;
    };

    let day = match day {
        Some(text) => match NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
            Ok(day) => day,
            Err(e) => {
                error!(error = %e, "invalid --day");
                return EXIT_CONFIG;
            }
        },
        None => Utc::now().date_naive(),
    };

    let rollups = Rollups::new(repo.clone(), config.risk.bankroll);
    if let Err(e) = rollups.recompute_day(day).await {
        error!(error = %e, "rollup recompute failed");
        return EXIT_FATAL;
    }

    // Refresh the delayed public view alongside the aggregates.
    let public = PublicReadModel::new(repo, config.public.delay);
    let now = Utc::now();
    let from = now - chrono::Duration::days(7);
    match public.publish_window(from, now).await {
        Ok(published) => {
            info!(%day, published, "rollups regenerated");
            EXIT_OK
        }
        Err(e) => {
            error!(error = %e, "public view publish failed");
            EXIT_FATAL
        }
    }
}

/// Connect to the repository; a missing database degrades shadow runs
/// instead of stopping them.
async fn connect_repo(config: &BotConfig) -> Option<Repository> {
    let repo = Repository::new(config.repo.clone());
    match repo.ping().await {
        Ok(()) => {
            if let Err(e) = repo.create_tables().await {
                warn!(error = %e, "table creation failed");
            }
            Some(repo)
        }
        Err(e) => {
            warn!(error = %e, "database unavailable; persistence disabled");
            None
        }
    }
}

fn build_exchange(config: &BotConfig) -> Result<Arc<dyn ExchangeClient>, CoreError> {
    let credentials = Credentials::new(
        config
            .exchange
            .api_key_id
            .clone()
            .unwrap_or_else(|| "anonymous".to_string()),
        config.exchange.signing_secret.clone().unwrap_or_default(),
    );
    let client = RestExchangeClient::new(
        RestClientConfig {
            base_url: config.exchange_base_url().to_string(),
            timeout: config.timing.call_timeout,
            rate_limit: config.exchange.rate_limit_rps,
        },
        RequestSigner::new(credentials),
    )?;
    Ok(Arc::new(client))
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await?;
        info!("received Ctrl+C");
    }

    Ok(())
}
