//! ClickHouse repository layer.
//!
//! The sole writer to durable storage: every other component passes values
//! in and receives receipts. Provides type-safe batch inserts plus the
//! handful of parameterized reads the trading loop, reconciler, rollups,
//! and public view need.

use std::time::Duration;

use chrono::{DateTime, Utc};
use clickhouse::inserter::Inserter;
use clickhouse::Client;
use thiserror::Error;

use crate::types::{
    CityDailyRollup, EquityPoint, FillRecord, HealthRecord, MarketSnapshot, OrderRecord,
    PositionRecord, PublicTrade, ReconcileCursor, RiskEventRecord, SignalRecord,
    StrategyDailyRollup, WeatherSnapshot,
};

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("ClickHouse client error: {0}")]
    Client(#[from] clickhouse::error::Error),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Schema creation failed: {0}")]
    Schema(String),
}

/// Configuration for the repository client.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// ClickHouse HTTP URL (e.g., "http://localhost:8123").
    pub url: String,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Maximum rows before auto-commit in inserters.
    pub max_rows: u64,
    /// Maximum bytes before auto-commit in inserters.
    pub max_bytes: u64,
    /// Auto-commit period for inserters.
    pub commit_period: Duration,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "tempest".to_string(),
            user: None,
            password: None,
            max_rows: 10_000,
            max_bytes: 10_000_000,
            commit_period: Duration::from_secs(5),
        }
    }
}

/// Repository client wrapper with type-safe inserters.
#[derive(Clone)]
pub struct Repository {
    client: Client,
    config: RepoConfig,
}

impl Repository {
    pub fn new(config: RepoConfig) -> Self {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        if let Some(ref user) = config.user {
            client = client.with_user(user);
        }
        if let Some(ref password) = config.password {
            client = client.with_password(password);
        }

        Self { client, config }
    }

    pub fn with_defaults() -> Self {
        Self::new(RepoConfig::default())
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Tests the connection by running a trivial query.
    pub async fn ping(&self) -> Result<(), RepoError> {
        self.client
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .map_err(|e| RepoError::Connection(e.to_string()))?;
        Ok(())
    }

    /// Creates all required tables from the embedded schema.
    pub async fn create_tables(&self) -> Result<(), RepoError> {
        let schema = include_str!("schema.sql");

        for statement in schema.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            let non_comment: Vec<&str> = statement
                .lines()
                .filter(|line| !line.trim().starts_with("--") && !line.trim().is_empty())
                .collect();
            if non_comment.is_empty() {
                continue;
            }

            self.client
                .query(statement)
                .execute()
                .await
                .map_err(|e| RepoError::Schema(format!("{}: {}", e, statement)))?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Inserters (long-lived, auto-committing)
    // ------------------------------------------------------------------

    pub fn weather_inserter(&self) -> Result<Inserter<WeatherSnapshot>, RepoError> {
        self.create_inserter("ops_weather_snapshots")
    }

    pub fn market_inserter(&self) -> Result<Inserter<MarketSnapshot>, RepoError> {
        self.create_inserter("ops_market_snapshots")
    }

    pub fn signal_inserter(&self) -> Result<Inserter<SignalRecord>, RepoError> {
        self.create_inserter("ops_signals")
    }

    fn create_inserter<T>(&self, table: &str) -> Result<Inserter<T>, RepoError>
    where
        T: clickhouse::Row,
    {
        let inserter = self
            .client
            .inserter(table)?
            .with_max_rows(self.config.max_rows)
            .with_max_bytes(self.config.max_bytes)
            .with_period(Some(self.config.commit_period));
        Ok(inserter)
    }

    // ------------------------------------------------------------------
    // One-shot batch inserts
    // ------------------------------------------------------------------

    pub async fn insert_weather(&self, rows: &[WeatherSnapshot]) -> Result<(), RepoError> {
        self.insert_batch("ops_weather_snapshots", rows).await
    }

    pub async fn insert_markets(&self, rows: &[MarketSnapshot]) -> Result<(), RepoError> {
        self.insert_batch("ops_market_snapshots", rows).await
    }

    pub async fn insert_signals(&self, rows: &[SignalRecord]) -> Result<(), RepoError> {
        self.insert_batch("ops_signals", rows).await
    }

    /// Orders live in a ReplacingMergeTree keyed by client_order_id; each
    /// state change writes a fresh row and the newest `updated_at` wins.
    pub async fn upsert_orders(&self, rows: &[OrderRecord]) -> Result<(), RepoError> {
        self.insert_batch("ops_orders", rows).await
    }

    pub async fn insert_fills(&self, rows: &[FillRecord]) -> Result<(), RepoError> {
        self.insert_batch("ops_fills", rows).await
    }

    pub async fn upsert_positions(&self, rows: &[PositionRecord]) -> Result<(), RepoError> {
        self.insert_batch("ops_positions", rows).await
    }

    pub async fn insert_risk_events(&self, rows: &[RiskEventRecord]) -> Result<(), RepoError> {
        self.insert_batch("ops_risk_events", rows).await
    }

    pub async fn upsert_health(&self, rows: &[HealthRecord]) -> Result<(), RepoError> {
        self.insert_batch("ops_health", rows).await
    }

    pub async fn upsert_city_daily(&self, rows: &[CityDailyRollup]) -> Result<(), RepoError> {
        self.insert_batch("analytics_city_daily", rows).await
    }

    pub async fn upsert_strategy_daily(
        &self,
        rows: &[StrategyDailyRollup],
    ) -> Result<(), RepoError> {
        self.insert_batch("analytics_strategy_daily", rows).await
    }

    pub async fn upsert_equity_points(&self, rows: &[EquityPoint]) -> Result<(), RepoError> {
        self.insert_batch("analytics_equity_curve", rows).await
    }

    pub async fn publish_trades(&self, rows: &[PublicTrade]) -> Result<(), RepoError> {
        self.insert_batch("analytics_public_trades", rows).await
    }

    async fn insert_batch<T>(&self, table: &str, rows: &[T]) -> Result<(), RepoError>
    where
        T: clickhouse::Row + serde::Serialize,
    {
        if rows.is_empty() {
            return Ok(());
        }
        let mut insert = self.client.insert(table)?;
        for row in rows {
            insert.write(row).await?;
        }
        insert.end().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Current state of every non-terminal order.
    pub async fn fetch_active_orders(&self) -> Result<Vec<OrderRecord>, RepoError> {
        let rows = self
            .client
            .query(
                "SELECT ?fields FROM ops_orders FINAL \
                 WHERE status NOT IN ('CANCELED', 'REJECTED', 'CLOSED')",
            )
            .fetch_all::<OrderRecord>()
            .await?;
        Ok(rows)
    }

    /// Current state of the order with this client id, if any.
    pub async fn fetch_order(
        &self,
        client_order_id: &str,
    ) -> Result<Option<OrderRecord>, RepoError> {
        let rows = self
            .client
            .query("SELECT ?fields FROM ops_orders FINAL WHERE client_order_id = ?")
            .bind(client_order_id)
            .fetch_all::<OrderRecord>()
            .await?;
        Ok(rows.into_iter().next())
    }

    /// All open positions.
    pub async fn fetch_open_positions(&self) -> Result<Vec<PositionRecord>, RepoError> {
        let rows = self
            .client
            .query("SELECT ?fields FROM ops_positions FINAL WHERE status = 'OPEN'")
            .fetch_all::<PositionRecord>()
            .await?;
        Ok(rows)
    }

    /// Fills within a half-open interval, oldest first.
    pub async fn fetch_fills_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<FillRecord>, RepoError> {
        let rows = self
            .client
            .query(
                "SELECT ?fields FROM ops_fills \
                 WHERE filled_at >= fromUnixTimestamp64Milli(?) \
                 AND filled_at < fromUnixTimestamp64Milli(?) ORDER BY filled_at",
            )
            .bind(from.timestamp_millis())
            .bind(to.timestamp_millis())
            .fetch_all::<FillRecord>()
            .await?;
        Ok(rows)
    }

    /// Signals within a half-open interval.
    pub async fn fetch_signals_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SignalRecord>, RepoError> {
        let rows = self
            .client
            .query(
                "SELECT ?fields FROM ops_signals \
                 WHERE created_at >= fromUnixTimestamp64Milli(?) \
                 AND created_at < fromUnixTimestamp64Milli(?) ORDER BY created_at",
            )
            .bind(from.timestamp_millis())
            .bind(to.timestamp_millis())
            .fetch_all::<SignalRecord>()
            .await?;
        Ok(rows)
    }

    /// The reconciliation cursor, if one has been written.
    pub async fn fetch_cursor(&self, name: &str) -> Result<Option<ReconcileCursor>, RepoError> {
        let rows = self
            .client
            .query("SELECT ?fields FROM ops_cursors FINAL WHERE name = ?")
            .bind(name)
            .fetch_all::<ReconcileCursor>()
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn save_cursor(&self, cursor: &ReconcileCursor) -> Result<(), RepoError> {
        self.insert_batch("ops_cursors", std::slice::from_ref(cursor))
            .await
    }

    /// Published (already delayed and redacted) trades, newest first.
    pub async fn fetch_public_trades(&self, limit: u64) -> Result<Vec<PublicTrade>, RepoError> {
        let rows = self
            .client
            .query(
                "SELECT ?fields FROM analytics_public_trades FINAL \
                 ORDER BY filled_at DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all::<PublicTrade>()
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RepoConfig::default();
        assert_eq!(config.url, "http://localhost:8123");
        assert_eq!(config.database, "tempest");
        assert!(config.user.is_none());
        assert_eq!(config.max_rows, 10_000);
    }

    #[test]
    fn test_client_creation() {
        let config = RepoConfig {
            url: "http://clickhouse:8123".to_string(),
            database: "test".to_string(),
            user: Some("admin".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let _repo = Repository::new(config);
    }

    #[test]
    fn test_schema_has_both_namespaces() {
        let schema = include_str!("schema.sql");
        assert!(schema.contains("ops_orders"));
        assert!(schema.contains("ops_fills"));
        assert!(schema.contains("analytics_public_trades"));
        assert!(schema.contains("analytics_city_daily"));
        // Every CREATE is namespaced.
        for line in schema.lines() {
            if let Some(rest) = line.trim().strip_prefix("CREATE TABLE IF NOT EXISTS ") {
                assert!(
                    rest.starts_with("ops_") || rest.starts_with("analytics_"),
                    "unnamespaced table: {}",
                    rest
                );
            }
        }
    }
}
