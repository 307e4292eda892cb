//! Market provider: candidate contracts and quotes per city.
//!
//! Wraps the exchange client. `list_active` keeps only contracts settling
//! on the requested event date whose close time is still in the future;
//! `quote` builds a `MarketSnapshot`, leaving missing sides as `None` so
//! downstream checks treat the market as ineligible.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::debug;

use tempest_common::{CoreError, Direction, MarketSnapshot};
use tempest_exchange::{ApiMarket, ExchangeClient};

/// Series ticker for a city's daily-high markets, e.g. `HIGHNYC`.
pub fn series_ticker(city_code: &str) -> String {
    format!("HIGH{}", city_code)
}

/// Candidate markets and quotes for the trading loop.
pub struct MarketProvider {
    exchange: Arc<dyn ExchangeClient>,
    /// Listing metadata (threshold, direction, close time) kept per ticker
    /// so `quote` can build complete snapshots.
    listed: parking_lot::Mutex<HashMap<String, ApiMarket>>,
}

impl MarketProvider {
    pub fn new(exchange: Arc<dyn ExchangeClient>) -> Self {
        Self {
            exchange,
            listed: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Tickers for contracts on `city_code` settling on `event_date` whose
    /// close time is in the future.
    pub async fn list_active(
        &self,
        city_code: &str,
        event_date: NaiveDate,
    ) -> Result<Vec<String>, CoreError> {
        let series = series_ticker(city_code);
        let markets = self.exchange.list_markets(&series, event_date).await?;
        let now = Utc::now();

        let mut tickers = Vec::new();
        let mut listed = self.listed.lock();
        for market in markets {
            if !market.is_open() || market.close_time <= now {
                continue;
            }
            if market.event_date != event_date.format("%Y-%m-%d").to_string() {
                continue;
            }
            tickers.push(market.ticker.clone());
            listed.insert(market.ticker.clone(), market);
        }
        debug!(city = city_code, count = tickers.len(), "active markets");
        Ok(tickers)
    }

    /// Quote one contract. Requires a prior `list_active` for the ticker's
    /// listing metadata.
    pub async fn quote(&self, city_code: &str, ticker: &str) -> Result<MarketSnapshot, CoreError> {
        let meta = self
            .listed
            .lock()
            .get(ticker)
            .cloned()
            .ok_or_else(|| CoreError::DataValidation(format!("unlisted ticker: {}", ticker)))?;

        let book = self.exchange.get_orderbook(ticker).await?;

        let direction = match meta.direction.as_str() {
            "above" => Direction::Above,
            "below" => Direction::Below,
            other => {
                return Err(CoreError::DataValidation(format!(
                    "{}: unknown direction {:?}",
                    ticker, other
                )))
            }
        };

        Ok(MarketSnapshot {
            ticker: ticker.to_string(),
            city_code: city_code.to_string(),
            threshold_f: meta.strike,
            direction,
            event_date: meta.event_date.clone(),
            yes_bid: book.yes_bid,
            yes_ask: book.yes_ask,
            no_bid: book.no_bid,
            no_ask: book.no_ask,
            volume: book.volume,
            open_interest: book.open_interest,
            close_time: meta.close_time,
            captured_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_ticker() {
        assert_eq!(series_ticker("NYC"), "HIGHNYC");
        assert_eq!(series_ticker("SFO"), "HIGHSFO");
    }
}
