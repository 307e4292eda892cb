//! Weather provider: cached, staleness-aware forecasts and observations.
//!
//! The trading loop consumes the `WeatherSource` trait; the production
//! implementation composes the REST client with a TTL cache. On permanent
//! fetch failure it degrades to the last known good snapshot flagged
//! stale — a stale snapshot skips the city for the cycle, it never trades.

pub mod cache;
pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use tempest_common::{cities, CoreError, WeatherSnapshot};

pub use cache::WeatherCache;
pub use client::{Forecast, Observation, WeatherClient};

/// Source of weather snapshots, one per city per call.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn get(&self, city_code: &str) -> Result<WeatherSnapshot, CoreError>;
}

/// Production provider: REST client + TTL cache + last-known-good fallback.
pub struct NwsWeatherProvider {
    client: WeatherClient,
    cache: WeatherCache,
    cache_ttl: Duration,
    stale_ceiling: Duration,
}

impl NwsWeatherProvider {
    pub fn new(client: WeatherClient, cache_ttl: Duration, stale_ceiling: Duration) -> Self {
        Self {
            client,
            cache: WeatherCache::new(),
            cache_ttl,
            stale_ceiling,
        }
    }

    pub fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    async fn fetch(&self, city_code: &str) -> Result<WeatherSnapshot, CoreError> {
        let city = cities::get(city_code)
            .ok_or_else(|| CoreError::DataValidation(format!("unknown city: {}", city_code)))?;

        let forecast = self
            .client
            .get_forecast(city.forecast_office, city.grid_x, city.grid_y)
            .await?;

        // A missing observation is tolerable; a missing forecast is not.
        let observation = match self.client.get_latest_observation(city.settlement_station).await {
            Ok(obs) => Some(obs),
            Err(e) => {
                warn!(city = city_code, error = %e, "observation fetch failed");
                None
            }
        };

        let now = Utc::now();
        let stale_ceiling = chrono::Duration::from_std(self.stale_ceiling)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        let stale = now - forecast.issued_at > stale_ceiling;

        Ok(WeatherSnapshot {
            city_code: city.code.to_string(),
            captured_at: now,
            forecast_high_f: forecast.high_f,
            // The daily product carries no interval; use the city's
            // historical default.
            forecast_stddev_f: city.default_stddev_f,
            observed_temp_f: observation.as_ref().map(|o| o.temp_f),
            forecast_issued_at: forecast.issued_at,
            observed_at: observation.map(|o| o.observed_at),
            stale,
        })
    }
}

#[async_trait]
impl WeatherSource for NwsWeatherProvider {
    async fn get(&self, city_code: &str) -> Result<WeatherSnapshot, CoreError> {
        let now = Utc::now();
        if let Some(snap) = self.cache.fresh(city_code, self.cache_ttl, now) {
            return Ok(snap);
        }

        match self.fetch(city_code).await {
            Ok(snapshot) => {
                self.cache.store(snapshot.clone());
                info!(
                    city = city_code,
                    high = snapshot.forecast_high_f,
                    stale = snapshot.stale,
                    "weather refreshed"
                );
                Ok(snapshot)
            }
            Err(e) if e.is_transient() || matches!(e, CoreError::PermanentApi { .. }) => {
                // Retries are exhausted inside the client. Degrade to the
                // last known good value, flagged stale.
                if let Some(mut snap) = self.cache.last_good(city_code) {
                    warn!(city = city_code, error = %e, "weather fetch failed, serving last good as stale");
                    snap.stale = true;
                    snap.captured_at = now;
                    self.cache.store(snap.clone());
                    return Ok(snap);
                }
                Err(CoreError::StaleData(format!(
                    "{}: no weather available ({})",
                    city_code, e
                )))
            }
            Err(e) => Err(e),
        }
    }
}
