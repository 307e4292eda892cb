//! Weather service REST client.
//!
//! Talks to an NWS-style API: gridpoint forecasts plus latest station
//! observations. This is the single retry layer for weather data — callers
//! must not wrap it in their own retries. Transport errors and 5xx retry
//! with exponential backoff (base 500 ms, cap 4 s, 3 attempts).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use tempest_common::{CoreError, TokenBucket};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(4);

/// Parsed daily forecast for one grid point.
#[derive(Debug, Clone)]
pub struct Forecast {
    /// Forecasted daily high (°F).
    pub high_f: f64,
    /// When the source generated the forecast.
    pub issued_at: DateTime<Utc>,
}

/// Parsed latest observation for one station.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Observed temperature (°F).
    pub temp_f: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    #[serde(rename = "generatedAt")]
    generated_at: DateTime<Utc>,
    periods: Vec<ForecastPeriod>,
}

#[derive(Debug, Deserialize)]
struct ForecastPeriod {
    #[serde(rename = "isDaytime")]
    is_daytime: bool,
    /// Already °F in the daily product.
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ObservationResponse {
    properties: ObservationProperties,
}

#[derive(Debug, Deserialize)]
struct ObservationProperties {
    timestamp: DateTime<Utc>,
    temperature: ObservationValue,
}

#[derive(Debug, Deserialize)]
struct ObservationValue {
    /// Stations report °C; may be null when the sensor is offline.
    value: Option<f64>,
}

/// REST client for the weather service.
pub struct WeatherClient {
    http: Client,
    base_url: String,
    limiter: Arc<TokenBucket>,
}

impl WeatherClient {
    pub fn new(base_url: &str, rate_limit_rps: f64, call_timeout: Duration) -> Result<Self, CoreError> {
        let http = Client::builder()
            .timeout(call_timeout)
            .user_agent("tempest-trading (ops@tempest.example)")
            .build()
            .map_err(|e| CoreError::Config(format!("weather http client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: Arc::new(TokenBucket::new("weather", rate_limit_rps)),
        })
    }

    /// Fetch the gridpoint forecast and extract the next daytime high.
    pub async fn get_forecast(
        &self,
        office: &str,
        grid_x: u32,
        grid_y: u32,
    ) -> Result<Forecast, CoreError> {
        let path = format!("/gridpoints/{}/{},{}/forecast", office, grid_x, grid_y);
        let resp: ForecastResponse = self.get_with_retry(&path).await?;

        // The daily product alternates day/night periods; the first
        // daytime period carries today's high.
        let high = resp
            .properties
            .periods
            .iter()
            .find(|p| p.is_daytime)
            .map(|p| p.temperature)
            .ok_or_else(|| {
                CoreError::DataValidation(format!("no daytime period in forecast for {}", office))
            })?;

        Ok(Forecast {
            high_f: high,
            issued_at: resp.properties.generated_at,
        })
    }

    /// Fetch the latest observation for a settlement station.
    pub async fn get_latest_observation(&self, station: &str) -> Result<Observation, CoreError> {
        let path = format!("/stations/{}/observations/latest", station);
        let resp: ObservationResponse = self.get_with_retry(&path).await?;

        let celsius = resp.properties.temperature.value.ok_or_else(|| {
            CoreError::DataValidation(format!("{}: observation has no temperature", station))
        })?;

        Ok(Observation {
            temp_f: celsius_to_fahrenheit(celsius),
            observed_at: resp.properties.timestamp,
        })
    }

    async fn get_with_retry<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, CoreError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.limiter.acquire().await;

            match self.http.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        debug!(path, "weather fetch ok");
                        return resp.json::<T>().await.map_err(|e| {
                            CoreError::DataValidation(format!("{}: {}", path, e))
                        });
                    }
                    if status.is_server_error() && attempt < MAX_ATTEMPTS {
                        let delay = backoff_delay(attempt);
                        warn!(path, code = status.as_u16(), attempt, "weather 5xx, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    if status.is_server_error() {
                        return Err(CoreError::TransientNetwork(format!(
                            "{}: {} after {} attempts",
                            path, status, attempt
                        )));
                    }
                    return Err(CoreError::PermanentApi {
                        status: status.as_u16(),
                        message: format!("weather {}", path),
                    });
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    warn!(path, attempt, error = %e, "weather transport error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    (BACKOFF_BASE * 2u32.saturating_pow(attempt.saturating_sub(1))).min(BACKOFF_CAP)
}

fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}
