//! City registry: the ten cities whose daily-high contracts we trade.
//!
//! Entries are compiled in and never mutated. Each carries the forecast
//! grid for the weather service, the settlement station the exchange uses
//! to resolve contracts, and the correlation cluster for exposure limits.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::types::Cluster;

/// Immutable registry entry for one city.
#[derive(Debug, Clone)]
pub struct CityConfig {
    /// 3-letter city code, e.g. "NYC".
    pub code: &'static str,
    pub display_name: &'static str,
    /// IANA timezone for local settlement dates.
    pub timezone: Tz,
    pub cluster: Cluster,
    /// Forecast grid: office identifier plus grid coordinates.
    pub forecast_office: &'static str,
    pub grid_x: u32,
    pub grid_y: u32,
    /// ICAO station the exchange settles against.
    pub settlement_station: &'static str,
    pub lat: f64,
    pub lon: f64,
    /// Fallback forecast standard deviation (°F) when the source gives
    /// no interval.
    pub default_stddev_f: f64,
}

impl CityConfig {
    /// The city's current local date, used as the default event date.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }
}

/// All ten cities. Cluster membership is enumerated explicitly; the
/// grouping follows regional weather regimes, not state lines.
pub static CITIES: [CityConfig; 10] = [
    CityConfig {
        code: "NYC",
        display_name: "New York City",
        timezone: Tz::America__New_York,
        cluster: Cluster::NorthEast,
        forecast_office: "OKX",
        grid_x: 33,
        grid_y: 35,
        settlement_station: "KNYC",
        lat: 40.78,
        lon: -73.97,
        default_stddev_f: 3.0,
    },
    CityConfig {
        code: "PHL",
        display_name: "Philadelphia",
        timezone: Tz::America__New_York,
        cluster: Cluster::NorthEast,
        forecast_office: "PHI",
        grid_x: 49,
        grid_y: 75,
        settlement_station: "KPHL",
        lat: 39.87,
        lon: -75.23,
        default_stddev_f: 3.0,
    },
    CityConfig {
        code: "BOS",
        display_name: "Boston",
        timezone: Tz::America__New_York,
        cluster: Cluster::NorthEast,
        forecast_office: "BOX",
        grid_x: 71,
        grid_y: 90,
        settlement_station: "KBOS",
        lat: 42.36,
        lon: -71.01,
        default_stddev_f: 3.2,
    },
    CityConfig {
        code: "MIA",
        display_name: "Miami",
        timezone: Tz::America__New_York,
        cluster: Cluster::SouthEast,
        forecast_office: "MFL",
        grid_x: 110,
        grid_y: 50,
        settlement_station: "KMIA",
        lat: 25.79,
        lon: -80.32,
        default_stddev_f: 2.0,
    },
    CityConfig {
        code: "AUS",
        display_name: "Austin",
        timezone: Tz::America__Chicago,
        cluster: Cluster::SouthEast,
        forecast_office: "EWX",
        grid_x: 156,
        grid_y: 91,
        settlement_station: "KAUS",
        lat: 30.18,
        lon: -97.68,
        default_stddev_f: 3.5,
    },
    CityConfig {
        code: "CHI",
        display_name: "Chicago",
        timezone: Tz::America__Chicago,
        cluster: Cluster::Midwest,
        forecast_office: "LOT",
        grid_x: 65,
        grid_y: 76,
        settlement_station: "KMDW",
        lat: 41.79,
        lon: -87.75,
        default_stddev_f: 3.8,
    },
    CityConfig {
        code: "DEN",
        display_name: "Denver",
        timezone: Tz::America__Denver,
        cluster: Cluster::Mountain,
        forecast_office: "BOU",
        grid_x: 62,
        grid_y: 61,
        settlement_station: "KDEN",
        lat: 39.85,
        lon: -104.66,
        default_stddev_f: 4.5,
    },
    CityConfig {
        code: "LAX",
        display_name: "Los Angeles",
        timezone: Tz::America__Los_Angeles,
        cluster: Cluster::West,
        forecast_office: "LOX",
        grid_x: 155,
        grid_y: 45,
        settlement_station: "KLAX",
        lat: 33.94,
        lon: -118.41,
        default_stddev_f: 2.5,
    },
    CityConfig {
        code: "SEA",
        display_name: "Seattle",
        timezone: Tz::America__Los_Angeles,
        cluster: Cluster::West,
        forecast_office: "SEW",
        grid_x: 125,
        grid_y: 68,
        settlement_station: "KSEA",
        lat: 47.45,
        lon: -122.31,
        default_stddev_f: 2.8,
    },
    CityConfig {
        code: "SFO",
        display_name: "San Francisco",
        timezone: Tz::America__Los_Angeles,
        cluster: Cluster::West,
        forecast_office: "MTR",
        grid_x: 85,
        grid_y: 105,
        settlement_station: "KSFO",
        lat: 37.62,
        lon: -122.37,
        default_stddev_f: 2.5,
    },
];

/// Look up a city by code. Codes are case-sensitive 3-letter uppercase.
pub fn get(code: &str) -> Option<&'static CityConfig> {
    CITIES.iter().find(|c| c.code == code)
}

/// All registered city codes, in registry order.
pub fn codes() -> Vec<&'static str> {
    CITIES.iter().map(|c| c.code).collect()
}

/// Cities belonging to the given cluster.
pub fn in_cluster(cluster: Cluster) -> Vec<&'static CityConfig> {
    CITIES.iter().filter(|c| c.cluster == cluster).collect()
}
