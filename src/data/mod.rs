//! Weather records and the collaborators that produce them
//!
//! [`WeatherRecord`] is what the application caches: hourly series fetched
//! from Open-Meteo. The cache itself treats it as an opaque serializable
//! value; only this module knows its shape.

pub mod cities;
pub mod service;
pub mod weather;

pub use cities::{find_city, City};
pub use service::{Fetched, Origin, TtlPolicy, WeatherService};
pub use weather::{forecast_cache_key, historical_cache_key, WeatherClient, WeatherError};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hourly weather series for one location and time span
///
/// All sequences are indexed by position: `temperatures[i]` was measured at
/// `times[i]`. `soil_temperature` is empty when the API does not provide it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    /// Local timestamps of the samples
    pub times: Vec<NaiveDateTime>,
    /// Air temperature at 2 m, °C
    pub temperatures: Vec<f64>,
    /// Wind speed at 10 m, km/h
    pub wind_speeds: Vec<f64>,
    /// Precipitation, mm
    pub rainfall: Vec<f64>,
    /// Surface pressure, hPa
    pub pressure: Vec<f64>,
    /// Soil temperature at 0 cm, °C
    pub soil_temperature: Vec<f64>,
}

/// One row of a [`WeatherRecord`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlySample {
    pub time: NaiveDateTime,
    pub temperature: f64,
    pub wind_speed: f64,
    pub rainfall: f64,
    pub pressure: f64,
    pub soil_temperature: Option<f64>,
}

impl WeatherRecord {
    /// Number of hourly samples
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Iterates over rows, stopping at the shortest required series
    pub fn samples(&self) -> impl Iterator<Item = HourlySample> + '_ {
        self.times
            .iter()
            .zip(&self.temperatures)
            .zip(&self.wind_speeds)
            .zip(&self.rainfall)
            .zip(&self.pressure)
            .enumerate()
            .map(|(i, ((((time, temperature), wind_speed), rainfall), pressure))| HourlySample {
                time: *time,
                temperature: *temperature,
                wind_speed: *wind_speed,
                rainfall: *rainfall,
                pressure: *pressure,
                soil_temperature: self.soil_temperature.get(i).copied(),
            })
    }
}

impl fmt::Display for WeatherRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WeatherRecord {{ times: {}, temperatures: {}, wind_speeds: {}, rainfall: {}, pressure: {}, soil_temperature: {} }}",
            self.times.len(),
            self.temperatures.len(),
            self.wind_speeds.len(),
            self.rainfall.len(),
            self.pressure.len(),
            self.soil_temperature.len()
        )
    }
}
