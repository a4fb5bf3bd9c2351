//! Open-Meteo weather API client
//!
//! Fetches hourly temperature, wind, precipitation, surface pressure and soil
//! temperature series from the Open-Meteo forecast and archive APIs and
//! parses them into [`WeatherRecord`]s.

use chrono::{NaiveDate, NaiveDateTime};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use super::WeatherRecord;

/// Base URL for the Open-Meteo forecast API
const OPEN_METEO_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Base URL for the Open-Meteo historical archive API
const OPEN_METEO_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

/// Hourly variables requested from both APIs
const HOURLY_FIELDS: &str =
    "temperature_2m,wind_speed_10m,precipitation,surface_pressure,soil_temperature_0cm";

const DEFAULT_TIMEZONE: &str = "Europe/Warsaw";

/// Substituted for missing pressure readings, hPa
const STANDARD_PRESSURE_HPA: f64 = 1013.25;

/// Forecast horizon accepted by Open-Meteo
pub const MIN_FORECAST_DAYS: u8 = 1;
pub const MAX_FORECAST_DAYS: u8 = 16;

/// Errors that can occur when fetching weather data
#[derive(Debug, Error)]
pub enum WeatherError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP error: {0}")]
    Status(u16),

    /// Server answered with an empty body
    #[error("Empty response from weather API")]
    EmptyResponse,

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The API reported an error of its own
    #[error("API error: {0}")]
    Api(String),

    /// Missing expected field in response
    #[error("Missing expected field in response: {0}")]
    MissingField(String),

    /// Invalid time format in response
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// Start date after end date
    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

/// Cache key for a historical query, coordinates rounded to four decimals
pub fn historical_cache_key(lat: f64, lon: f64, start: NaiveDate, end: NaiveDate) -> String {
    format!("historical_{:.4}_{:.4}_{}_{}", lat, lon, start, end)
}

/// Cache key for a forecast query, coordinates rounded to four decimals
pub fn forecast_cache_key(lat: f64, lon: f64, days: u8) -> String {
    format!("forecast_{:.4}_{:.4}_{}", lat, lon, days)
}

/// Clamps a requested forecast horizon into the range the API accepts
pub fn clamp_forecast_days(days: u8) -> u8 {
    days.clamp(MIN_FORECAST_DAYS, MAX_FORECAST_DAYS)
}

/// Client for fetching weather data from Open-Meteo API
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: Client,
    forecast_url: String,
    archive_url: String,
    timezone: String,
}

impl Default for WeatherClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherClient {
    /// Create a new WeatherClient with default settings
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a new WeatherClient with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            forecast_url: OPEN_METEO_FORECAST_URL.to_string(),
            archive_url: OPEN_METEO_ARCHIVE_URL.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }

    /// Use a custom timezone for the returned timestamps
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Point the client at different forecast/archive endpoints
    pub fn with_base_urls(
        mut self,
        forecast_url: impl Into<String>,
        archive_url: impl Into<String>,
    ) -> Self {
        self.forecast_url = forecast_url.into();
        self.archive_url = archive_url.into();
        self
    }

    /// URL of a historical query
    pub fn historical_url(&self, lat: f64, lon: f64, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}?latitude={:.4}&longitude={:.4}&start_date={}&end_date={}&hourly={}&timezone={}",
            self.archive_url, lat, lon, start, end, HOURLY_FIELDS, self.timezone
        )
    }

    /// URL of a forecast query; `days` must already be clamped
    pub fn forecast_url(&self, lat: f64, lon: f64, days: u8) -> String {
        format!(
            "{}?latitude={:.4}&longitude={:.4}&forecast_days={}&hourly={}&timezone={}",
            self.forecast_url, lat, lon, days, HOURLY_FIELDS, self.timezone
        )
    }

    /// Fetch archived hourly data between two dates, inclusive
    pub async fn fetch_historical(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<WeatherRecord, WeatherError> {
        if start > end {
            return Err(WeatherError::InvalidRange { start, end });
        }
        self.fetch(&self.historical_url(lat, lon, start, end)).await
    }

    /// Fetch hourly forecast data for the next `days` days (clamped to 1..=16)
    pub async fn fetch_forecast(
        &self,
        lat: f64,
        lon: f64,
        days: u8,
    ) -> Result<WeatherRecord, WeatherError> {
        let days = clamp_forecast_days(days);
        self.fetch(&self.forecast_url(lat, lon, days)).await
    }

    async fn fetch(&self, url: &str) -> Result<WeatherRecord, WeatherError> {
        tracing::debug!(url = %url, "requesting weather data");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("weather-cache/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Err(WeatherError::EmptyResponse);
        }

        parse_response(&text)
    }
}

/// Parse an Open-Meteo JSON body into a WeatherRecord
///
/// Null readings become 0.0, except pressure which falls back to standard
/// atmospheric pressure. A response without soil temperature yields an
/// empty `soil_temperature` series.
pub fn parse_response(text: &str) -> Result<WeatherRecord, WeatherError> {
    let response: OpenMeteoResponse = serde_json::from_str(text)?;

    if response.error {
        return Err(WeatherError::Api(
            response
                .reason
                .unwrap_or_else(|| "Unknown API error".to_string()),
        ));
    }

    let hourly = response
        .hourly
        .ok_or_else(|| WeatherError::MissingField("hourly".to_string()))?;

    let len = hourly.time.len();
    let soil_len = hourly.soil_temperature_0cm.as_ref().map_or(len, Vec::len);

    // Validate that all arrays have the same length
    if hourly.temperature_2m.len() != len
        || hourly.wind_speed_10m.len() != len
        || hourly.precipitation.len() != len
        || hourly.surface_pressure.len() != len
        || soil_len != len
    {
        return Err(WeatherError::MissingField(
            "hourly arrays have inconsistent lengths".to_string(),
        ));
    }

    let times = hourly
        .time
        .iter()
        .map(|t| parse_datetime(t))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WeatherRecord {
        times,
        temperatures: fill_nulls(&hourly.temperature_2m, 0.0),
        wind_speeds: fill_nulls(&hourly.wind_speed_10m, 0.0),
        rainfall: fill_nulls(&hourly.precipitation, 0.0),
        pressure: fill_nulls(&hourly.surface_pressure, STANDARD_PRESSURE_HPA),
        soil_temperature: hourly
            .soil_temperature_0cm
            .as_deref()
            .map(|values| fill_nulls(values, 0.0))
            .unwrap_or_default(),
    })
}

fn fill_nulls(values: &[Option<f64>], default: f64) -> Vec<f64> {
    values.iter().map(|v| v.unwrap_or(default)).collect()
}

/// Parse a datetime string in ISO 8601 format (e.g., "2024-01-01T05:00") to NaiveDateTime
fn parse_datetime(datetime_str: &str) -> Result<NaiveDateTime, WeatherError> {
    NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%dT%H:%M")
        .map_err(|_| WeatherError::InvalidTimeFormat(datetime_str.to_string()))
}

/// Open-Meteo API response structure
#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    #[serde(default)]
    error: bool,
    reason: Option<String>,
    hourly: Option<HourlyWeather>,
}

/// Hourly weather data from Open-Meteo
#[derive(Debug, Deserialize)]
struct HourlyWeather {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
    #[serde(default)]
    surface_pressure: Vec<Option<f64>>,
    soil_temperature_0cm: Option<Vec<Option<f64>>>,
}
