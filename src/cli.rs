//! Command-line interface parsing for the weather cache
//!
//! Global flags describe the cache (directory, Redis URL, namespace); the
//! subcommand says what to do with it.

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cache::DEFAULT_NAMESPACE;
use crate::config::{CacheConfig, DEFAULT_CACHE_DIR, DEFAULT_REDIS_URL};
use crate::data::find_city;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// Date not in YYYY-MM-DD form
    #[error("Invalid date: '{0}'. Expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Latitude outside -90..=90 or longitude outside -180..=180
    #[error("Invalid coordinate: '{0}'")]
    InvalidCoordinate(String),

    /// No home directory to derive a per-user cache directory from
    #[error("Cannot determine a per-user cache directory")]
    NoUserCacheDir,

    /// `--city` names no built-in city
    #[error("Unknown city: '{0}'. Run 'weather-cache cities' to list known cities")]
    UnknownCity(String),

    /// `get` found nothing live under the key
    #[error("No live cache entry for '{0}'")]
    NotCached(String),
}

/// Weather cache - fetch Open-Meteo data through a Redis/file cache
#[derive(Parser, Debug)]
#[command(name = "weather-cache")]
#[command(about = "Fetch Open-Meteo weather data through a two-tier Redis/file cache")]
#[command(version)]
pub struct Cli {
    /// Directory of the file cache
    #[arg(long, env = "WEATHER_CACHE_DIR", value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Use the per-user cache directory instead of ./weather_cache
    #[arg(long, conflicts_with = "cache_dir", global = true)]
    pub user_cache_dir: bool,

    /// Redis connection URL
    #[arg(long, env = "WEATHER_CACHE_REDIS_URL", default_value = DEFAULT_REDIS_URL, global = true)]
    pub redis_url: String,

    /// Never try Redis; use the file cache only
    #[arg(long, global = true)]
    pub no_remote: bool,

    /// Prefix of every Redis key
    #[arg(long, env = "WEATHER_CACHE_NAMESPACE", default_value = DEFAULT_NAMESPACE, global = true)]
    pub namespace: String,

    /// Retry an unreachable Redis every SECS seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub reprobe_secs: Option<u64>,

    /// Print records as JSON instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Where to query: a built-in city or explicit coordinates
#[derive(Args, Debug, Clone, PartialEq)]
pub struct LocationArgs {
    /// City name, e.g. "Kraków", "krakow" or "Krakow, Poland"
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    pub city: Option<String>,
    /// Latitude in degrees
    #[arg(long, allow_negative_numbers = true, value_parser = parse_latitude,
          required_unless_present = "city", requires = "lon")]
    pub lat: Option<f64>,
    /// Longitude in degrees
    #[arg(long, allow_negative_numbers = true, value_parser = parse_longitude,
          required_unless_present = "city", requires = "lat")]
    pub lon: Option<f64>,
}

impl LocationArgs {
    /// Explicit coordinates
    pub fn at(lat: f64, lon: f64) -> Self {
        Self {
            city: None,
            lat: Some(lat),
            lon: Some(lon),
        }
    }

    /// Named city
    pub fn city(name: impl Into<String>) -> Self {
        Self {
            city: Some(name.into()),
            lat: None,
            lon: None,
        }
    }

    /// Resolves to `(latitude, longitude)`, looking the city up if one was given
    pub fn resolve(&self) -> Result<(f64, f64), CliError> {
        if let Some(name) = &self.city {
            return find_city(name)
                .map(|city| (city.latitude, city.longitude))
                .ok_or_else(|| CliError::UnknownCity(name.clone()));
        }
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Ok((lat, lon)),
            _ => Err(CliError::InvalidCoordinate("both --lat and --lon are required".to_string())),
        }
    }
}

/// What to do with the cache
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Hourly archive data for a date range
    Historical {
        #[command(flatten)]
        location: LocationArgs,
        /// First day, YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        start: NaiveDate,
        /// Last day, YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        end: NaiveDate,
    },
    /// Hourly forecast for the coming days
    Forecast {
        #[command(flatten)]
        location: LocationArgs,
        /// Number of days (1-16)
        #[arg(long, default_value_t = 7)]
        days: u8,
    },
    /// List built-in cities, optionally filtered by name or country
    Cities {
        /// Part of a city name (at least 2 characters)
        query: Option<String>,
        /// Only cities in this country
        #[arg(long, conflicts_with = "query")]
        country: Option<String>,
        /// Maximum number of cities shown
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the cached value stored under KEY
    Get {
        /// Exact cache key, e.g. forecast_52.2297_21.0122_7
        key: String,
    },
    /// Remove every cached entry
    Clear,
    /// Show the backend mode and cache location
    Status,
}

/// Parses a YYYY-MM-DD date argument
pub fn parse_date(s: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| CliError::InvalidDate(s.to_string()))
}

/// Parses a latitude in -90..=90
pub fn parse_latitude(s: &str) -> Result<f64, CliError> {
    parse_coordinate(s, 90.0)
}

/// Parses a longitude in -180..=180
pub fn parse_longitude(s: &str) -> Result<f64, CliError> {
    parse_coordinate(s, 180.0)
}

fn parse_coordinate(s: &str, limit: f64) -> Result<f64, CliError> {
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= limit)
        .ok_or_else(|| CliError::InvalidCoordinate(s.to_string()))
}

impl Cli {
    /// Builds the cache configuration described by the global flags
    pub fn cache_config(&self) -> Result<CacheConfig, CliError> {
        let cache_dir = if self.user_cache_dir {
            CacheConfig::user_cache_dir().ok_or(CliError::NoUserCacheDir)?
        } else {
            self.cache_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR))
        };

        let mut config = CacheConfig::default()
            .with_cache_dir(cache_dir)
            .with_namespace(self.namespace.clone());
        config = if self.no_remote {
            config.without_remote()
        } else {
            config.with_remote_url(self.redis_url.clone())
        };
        if let Some(secs) = self.reprobe_secs {
            config = config.with_reprobe_interval(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Default tracing filter for the chosen verbosity
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "weather_cache=info,warn",
            _ => "weather_cache=debug,info",
        }
    }
}
