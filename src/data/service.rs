//! Read-through weather service
//!
//! Looks up each query in the cache first and only calls Open-Meteo on a
//! miss, storing the fresh record with a TTL that depends on how quickly that
//! kind of data changes.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::weather::{clamp_forecast_days, forecast_cache_key, historical_cache_key};
use super::{WeatherClient, WeatherError, WeatherRecord};
use crate::cache::{CacheOrchestrator, Lookup, RedisBackend, RemoteBackend, Source};

/// How long fetched records stay cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// Archived data barely changes
    pub historical_secs: u64,
    /// Forecasts are refreshed upstream more often
    pub forecast_secs: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            historical_secs: 3600, // 1 hour
            forecast_secs: 1800,   // 30 minutes
        }
    }
}

/// Where a returned record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache(Source),
    Api,
}

/// A record plus its origin
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub record: WeatherRecord,
    pub origin: Origin,
}

/// Weather client fronted by the two-tier cache
#[derive(Debug)]
pub struct WeatherService<R = RedisBackend> {
    client: WeatherClient,
    cache: Arc<CacheOrchestrator<R>>,
    ttl: TtlPolicy,
}

impl<R: RemoteBackend + 'static> WeatherService<R> {
    pub fn new(client: WeatherClient, cache: Arc<CacheOrchestrator<R>>, ttl: TtlPolicy) -> Self {
        Self { client, cache, ttl }
    }

    /// The cache behind this service
    pub fn cache(&self) -> &CacheOrchestrator<R> {
        &self.cache
    }

    /// Hourly archive data between `start` and `end`, inclusive
    pub async fn historical(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Fetched, WeatherError> {
        if start > end {
            return Err(WeatherError::InvalidRange { start, end });
        }

        let key = historical_cache_key(lat, lon, start, end);
        if let Some(fetched) = self.cached(&key).await {
            return Ok(fetched);
        }

        let record = self.client.fetch_historical(lat, lon, start, end).await?;
        self.store(key, &record, self.ttl.historical_secs).await;
        Ok(Fetched {
            record,
            origin: Origin::Api,
        })
    }

    /// Hourly forecast for the next `days` days (clamped to 1..=16)
    pub async fn forecast(&self, lat: f64, lon: f64, days: u8) -> Result<Fetched, WeatherError> {
        let days = clamp_forecast_days(days);
        let key = forecast_cache_key(lat, lon, days);
        if let Some(fetched) = self.cached(&key).await {
            return Ok(fetched);
        }

        let record = self.client.fetch_forecast(lat, lon, days).await?;
        self.store(key, &record, self.ttl.forecast_secs).await;
        Ok(Fetched {
            record,
            origin: Origin::Api,
        })
    }

    /// Cache lookup on the blocking pool; a Redis checkout may wait seconds
    async fn cached(&self, key: &str) -> Option<Fetched> {
        let cache = Arc::clone(&self.cache);
        let owned_key = key.to_string();
        let lookup = tokio::task::spawn_blocking(move || cache.get::<WeatherRecord>(&owned_key)).await;

        match lookup {
            Ok(Lookup::Hit { value, source }) => {
                info!(key = %key, ?source, "serving weather data from cache");
                Some(Fetched {
                    record: value,
                    origin: Origin::Cache(source),
                })
            }
            Ok(Lookup::Miss) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "cache lookup task failed");
                None
            }
        }
    }

    async fn store(&self, key: String, record: &WeatherRecord, ttl_secs: u64) {
        let cache = Arc::clone(&self.cache);
        let owned = record.clone();
        let samples = record.len();
        let result = tokio::task::spawn_blocking(move || {
            let outcome = cache.put(&key, &owned, ttl_secs);
            (key, outcome)
        })
        .await;

        match result {
            Ok((key, outcome)) => debug!(key = %key, ?outcome, samples, "cached weather data"),
            Err(e) => warn!(error = %e, "cache write task failed"),
        }
    }
}
