//! Weather cache CLI - fetch Open-Meteo weather data through the two-tier cache
//!
//! Historical and forecast queries are answered from Redis or the local file
//! cache when possible and fetched from Open-Meteo otherwise.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use weather_cache::cli::{Cli, CliError, Command};
use weather_cache::data::cities::{cities_in_country, popular_cities, search_cities, City};
use weather_cache::data::{Fetched, Origin, TtlPolicy, WeatherClient, WeatherService};
use weather_cache::{BackendMode, CacheOrchestrator, Lookup, Source};

/// Sets up stderr logging; `RUST_LOG` overrides the verbosity flags
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints a fetched record as a table, or as JSON with `--json`
fn print_record(fetched: &Fetched, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(&fetched.record)?);
        return Ok(());
    }

    let origin = match fetched.origin {
        Origin::Api => "weather API",
        Origin::Cache(Source::Primary) => "cache",
        Origin::Cache(Source::Fallback) => "file cache (fallback)",
    };
    println!("{} hourly samples from {}", fetched.record.len(), origin);
    println!(
        "{:<17} {:>8} {:>9} {:>8} {:>10} {:>8}",
        "time", "temp °C", "wind km/h", "rain mm", "press hPa", "soil °C"
    );
    for sample in fetched.record.samples() {
        let soil = sample
            .soil_temperature
            .map(|t| format!("{:.1}", t))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<17} {:>8.1} {:>9.1} {:>8.1} {:>10.1} {:>8}",
            sample.time.format("%Y-%m-%d %H:%M"),
            sample.temperature,
            sample.wind_speed,
            sample.rainfall,
            sample.pressure,
            soil
        );
    }
    Ok(())
}

/// Prints built-in cities as a table
fn print_cities(cities: &[&City]) {
    println!(
        "{:<12} {:<15} {:>9} {:>10} {:>11}",
        "city", "country", "lat", "lon", "population"
    );
    for city in cities {
        println!(
            "{:<12} {:<15} {:>9.4} {:>10.4} {:>11}",
            city.name, city.country, city.latitude, city.longitude, city.population
        );
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // Listing cities needs no cache
    if let Command::Cities {
        query,
        country,
        limit,
    } = &cli.command
    {
        let mut cities = match (query, country) {
            (Some(query), _) => search_cities(query, *limit),
            (None, Some(country)) => cities_in_country(country),
            (None, None) => popular_cities(*limit),
        };
        cities.truncate(*limit);
        print_cities(&cities);
        return Ok(());
    }

    let config = cli.cache_config()?;
    let cache_dir = config.cache_dir.clone();

    // Probing Redis blocks for up to the probe timeout
    let cache = tokio::task::spawn_blocking(move || CacheOrchestrator::connect(&config)).await?;
    let cache = Arc::new(cache);
    let service = WeatherService::new(WeatherClient::new(), Arc::clone(&cache), TtlPolicy::default());

    let result = match cli.command {
        Command::Historical {
            location,
            start,
            end,
        } => match location.resolve() {
            Ok((lat, lon)) => match service.historical(lat, lon, start, end).await {
                Ok(fetched) => print_record(&fetched, cli.json),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        },
        Command::Forecast { location, days } => match location.resolve() {
            Ok((lat, lon)) => match service.forecast(lat, lon, days).await {
                Ok(fetched) => print_record(&fetched, cli.json),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        },
        Command::Cities { .. } => Ok(()),
        Command::Get { key } => match cache.get::<serde_json::Value>(&key) {
            Lookup::Hit { value, .. } => {
                println!("{}", serde_json::to_string_pretty(&value)?);
                Ok(())
            }
            Lookup::Miss => Err(CliError::NotCached(key).into()),
        },
        Command::Clear => {
            cache.clear();
            println!("Cache cleared");
            Ok(())
        }
        Command::Status => {
            let mode = match cache.mode() {
                BackendMode::Remote => "remote (redis)",
                BackendMode::FileOnly => "file-only",
            };
            println!("mode: {}", mode);
            println!("cache dir: {}", cache_dir.display());
            println!("namespace: {}", cache.key_codec().namespace());
            Ok(())
        }
    };

    let stats = cache.stats();
    tracing::debug!(?stats, "cache statistics");
    cache.close();
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_filter());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
