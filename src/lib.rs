//! Weather cache library
//!
//! Exposes the two-tier cache, its configuration, the Open-Meteo
//! collaborators and the CLI definitions (the latter for integration tests).

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;

pub use cache::{BackendMode, CacheOrchestrator, Lookup, Source, WriteOutcome};
pub use config::CacheConfig;
