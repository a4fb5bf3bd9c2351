//! Two-tier cache for weather records
//!
//! A [`CacheOrchestrator`] sits between data producers and the weather API.
//! It prefers a shared Redis instance ([`RedisBackend`]) and falls back to a
//! local directory of JSON files ([`FileBackend`]) when Redis is unreachable
//! at startup or fails a single call. Entries expire after a caller-supplied
//! TTL; expiry is enforced natively by Redis and lazily on read by the file
//! backend.
//!
//! The cache never fails its callers: every error degrades to a miss or a
//! dropped write, and is logged through `tracing`.

mod clock;
mod envelope;
mod error;
mod file;
mod key;
mod orchestrator;
mod remote;
mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use envelope::{freshness, CacheEnvelope, Freshness};
pub use error::BackendError;
pub use file::FileBackend;
pub use key::{sanitize, KeyCodec, DEFAULT_EXTENSION, DEFAULT_NAMESPACE};
pub use orchestrator::{BackendMode, CacheOrchestrator, Lookup, Source, WriteOutcome};
pub use remote::{RedisBackend, RedisConnectionManager, RemoteBackend};
pub use stats::{CacheStats, StatsSnapshot};
