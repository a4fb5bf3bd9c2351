//! Public face of the cache
//!
//! The orchestrator owns both backends and decides, per call, which one
//! serves it:
//!
//! - While the remote tier is **healthy** every call goes to Redis first. A
//!   failing call is retried once against the file backend; the tier stays
//!   healthy.
//! - While the remote tier is **degraded** (startup probe failed, or no remote
//!   configured) every call goes straight to the file backend. With a
//!   re-probe interval configured, the first call after each interval probes
//!   Redis again and promotes the tier back to healthy if it answers.
//!   Without one, a Redis that fails the startup probe is closed for good.
//!
//! A tier that stopped receiving writes is emptied before it serves reads
//! again: promotion purges the namespace in Redis, and demotion (or closing
//! a healthy cache) clears the file directory. Either way a value replaced
//! or cleared in the meantime reads as a miss, never as the old value.
//!
//! No operation ever returns an error. Lookups resolve to [`Lookup::Miss`],
//! writes to [`WriteOutcome::Failed`], and the reason is logged and counted
//! in [`CacheStats`].

use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::envelope::CacheEnvelope;
use super::error::BackendError;
use super::file::FileBackend;
use super::key::KeyCodec;
use super::remote::{RedisBackend, RemoteBackend};
use super::stats::{CacheStats, StatsSnapshot};
use crate::config::{CacheConfig, RemoteConfig};

/// Which backend the orchestrator currently prefers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Remote tier is healthy
    Remote,
    /// Remote tier is degraded, absent, or closed
    FileOnly,
}

/// Where a value was read from or written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The backend selected by the current mode
    Primary,
    /// The file backend, standing in for a remote call that just failed
    Fallback,
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Hit { value: T, source: Source },
    Miss,
}

impl<T> Lookup<T> {
    /// Drops the source information
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Hit { value, .. } => Some(value),
            Lookup::Miss => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit { .. })
    }

    /// Source of a hit, `None` for a miss
    pub fn source(&self) -> Option<Source> {
        match self {
            Lookup::Hit { source, .. } => Some(*source),
            Lookup::Miss => None,
        }
    }
}

/// Result of a cache write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The entry was stored
    Stored(Source),
    /// Every backend tried refused the write
    Failed,
    /// Empty key or zero TTL; nothing was attempted
    Rejected,
}

/// Two-tier cache with a remote primary and a file fallback
#[derive(Debug)]
pub struct CacheOrchestrator<R = RedisBackend> {
    remote: Option<R>,
    file: FileBackend,
    keys: KeyCodec,
    clock: Arc<dyn Clock>,
    /// `true` = Healthy, `false` = Degraded
    healthy: AtomicBool,
    /// Epoch second of the most recent probe
    last_probe: AtomicI64,
    reprobe_interval: Option<Duration>,
    probe_timeout: Duration,
    closed: AtomicBool,
    stats: CacheStats,
}

impl CacheOrchestrator<RedisBackend> {
    /// Builds a Redis-backed cache from `config` and probes Redis once
    ///
    /// An unreachable or misconfigured Redis is not an error: the cache
    /// starts in [`BackendMode::FileOnly`].
    pub fn connect(config: &CacheConfig) -> Self {
        Self::connect_with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`connect`](Self::connect), with a custom time source
    pub fn connect_with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let remote = config.remote.as_ref().and_then(|remote_config| {
            match RedisBackend::new(remote_config, Arc::clone(&clock)) {
                Ok(backend) => Some(backend),
                Err(e) => {
                    warn!(url = %remote_config.url, error = %e, "invalid redis configuration");
                    None
                }
            }
        });
        Self::from_parts(config, remote, clock)
    }
}

impl<R: RemoteBackend> CacheOrchestrator<R> {
    /// Builds a cache around an arbitrary remote backend and clock
    pub fn from_parts(config: &CacheConfig, remote: Option<R>, clock: Arc<dyn Clock>) -> Self {
        let probe_timeout = config
            .remote
            .as_ref()
            .map(|r| r.probe_timeout)
            .unwrap_or_else(|| RemoteConfig::default().probe_timeout);

        let (remote, healthy) = match remote {
            Some(backend) if backend.probe(probe_timeout) => {
                info!("remote cache available");
                (Some(backend), true)
            }
            Some(backend) if config.reprobe_interval.is_some() => {
                warn!(dir = %config.cache_dir.display(), "remote cache unreachable, using file cache until it answers");
                (Some(backend), false)
            }
            Some(backend) => {
                warn!(dir = %config.cache_dir.display(), "remote cache unreachable, using file cache");
                backend.close();
                (None, false)
            }
            None => {
                info!(dir = %config.cache_dir.display(), "no remote cache configured, using file cache");
                (None, false)
            }
        };

        Self {
            remote,
            file: FileBackend::new(&config.cache_dir, config.file_extension.clone(), Arc::clone(&clock)),
            keys: config.key_codec(),
            last_probe: AtomicI64::new(clock.now()),
            clock,
            healthy: AtomicBool::new(healthy),
            reprobe_interval: config.reprobe_interval,
            probe_timeout,
            closed: AtomicBool::new(false),
            stats: CacheStats::default(),
        }
    }

    /// Current backend mode
    pub fn mode(&self) -> BackendMode {
        if !self.closed.load(Ordering::Acquire) && self.healthy.load(Ordering::Acquire) {
            BackendMode::Remote
        } else {
            BackendMode::FileOnly
        }
    }

    /// Counters of hits, misses, fallbacks and swallowed failures
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The file backend, e.g. to inspect its directory
    pub fn file_backend(&self) -> &FileBackend {
        &self.file
    }

    /// Key mapping in use
    pub fn key_codec(&self) -> &KeyCodec {
        &self.keys
    }

    /// Probes the remote backend immediately and adopts the result
    ///
    /// Unlike the periodic re-probe this can also demote a healthy tier.
    pub fn probe_now(&self) -> BackendMode {
        if self.closed.load(Ordering::Acquire) {
            return BackendMode::FileOnly;
        }
        if let Some(remote) = &self.remote {
            self.last_probe.store(self.clock.now(), Ordering::Release);
            if remote.probe(self.probe_timeout) {
                self.promote(remote);
            } else {
                self.demote("remote cache unreachable, switching to file-only mode");
            }
        }
        self.mode()
    }

    /// Stores `value` under `key` for `ttl_secs` seconds
    ///
    /// Never fails loudly; see [`WriteOutcome`].
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) -> WriteOutcome {
        if key.is_empty() || ttl_secs == 0 {
            debug!(key = %key, ttl_secs, "cache write rejected");
            return WriteOutcome::Rejected;
        }

        let envelope = CacheEnvelope::new(value, self.clock.now(), ttl_secs);
        let bytes = match envelope.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "cannot serialize cache entry");
                self.stats.write_failure();
                return WriteOutcome::Failed;
            }
        };

        if let Some(remote) = self.active_remote() {
            match remote.put(&self.keys.remote_key(key), &bytes, ttl_secs) {
                Ok(()) => return WriteOutcome::Stored(Source::Primary),
                Err(e) => {
                    warn!(key = %key, error = %e, "remote cache write failed, falling back to file cache");
                    self.stats.remote_error();
                    return self.file_put(key, &bytes, Source::Fallback);
                }
            }
        }

        self.file_put(key, &bytes, Source::Primary)
    }

    /// Looks up a live entry for `key`
    ///
    /// Missing, expired, corrupt and unreadable entries are all a
    /// [`Lookup::Miss`].
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
        if key.is_empty() {
            self.stats.miss();
            return Lookup::Miss;
        }

        if let Some(remote) = self.active_remote() {
            let remote_key = self.keys.remote_key(key);
            match remote.get(&remote_key) {
                Ok(found) => {
                    return self.decode(key, found, Source::Primary, || remote.delete(&remote_key));
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "remote cache read failed, falling back to file cache");
                    self.stats.remote_error();
                    return self.file_get(key, Source::Fallback);
                }
            }
        }

        self.file_get(key, Source::Primary)
    }

    /// Removes every entry of this cache, best effort
    ///
    /// The file directory is always cleared too, since earlier fallbacks may
    /// have left entries there while Redis was the primary.
    pub fn clear(&self) {
        // Degraded or not, so a later promotion cannot bring entries back
        if let Some(remote) = self.remote.as_ref().filter(|_| !self.closed.load(Ordering::Acquire)) {
            match remote.delete_by_prefix(self.keys.namespace()) {
                Ok(removed) => info!(removed, "remote cache cleared"),
                Err(e) => warn!(error = %e, "cannot clear remote cache"),
            }
        }

        match self.file.clear() {
            Ok(removed) => info!(removed, "file cache cleared"),
            Err(e) => warn!(error = %e, "cannot clear file cache"),
        }
    }

    /// Releases the remote connection pool; safe to call more than once
    ///
    /// The file backend keeps working afterwards, starting empty if the
    /// remote tier was healthy up to now.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(remote) = &self.remote {
            remote.close();
        }
        self.demote("remote cache closed, switching to file-only mode");
    }

    /// Marks the remote tier healthy after purging what it held for this namespace
    ///
    /// Writes made while degraded only exist in files, so anything Redis still
    /// has under the namespace may be older than them. If the purge fails the
    /// tier stays degraded.
    fn promote(&self, remote: &R) {
        if self.healthy.load(Ordering::Acquire) {
            return;
        }
        match remote.delete_by_prefix(self.keys.namespace()) {
            Ok(removed) => {
                if !self.healthy.swap(true, Ordering::AcqRel) {
                    self.stats.promotion();
                    info!(purged = removed, "remote cache reachable again, leaving file-only mode");
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot purge stale remote entries, staying in file-only mode");
            }
        }
    }

    /// Marks the remote tier degraded and clears the file directory
    ///
    /// While healthy the files only received per-call fallback writes, which
    /// later remote writes may have superseded.
    fn demote(&self, reason: &str) {
        if !self.healthy.swap(false, Ordering::AcqRel) {
            return;
        }
        warn!("{}", reason);
        match self.file.clear() {
            Ok(removed) => debug!(removed, "dropped fallback entries"),
            Err(e) => warn!(error = %e, "cannot clear file cache"),
        }
    }

    /// Remote backend to use for this call, if the tier is healthy
    fn active_remote(&self) -> Option<&R> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let remote = self.remote.as_ref()?;
        if !self.healthy.load(Ordering::Acquire) {
            self.maybe_reprobe(remote);
        }
        self.healthy.load(Ordering::Acquire).then_some(remote)
    }

    /// Probes a degraded remote at most once per interval
    fn maybe_reprobe(&self, remote: &R) {
        let Some(interval) = self.reprobe_interval else {
            return;
        };

        let now = self.clock.now();
        let last = self.last_probe.load(Ordering::Acquire);
        let interval_secs = i64::try_from(interval.as_secs()).unwrap_or(i64::MAX);
        if now.saturating_sub(last) < interval_secs {
            return;
        }
        // Only the caller that wins the swap probes; the rest stay on files
        if self
            .last_probe
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if remote.probe(self.probe_timeout) {
            self.promote(remote);
        } else {
            debug!("remote cache still unreachable");
        }
    }

    fn file_put(&self, key: &str, bytes: &[u8], source: Source) -> WriteOutcome {
        match self.file.put(&self.keys.file_name(key), bytes) {
            Ok(()) => {
                if source == Source::Fallback {
                    self.stats.fallback_write();
                }
                WriteOutcome::Stored(source)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cache write dropped");
                self.stats.write_failure();
                WriteOutcome::Failed
            }
        }
    }

    fn file_get<T: DeserializeOwned>(&self, key: &str, source: Source) -> Lookup<T> {
        let file_name = self.keys.file_name(key);
        match self.file.get(&file_name) {
            Ok(found) => self.decode(key, found, source, || self.file.delete(&file_name)),
            Err(e) => {
                warn!(key = %key, error = %e, "file cache read failed");
                self.stats.read_failure();
                self.stats.miss();
                Lookup::Miss
            }
        }
    }

    /// Turns stored bytes into a typed lookup, purging payloads that do not decode
    fn decode<T: DeserializeOwned>(
        &self,
        key: &str,
        found: Option<Vec<u8>>,
        source: Source,
        purge: impl FnOnce() -> Result<(), BackendError>,
    ) -> Lookup<T> {
        let Some(bytes) = found else {
            debug!(key = %key, "cache miss");
            self.stats.miss();
            return Lookup::Miss;
        };

        match CacheEnvelope::<T>::decode(&bytes) {
            Ok(envelope) => {
                debug!(key = %key, ?source, "cache hit");
                self.stats.hit();
                if source == Source::Fallback {
                    self.stats.fallback_read();
                }
                Lookup::Hit {
                    value: envelope.payload,
                    source,
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cached payload does not decode, purging");
                if let Err(e) = purge() {
                    debug!(key = %key, error = %e, "cannot purge undecodable entry");
                }
                self.stats.miss();
                Lookup::Miss
            }
        }
    }
}
