//! Remote backend: a pooled, networked key-value store
//!
//! [`RemoteBackend`] is the seam the orchestrator talks to; [`RedisBackend`]
//! is the production implementation on top of a blocking `redis` client and
//! an `r2d2` pool. Entries carry a native Redis expiry (`SET ... EX`), so the
//! store evicts stale keys even if nobody reads them again.

use r2d2::{ManageConnection, Pool, PooledConnection};
use redis::ConnectionLike;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::envelope::{self, Freshness};
use super::error::BackendError;
use crate::config::RemoteConfig;

/// Keys fetched per `SCAN` round trip when clearing a namespace
const SCAN_BATCH: usize = 500;

/// Operations the orchestrator needs from a remote store
///
/// Implementations report every failure as a [`BackendError`] and leave the
/// fallback decision to the caller.
pub trait RemoteBackend: Send + Sync {
    /// Checks liveness within `timeout`; never fails, only answers
    fn probe(&self, timeout: Duration) -> bool;

    /// Stores `envelope` under `key`, expiring natively after `ttl_secs`
    fn put(&self, key: &str, envelope: &[u8], ttl_secs: u64) -> Result<(), BackendError>;

    /// Fetches a live envelope; expired or corrupt ones are deleted and read as `None`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Removes a single key
    fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// Removes every key starting with `prefix`, returning how many went away
    fn delete_by_prefix(&self, prefix: &str) -> Result<u64, BackendError>;

    /// Releases pooled connections; later calls fail with [`BackendError::Closed`]
    fn close(&self);
}

/// r2d2 manager producing blocking Redis connections
#[derive(Debug)]
pub struct RedisConnectionManager {
    client: redis::Client,
    /// Bound on connecting and on each socket read/write
    io_timeout: Duration,
}

impl RedisConnectionManager {
    pub fn new(client: redis::Client, io_timeout: Duration) -> Self {
        Self { client, io_timeout }
    }
}

impl ManageConnection for RedisConnectionManager {
    type Connection = redis::Connection;
    type Error = redis::RedisError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let conn = self.client.get_connection_with_timeout(self.io_timeout)?;
        conn.set_read_timeout(Some(self.io_timeout))?;
        conn.set_write_timeout(Some(self.io_timeout))?;
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        redis::cmd("PING").query::<String>(conn).map(|_| ())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        !conn.is_open()
    }
}

/// Routes pool-internal connection errors into tracing instead of `log`
#[derive(Debug)]
struct TracingErrorHandler;

impl r2d2::HandleError<redis::RedisError> for TracingErrorHandler {
    fn handle_error(&self, error: redis::RedisError) {
        debug!(error = %error, "redis pool connection error");
    }
}

/// Redis-backed [`RemoteBackend`]
#[derive(Debug)]
pub struct RedisBackend {
    /// `None` once closed
    pool: RwLock<Option<Pool<RedisConnectionManager>>>,
    clock: Arc<dyn Clock>,
    checkout_timeout: Duration,
}

impl RedisBackend {
    /// Builds the pool without connecting
    ///
    /// Fails only on a malformed URL; an unreachable server shows up later as
    /// a failed [`probe`](RemoteBackend::probe).
    pub fn new(config: &RemoteConfig, clock: Arc<dyn Clock>) -> Result<Self, BackendError> {
        let client = redis::Client::open(config.url.as_str())?;
        let manager = RedisConnectionManager::new(client, config.pool.connect_timeout);

        let max_size = config.pool.max_size.max(1);
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(config.pool.min_idle.min(max_size)))
            .test_on_check_out(true)
            .connection_timeout(config.pool.checkout_timeout)
            .idle_timeout(Some(config.pool.idle_timeout))
            .error_handler(Box::new(TracingErrorHandler))
            .build_unchecked(manager);

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            clock,
            checkout_timeout: config.pool.checkout_timeout,
        })
    }

    /// Checks out a validated connection, waiting at most `timeout`
    fn connection(
        &self,
        timeout: Duration,
    ) -> Result<PooledConnection<RedisConnectionManager>, BackendError> {
        let pool = self
            .pool
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(BackendError::Closed)?;
        Ok(pool.get_timeout(timeout)?)
    }
}

impl RemoteBackend for RedisBackend {
    fn probe(&self, timeout: Duration) -> bool {
        let result = self.connection(timeout).and_then(|mut conn| {
            redis::cmd("PING")
                .query::<String>(&mut *conn)
                .map_err(BackendError::from)
        });

        match result {
            Ok(_) => true,
            Err(e) => {
                info!(error = %e, "redis probe failed");
                false
            }
        }
    }

    fn put(&self, key: &str, envelope: &[u8], ttl_secs: u64) -> Result<(), BackendError> {
        let mut conn = self.connection(self.checkout_timeout)?;
        redis::cmd("SET")
            .arg(key)
            .arg(envelope)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query::<()>(&mut *conn)?;

        debug!(key = %key, ttl_secs, "redis cache write");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut conn = self.connection(self.checkout_timeout)?;
        let stored: Option<Vec<u8>> = redis::cmd("GET").arg(key).query(&mut *conn)?;
        let Some(bytes) = stored else {
            return Ok(None);
        };

        match envelope::freshness(&bytes, self.clock.now()) {
            Ok(Freshness::Live) => Ok(Some(bytes)),
            Ok(Freshness::Expired) => {
                debug!(key = %key, "redis entry outlived its envelope, removing");
                redis::cmd("DEL").arg(key).query::<()>(&mut *conn)?;
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "corrupt redis entry, removing");
                redis::cmd("DEL").arg(key).query::<()>(&mut *conn)?;
                Ok(None)
            }
        }
    }

    fn delete(&self, key: &str) -> Result<(), BackendError> {
        let mut conn = self.connection(self.checkout_timeout)?;
        redis::cmd("DEL").arg(key).query::<()>(&mut *conn)?;
        Ok(())
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<u64, BackendError> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.connection(self.checkout_timeout)?;

        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query(&mut *conn)?;

            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL").arg(&keys).query(&mut *conn)?;
                removed += deleted;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(prefix = %prefix, removed, "redis namespace cleared");
        Ok(removed)
    }

    fn close(&self) {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if pool.is_some() {
            info!("redis pool closed");
        }
    }
}

/// Escapes Redis glob metacharacters so `prefix` matches literally
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
