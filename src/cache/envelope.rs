//! Serialized form of a cache entry
//!
//! Every stored value is wrapped in a [`CacheEnvelope`] carrying its absolute
//! expiry time, encoded as JSON:
//!
//! ```json
//! {"payload": { ... }, "expires_at": 1704067200}
//! ```
//!
//! Backends only need the expiry to decide whether an entry is live, so they
//! read it through [`freshness`] without knowing the payload type.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A payload paired with the epoch second at which it stops being live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    /// The cached value
    pub payload: T,
    /// Absolute expiry, seconds since the Unix epoch
    pub expires_at: i64,
}

/// Header view of an envelope; the payload is parsed but discarded
#[derive(Deserialize)]
struct EnvelopeHeader {
    expires_at: i64,
}

/// Whether a stored envelope may still be served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Live,
    Expired,
}

impl<T> CacheEnvelope<T> {
    /// Wraps `payload` so that it expires `ttl_secs` after `now`
    pub fn new(payload: T, now: i64, ttl_secs: u64) -> Self {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        Self {
            payload,
            expires_at: now.saturating_add(ttl),
        }
    }

    /// An envelope is live strictly before its expiry second
    pub fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

impl<T: Serialize> CacheEnvelope<T> {
    /// Encodes the envelope as JSON bytes
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<T: DeserializeOwned> CacheEnvelope<T> {
    /// Decodes an envelope, including its payload, from JSON bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Reads only the expiry of an encoded envelope and compares it with `now`
///
/// Fails when the bytes are not a well-formed envelope, which callers treat
/// as a corrupt entry.
pub fn freshness(bytes: &[u8], now: i64) -> Result<Freshness, serde_json::Error> {
    let header: EnvelopeHeader = serde_json::from_slice(bytes)?;
    if header.expires_at > now {
        Ok(Freshness::Live)
    } else {
        Ok(Freshness::Expired)
    }
}
