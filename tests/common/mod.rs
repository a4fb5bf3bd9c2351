//! Shared helpers for integration tests
//!
//! [`FakeRemote`] stands in for Redis: an in-memory map with native expiry
//! driven by the test's [`ManualClock`], plus switches to make it unreachable
//! or to fail individual calls.

#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use weather_cache::cache::{BackendError, Clock, ManualClock, RemoteBackend};
use weather_cache::data::WeatherRecord;

/// 2024-01-01T00:00:00Z
pub const T0: i64 = 1_704_067_200;

#[derive(Debug)]
struct FakeState {
    /// key -> (bytes, native expiry)
    entries: Mutex<HashMap<String, (Vec<u8>, i64)>>,
    reachable: AtomicBool,
    failing: AtomicBool,
    closed: AtomicBool,
    probes: AtomicUsize,
    clock: Arc<ManualClock>,
}

/// Cloneable handle to an in-memory remote store
#[derive(Debug, Clone)]
pub struct FakeRemote {
    state: Arc<FakeState>,
}

impl FakeRemote {
    pub fn new(clock: Arc<ManualClock>, reachable: bool) -> Self {
        Self {
            state: Arc::new(FakeState {
                entries: Mutex::new(HashMap::new()),
                reachable: AtomicBool::new(reachable),
                failing: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                probes: AtomicUsize::new(0),
                clock,
            }),
        }
    }

    /// Makes every probe and call fail (or succeed again)
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Makes calls fail while probes keep succeeding
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn probes(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.entries.lock().unwrap().contains_key(key)
    }

    pub fn insert_raw(&self, key: &str, bytes: &[u8], ttl_secs: i64) {
        let expiry = self.state.clock.now() + ttl_secs;
        self.state
            .entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes.to_vec(), expiry));
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(BackendError::Closed);
        }
        if !self.state.reachable.load(Ordering::SeqCst) || self.state.failing.load(Ordering::SeqCst) {
            return Err(BackendError::PoolExhausted("fake remote is down".to_string()));
        }
        Ok(())
    }
}

impl RemoteBackend for FakeRemote {
    fn probe(&self, _timeout: Duration) -> bool {
        self.state.probes.fetch_add(1, Ordering::SeqCst);
        !self.state.closed.load(Ordering::SeqCst) && self.state.reachable.load(Ordering::SeqCst)
    }

    fn put(&self, key: &str, envelope: &[u8], ttl_secs: u64) -> Result<(), BackendError> {
        self.check()?;
        self.insert_raw(key, envelope, ttl_secs as i64);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.check()?;
        let now = self.state.clock.now();
        let mut entries = self.state.entries.lock().unwrap();
        match entries.get(key) {
            Some((_, expiry)) if *expiry <= now => {
                entries.remove(key);
                Ok(None)
            }
            Some((bytes, _)) => Ok(Some(bytes.clone())),
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.check()?;
        self.state.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<u64, BackendError> {
        self.check()?;
        let mut entries = self.state.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// A small but complete weather record
pub fn record(seed: f64) -> WeatherRecord {
    let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    WeatherRecord {
        times: (0..3).map(|h| day.and_hms_opt(h, 0, 0).unwrap()).collect(),
        temperatures: vec![seed, seed - 0.5, seed - 1.0],
        wind_speeds: vec![12.0, 13.5, 11.0],
        rainfall: vec![0.0, 0.2, 0.0],
        pressure: vec![1012.0, 1011.6, 1011.1],
        soil_temperature: vec![0.4, 0.3, 0.3],
    }
}
