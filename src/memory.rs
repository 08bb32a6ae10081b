//! In-process counting store.
//!
//! Suitable for a single process, and for tests where a [`ManualClock`]
//! drives expiry. Each call holds the map lock for its whole duration, which
//! gives the same per-key atomicity Redis transactions do.
//!
//! [`ManualClock`]: crate::clock::ManualClock

use crate::clock::Clock;
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::store::{CountingStore, Histogram, Snapshot};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct Entry {
    fields: Histogram,
    expires_at: Option<i64>,
}

/// Minimum spacing between bulk sweeps of expired keys.
const SWEEP_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Default)]
struct Entries {
    keys: HashMap<String, Entry>,
    next_sweep_at: i64,
}

impl Entries {
    /// Drop every expired key once per sweep interval. Keys that are never
    /// touched again would otherwise stay in the map for good.
    fn sweep_if_due(&mut self, now: i64) {
        if now >= self.next_sweep_at {
            self.retain_live(now);
            self.next_sweep_at = now + SWEEP_INTERVAL_SECS;
        }
    }

    fn retain_live(&mut self, now: i64) -> usize {
        let before = self.keys.len();
        self.keys.retain(|_, entry| !is_expired(entry, now));
        before - self.keys.len()
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<Entries>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries::default())),
            clock,
        }
    }

    /// Overwrite a raw field value. Mostly useful for seeding tests.
    pub fn put_field(&self, key: &str, field: &str, value: &str) -> ThrottlerResult<()> {
        let now = self.clock.now_secs();
        let mut entries = self.lock()?;
        Self::purge_if_expired(&mut entries.keys, key, now);
        entries
            .keys
            .entry(key.to_string())
            .or_default()
            .fields
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_secs();
        match self.entries.lock() {
            Ok(entries) => entries.keys.values().filter(|e| !is_expired(e, now)).count(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired key now, returning how many were dropped.
    pub fn purge_expired(&self) -> ThrottlerResult<usize> {
        let now = self.clock.now_secs();
        let mut entries = self.lock()?;
        let purged = entries.retain_live(now);
        entries.next_sweep_at = now + SWEEP_INTERVAL_SECS;
        Ok(purged)
    }

    fn lock(&self) -> ThrottlerResult<MutexGuard<'_, Entries>> {
        self.entries
            .lock()
            .map_err(|_| ThrottlerError::Store("Failed to acquire memory store lock".into()))
    }

    fn purge_if_expired(entries: &mut HashMap<String, Entry>, key: &str, now: i64) {
        if entries.get(key).is_some_and(|e| is_expired(e, now)) {
            entries.remove(key);
        }
    }

    fn increment_locked(
        entries: &mut Entries,
        key: &str,
        field: &str,
        now: i64,
    ) -> ThrottlerResult<Histogram> {
        entries.sweep_if_due(now);
        Self::purge_if_expired(&mut entries.keys, key, now);
        let entry = entries.keys.entry(key.to_string()).or_default();

        let current = match entry.fields.get(field) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                ThrottlerError::Store(format!("hash value of '{}' is not an integer", field))
            })?,
            None => 0,
        };
        entry
            .fields
            .insert(field.to_string(), (current + 1).to_string());

        Ok(entry.fields.clone())
    }

    fn ttl_locked(entries: &HashMap<String, Entry>, key: &str, now: i64) -> Option<Duration> {
        entries
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| Duration::from_secs(at.saturating_sub(now).max(0) as u64))
    }
}

fn is_expired(entry: &Entry, now: i64) -> bool {
    entry.expires_at.is_some_and(|at| now >= at)
}

#[async_trait]
impl CountingStore for MemoryStore {
    async fn increment_and_snapshot(&self, key: &str, field: &str) -> ThrottlerResult<Histogram> {
        let now = self.clock.now_secs();
        let mut entries = self.lock()?;
        Self::increment_locked(&mut entries, key, field, now)
    }

    async fn time_to_live(&self, key: &str) -> ThrottlerResult<Option<Duration>> {
        let now = self.clock.now_secs();
        let mut entries = self.lock()?;
        Self::purge_if_expired(&mut entries.keys, key, now);
        Ok(Self::ttl_locked(&entries.keys, key, now))
    }

    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> ThrottlerResult<()> {
        let now = self.clock.now_secs();
        let mut entries = self.lock()?;
        Self::purge_if_expired(&mut entries.keys, key, now);
        if let Some(entry) = entries.keys.get_mut(key) {
            if entry.expires_at.is_none() {
                entry.expires_at = Some(now + ttl.as_secs() as i64);
            }
        }
        Ok(())
    }

    async fn increment_and_snapshot_with_ttl(
        &self,
        key: &str,
        field: &str,
    ) -> ThrottlerResult<Snapshot> {
        let now = self.clock.now_secs();
        let mut entries = self.lock()?;
        let histogram = Self::increment_locked(&mut entries, key, field, now)?;
        let ttl = Self::ttl_locked(&entries.keys, key, now);
        Ok(Snapshot { histogram, ttl })
    }
}
