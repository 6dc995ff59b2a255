//! In-memory idempotency store
//!
//! DashMap keyed by idempotency key. The claim goes through the entry API so
//! the check and the insert happen under the same shard lock. Expired records
//! are swept every `sweep_every` writes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::{IdempotencyOutcome, IdempotencyStore};
use crate::error::LedgerError;
use crate::transfer::IdempotencyKey;

#[derive(Debug, Clone, Copy)]
struct Record {
    outcome: IdempotencyOutcome,
    expires_at: Instant,
}

/// Writes between two sweeps of expired records
pub const DEFAULT_SWEEP_EVERY: usize = 1_024;

impl Record {
    fn new(outcome: IdempotencyOutcome, ttl: Duration) -> Result<Self, LedgerError> {
        let expires_at = Instant::now().checked_add(ttl).ok_or_else(|| {
            LedgerError::Storage(format!("idempotency ttl {:?} out of range", ttl))
        })?;
        Ok(Self {
            outcome,
            expires_at,
        })
    }

    #[inline]
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Thread-safe idempotency store with TTL
#[derive(Debug)]
pub struct InMemoryIdempotencyStore {
    records: DashMap<String, Record>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
    sweep_every: usize,
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
            unavailable: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            sweep_every: DEFAULT_SWEEP_EVERY,
        }
    }
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep expired records every `writes` writes (minimum 1)
    pub fn with_sweep_every(mut self, writes: usize) -> Self {
        self.sweep_every = writes.max(1);
        self
    }

    /// Make every call fail with a storage error (tests)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop expired records, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.records.retain(|_, record| {
            let live = record.is_live(now);
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage(
                "idempotency store unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn note_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if writes % self.sweep_every == 0 {
            let removed = self.purge_expired();
            if removed > 0 {
                debug!(removed, "Swept expired idempotency records");
            }
        }
    }

    fn live_record(&self, key: &IdempotencyKey) -> Option<Record> {
        let now = Instant::now();
        self.records
            .get(key.as_str())
            .map(|entry| *entry.value())
            .filter(|record| record.is_live(now))
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn try_claim(
        &self,
        key: &IdempotencyKey,
        outcome: IdempotencyOutcome,
        ttl: Duration,
    ) -> Result<bool, LedgerError> {
        self.check_available()?;
        let record = Record::new(outcome, ttl)?;
        let now = Instant::now();

        let claimed = match self.records.entry(key.as_str().to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    false
                } else {
                    occupied.insert(record);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                true
            }
        };
        if claimed {
            self.note_write();
        }
        Ok(claimed)
    }

    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyOutcome>, LedgerError> {
        self.check_available()?;
        Ok(self.live_record(key).map(|record| record.outcome))
    }

    async fn put(
        &self,
        key: &IdempotencyKey,
        outcome: IdempotencyOutcome,
        ttl: Duration,
    ) -> Result<(), LedgerError> {
        self.check_available()?;
        let record = Record::new(outcome, ttl)?;
        self.records.insert(key.as_str().to_string(), record);
        self.note_write();
        Ok(())
    }

    async fn remove(&self, key: &IdempotencyKey) -> Result<(), LedgerError> {
        self.check_available()?;
        self.records.remove(key.as_str());
        Ok(())
    }

    async fn remaining_ttl(&self, key: &IdempotencyKey) -> Result<Option<Duration>, LedgerError> {
        self.check_available()?;
        let now = Instant::now();
        Ok(self
            .live_record(key)
            .map(|record| record.expires_at.saturating_duration_since(now)))
    }
}
