//! Idempotency Guard
//!
//! Decides, before any mutation, whether a transfer request with a given key
//! was already accepted. The claim is a single atomic put-if-absent against
//! the [`IdempotencyStore`]; there is never a read-then-write pair.
//!
//! # Record lifecycle
//!
//! ```text
//! (absent) --try_claim--> IN_FLIGHT{transfer_id} --finalize--> COMPLETED | FAILED
//!                               |
//!                               +--release--> (absent)
//! ```
//!
//! A losing claimant never waits: it reads the record and returns whatever
//! the winner has produced so far.

pub mod memory;

pub use memory::InMemoryIdempotencyStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LedgerError;
use crate::transfer::{IdempotencyKey, TransferId};

/// Default record lifetime (24h)
pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// What the store knows about a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyOutcome {
    /// Claimed, transfer not finished yet
    InFlight { transfer_id: TransferId },
    Completed { transfer_id: TransferId },
    Failed { transfer_id: TransferId },
}

impl IdempotencyOutcome {
    pub fn transfer_id(&self) -> TransferId {
        match self {
            IdempotencyOutcome::InFlight { transfer_id }
            | IdempotencyOutcome::Completed { transfer_id }
            | IdempotencyOutcome::Failed { transfer_id } => *transfer_id,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, IdempotencyOutcome::InFlight { .. })
    }
}

/// Shared idempotency storage port
///
/// `try_claim` must be atomic: of any number of concurrent claimants for
/// the same live key exactly one observes `true`. Expired records are
/// treated as absent by every method.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Put-if-absent with TTL
    async fn try_claim(
        &self,
        key: &IdempotencyKey,
        outcome: IdempotencyOutcome,
        ttl: Duration,
    ) -> Result<bool, LedgerError>;

    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyOutcome>, LedgerError>;

    /// Unconditional overwrite with TTL
    async fn put(
        &self,
        key: &IdempotencyKey,
        outcome: IdempotencyOutcome,
        ttl: Duration,
    ) -> Result<(), LedgerError>;

    async fn remove(&self, key: &IdempotencyKey) -> Result<(), LedgerError>;

    async fn remaining_ttl(&self, key: &IdempotencyKey) -> Result<Option<Duration>, LedgerError>;
}

/// Guard used by the transfer coordinator
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn IdempotencyStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Atomically mark `key` as in flight for `transfer_id`
    ///
    /// Returns true only for the first claimant.
    pub async fn try_claim(
        &self,
        key: &IdempotencyKey,
        transfer_id: TransferId,
    ) -> Result<bool, LedgerError> {
        let claimed = self
            .store
            .try_claim(key, IdempotencyOutcome::InFlight { transfer_id }, self.ttl)
            .await?;
        debug!(idempotency_key = %key, transfer_id = %transfer_id, claimed, "Idempotency claim");
        Ok(claimed)
    }

    /// Final outcome recorded for `key`, if any
    pub async fn lookup(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyOutcome>, LedgerError> {
        Ok(self.current(key).await?.filter(IdempotencyOutcome::is_terminal))
    }

    /// Whatever is recorded for `key`, in flight included
    pub async fn current(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyOutcome>, LedgerError> {
        self.store.get(key).await
    }

    /// Overwrite the in-flight marker with the terminal result
    pub async fn finalize(
        &self,
        key: &IdempotencyKey,
        outcome: IdempotencyOutcome,
    ) -> Result<(), LedgerError> {
        if !outcome.is_terminal() {
            return Err(LedgerError::IllegalState(format!(
                "idempotency key {key} can only be finalized with a terminal outcome"
            )));
        }
        self.store.put(key, outcome, self.ttl).await
    }

    /// Drop a claim whose request was rejected before any transfer existed
    pub async fn release(&self, key: &IdempotencyKey) -> Result<(), LedgerError> {
        debug!(idempotency_key = %key, "Idempotency claim released");
        self.store.remove(key).await
    }

    pub async fn remaining_ttl(&self, key: &IdempotencyKey) -> Result<Option<Duration>, LedgerError> {
        self.store.remaining_ttl(key).await
    }
}
