//! Persistence ports
//!
//! Repositories for the two aggregates plus the unit-of-work boundary that
//! writes several aggregates all-or-nothing.
//!
//! # Optimistic versioning
//!
//! Every aggregate carries the version it was loaded at. A save succeeds only
//! if the stored version still matches, and returns the aggregate with the
//! version bumped. A mismatch is `LedgerError::VersionConflict` (retriable).
//! A never-saved aggregate has version 0.

pub mod memory;

pub use memory::InMemoryLedgerStore;

use async_trait::async_trait;

use crate::account::{Account, AccountId, AccountNumber, TaxId};
use crate::error::LedgerError;
use crate::transfer::{IdempotencyKey, Transfer, TransferId};

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert or update, enforcing version and unique number/tax id
    async fn save(&self, account: &Account) -> Result<Account, LedgerError>;

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, LedgerError>;

    async fn exists_by_number(&self, number: &AccountNumber) -> Result<bool, LedgerError>;

    async fn exists_by_tax_id(&self, tax_id: &TaxId) -> Result<bool, LedgerError>;
}

#[async_trait]
pub trait TransferRepository: Send + Sync {
    /// Insert or update, enforcing version and unique idempotency key
    async fn save(&self, transfer: &Transfer) -> Result<Transfer, LedgerError>;

    async fn find_by_id(&self, id: TransferId) -> Result<Option<Transfer>, LedgerError>;

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<Transfer>, LedgerError>;

    async fn exists_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<bool, LedgerError>;
}

/// Aggregates written together by [`UnitOfWork::commit`]
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub accounts: Vec<Account>,
    pub transfer: Option<Transfer>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(mut self, account: Account) -> Self {
        self.accounts.push(account);
        self
    }

    pub fn transfer(mut self, transfer: Transfer) -> Self {
        self.transfer = Some(transfer);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.transfer.is_none()
    }
}

/// Atomic multi-aggregate write
///
/// Either every aggregate in the batch is stored (each with its version
/// bumped) or none is. The returned batch holds the stored versions.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn commit(&self, batch: WriteBatch) -> Result<WriteBatch, LedgerError>;
}
