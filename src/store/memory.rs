//! In-memory ledger store
//!
//! Implements both repositories and the unit of work over one set of
//! `FxHashMap` tables behind a single tokio `RwLock`. A batch commit validates
//! every write against the tables before applying any of them, so a failed
//! commit leaves the tables untouched.
//!
//! Fault switches let tests make saves or commits fail, or slow every call
//! down to exercise deadlines.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{AccountRepository, TransferRepository, UnitOfWork, WriteBatch};
use crate::account::{Account, AccountId, AccountNumber, TaxId};
use crate::error::LedgerError;
use crate::transfer::{IdempotencyKey, Transfer, TransferId, TransferStatus};

#[derive(Default)]
struct Tables {
    accounts: FxHashMap<AccountId, Account>,
    /// account number → owner
    account_numbers: FxHashMap<String, AccountId>,
    /// tax id → owner
    tax_ids: FxHashMap<String, AccountId>,
    transfers: FxHashMap<TransferId, Transfer>,
    /// idempotency key → transfer
    transfer_keys: FxHashMap<String, TransferId>,
}

impl Tables {
    fn check_account(&self, account: &Account) -> Result<(), LedgerError> {
        let stored = self.accounts.get(&account.id()).map(Account::version);
        check_version("Account", &account.id(), stored, account.version())?;

        if let Some(owner) = self.account_numbers.get(account.number().as_str())
            && *owner != account.id()
        {
            return Err(LedgerError::DuplicateAccountNumber(
                account.number().to_string(),
            ));
        }
        if let Some(owner) = self.tax_ids.get(account.tax_id().as_str())
            && *owner != account.id()
        {
            return Err(LedgerError::DuplicateTaxId(account.tax_id().to_string()));
        }
        Ok(())
    }

    fn check_transfer(&self, transfer: &Transfer) -> Result<(), LedgerError> {
        let stored = self.transfers.get(&transfer.id()).map(Transfer::version);
        check_version("Transfer", &transfer.id(), stored, transfer.version())?;

        if let Some(owner) = self.transfer_keys.get(transfer.idempotency_key().as_str())
            && *owner != transfer.id()
        {
            return Err(LedgerError::DuplicateIdempotencyKey(
                transfer.idempotency_key().to_string(),
            ));
        }
        Ok(())
    }

    fn apply_account(&mut self, account: &Account) -> Account {
        let mut stored = account.clone();
        stored.set_version(account.version() + 1);
        self.account_numbers
            .insert(stored.number().as_str().to_string(), stored.id());
        self.tax_ids
            .insert(stored.tax_id().as_str().to_string(), stored.id());
        self.accounts.insert(stored.id(), stored.clone());
        stored
    }

    fn apply_transfer(&mut self, transfer: &Transfer) -> Transfer {
        let mut stored = transfer.clone();
        stored.set_version(transfer.version() + 1);
        self.transfer_keys
            .insert(stored.idempotency_key().as_str().to_string(), stored.id());
        self.transfers.insert(stored.id(), stored.clone());
        stored
    }
}

fn check_version(
    entity: &'static str,
    id: &impl ToString,
    stored: Option<u64>,
    expected: u64,
) -> Result<(), LedgerError> {
    let found = stored.unwrap_or(0);
    if found != expected {
        return Err(LedgerError::VersionConflict {
            entity,
            id: id.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

#[derive(Default)]
struct Faults {
    fail_account_saves: AtomicBool,
    fail_commits: AtomicBool,
    /// Fail transfer saves carrying this status (any status when `Some(None)`)
    fail_transfer_saves: Mutex<Option<Option<TransferStatus>>>,
    latency_ms: AtomicU64,
}

/// Reference store for tests and the demo binary
#[derive(Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
    faults: Faults,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Fault injection ===

    pub fn set_fail_account_saves(&self, fail: bool) {
        self.faults.fail_account_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.faults.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Fail every transfer save
    pub fn set_fail_transfer_saves(&self, fail: bool) {
        self.set_transfer_save_fault(fail.then_some(None));
    }

    /// Fail transfer saves only for transfers in `status`
    pub fn fail_transfer_saves_with_status(&self, status: TransferStatus) {
        self.set_transfer_save_fault(Some(Some(status)));
    }

    fn set_transfer_save_fault(&self, fault: Option<Option<TransferStatus>>) {
        if let Ok(mut slot) = self.faults.fail_transfer_saves.lock() {
            *slot = fault;
        }
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.faults.latency_ms.store(millis, Ordering::SeqCst);
    }

    // === Inspection ===

    pub async fn account_count(&self) -> usize {
        self.tables.read().await.accounts.len()
    }

    pub async fn transfer_count(&self) -> usize {
        self.tables.read().await.transfers.len()
    }

    pub async fn transfers_with_status(&self, status: TransferStatus) -> Vec<Transfer> {
        self.tables
            .read()
            .await
            .transfers
            .values()
            .filter(|t| t.status() == status)
            .cloned()
            .collect()
    }

    async fn simulate_latency(&self) {
        let millis = self.faults.latency_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn transfer_save_fails(&self, transfer: &Transfer) -> bool {
        match self.faults.fail_transfer_saves.lock() {
            Ok(slot) => match *slot {
                Some(None) => true,
                Some(Some(status)) => status == transfer.status(),
                None => false,
            },
            Err(_) => true,
        }
    }
}

#[async_trait]
impl AccountRepository for InMemoryLedgerStore {
    async fn save(&self, account: &Account) -> Result<Account, LedgerError> {
        self.simulate_latency().await;
        if self.faults.fail_account_saves.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage("account table unavailable".to_string()));
        }

        let mut tables = self.tables.write().await;
        tables.check_account(account)?;
        let stored = tables.apply_account(account);
        debug!(account_id = %stored.id(), version = stored.version(), "Account saved");
        Ok(stored)
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        self.simulate_latency().await;
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn exists_by_number(&self, number: &AccountNumber) -> Result<bool, LedgerError> {
        self.simulate_latency().await;
        Ok(self
            .tables
            .read()
            .await
            .account_numbers
            .contains_key(number.as_str()))
    }

    async fn exists_by_tax_id(&self, tax_id: &TaxId) -> Result<bool, LedgerError> {
        self.simulate_latency().await;
        Ok(self.tables.read().await.tax_ids.contains_key(tax_id.as_str()))
    }
}

#[async_trait]
impl TransferRepository for InMemoryLedgerStore {
    async fn save(&self, transfer: &Transfer) -> Result<Transfer, LedgerError> {
        self.simulate_latency().await;
        if self.transfer_save_fails(transfer) {
            return Err(LedgerError::Storage("transfer table unavailable".to_string()));
        }

        let mut tables = self.tables.write().await;
        tables.check_transfer(transfer)?;
        let stored = tables.apply_transfer(transfer);
        debug!(
            transfer_id = %stored.id(),
            status = %stored.status(),
            version = stored.version(),
            "Transfer saved"
        );
        Ok(stored)
    }

    async fn find_by_id(&self, id: TransferId) -> Result<Option<Transfer>, LedgerError> {
        self.simulate_latency().await;
        Ok(self.tables.read().await.transfers.get(&id).cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<Transfer>, LedgerError> {
        self.simulate_latency().await;
        let tables = self.tables.read().await;
        Ok(tables
            .transfer_keys
            .get(key.as_str())
            .and_then(|id| tables.transfers.get(id))
            .cloned())
    }

    async fn exists_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<bool, LedgerError> {
        self.simulate_latency().await;
        Ok(self
            .tables
            .read()
            .await
            .transfer_keys
            .contains_key(key.as_str()))
    }
}

#[async_trait]
impl UnitOfWork for InMemoryLedgerStore {
    async fn commit(&self, batch: WriteBatch) -> Result<WriteBatch, LedgerError> {
        if batch.is_empty() {
            return Ok(batch);
        }
        self.simulate_latency().await;
        if self.faults.fail_commits.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage("commit failed".to_string()));
        }
        if let Some(transfer) = &batch.transfer
            && self.transfer_save_fails(transfer)
        {
            return Err(LedgerError::Storage("transfer table unavailable".to_string()));
        }

        let mut tables = self.tables.write().await;

        // validate everything first
        for (i, account) in batch.accounts.iter().enumerate() {
            if batch.accounts[..i].iter().any(|a| a.id() == account.id()) {
                return Err(LedgerError::IllegalState(format!(
                    "account {} appears twice in one batch",
                    account.id()
                )));
            }
            tables.check_account(account)?;
        }
        if let Some(transfer) = &batch.transfer {
            tables.check_transfer(transfer)?;
        }

        let accounts = batch
            .accounts
            .iter()
            .map(|account| tables.apply_account(account))
            .collect();
        let transfer = batch
            .transfer
            .as_ref()
            .map(|transfer| tables.apply_transfer(transfer));

        debug!(
            accounts = batch.accounts.len(),
            transfer = batch.transfer.is_some(),
            "Batch committed"
        );
        Ok(WriteBatch { accounts, transfer })
    }
}
