//! Integration Tests for the Transfer Coordinator
//!
//! End-to-end scenarios against the in-memory store, idempotency store and a
//! recording event sink. No external services needed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::account::{Account, AccountId, AccountService, CreateAccountRequest};
use crate::context::RequestContext;
use crate::error::LedgerError;
use crate::events::RecordingEventSink;
use crate::idempotency::{
    DEFAULT_IDEMPOTENCY_TTL, IdempotencyGuard, IdempotencyOutcome, IdempotencyStore,
    InMemoryIdempotencyStore,
};
use crate::money::{Amount, Balance};
use crate::store::{InMemoryLedgerStore, TransferRepository, UnitOfWork, WriteBatch};
use crate::transfer::coordinator::TransferCoordinator;
use crate::transfer::models::Transfer;
use crate::transfer::state::TransferStatus;
use crate::transfer::types::{IdempotencyKey, TransferId, TransferRequest};

const TAX_A: &str = "529.982.247-25";
const TAX_B: &str = "111.444.777-35";
const TAX_C: &str = "123.456.789-09";

/// Coordinator wired to in-memory adapters
struct TestHarness {
    coordinator: Arc<TransferCoordinator>,
    accounts: AccountService,
    store: Arc<InMemoryLedgerStore>,
    idempotency: Arc<InMemoryIdempotencyStore>,
    events: Arc<RecordingEventSink>,
}

impl TestHarness {
    fn new() -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        let events = Arc::new(RecordingEventSink::new());
        let guard = IdempotencyGuard::new(idempotency.clone(), DEFAULT_IDEMPOTENCY_TTL);

        let coordinator = Arc::new(
            TransferCoordinator::with_store(store.clone(), events.clone(), guard)
                .with_failure_write_timeout(Duration::from_secs(1)),
        );
        let accounts = AccountService::new(store.clone(), events.clone());

        Self {
            coordinator,
            accounts,
            store,
            idempotency,
            events,
        }
    }

    async fn open(&self, name: &str, tax_id: &str, balance: &str) -> Account {
        let req = CreateAccountRequest::new(name, tax_id)
            .with_initial_balance(balance.parse::<Decimal>().unwrap());
        self.accounts.open_account(req, &ctx()).await.unwrap()
    }

    /// A with 100.00 and B with 0.00, creation events cleared
    async fn two_accounts(&self) -> (AccountId, AccountId) {
        let a = self.open("Ana Souza", TAX_A, "100.00").await;
        let b = self.open("Bruno Lima", TAX_B, "0.00").await;
        self.events.clear();
        (a.id(), b.id())
    }

    async fn balance(&self, id: AccountId) -> Balance {
        self.accounts.get_account(id, &ctx()).await.unwrap().balance()
    }
}

fn ctx() -> RequestContext {
    RequestContext::with_timeout(Duration::from_secs(5))
}

fn money(value: &str) -> Balance {
    Balance::parse(value).unwrap()
}

fn request(from: AccountId, to: AccountId, amount: &str, key: &str) -> TransferRequest {
    TransferRequest::new(from, to, Amount::parse(amount).unwrap())
        .with_description("integration test")
        .with_idempotency_key(IdempotencyKey::new(key).unwrap())
}

// ============================================================================
// Happy Path Tests
// ============================================================================

/// A 100.00 → B 0.00, transfer 40.00
#[tokio::test]
async fn test_transfer_happy_path() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;

    let transfer = harness
        .coordinator
        .process(request(a, b, "40.00", "happy-path-0001"), &ctx())
        .await
        .unwrap();

    assert_eq!(transfer.status(), TransferStatus::Completed);
    assert!(transfer.failure_reason().is_none());
    assert_eq!(harness.balance(a).await, money("60.00"));
    assert_eq!(harness.balance(b).await, money("40.00"));

    assert_eq!(
        harness.events.event_types(),
        vec![
            "TRANSFER_REQUESTED",
            "ACCOUNT_DEBITED",
            "ACCOUNT_CREDITED",
            "TRANSFER_COMPLETED"
        ]
    );

    let outcome = harness
        .idempotency
        .get(transfer.idempotency_key())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Some(IdempotencyOutcome::Completed {
            transfer_id: transfer.id()
        })
    );
}

/// Missing key is generated and the transfer is findable by it
#[tokio::test]
async fn test_generated_idempotency_key() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;

    let req = TransferRequest::new(a, b, Amount::parse("1").unwrap());
    let transfer = harness.coordinator.process(req, &ctx()).await.unwrap();

    let found = harness
        .coordinator
        .find_by_idempotency_key(transfer.idempotency_key(), &ctx())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), transfer.id());

    let by_id = harness
        .coordinator
        .get_transfer(transfer.id(), &ctx())
        .await
        .unwrap();
    assert_eq!(by_id, found);
}

// ============================================================================
// Business Failure Tests
// ============================================================================

/// A 60.00 → B, transfer 150.00
#[tokio::test]
async fn test_overdraft_marks_transfer_failed() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;
    harness
        .coordinator
        .process(request(a, b, "40.00", "overdraft-setup-1"), &ctx())
        .await
        .unwrap();
    harness.events.clear();

    let err = harness
        .coordinator
        .process(request(a, b, "150.00", "overdraft-0001"), &ctx())
        .await
        .unwrap_err();

    assert!(matches!(
        err.root_cause(),
        LedgerError::InsufficientFunds { .. }
    ));
    assert!(!err.is_retriable());
    assert_eq!(err.http_status(), 422);

    let LedgerError::TransferFailed { transfer_id, .. } = &err else {
        panic!("expected TransferFailed, got {err:?}");
    };
    let failed = harness
        .coordinator
        .get_transfer(*transfer_id, &ctx())
        .await
        .unwrap();
    assert_eq!(failed.status(), TransferStatus::Failed);
    assert!(failed.failure_reason().unwrap().contains("Insufficient funds"));

    assert_eq!(harness.balance(a).await, money("60.00"));
    assert_eq!(harness.balance(b).await, money("40.00"));
    assert_eq!(
        harness.events.event_types(),
        vec!["TRANSFER_REQUESTED", "TRANSFER_FAILED"]
    );
}

#[tokio::test]
async fn test_unknown_account_stores_nothing() {
    let harness = TestHarness::new();
    let (a, _) = harness.two_accounts().await;

    let err = harness
        .coordinator
        .process(request(a, AccountId::new(), "1.00", "not-found-0001"), &ctx())
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), 404);
    assert_eq!(harness.store.transfer_count().await, 0);
    // claim released
    assert!(harness.idempotency.is_empty());
    assert!(harness.events.events().is_empty());
}

#[tokio::test]
async fn test_inactive_account_rejected() {
    let harness = TestHarness::new();
    let (a, _) = harness.two_accounts().await;
    let closed = harness.open("Carla Dias", TAX_C, "0").await;
    harness
        .accounts
        .deactivate_account(closed.id(), &ctx())
        .await
        .unwrap();

    let err = harness
        .coordinator
        .process(request(a, closed.id(), "1.00", "inactive-0001"), &ctx())
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InactiveAccount(id) if id == closed.id()));
    assert_eq!(err.http_status(), 400);
    assert_eq!(harness.store.transfer_count().await, 0);
    assert_eq!(harness.balance(a).await, money("100.00"));
}

#[tokio::test]
async fn test_same_account_rejected() {
    let harness = TestHarness::new();
    let (a, _) = harness.two_accounts().await;

    let err = harness
        .coordinator
        .process(request(a, a, "1.00", "same-account-1"), &ctx())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert!(harness.idempotency.is_empty());
}

// ============================================================================
// Idempotency Tests
// ============================================================================

#[tokio::test]
async fn test_replay_returns_same_transfer() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;
    let req = request(a, b, "25.00", "replay-key-0001");

    let first = harness.coordinator.process(req.clone(), &ctx()).await.unwrap();
    harness.events.clear();
    let second = harness.coordinator.process(req, &ctx()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(harness.balance(a).await, money("75.00"));
    assert!(harness.events.events().is_empty());
}

#[tokio::test]
async fn test_replay_of_failed_transfer() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;
    let req = request(a, b, "500.00", "replay-failed-01");

    let err = harness
        .coordinator
        .process(req.clone(), &ctx())
        .await
        .unwrap_err();
    let LedgerError::TransferFailed { transfer_id, .. } = err else {
        panic!("expected TransferFailed");
    };

    let replayed = harness.coordinator.process(req, &ctx()).await.unwrap();
    assert_eq!(replayed.id(), transfer_id);
    assert_eq!(replayed.status(), TransferStatus::Failed);
}

/// Key claimed and PENDING stored by another caller that has not finished
#[tokio::test]
async fn test_same_key_returns_unfinished_transfer() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;
    let key = IdempotencyKey::new("unfinished-key-1").unwrap();

    let (pending, _) = Transfer::request(
        TransferId::new(),
        a,
        b,
        Amount::parse("10.00").unwrap(),
        key.clone(),
        "",
    )
    .unwrap();
    let pending = TransferRepository::save(harness.store.as_ref(), &pending)
        .await
        .unwrap();
    harness
        .idempotency
        .try_claim(
            &key,
            IdempotencyOutcome::InFlight {
                transfer_id: pending.id(),
            },
            DEFAULT_IDEMPOTENCY_TTL,
        )
        .await
        .unwrap();

    let returned = harness
        .coordinator
        .process(request(a, b, "10.00", "unfinished-key-1"), &ctx())
        .await
        .unwrap();

    assert_eq!(returned.id(), pending.id());
    assert_eq!(returned.status(), TransferStatus::Pending);
    assert!(!returned.status().is_terminal());
    assert_eq!(harness.balance(a).await, money("100.00"));
    assert!(harness.events.events().is_empty());
}

/// Same key submitted concurrently: exactly one COMPLETED transfer
#[tokio::test]
async fn test_concurrent_same_key_single_execution() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;
    let req = request(a, b, "10.00", "concurrent-key-01");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = harness.coordinator.clone();
        let req = req.clone();
        handles.push(tokio::spawn(async move {
            coordinator.process(req, &ctx()).await
        }));
    }

    let mut observed = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(transfer) => observed.push(transfer.id()),
            Err(LedgerError::RequestInFlight { transfer_id, .. }) => observed.push(transfer_id),
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    observed.dedup();
    assert_eq!(observed.len(), 1);
    assert_eq!(
        harness
            .store
            .transfers_with_status(TransferStatus::Completed)
            .await
            .len(),
        1
    );
    assert_eq!(harness.store.transfer_count().await, 1);
    assert_eq!(harness.balance(a).await, money("90.00"));
    assert_eq!(harness.balance(b).await, money("10.00"));
}

// ============================================================================
// Infrastructure Failure Tests
// ============================================================================

#[tokio::test]
async fn test_commit_failure_marks_failed_and_keeps_balances() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;
    harness.store.set_fail_commits(true);

    let req = request(a, b, "40.00", "commit-fault-01");
    let err = harness
        .coordinator
        .process(req.clone(), &ctx())
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), LedgerError::Storage(_)));
    assert!(err.is_retriable());
    assert_eq!(harness.balance(a).await, money("100.00"));
    assert_eq!(harness.balance(b).await, money("0.00"));

    let failed = harness
        .store
        .transfers_with_status(TransferStatus::Failed)
        .await;
    assert_eq!(failed.len(), 1);
    assert!(failed[0].failure_reason().is_some());
    assert_eq!(
        harness.events.event_types(),
        vec!["TRANSFER_REQUESTED", "TRANSFER_FAILED"]
    );

    // same key converges to the recorded outcome
    harness.store.set_fail_commits(false);
    let replayed = harness.coordinator.process(req, &ctx()).await.unwrap();
    assert_eq!(replayed.status(), TransferStatus::Failed);
    assert_eq!(harness.balance(a).await, money("100.00"));
}

#[tokio::test]
async fn test_failure_record_write_error_still_reports_failure() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;
    harness.store.set_fail_commits(true);
    harness
        .store
        .fail_transfer_saves_with_status(TransferStatus::Failed);

    let err = harness
        .coordinator
        .process(request(a, b, "40.00", "double-fault-01"), &ctx())
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::TransferFailed { .. }));
    assert!(harness.events.events().is_empty());
    assert_eq!(
        harness
            .store
            .transfers_with_status(TransferStatus::Pending)
            .await
            .len(),
        1
    );
    assert_eq!(harness.balance(a).await, money("100.00"));
}

#[tokio::test]
async fn test_pending_save_failure_bubbles_up() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;
    harness.store.set_fail_transfer_saves(true);

    let err = harness
        .coordinator
        .process(request(a, b, "40.00", "pending-fault-1"), &ctx())
        .await
        .unwrap_err();

    // before PROCESSING: not wrapped, no transfer, claim released
    assert!(matches!(err, LedgerError::Storage(_)));
    assert_eq!(harness.store.transfer_count().await, 0);
    assert!(harness.idempotency.is_empty());
}

#[tokio::test]
async fn test_event_sink_failure_does_not_fail_transfer() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;
    harness.events.set_fail_publish(true);

    let transfer = harness
        .coordinator
        .process(request(a, b, "5.00", "sink-down-0001"), &ctx())
        .await
        .unwrap();

    assert_eq!(transfer.status(), TransferStatus::Completed);
    assert_eq!(harness.balance(b).await, money("5.00"));
}

#[tokio::test]
async fn test_slow_store_times_out() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;
    harness.store.set_latency(Duration::from_millis(200));

    let short = RequestContext::with_timeout(Duration::from_millis(20));
    let err = harness
        .coordinator
        .process(request(a, b, "5.00", "timeout-key-01"), &short)
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::Timeout(_)));
    assert!(err.is_retriable());

    harness.store.set_latency(Duration::ZERO);
    assert_eq!(harness.balance(a).await, money("100.00"));
}

/// Unit of work that stalls before delegating the commit
struct StalledCommit {
    inner: Arc<InMemoryLedgerStore>,
    delay: Duration,
}

#[async_trait]
impl UnitOfWork for StalledCommit {
    async fn commit(&self, batch: WriteBatch) -> Result<WriteBatch, LedgerError> {
        tokio::time::sleep(self.delay).await;
        self.inner.commit(batch).await
    }
}

#[tokio::test]
async fn test_commit_timeout_records_failed_transfer() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;

    let stalled = Arc::new(StalledCommit {
        inner: harness.store.clone(),
        delay: Duration::from_millis(300),
    });
    let coordinator = TransferCoordinator::new(
        harness.store.clone(),
        harness.store.clone(),
        stalled,
        harness.events.clone(),
        IdempotencyGuard::new(harness.idempotency.clone(), DEFAULT_IDEMPOTENCY_TTL),
    )
    .with_failure_write_timeout(Duration::from_secs(1));

    let short = RequestContext::with_timeout(Duration::from_millis(100));
    let err = coordinator
        .process(request(a, b, "40.00", "stalled-commit-1"), &short)
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::TransferFailed { .. }));
    assert!(matches!(err.root_cause(), LedgerError::Timeout(_)));
    assert!(err.is_retriable());

    let failed = harness
        .store
        .transfers_with_status(TransferStatus::Failed)
        .await;
    assert_eq!(failed.len(), 1);
    assert_eq!(
        harness.events.event_types(),
        vec!["TRANSFER_REQUESTED", "TRANSFER_FAILED"]
    );

    // let the abandoned commit future settle, nothing was applied
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.balance(a).await, money("100.00"));
    assert_eq!(harness.balance(b).await, money("0.00"));
}

// ============================================================================
// Concurrency Tests
// ============================================================================

/// Distinct transfers racing on one account never lose or create money
#[tokio::test]
async fn test_concurrent_transfers_conserve_money() {
    let harness = TestHarness::new();
    let (a, b) = harness.two_accounts().await;

    let mut handles = Vec::new();
    for i in 0..12 {
        let coordinator = harness.coordinator.clone();
        let req = request(a, b, "10.00", &format!("race-key-{i:04}"));
        handles.push(tokio::spawn(async move {
            coordinator.process(req, &ctx()).await
        }));
    }

    let mut completed = 0u32;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(transfer) => {
                assert_eq!(transfer.status(), TransferStatus::Completed);
                completed += 1;
            }
            Err(e) => assert!(matches!(
                e.root_cause(),
                LedgerError::VersionConflict { .. } | LedgerError::InsufficientFunds { .. }
            )),
        }
    }

    let a_balance = harness.balance(a).await.value();
    let b_balance = harness.balance(b).await.value();
    assert_eq!(a_balance + b_balance, Decimal::new(10000, 2));
    assert_eq!(b_balance, Decimal::from(completed * 10));
    assert!(a_balance >= Decimal::ZERO);

    let stored = harness
        .store
        .find_by_idempotency_key(&IdempotencyKey::new("race-key-0000").unwrap())
        .await
        .unwrap();
    assert!(stored.is_some());
}
