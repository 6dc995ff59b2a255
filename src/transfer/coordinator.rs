//! Transfer Coordinator
//!
//! Drives one transfer request from idempotency check to terminal status.
//!
//! # Flow
//!
//! ```text
//! replay? ──yes──> return stored transfer
//!    │no
//! validate shape ─> claim key ─> load accounts ─> save PENDING
//!                                                     │
//!                       PROCESSING: debit + credit + COMPLETED in memory
//!                                                     │
//!                      commit {source, destination, transfer} atomically
//!                         │ok                                  │err
//!              dispatch events, finalize              save FAILED, dispatch,
//!                   COMPLETED                          finalize FAILED
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Atomic apply**: both balance changes and the COMPLETED transfer are
//!    written in one unit of work; there is no compensating reversal.
//! 2. **Events after persistence**: nothing is published before the state
//!    change it describes is stored.
//! 3. **Claim before mutation**: the idempotency key is claimed atomically
//!    before any write; a losing claimant returns the winner's transfer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::models::Transfer;
use super::types::{IdempotencyKey, TransferId, TransferRequest};
use crate::account::{Account, AccountId};
use crate::context::{RequestContext, run_with_timeout};
use crate::error::{ErrorKind, LedgerError};
use crate::events::{DomainEvent, EventSink};
use crate::idempotency::{IdempotencyGuard, IdempotencyOutcome};
use crate::money::Balance;
use crate::store::{AccountRepository, TransferRepository, UnitOfWork, WriteBatch};

/// Default bound for recording a FAILED transfer
pub const DEFAULT_FAILURE_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Claim attempts when the record disappears between claim and lookup
const MAX_CLAIM_ATTEMPTS: u32 = 3;

/// What a losing claimant found
enum ClaimResolution {
    Existing(Transfer),
    InFlight(TransferId),
    Vanished,
}

/// Accounts and transfer ready for the PROCESSING phase
struct Prepared {
    source: Account,
    destination: Account,
    transfer: Transfer,
    requested: DomainEvent,
}

/// Transfer Coordinator - orchestrates one transfer as a unit of work
pub struct TransferCoordinator {
    accounts: Arc<dyn AccountRepository>,
    transfers: Arc<dyn TransferRepository>,
    unit_of_work: Arc<dyn UnitOfWork>,
    events: Arc<dyn EventSink>,
    guard: IdempotencyGuard,
    failure_write_timeout: Duration,
}

impl TransferCoordinator {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        transfers: Arc<dyn TransferRepository>,
        unit_of_work: Arc<dyn UnitOfWork>,
        events: Arc<dyn EventSink>,
        guard: IdempotencyGuard,
    ) -> Self {
        Self {
            accounts,
            transfers,
            unit_of_work,
            events,
            guard,
            failure_write_timeout: DEFAULT_FAILURE_WRITE_TIMEOUT,
        }
    }

    /// Wire all three storage ports to one store
    pub fn with_store<S>(store: Arc<S>, events: Arc<dyn EventSink>, guard: IdempotencyGuard) -> Self
    where
        S: AccountRepository + TransferRepository + UnitOfWork + 'static,
    {
        Self::new(store.clone(), store.clone(), store, events, guard)
    }

    pub fn with_failure_write_timeout(mut self, timeout: Duration) -> Self {
        self.failure_write_timeout = timeout;
        self
    }

    /// Execute a transfer request
    ///
    /// Returns the COMPLETED transfer, or the stored transfer unchanged when
    /// the idempotency key was already used. A stored transfer can be
    /// non-terminal: a caller that loses the claim after the winner saved
    /// PENDING gets that PENDING (or PROCESSING) transfer back, and should
    /// poll `get_transfer` for the outcome.
    ///
    /// # Errors
    /// - `Validation` / `InvalidArgument` / `InactiveAccount`: bad request, nothing stored
    /// - `NotFound`: an account is missing, nothing stored
    /// - `RequestInFlight`: another caller holds the key and has not stored its transfer yet
    /// - `TransferFailed`: the transfer was recorded as FAILED; `root_cause()` has the reason
    pub async fn process(
        &self,
        req: TransferRequest,
        ctx: &RequestContext,
    ) -> Result<Transfer, LedgerError> {
        let key = req
            .idempotency_key
            .clone()
            .unwrap_or_else(IdempotencyKey::generate);

        // 1. Idempotent replay
        if let Some(existing) = self.replay(&key, ctx).await? {
            debug!(
                idempotency_key = %key,
                transfer_id = %existing.id(),
                status = %existing.status(),
                "Idempotent replay"
            );
            return Ok(existing);
        }

        // 2. Request shape
        if req.source_account_id == req.destination_account_id {
            return Err(LedgerError::Validation(
                "source and destination accounts must differ".to_string(),
            ));
        }

        // 3. Claim the key
        let transfer_id = TransferId::new();
        let mut attempts = 0;
        loop {
            attempts += 1;
            if ctx.run(self.guard.try_claim(&key, transfer_id)).await? {
                break;
            }
            match self.resolve_lost_claim(&key, ctx).await? {
                ClaimResolution::Existing(existing) => {
                    debug!(
                        idempotency_key = %key,
                        transfer_id = %existing.id(),
                        "Concurrent request already stored transfer"
                    );
                    return Ok(existing);
                }
                ClaimResolution::InFlight(in_flight) => {
                    return Err(LedgerError::RequestInFlight {
                        key: key.to_string(),
                        transfer_id: in_flight,
                    });
                }
                ClaimResolution::Vanished if attempts < MAX_CLAIM_ATTEMPTS => continue,
                ClaimResolution::Vanished => {
                    return Err(LedgerError::Storage(format!(
                        "idempotency claim for {key} could not be settled"
                    )));
                }
            }
        }

        // 4. Load, validate and persist PENDING; nothing exists yet if this fails
        let prepared = match self.prepare(&req, &key, transfer_id, ctx).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.release(&key).await;
                debug!(idempotency_key = %key, code = e.code(), "Transfer rejected: {}", e);
                return Err(e);
            }
        };

        // 5-7. Everything from PROCESSING on either completes or records FAILED
        let Prepared {
            source,
            destination,
            mut transfer,
            requested,
        } = prepared;

        if let Err(e) = transfer.mark_processing() {
            self.release(&key).await;
            return Err(e);
        }
        let processing = transfer.clone();

        match self.apply(transfer, source, destination, ctx).await {
            Ok((completed, mut events)) => {
                events.insert(0, requested);
                self.dispatch(events, ctx).await;
                self.finalize(
                    &key,
                    IdempotencyOutcome::Completed {
                        transfer_id: completed.id(),
                    },
                    ctx.remaining(),
                )
                .await;
                info!(
                    transfer_id = %completed.id(),
                    idempotency_key = %key,
                    source = %completed.source_account_id(),
                    destination = %completed.destination_account_id(),
                    amount = %completed.amount(),
                    correlation_id = ctx.correlation_id(),
                    "Transfer completed"
                );
                Ok(completed)
            }
            Err(cause) => Err(self.record_failure(processing, requested, &key, cause).await),
        }
    }

    /// Look up a transfer by id
    pub async fn get_transfer(
        &self,
        id: TransferId,
        ctx: &RequestContext,
    ) -> Result<Transfer, LedgerError> {
        ctx.run(self.transfers.find_by_id(id))
            .await?
            .ok_or_else(|| LedgerError::transfer_not_found(id))
    }

    /// Look up the transfer created for an idempotency key
    pub async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
        ctx: &RequestContext,
    ) -> Result<Option<Transfer>, LedgerError> {
        ctx.run(self.transfers.find_by_idempotency_key(key)).await
    }

    // ========================================================================
    // Steps
    // ========================================================================

    async fn replay(
        &self,
        key: &IdempotencyKey,
        ctx: &RequestContext,
    ) -> Result<Option<Transfer>, LedgerError> {
        if let Some(existing) = ctx.run(self.transfers.find_by_idempotency_key(key)).await? {
            return Ok(Some(existing));
        }

        match ctx.run(self.guard.lookup(key)).await? {
            Some(outcome) => ctx.run(self.transfers.find_by_id(outcome.transfer_id())).await,
            None => Ok(None),
        }
    }

    async fn resolve_lost_claim(
        &self,
        key: &IdempotencyKey,
        ctx: &RequestContext,
    ) -> Result<ClaimResolution, LedgerError> {
        let Some(outcome) = ctx.run(self.guard.current(key)).await? else {
            return Ok(ClaimResolution::Vanished);
        };

        match ctx.run(self.transfers.find_by_id(outcome.transfer_id())).await? {
            Some(existing) => Ok(ClaimResolution::Existing(existing)),
            None => Ok(ClaimResolution::InFlight(outcome.transfer_id())),
        }
    }

    async fn prepare(
        &self,
        req: &TransferRequest,
        key: &IdempotencyKey,
        transfer_id: TransferId,
        ctx: &RequestContext,
    ) -> Result<Prepared, LedgerError> {
        let source = self.load_active_account(req.source_account_id, ctx).await?;
        let destination = self
            .load_active_account(req.destination_account_id, ctx)
            .await?;

        let (transfer, requested) = Transfer::request(
            transfer_id,
            source.id(),
            destination.id(),
            req.amount,
            key.clone(),
            req.description.clone(),
        )?;

        let transfer = ctx.run(self.transfers.save(&transfer)).await?;
        debug!(transfer_id = %transfer.id(), idempotency_key = %key, "Transfer pending");

        Ok(Prepared {
            source,
            destination,
            transfer,
            requested,
        })
    }

    async fn load_active_account(
        &self,
        id: AccountId,
        ctx: &RequestContext,
    ) -> Result<Account, LedgerError> {
        let account = ctx
            .run(self.accounts.find_by_id(id))
            .await?
            .ok_or_else(|| LedgerError::account_not_found(&id))?;

        if !account.is_active() {
            return Err(LedgerError::InactiveAccount(id));
        }
        Ok(account)
    }

    /// Debit, credit and complete in memory, then commit all three together
    async fn apply(
        &self,
        mut transfer: Transfer,
        mut source: Account,
        mut destination: Account,
        ctx: &RequestContext,
    ) -> Result<(Transfer, Vec<DomainEvent>), LedgerError> {
        let amount = Balance::from(transfer.amount());

        let debited = source.debit(
            amount,
            format!("transfer {} to {}", transfer.id(), destination.number()),
        )?;
        let credited = destination.credit(
            amount,
            format!("transfer {} from {}", transfer.id(), source.number()),
        )?;
        let completed = transfer.mark_completed()?;

        let batch = WriteBatch::new()
            .account(source)
            .account(destination)
            .transfer(transfer);
        let committed = ctx.run(self.unit_of_work.commit(batch)).await?;

        let transfer = committed.transfer.ok_or_else(|| {
            LedgerError::IllegalState("commit returned no transfer".to_string())
        })?;

        Ok((transfer, vec![debited, credited, completed]))
    }

    /// Record FAILED under a fresh deadline and wrap the cause
    async fn record_failure(
        &self,
        processing: Transfer,
        requested: DomainEvent,
        key: &IdempotencyKey,
        cause: LedgerError,
    ) -> LedgerError {
        let transfer_id = processing.id();
        let reason = cause.to_string();

        if cause.kind() == ErrorKind::Infrastructure {
            error!(
                transfer_id = %transfer_id,
                idempotency_key = %key,
                code = cause.code(),
                "Transfer aborted: {}", cause
            );
        } else {
            warn!(
                transfer_id = %transfer_id,
                idempotency_key = %key,
                code = cause.code(),
                "Transfer rejected: {}", cause
            );
        }

        let mut failed = processing;
        match failed.mark_failed(reason.clone()) {
            Ok(failed_event) => {
                match run_with_timeout(self.failure_write_timeout, self.transfers.save(&failed))
                    .await
                {
                    Ok(_) => {
                        let bound = RequestContext::with_timeout(self.failure_write_timeout);
                        self.dispatch(vec![requested, failed_event], &bound).await;
                        self.finalize(
                            key,
                            IdempotencyOutcome::Failed { transfer_id },
                            self.failure_write_timeout,
                        )
                        .await;
                    }
                    Err(save_err) => {
                        error!(
                            transfer_id = %transfer_id,
                            idempotency_key = %key,
                            code = save_err.code(),
                            "Failed to record FAILED transfer: {}", save_err
                        );
                    }
                }
            }
            Err(e) => {
                error!(transfer_id = %transfer_id, "Cannot mark transfer failed: {}", e);
            }
        }

        LedgerError::TransferFailed {
            transfer_id,
            reason,
            cause: Box::new(cause),
        }
    }

    // ========================================================================
    // Best-effort side effects
    // ========================================================================

    /// Publish events in order; the state change is already stored
    async fn dispatch(&self, events: Vec<DomainEvent>, ctx: &RequestContext) {
        let count = events.len();
        if let Err(e) = ctx.run(self.events.publish_all(events)).await {
            error!(
                sink = self.events.name(),
                events = count,
                code = e.code(),
                "Event dispatch failed: {}", e
            );
        }
    }

    async fn finalize(&self, key: &IdempotencyKey, outcome: IdempotencyOutcome, bound: Duration) {
        if let Err(e) = run_with_timeout(bound, self.guard.finalize(key, outcome)).await {
            warn!(
                idempotency_key = %key,
                transfer_id = %outcome.transfer_id(),
                code = e.code(),
                "Failed to finalize idempotency record: {}", e
            );
        }
    }

    async fn release(&self, key: &IdempotencyKey) {
        if let Err(e) = run_with_timeout(self.failure_write_timeout, self.guard.release(key)).await {
            warn!(idempotency_key = %key, code = e.code(), "Failed to release idempotency claim: {}", e);
        }
    }
}
