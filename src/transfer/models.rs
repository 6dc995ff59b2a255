//! Transfer aggregate
//!
//! Immutable transfer facts plus the lifecycle status. Transitions are only
//! those allowed by [`TransferStatus::can_transition_to`]; an illegal one
//! fails with `IllegalState` and leaves the transfer untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::TransferStatus;
use super::types::{IdempotencyKey, TransferId};
use crate::account::AccountId;
use crate::error::LedgerError;
use crate::events::DomainEvent;
use crate::money::Amount;

/// Money movement between two accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    id: TransferId,
    source_account_id: AccountId,
    destination_account_id: AccountId,
    amount: Amount,
    idempotency_key: IdempotencyKey,
    description: String,
    status: TransferStatus,
    failure_reason: Option<String>,
    /// Optimistic concurrency version, bumped by the store on every write
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Transfer {
    /// Create a PENDING transfer
    ///
    /// # Errors
    /// `Validation` if source and destination are the same account.
    pub fn request(
        id: TransferId,
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Amount,
        idempotency_key: IdempotencyKey,
        description: impl Into<String>,
    ) -> Result<(Self, DomainEvent), LedgerError> {
        if source_account_id == destination_account_id {
            return Err(LedgerError::Validation(
                "source and destination accounts must differ".to_string(),
            ));
        }

        let now = Utc::now();
        let transfer = Self {
            id,
            source_account_id,
            destination_account_id,
            amount,
            idempotency_key,
            description: description.into().trim().to_string(),
            status: TransferStatus::Pending,
            failure_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let event = DomainEvent::TransferRequested {
            transfer_id: transfer.id,
            source_account_id,
            destination_account_id,
            amount,
            idempotency_key: transfer.idempotency_key.clone(),
            description: transfer.description.clone(),
            occurred_at: now,
        };

        Ok((transfer, event))
    }

    /// PENDING → PROCESSING
    pub fn mark_processing(&mut self) -> Result<(), LedgerError> {
        self.transition(TransferStatus::Processing)?;
        Ok(())
    }

    /// PROCESSING → COMPLETED
    pub fn mark_completed(&mut self) -> Result<DomainEvent, LedgerError> {
        let now = self.transition(TransferStatus::Completed)?;
        Ok(DomainEvent::TransferCompleted {
            transfer_id: self.id,
            source_account_id: self.source_account_id,
            destination_account_id: self.destination_account_id,
            amount: self.amount,
            occurred_at: now,
        })
    }

    /// PROCESSING → FAILED, recording `reason`
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<DomainEvent, LedgerError> {
        let reason = reason.into();
        let now = self.transition(TransferStatus::Failed)?;
        self.failure_reason = Some(reason.clone());
        Ok(DomainEvent::TransferFailed {
            transfer_id: self.id,
            source_account_id: self.source_account_id,
            destination_account_id: self.destination_account_id,
            amount: self.amount,
            reason,
            occurred_at: now,
        })
    }

    /// PENDING → CANCELLED
    pub fn cancel(&mut self) -> Result<(), LedgerError> {
        self.transition(TransferStatus::Cancelled)?;
        Ok(())
    }

    fn transition(&mut self, next: TransferStatus) -> Result<DateTime<Utc>, LedgerError> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::IllegalState(format!(
                "transfer {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        Ok(now)
    }

    // === Accessors ===

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn source_account_id(&self) -> AccountId {
        self.source_account_id
    }

    pub fn destination_account_id(&self) -> AccountId {
        self.destination_account_id
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Transfer {
        let (transfer, _) = Transfer::request(
            TransferId::new(),
            AccountId::new(),
            AccountId::new(),
            Amount::parse("40").unwrap(),
            IdempotencyKey::new("key-00000001").unwrap(),
            "  rent  ",
        )
        .unwrap();
        transfer
    }

    #[test]
    fn test_request_starts_pending() {
        let transfer = pending();
        assert_eq!(transfer.status(), TransferStatus::Pending);
        assert_eq!(transfer.description(), "rent");
        assert!(transfer.failure_reason().is_none());
    }

    #[test]
    fn test_request_rejects_same_account() {
        let account = AccountId::new();
        let err = Transfer::request(
            TransferId::new(),
            account,
            account,
            Amount::parse("1").unwrap(),
            IdempotencyKey::generate(),
            "",
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut transfer = pending();
        transfer.mark_processing().unwrap();
        assert_eq!(transfer.status(), TransferStatus::Processing);

        let event = transfer.mark_completed().unwrap();
        assert_eq!(transfer.status(), TransferStatus::Completed);
        assert_eq!(event.event_type(), "TRANSFER_COMPLETED");
    }

    #[test]
    fn test_complete_from_pending_is_illegal() {
        let mut transfer = pending();
        let err = transfer.mark_completed().unwrap_err();

        assert!(matches!(err, LedgerError::IllegalState(_)));
        assert_eq!(transfer.status(), TransferStatus::Pending);
    }

    #[test]
    fn test_mark_failed_records_reason() {
        let mut transfer = pending();
        transfer.mark_processing().unwrap();

        let event = transfer.mark_failed("Insufficient funds").unwrap();
        assert_eq!(transfer.status(), TransferStatus::Failed);
        assert_eq!(transfer.failure_reason(), Some("Insufficient funds"));
        assert!(matches!(
            event,
            DomainEvent::TransferFailed { ref reason, .. } if reason == "Insufficient funds"
        ));

        // terminal
        assert!(transfer.mark_processing().is_err());
        assert_eq!(transfer.status(), TransferStatus::Failed);
    }

    #[test]
    fn test_fail_from_pending_keeps_reason_empty() {
        let mut transfer = pending();
        assert!(transfer.mark_failed("nope").is_err());
        assert!(transfer.failure_reason().is_none());
    }

    #[test]
    fn test_cancel_only_from_pending() {
        let mut transfer = pending();
        transfer.cancel().unwrap();
        assert_eq!(transfer.status(), TransferStatus::Cancelled);

        let mut processing = pending();
        processing.mark_processing().unwrap();
        assert!(processing.cancel().is_err());
        assert_eq!(processing.status(), TransferStatus::Processing);
    }
}
