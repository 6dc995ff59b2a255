//! Domain Events
//!
//! Closed set of facts emitted by the Account and Transfer aggregates.
//! Aggregates return events as values from their mutators; the coordinator
//! hands them to an [`EventSink`] only after the triggering state change has
//! been persisted.
//!
//! Delivery is at-least-once. Consumers must tolerate duplicates.

pub mod channel;
pub mod sinks;

pub use channel::{ChannelEventSink, EventReceiver, event_channel};
pub use sinks::{RecordingEventSink, TracingEventSink};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{AccountId, AccountNumber, HolderName, TaxId};
use crate::error::LedgerError;
use crate::money::{Amount, Balance};
use crate::transfer::{IdempotencyKey, TransferId};

/// Every event the ledger can emit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    AccountCreated {
        account_id: AccountId,
        account_number: AccountNumber,
        holder_name: HolderName,
        tax_id: TaxId,
        balance: Balance,
        occurred_at: DateTime<Utc>,
    },
    AccountDebited {
        account_id: AccountId,
        amount: Balance,
        new_balance: Balance,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    AccountCredited {
        account_id: AccountId,
        amount: Balance,
        new_balance: Balance,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    TransferRequested {
        transfer_id: TransferId,
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Amount,
        idempotency_key: IdempotencyKey,
        description: String,
        occurred_at: DateTime<Utc>,
    },
    TransferCompleted {
        transfer_id: TransferId,
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Amount,
        occurred_at: DateTime<Utc>,
    },
    TransferFailed {
        transfer_id: TransferId,
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Amount,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Stable event name (matches the serde tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::AccountCreated { .. } => "ACCOUNT_CREATED",
            DomainEvent::AccountDebited { .. } => "ACCOUNT_DEBITED",
            DomainEvent::AccountCredited { .. } => "ACCOUNT_CREDITED",
            DomainEvent::TransferRequested { .. } => "TRANSFER_REQUESTED",
            DomainEvent::TransferCompleted { .. } => "TRANSFER_COMPLETED",
            DomainEvent::TransferFailed { .. } => "TRANSFER_FAILED",
        }
    }

    /// Id of the aggregate that emitted the event
    pub fn aggregate_id(&self) -> String {
        match self {
            DomainEvent::AccountCreated { account_id, .. }
            | DomainEvent::AccountDebited { account_id, .. }
            | DomainEvent::AccountCredited { account_id, .. } => account_id.to_string(),
            DomainEvent::TransferRequested { transfer_id, .. }
            | DomainEvent::TransferCompleted { transfer_id, .. }
            | DomainEvent::TransferFailed { transfer_id, .. } => transfer_id.to_string(),
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::AccountCreated { occurred_at, .. }
            | DomainEvent::AccountDebited { occurred_at, .. }
            | DomainEvent::AccountCredited { occurred_at, .. }
            | DomainEvent::TransferRequested { occurred_at, .. }
            | DomainEvent::TransferCompleted { occurred_at, .. }
            | DomainEvent::TransferFailed { occurred_at, .. } => *occurred_at,
        }
    }
}

/// Publish-only event port
///
/// Fire-and-forget from the ledger's perspective: the coordinator logs a
/// publish error and carries on, the state change is already durable.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Sink name for logging
    fn name(&self) -> &'static str;

    async fn publish(&self, event: DomainEvent) -> Result<(), LedgerError>;

    /// Publish in order, stopping at the first error
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<(), LedgerError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}
