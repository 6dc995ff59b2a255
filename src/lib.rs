//! Ledger Engine - accounts and atomic, idempotent transfers
//!
//! # Modules
//!
//! - [`money`] - Fixed-point balance and transfer amount
//! - [`account`] - Account value types, aggregate and service
//! - [`transfer`] - Transfer aggregate, state machine and coordinator
//! - [`idempotency`] - Idempotency guard and store
//! - [`store`] - Repository and unit-of-work ports, in-memory store
//! - [`events`] - Domain events and sinks
//! - [`context`] - Per-request deadline
//! - [`error`] - Error taxonomy
//! - [`config`] / [`logging`] - Ambient setup

pub mod account;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod idempotency;
pub mod logging;
pub mod money;
pub mod store;
pub mod transfer;

// Convenient re-exports at crate root
pub use account::{Account, AccountId, AccountService};
pub use context::RequestContext;
pub use error::{ErrorKind, LedgerError, ValidationError};
pub use events::{DomainEvent, EventSink};
pub use money::{Amount, Balance};
pub use transfer::{Transfer, TransferCoordinator, TransferRequest, TransferStatus};
