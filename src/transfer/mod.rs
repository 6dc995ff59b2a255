//! Transfer engine
//!
//! Moves money between two accounts as one unit of work.
//!
//! # State Machine
//!
//! ```text
//! PENDING → PROCESSING → COMPLETED
//!    ↓           ↓
//! CANCELLED    FAILED
//! ```
//!
//! # Safety Invariants
//!
//! 1. **No partial apply**: debit, credit and the COMPLETED status are
//!    persisted together or not at all
//! 2. **At most once**: a request is accepted at most once per idempotency key
//! 3. **No negative balance**: a debit never takes a balance below zero

pub mod coordinator;
pub mod models;
pub mod state;
pub mod types;

#[cfg(test)]
mod integration_tests;

// Re-exports for convenience
pub use coordinator::TransferCoordinator;
pub use models::Transfer;
pub use state::TransferStatus;
pub use types::{IdempotencyKey, TransferId, TransferRequest};
