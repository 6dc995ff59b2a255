//! Account management module
//!
//! Validated value types, the Account aggregate and the account service
//! that opens accounts and answers balance queries.

pub mod models;
pub mod service;
pub mod validation;

// Re-export commonly used types
pub use models::{Account, AccountBalance, AccountId};
pub use service::{AccountService, CreateAccountRequest};
pub use validation::{AccountNumber, HolderName, TaxId};
