//! Ledger Error Types
//!
//! Two layers:
//! - [`ValidationError`]: a value type refused its input (raised at construction)
//! - [`LedgerError`]: everything the aggregates, services and the coordinator
//!   can surface, grouped into the [`ErrorKind`] taxonomy.
//!
//! Every error carries a stable machine-readable `code()` for adapters.

use std::fmt;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::account::AccountId;
use crate::money::Balance;
use crate::transfer::TransferId;

// ============================================================================
// Validation Errors (value types)
// ============================================================================

/// Validation errors raised by value-type constructors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid check digit for {field}: '{value}'")]
    InvalidCheckDigit { field: &'static str, value: String },

    #[error("Tax id cannot be a sequence of identical digits: '{0}'")]
    RepeatedDigits(String),

    #[error("Holder name must contain at least first and last name")]
    MissingLastName,

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: Decimal },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: Decimal,
        max: Decimal,
        value: Decimal,
    },

    #[error("Initial balance cannot be negative, got {0}")]
    NegativeInitialBalance(Decimal),

    #[error("Invalid number for {field}: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid identifier for {field}: '{value}'")]
    InvalidIdentifier { field: &'static str, value: String },
}

impl ValidationError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Required { .. } => "REQUIRED",
            ValidationError::InvalidLength { .. } => "INVALID_LENGTH",
            ValidationError::InvalidFormat { .. } => "INVALID_FORMAT",
            ValidationError::InvalidCheckDigit { .. } => "INVALID_CHECK_DIGIT",
            ValidationError::RepeatedDigits(_) => "REPEATED_DIGITS",
            ValidationError::MissingLastName => "MISSING_LAST_NAME",
            ValidationError::NotPositive { .. } => "NOT_POSITIVE",
            ValidationError::OutOfRange { .. } => "OUT_OF_RANGE",
            ValidationError::NegativeInitialBalance(_) => "NEGATIVE_INITIAL_BALANCE",
            ValidationError::InvalidNumber { .. } => "INVALID_NUMBER",
            ValidationError::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
        }
    }
}

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Coarse error classification shared by every [`LedgerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or business-rule-violating input
    Validation,
    /// Referenced account/transfer absent
    NotFound,
    /// Business rejection, terminal for the transfer
    InsufficientFunds,
    /// Transition not permitted by the state machine (programming error)
    IllegalState,
    /// Duplicate unique key or concurrent claim
    Conflict,
    /// Storage/messaging failure
    Infrastructure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorKind::IllegalState => "ILLEGAL_STATE",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Infrastructure => "INFRASTRUCTURE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Ledger Errors
// ============================================================================

/// Ledger error types
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    // === Validation Errors ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Account {0} is not active")]
    InactiveAccount(AccountId),

    // === Business Rejections ===
    #[error("Insufficient funds in account {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Balance,
        required: Balance,
    },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    // === Lookup Errors ===
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // === Uniqueness Errors ===
    #[error("Account number already in use: {0}")]
    DuplicateAccountNumber(String),

    #[error("Tax id already has an associated account: {0}")]
    DuplicateTaxId(String),

    #[error("Idempotency key already bound to another transfer: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("Request with idempotency key {key} is in flight as transfer {transfer_id}")]
    RequestInFlight { key: String, transfer_id: TransferId },

    // === System Errors ===
    #[error("Version conflict on {entity} {id}: expected {expected}, found {found}")]
    VersionConflict {
        entity: &'static str,
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("Unable to generate unique {what} after {attempts} attempts")]
    GenerationExhausted { what: &'static str, attempts: u32 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    // === Orchestration ===
    #[error("Transfer {transfer_id} failed: {reason}")]
    TransferFailed {
        transfer_id: TransferId,
        reason: String,
        cause: Box<LedgerError>,
    },
}

impl LedgerError {
    /// Shorthand for a missing account
    pub fn account_not_found(id: &AccountId) -> Self {
        LedgerError::NotFound {
            entity: "Account",
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing transfer
    pub fn transfer_not_found(id: impl fmt::Display) -> Self {
        LedgerError::NotFound {
            entity: "Transfer",
            id: id.to_string(),
        }
    }

    /// Taxonomy bucket
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidArgument(_)
            | LedgerError::Validation(_)
            | LedgerError::InactiveAccount(_) => ErrorKind::Validation,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::IllegalState(_) => ErrorKind::IllegalState,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::DuplicateAccountNumber(_)
            | LedgerError::DuplicateTaxId(_)
            | LedgerError::DuplicateIdempotencyKey(_)
            | LedgerError::RequestInFlight { .. } => ErrorKind::Conflict,
            LedgerError::VersionConflict { .. }
            | LedgerError::GenerationExhausted { .. }
            | LedgerError::Storage(_)
            | LedgerError::Timeout(_) => ErrorKind::Infrastructure,
            LedgerError::TransferFailed { cause, .. } => cause.kind(),
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidArgument(e) => e.code(),
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::InactiveAccount(_) => "INACTIVE_ACCOUNT",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::IllegalState(_) => "ILLEGAL_STATE",
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::DuplicateAccountNumber(_) => "DUPLICATE_ACCOUNT_NUMBER",
            LedgerError::DuplicateTaxId(_) => "DUPLICATE_TAX_ID",
            LedgerError::DuplicateIdempotencyKey(_) => "DUPLICATE_IDEMPOTENCY_KEY",
            LedgerError::RequestInFlight { .. } => "REQUEST_IN_FLIGHT",
            LedgerError::VersionConflict { .. } => "VERSION_CONFLICT",
            LedgerError::GenerationExhausted { .. } => "GENERATION_EXHAUSTED",
            LedgerError::Storage(_) => "STORAGE_ERROR",
            LedgerError::Timeout(_) => "TIMEOUT",
            LedgerError::TransferFailed { .. } => "TRANSFER_FAILED",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::TransferFailed { cause, .. } => cause.http_status(),
            LedgerError::RequestInFlight { .. } => 409,
            LedgerError::Timeout(_) => 503,
            other => match other.kind() {
                ErrorKind::Validation => 400,
                ErrorKind::NotFound => 404,
                ErrorKind::InsufficientFunds => 422,
                ErrorKind::Conflict => 409,
                ErrorKind::IllegalState | ErrorKind::Infrastructure => 500,
            },
        }
    }

    /// Whether a caller may retry the same request
    ///
    /// Retrying with the same idempotency key is always safe.
    pub fn is_retriable(&self) -> bool {
        match self {
            LedgerError::TransferFailed { cause, .. } => cause.is_retriable(),
            LedgerError::RequestInFlight { .. }
            | LedgerError::VersionConflict { .. }
            | LedgerError::Storage(_)
            | LedgerError::Timeout(_) => true,
            _ => false,
        }
    }

    /// Innermost error behind any `TransferFailed` wrapping
    pub fn root_cause(&self) -> &LedgerError {
        match self {
            LedgerError::TransferFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}
