//! Transfer identifiers and request types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::error::ValidationError;
use crate::money::Amount;

pub const IDEMPOTENCY_KEY_MIN: usize = 8;
pub const IDEMPOTENCY_KEY_MAX: usize = 255;

// ============================================================================
// TransferId
// ============================================================================

/// Transfer identifier (ULID, time-ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransferId(ulid::Ulid);

impl TransferId {
    /// Generate a new unique TransferId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::InvalidIdentifier {
                field: "transfer_id",
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for TransferId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TransferId> for String {
    fn from(id: TransferId) -> Self {
        id.to_string()
    }
}

// ============================================================================
// IdempotencyKey
// ============================================================================

/// Caller-supplied deduplication token
///
/// 8-255 characters drawn from `[A-Za-z0-9_-]`. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "idempotency_key",
            });
        }

        let length = value.chars().count();
        if !(IDEMPOTENCY_KEY_MIN..=IDEMPOTENCY_KEY_MAX).contains(&length) {
            return Err(ValidationError::InvalidLength {
                field: "idempotency_key",
                min: IDEMPOTENCY_KEY_MIN,
                max: IDEMPOTENCY_KEY_MAX,
                actual: length,
            });
        }

        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "idempotency_key",
                value: value.to_string(),
                expected: "letters, digits, '-' and '_'",
            });
        }

        Ok(Self(value.to_string()))
    }

    /// Fresh random key (UUID v4) for callers that did not send one
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// TransferRequest
// ============================================================================

/// Request accepted by the coordinator
///
/// A missing idempotency key is generated by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    pub amount: Amount,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
}

impl TransferRequest {
    pub fn new(source: AccountId, destination: AccountId, amount: Amount) -> Self {
        Self {
            source_account_id: source,
            destination_account_id: destination,
            amount,
            description: String::new(),
            idempotency_key: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}
