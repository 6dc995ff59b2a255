//! Transfer Status Definitions
//!
//! ```text
//! PENDING → PROCESSING → COMPLETED
//!    ↓           ↓
//! CANCELLED    FAILED
//! ```
//!
//! Status IDs are stable for storage as SMALLINT.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transfer lifecycle status
///
/// Terminal states: COMPLETED (30), FAILED (-10), CANCELLED (-20)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum TransferStatus {
    /// Initial state - request accepted and recorded
    Pending = 0,

    /// Balance changes are being applied
    Processing = 10,

    /// Terminal: both balances changed and persisted
    Completed = 30,

    /// Terminal: rejected or aborted after processing started
    Failed = -10,

    /// Terminal: withdrawn before processing
    Cancelled = -20,
}

impl TransferStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }

    /// Transition table
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (
                TransferStatus::Pending,
                TransferStatus::Processing | TransferStatus::Cancelled
            ) | (
                TransferStatus::Processing,
                TransferStatus::Completed | TransferStatus::Failed
            )
        )
    }

    /// Get the numeric status ID for storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from storage ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransferStatus::Pending),
            10 => Some(TransferStatus::Processing),
            30 => Some(TransferStatus::Completed),
            -10 => Some(TransferStatus::Failed),
            -20 => Some(TransferStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Processing => "PROCESSING",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Failed => "FAILED",
            TransferStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for TransferStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransferStatus::from_id(value).ok_or(())
    }
}
