//! Account aggregate
//!
//! Owns the balance and the activation flag. Every mutator validates before
//! touching any field, so a failed call leaves the account unchanged, and
//! returns the domain event it produced instead of buffering it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{AccountNumber, HolderName, TaxId};
use crate::error::{LedgerError, ValidationError};
use crate::events::DomainEvent;
use crate::money::Balance;

// ============================================================================
// AccountId
// ============================================================================

/// Opaque account identifier (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AccountId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::InvalidIdentifier {
                field: "account_id",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// Account
// ============================================================================

/// Ledger account
///
/// Fields are private; state changes only through the methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    number: AccountNumber,
    holder_name: HolderName,
    tax_id: TaxId,
    balance: Balance,
    active: bool,
    /// Optimistic concurrency version, bumped by the store on every write
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Account {
    /// Open a new active account
    ///
    /// A missing initial balance defaults to zero; a negative one is refused.
    pub fn open(
        number: AccountNumber,
        holder_name: HolderName,
        tax_id: TaxId,
        initial_balance: Option<Balance>,
    ) -> Result<(Self, DomainEvent), LedgerError> {
        let balance = initial_balance.unwrap_or_default();
        if balance.is_negative() {
            return Err(ValidationError::NegativeInitialBalance(balance.value()).into());
        }

        let now = Utc::now();
        let account = Self {
            id: AccountId::new(),
            number,
            holder_name,
            tax_id,
            balance,
            active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let event = DomainEvent::AccountCreated {
            account_id: account.id,
            account_number: account.number.clone(),
            holder_name: account.holder_name.clone(),
            tax_id: account.tax_id.clone(),
            balance: account.balance,
            occurred_at: now,
        };

        Ok((account, event))
    }

    /// Withdraw `amount`
    ///
    /// # Errors
    /// Checked in order: `InvalidArgument` (amount not positive),
    /// `InactiveAccount`, `InsufficientFunds`.
    pub fn debit(
        &mut self,
        amount: Balance,
        reason: impl Into<String>,
    ) -> Result<DomainEvent, LedgerError> {
        Self::ensure_positive(amount)?;
        self.ensure_active()?;

        if !self.balance.has_sufficient_funds(amount) {
            return Err(LedgerError::InsufficientFunds {
                account_id: self.id,
                balance: self.balance,
                required: amount,
            });
        }

        let new_balance = self
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::IllegalState("balance underflow".to_string()))?;

        let now = Utc::now();
        self.balance = new_balance;
        self.updated_at = now;

        Ok(DomainEvent::AccountDebited {
            account_id: self.id,
            amount,
            new_balance,
            reason: reason.into(),
            occurred_at: now,
        })
    }

    /// Deposit `amount`
    ///
    /// # Errors
    /// `InvalidArgument` (amount not positive), then `InactiveAccount`.
    pub fn credit(
        &mut self,
        amount: Balance,
        reason: impl Into<String>,
    ) -> Result<DomainEvent, LedgerError> {
        Self::ensure_positive(amount)?;
        self.ensure_active()?;

        let new_balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::IllegalState("balance overflow".to_string()))?;

        let now = Utc::now();
        self.balance = new_balance;
        self.updated_at = now;

        Ok(DomainEvent::AccountCredited {
            account_id: self.id,
            amount,
            new_balance,
            reason: reason.into(),
            occurred_at: now,
        })
    }

    /// Close the account for debits and credits
    ///
    /// Refused while the balance is positive.
    pub fn deactivate(&mut self) -> Result<(), LedgerError> {
        if self.balance.is_positive() {
            return Err(LedgerError::IllegalState(format!(
                "cannot deactivate account {} with positive balance {}",
                self.id, self.balance
            )));
        }
        self.active = false;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn activate(&mut self) {
        self.active = true;
        self.updated_at = Utc::now();
    }

    fn ensure_positive(amount: Balance) -> Result<(), LedgerError> {
        if !amount.is_positive() {
            return Err(ValidationError::NotPositive {
                field: "amount",
                value: amount.value(),
            }
            .into());
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), LedgerError> {
        if !self.active {
            return Err(LedgerError::InactiveAccount(self.id));
        }
        Ok(())
    }

    // === Accessors ===

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn number(&self) -> &AccountNumber {
        &self.number
    }

    pub fn holder_name(&self) -> &HolderName {
        &self.holder_name
    }

    pub fn tax_id(&self) -> &TaxId {
        &self.tax_id
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn is_active(&self) -> bool {
        self.active
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

    /// Store-side version bump after a successful write
    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

/// Balance view returned by balance queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub account_number: AccountNumber,
    pub balance: Balance,
}
