//! Validated value types for account fields
//!
//! Account number, holder name and holder tax id. All fields are private to
//! force validation through the public constructors; no instance of these
//! types can hold an invalid value.

use std::fmt;
use std::hash::{Hash, Hasher};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Digits in an account number (7 body digits + 1 check digit)
pub const ACCOUNT_NUMBER_LENGTH: usize = 8;

/// Digits in a tax id (9 body digits + 2 check digits)
pub const TAX_ID_LENGTH: usize = 11;

pub const HOLDER_NAME_MIN: usize = 2;
pub const HOLDER_NAME_MAX: usize = 100;

fn digits_of(value: &str) -> Vec<u32> {
    value.chars().filter_map(|c| c.to_digit(10)).collect()
}

// ============================================================================
// Check Digit Algorithms
// ============================================================================

/// Mod-11 check digit over an account number body
///
/// Weights cycle 2..=9 starting from the rightmost body digit.
/// `remainder < 2` maps to 0, otherwise `11 - remainder`.
pub fn account_number_check_digit(body: &[u32]) -> u32 {
    let sum: u32 = body
        .iter()
        .rev()
        .zip((2..=9).cycle())
        .map(|(digit, weight)| digit * weight)
        .sum();

    let remainder = sum % 11;
    if remainder < 2 { 0 } else { 11 - remainder }
}

fn tax_id_digit(digits: &[u32], first_weight: u32) -> u32 {
    let sum: u32 = digits
        .iter()
        .zip((2..=first_weight).rev())
        .map(|(digit, weight)| digit * weight)
        .sum();

    let digit = 11 - (sum % 11);
    if digit >= 10 { 0 } else { digit }
}

/// Both mod-11 check digits of a tax id from its first nine digits
///
/// First pass weights 10..=2 over the nine body digits, second pass weights
/// 11..=2 over the body plus the first check digit. Results of 10 or 11 clamp to 0.
pub fn tax_id_check_digits(body: &[u32; 9]) -> (u32, u32) {
    let first = tax_id_digit(body, 10);

    let mut extended = body.to_vec();
    extended.push(first);
    let second = tax_id_digit(&extended, 11);

    (first, second)
}

// ============================================================================
// AccountNumber
// ============================================================================

/// Validated 8-digit account number with trailing mod-11 check digit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Parse and validate an account number
    ///
    /// # Validation Rules
    /// - Exactly 8 ASCII digits
    /// - Last digit equals the mod-11 check digit of the first seven
    ///
    /// # Examples
    /// ```
    /// use ledger_engine::account::AccountNumber;
    ///
    /// let number = AccountNumber::parse("12345679").unwrap();
    /// assert_eq!(number.formatted(), "1234567-9");
    ///
    /// assert!(AccountNumber::parse("12345670").is_err()); // wrong check digit
    /// ```
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "account_number",
            });
        }

        if value.len() != ACCOUNT_NUMBER_LENGTH {
            return Err(ValidationError::InvalidLength {
                field: "account_number",
                min: ACCOUNT_NUMBER_LENGTH,
                max: ACCOUNT_NUMBER_LENGTH,
                actual: value.chars().count(),
            });
        }

        if !value.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidFormat {
                field: "account_number",
                value: value.to_string(),
                expected: "digits only",
            });
        }

        let digits = digits_of(value);
        let (body, check) = digits.split_at(ACCOUNT_NUMBER_LENGTH - 1);
        if account_number_check_digit(body) != check[0] {
            return Err(ValidationError::InvalidCheckDigit {
                field: "account_number",
                value: value.to_string(),
            });
        }

        Ok(Self(value.to_string()))
    }

    /// Generate a random valid account number
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let body: Vec<u32> = (0..ACCOUNT_NUMBER_LENGTH - 1)
            .map(|_| rng.gen_range(0..10))
            .collect();
        let check = account_number_check_digit(&body);

        let value = body
            .iter()
            .chain(std::iter::once(&check))
            .map(|d| char::from_digit(*d, 10).unwrap_or('0'))
            .collect();

        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `xxxxxxx-x`
    pub fn formatted(&self) -> String {
        let (body, check) = self.0.split_at(ACCOUNT_NUMBER_LENGTH - 1);
        format!("{}-{}", body, check)
    }
}

impl TryFrom<String> for AccountNumber {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountNumber> for String {
    fn from(number: AccountNumber) -> Self {
        number.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

impl AsRef<str> for AccountNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// HolderName
// ============================================================================

/// Validated account holder name
///
/// Equality is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HolderName(String);

impl HolderName {
    /// Create a validated holder name
    ///
    /// # Validation Rules
    /// - Trimmed length 2-100 characters
    /// - Letters (accented letters included) and spaces only
    /// - At least two words
    pub fn new(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "holder_name",
            });
        }

        let length = value.chars().count();
        if !(HOLDER_NAME_MIN..=HOLDER_NAME_MAX).contains(&length) {
            return Err(ValidationError::InvalidLength {
                field: "holder_name",
                min: HOLDER_NAME_MIN,
                max: HOLDER_NAME_MAX,
                actual: length,
            });
        }

        if !value.chars().all(|c| c.is_alphabetic() || c == ' ') {
            return Err(ValidationError::InvalidFormat {
                field: "holder_name",
                value: value.to_string(),
                expected: "letters and spaces only",
            });
        }

        if value.split_whitespace().count() < 2 {
            return Err(ValidationError::MissingLastName);
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Title-cased words separated by single spaces
    pub fn formatted(&self) -> String {
        self.0
            .split_whitespace()
            .map(|word| {
                let lower = word.to_lowercase();
                let mut chars = lower.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl PartialEq for HolderName {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_lowercase() == other.0.to_lowercase()
    }
}

impl Eq for HolderName {}

impl Hash for HolderName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_lowercase().hash(state);
    }
}

impl TryFrom<String> for HolderName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<HolderName> for String {
    fn from(name: HolderName) -> Self {
        name.0
    }
}

impl fmt::Display for HolderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

// ============================================================================
// TaxId
// ============================================================================

/// Validated 11-digit national tax id with two mod-11 check digits
///
/// Stored as bare digits; the formatted form `xxx.xxx.xxx-xx` is accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxId(String);

impl TaxId {
    /// Parse and validate a tax id
    ///
    /// # Examples
    /// ```
    /// use ledger_engine::account::TaxId;
    ///
    /// let tax_id = TaxId::parse("529.982.247-25").unwrap();
    /// assert_eq!(tax_id.as_str(), "52998224725");
    ///
    /// assert!(TaxId::parse("11111111111").is_err()); // repeated digits
    /// ```
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();

        if value.is_empty() {
            return Err(ValidationError::Required { field: "tax_id" });
        }

        let cleaned: String = value
            .chars()
            .filter(|c| !matches!(c, '.' | '-' | ' '))
            .collect();

        if cleaned.len() != TAX_ID_LENGTH || !cleaned.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidFormat {
                field: "tax_id",
                value: value.to_string(),
                expected: "11 digits",
            });
        }

        let digits = digits_of(&cleaned);
        if digits.iter().all(|d| *d == digits[0]) {
            return Err(ValidationError::RepeatedDigits(cleaned));
        }

        let mut body = [0u32; 9];
        body.copy_from_slice(&digits[..9]);
        let (first, second) = tax_id_check_digits(&body);
        if digits[9] != first || digits[10] != second {
            return Err(ValidationError::InvalidCheckDigit {
                field: "tax_id",
                value: cleaned,
            });
        }

        Ok(Self(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `xxx.xxx.xxx-xx`
    pub fn formatted(&self) -> String {
        format!(
            "{}.{}.{}-{}",
            &self.0[0..3],
            &self.0[3..6],
            &self.0[6..9],
            &self.0[9..11]
        )
    }
}

impl TryFrom<String> for TaxId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaxId> for String {
    fn from(tax_id: TaxId) -> Self {
        tax_id.0
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

// ============================================================================
// Tests
// ============================================================================
