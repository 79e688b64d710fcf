//! Token amount type
//!
//! Domain primitive for ledger amounts. Token amounts are integers scaled
//! by the token's decimals (often 10^18), so they routinely exceed the
//! 64-bit range and must never pass through a floating type.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest power of ten an amount may carry. Far above any real supply,
/// low enough that rescaling stays cheap.
pub const MAX_EXPONENT: i64 = 128;

/// TokenAmount represents an exact, non-negative integer amount.
///
/// # Invariants
/// - Value is never negative
/// - Value has no fractional part (stored with scale 0)
///
/// # Example
/// ```
/// use blockchain_ledger::domain::TokenAmount;
///
/// let amount = TokenAmount::scaled(50, 18).unwrap();
/// assert_eq!(amount.to_string(), "50000000000000000000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenAmount(BigDecimal);

/// Errors that can occur when creating a TokenAmount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must not be negative (got {0})")]
    Negative(String),

    #[error("Amount must be an integer (got {0})")]
    Fractional(String),

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl TokenAmount {
    /// Create a new TokenAmount with validation.
    ///
    /// # Errors
    /// - `AmountError::Negative` if value < 0
    /// - `AmountError::Fractional` if value has a fractional part
    pub fn new(value: BigDecimal) -> Result<Self, AmountError> {
        let (_, scale) = value.as_bigint_and_exponent();
        if scale.abs() > MAX_EXPONENT {
            return Err(AmountError::ParseError(format!(
                "exponent {} out of range",
                -scale
            )));
        }

        if value < BigDecimal::from(0i64) {
            return Err(AmountError::Negative(value.to_string()));
        }

        let integral = value.with_scale(0);
        if integral != value {
            return Err(AmountError::Fractional(value.to_string()));
        }

        Ok(Self(integral))
    }

    /// The zero amount.
    pub fn zero() -> Self {
        Self(BigDecimal::from(0u64))
    }

    /// Create an amount from a native unsigned integer.
    pub fn from_u64(value: u64) -> Self {
        Self(BigDecimal::from(value))
    }

    /// Create `units * 10^decimals`, e.g. `scaled(1000, 18)` for 1000 tokens.
    pub fn scaled(units: u64, decimals: u32) -> Result<Self, AmountError> {
        let raw = format!("{}e{}", units, decimals);
        let value =
            BigDecimal::from_str(&raw).map_err(|e| AmountError::ParseError(e.to_string()))?;
        Self::new(value)
    }

    /// Get the underlying arbitrary-precision value (always scale 0).
    pub fn value(&self) -> &BigDecimal {
        &self.0
    }

    /// Check whether this is the zero amount.
    pub fn is_zero(&self) -> bool {
        self.0 == BigDecimal::from(0u64)
    }
}

impl Default for TokenAmount {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = AmountError;

    /// Accepts plain decimal notation only (`-?digits[.digits]`).
    /// Exponent notation is rejected before any arithmetic happens.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !is_plain_decimal(s) {
            return Err(AmountError::ParseError(s.to_string()));
        }

        let value =
            BigDecimal::from_str(s).map_err(|e| AmountError::ParseError(e.to_string()))?;
        TokenAmount::new(value)
    }
}

fn is_plain_decimal(s: &str) -> bool {
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    let (integral, fraction) = match unsigned.split_once('.') {
        Some((integral, fraction)) => (integral, Some(fraction)),
        None => (unsigned, None),
    };

    !integral.is_empty()
        && integral.bytes().all(|b| b.is_ascii_digit())
        && fraction.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

impl TryFrom<String> for TokenAmount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TokenAmount::from_str(&value)
    }
}

impl TryFrom<BigDecimal> for TokenAmount {
    type Error = AmountError;

    fn try_from(value: BigDecimal) -> Result<Self, Self::Error> {
        TokenAmount::new(value)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        TokenAmount::from_u64(value)
    }
}

impl From<TokenAmount> for String {
    fn from(amount: TokenAmount) -> Self {
        amount.to_string()
    }
}

impl From<TokenAmount> for BigDecimal {
    fn from(amount: TokenAmount) -> Self {
        amount.0
    }
}
