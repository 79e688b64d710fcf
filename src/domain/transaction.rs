//! Transaction entity
//!
//! The canonical record of one value transfer. Transactions are immutable
//! once built; there is no update path, corrections are new records.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::{DomainError, TokenAmount};

/// Wallet address marking an internally settled transfer
pub const OFFCHAIN: &str = "offchain";

/// Where a transaction settles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WalletAddress {
    /// Settled internally, stored as the literal `offchain`
    Offchain,
    /// A literal on-chain address
    Address(String),
}

impl WalletAddress {
    pub fn as_str(&self) -> &str {
        match self {
            WalletAddress::Offchain => OFFCHAIN,
            WalletAddress::Address(address) => address,
        }
    }

    pub fn is_offchain(&self) -> bool {
        matches!(self, WalletAddress::Offchain)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for WalletAddress {
    fn from(value: String) -> Self {
        if value == OFFCHAIN {
            WalletAddress::Offchain
        } else {
            WalletAddress::Address(value)
        }
    }
}

impl From<&str> for WalletAddress {
    fn from(value: &str) -> Self {
        WalletAddress::from(value.to_string())
    }
}

impl FromStr for WalletAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DomainError::MissingField("wallet_address"));
        }
        Ok(WalletAddress::from(s))
    }
}

impl From<WalletAddress> for String {
    fn from(address: WalletAddress) -> Self {
        match address {
            WalletAddress::Offchain => OFFCHAIN.to_string(),
            WalletAddress::Address(address) => address,
        }
    }
}

/// Convert unix seconds into a ledger timestamp.
pub fn timestamp_from_unix(seconds: i64) -> Result<DateTime<Utc>, DomainError> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| DomainError::InvalidTimestamp(seconds.to_string()))
}

/// Drop sub-second precision; the ledger records whole seconds.
fn truncate_to_seconds(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(timestamp.timestamp(), 0)
        .single()
        .unwrap_or(timestamp)
}

/// One ledger entry, identified by `(user_guid, tx)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    user_guid: u64,
    wallet_address: WalletAddress,
    timestamp: DateTime<Utc>,
    tx: String,
    contract: String,
    amount: TokenAmount,
    completed: bool,
    data: Map<String, Value>,
}

impl Transaction {
    pub fn builder() -> TransactionBuilder {
        TransactionBuilder::default()
    }

    pub fn user_guid(&self) -> u64 {
        self.user_guid
    }

    pub fn wallet_address(&self) -> &WalletAddress {
        &self.wallet_address
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn tx(&self) -> &str {
        &self.tx
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn amount(&self) -> &TokenAmount {
        &self.amount
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Opaque metadata. An empty map means no data was attached.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}

/// Builder for [`Transaction`].
///
/// `user_guid`, `wallet_address` and `tx` are required. The timestamp
/// defaults to now, the amount to zero and `completed` to false.
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    user_guid: Option<u64>,
    wallet_address: Option<WalletAddress>,
    timestamp: Option<DateTime<Utc>>,
    tx: Option<String>,
    contract: Option<String>,
    amount: Option<TokenAmount>,
    completed: bool,
    data: Map<String, Value>,
}

impl TransactionBuilder {
    pub fn user_guid(mut self, user_guid: u64) -> Self {
        self.user_guid = Some(user_guid);
        self
    }

    pub fn wallet_address(mut self, wallet_address: impl Into<WalletAddress>) -> Self {
        self.wallet_address = Some(wallet_address.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn tx(mut self, tx: impl Into<String>) -> Self {
        self.tx = Some(tx.into());
        self
    }

    pub fn contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    pub fn amount(mut self, amount: impl Into<TokenAmount>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    pub fn data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn build(self) -> Result<Transaction, DomainError> {
        let user_guid = self.user_guid.ok_or(DomainError::MissingField("user_guid"))?;

        let wallet_address = match self.wallet_address {
            Some(WalletAddress::Address(ref address)) if address.is_empty() => None,
            other => other,
        }
        .ok_or(DomainError::MissingField("wallet_address"))?;

        let tx = self
            .tx
            .filter(|tx| !tx.is_empty())
            .ok_or(DomainError::MissingField("tx"))?;

        Ok(Transaction {
            user_guid,
            wallet_address,
            timestamp: truncate_to_seconds(self.timestamp.unwrap_or_else(Utc::now)),
            tx,
            contract: self.contract.unwrap_or_default(),
            amount: self.amount.unwrap_or_default(),
            completed: self.completed,
            data: self.data,
        })
    }
}
