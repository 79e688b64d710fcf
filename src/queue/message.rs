//! Queue message contract
//!
//! Wire shape of a `BlockchainTransactions` message. Producers are not
//! consistent about numeric encoding, so guids, timestamps and amounts are
//! accepted either as JSON numbers or as numeric strings.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::domain::{timestamp_from_unix, DomainError, TokenAmount};
use crate::transactions::RecordTransaction;

use super::QueueError;

/// A number that may arrive as a JSON number or a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Unsigned(u64),
    Signed(i64),
    Text(String),
}

impl Numeric {
    fn as_text(&self) -> String {
        match self {
            Numeric::Unsigned(n) => n.to_string(),
            Numeric::Signed(n) => n.to_string(),
            Numeric::Text(s) => s.trim().to_string(),
        }
    }
}

/// Decoded queue message. Every field is optional on the wire; required
/// fields are enforced by the manager so a missing one is reported by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_guid: Option<Numeric>,
    /// Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(
        default,
        deserialize_with = "data_object",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Map<String, Value>>,
}

/// Producers encode an empty `data` map as `[]`; accept it as `{}`.
fn data_object<'de, D>(deserializer: D) -> Result<Option<Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Array(items)) if items.is_empty() => Ok(Some(Map::new())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "data must be an object, got {}",
            other
        ))),
    }
}

impl TransactionMessage {
    /// Decode a raw payload
    pub fn decode(payload: &[u8]) -> Result<Self, QueueError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Convert into a manager command, checking field formats
    pub fn into_command(self) -> Result<RecordTransaction, DomainError> {
        let mut command = RecordTransaction::new();

        if let Some(user_guid) = self.user_guid {
            let text = user_guid.as_text();
            let user_guid = text
                .parse::<u64>()
                .map_err(|_| DomainError::InvalidUserGuid(text))?;
            command = command.user_guid(user_guid);
        }

        if let Some(timestamp) = self.timestamp {
            let text = timestamp.as_text();
            let seconds = text
                .parse::<i64>()
                .map_err(|_| DomainError::InvalidTimestamp(text))?;
            command = command.timestamp(timestamp_from_unix(seconds)?);
        }

        if let Some(amount) = self.amount {
            command = command.amount(TokenAmount::from_str(&amount.as_text())?);
        }

        command.wallet_address = self.wallet_address;
        command.tx = self.tx;
        command.contract = self.contract;
        command.completed = self.completed;
        command.data = self.data;

        Ok(command)
    }
}
