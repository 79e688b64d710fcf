//! Queue module
//!
//! Adapter between the message queue transport and the transactions
//! manager.

mod message;
mod runner;

pub use message::{Numeric, TransactionMessage};
pub use runner::{
    disposition_for, BlockchainTransactionsRunner, ChannelSource, Delivery, Disposition,
    MessageSource, RunStats, DEFAULT_QUEUE,
};

use crate::domain::DomainError;
use crate::transactions::ManagerError;

/// Errors while consuming queue messages
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Payload is not a JSON object of the expected shape
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field has the wrong format
    #[error("Invalid message: {0}")]
    Invalid(#[from] DomainError),

    /// The manager failed
    #[error(transparent)]
    Manager(#[from] ManagerError),

    /// The transport could not settle a delivery
    #[error("Transport error: {0}")]
    Transport(String),
}

impl QueueError {
    /// Check if redelivery may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            QueueError::Malformed(_) | QueueError::Invalid(_) => false,
            QueueError::Manager(e) => e.is_retryable(),
            QueueError::Transport(_) => true,
        }
    }
}
