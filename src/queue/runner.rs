//! Blockchain transactions queue runner
//!
//! Consumes decoded `BlockchainTransactions` messages one at a time and
//! records them through the manager. Delivery, retry and acknowledgement
//! belong to the transport; the runner only reports a [`Disposition`].

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::mpsc;

use crate::transactions::{Manager, RunOutcome};

use super::{QueueError, TransactionMessage};

/// Queue the runner listens on by default
pub const DEFAULT_QUEUE: &str = "BlockchainTransactions";

/// What the transport should do with a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handled (recorded or already present)
    Ack,
    /// Malformed; redelivering cannot help
    Reject,
    /// Transient failure; deliver again later
    Requeue,
}

/// One message as handed over by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: u64,
    pub payload: Vec<u8>,
    /// 1 on first delivery
    pub attempt: u32,
}

/// Transport seam for [`BlockchainTransactionsRunner::run`]
#[async_trait]
pub trait MessageSource: Send {
    /// Next delivery, or `None` once the source is closed and drained
    async fn receive(&mut self) -> Option<Delivery>;

    /// Report how a delivery was handled
    async fn settle(&mut self, delivery: Delivery, disposition: Disposition) -> Result<(), QueueError>;
}

/// Counters from one [`BlockchainTransactionsRunner::run`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub acked: u64,
    pub rejected: u64,
    pub requeued: u64,
}

impl RunStats {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Ack => self.acked += 1,
            Disposition::Reject => self.rejected += 1,
            Disposition::Requeue => self.requeued += 1,
        }
    }
}

/// Map a processing result to a transport disposition
pub fn disposition_for(result: &Result<RunOutcome, QueueError>) -> Disposition {
    match result {
        Ok(_) => Disposition::Ack,
        Err(e) if e.is_retryable() => Disposition::Requeue,
        Err(_) => Disposition::Reject,
    }
}

/// Queue consumer feeding the transactions manager
#[derive(Debug, Clone)]
pub struct BlockchainTransactionsRunner {
    manager: Manager,
    queue: String,
}

impl BlockchainTransactionsRunner {
    pub fn new(manager: Manager) -> Self {
        Self {
            manager,
            queue: DEFAULT_QUEUE.to_string(),
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// Decode one payload and run the manager on it
    pub async fn process(&self, payload: &[u8]) -> Result<RunOutcome, QueueError> {
        let command = TransactionMessage::decode(payload)?.into_command()?;
        Ok(self.manager.run(&command).await?)
    }

    /// Process one payload, log the result and return its disposition.
    /// Never panics on bad input.
    pub async fn handle(&self, payload: &[u8]) -> Disposition {
        let result = self.process(payload).await;
        let disposition = disposition_for(&result);

        match &result {
            Ok(outcome) => {
                tracing::debug!(
                    queue = %self.queue,
                    tx = %outcome.transaction().tx(),
                    duplicate = outcome.is_duplicate(),
                    "Message handled"
                );
            }
            Err(e) if disposition == Disposition::Requeue => {
                tracing::warn!(queue = %self.queue, error = %e, "Message failed, leaving for redelivery");
            }
            Err(e) => {
                tracing::error!(queue = %self.queue, error = %e, "Message rejected");
            }
        }

        disposition
    }

    /// Drain a message source, one delivery at a time
    pub async fn run<S>(&self, source: &mut S) -> Result<RunStats, QueueError>
    where
        S: MessageSource + ?Sized,
    {
        tracing::info!(queue = %self.queue, "Blockchain transactions runner started");

        let mut stats = RunStats::default();
        while let Some(delivery) = source.receive().await {
            tracing::info!(
                queue = %self.queue,
                delivery_id = delivery.id,
                attempt = delivery.attempt,
                "Received a new blockchain transaction"
            );

            let disposition = self.handle(&delivery.payload).await;
            stats.record(disposition);
            source.settle(delivery, disposition).await?;
        }

        tracing::info!(
            queue = %self.queue,
            acked = stats.acked,
            rejected = stats.rejected,
            requeued = stats.requeued,
            "Blockchain transactions runner stopped"
        );

        Ok(stats)
    }
}

// =========================================================================
// In-process transport
// =========================================================================

/// Message source over a tokio channel.
///
/// Requeued deliveries are handed out again before new messages, up to
/// `max_attempts` deliveries per message.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::Receiver<Vec<u8>>,
    redeliveries: VecDeque<Delivery>,
    next_id: u64,
    max_attempts: u32,
}

impl ChannelSource {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(receiver: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            receiver,
            redeliveries: VecDeque::new(),
            next_id: 1,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Create a bounded channel and the source reading from it
    pub fn channel(buffer: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (sender, receiver) = mpsc::channel(buffer);
        (sender, Self::new(receiver))
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn receive(&mut self) -> Option<Delivery> {
        if let Some(delivery) = self.redeliveries.pop_front() {
            return Some(delivery);
        }

        let payload = self.receiver.recv().await?;
        let delivery = Delivery {
            id: self.next_id,
            payload,
            attempt: 1,
        };
        self.next_id += 1;
        Some(delivery)
    }

    async fn settle(&mut self, delivery: Delivery, disposition: Disposition) -> Result<(), QueueError> {
        if disposition != Disposition::Requeue {
            return Ok(());
        }

        if delivery.attempt >= self.max_attempts {
            tracing::error!(
                delivery_id = delivery.id,
                attempts = delivery.attempt,
                "Delivery exhausted its attempts, dropping"
            );
            return Ok(());
        }

        self.redeliveries.push_back(Delivery {
            attempt: delivery.attempt + 1,
            ..delivery
        });
        Ok(())
    }
}
