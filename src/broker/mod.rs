// Copyright (c) 2025 - Cowboy AI, Inc.
//! Partitioned message broker
//!
//! Transports committed events from the write side to the read side.
//!
//! ```text
//! publish(topic, key) ──▶ partition = key mod N ──▶ ordered log per partition
//!                                                        │
//!                          subscribe(topic, group, p) ◀──┘  one cursor per group
//! ```
//!
//! # Guarantees
//!
//! - Messages with the same key land on the same partition, in publish order
//! - Delivery is at-least-once: a message is redelivered until acknowledged
//! - A group resumes from its last acknowledged message on resubscribe
//!
//! The broker may drop duplicates by `dedup_id`, but consumers must not rely on it.
//!
//! ## Implementations
//!
//! - [`JetStreamBroker`]: NATS JetStream, durable pull consumer per partition
//! - [`InMemoryBroker`]: process-local, for tests and embedded setups

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use uuid::Uuid;

pub mod jetstream;
pub mod memory;

pub use self::jetstream::JetStreamBroker;
pub use memory::InMemoryBroker;

/// Errors that can occur when using the broker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("failed to publish message: {0}")]
    Publish(String),

    #[error("failed to subscribe: {0}")]
    Subscribe(String),

    #[error("failed to acknowledge message: {0}")]
    Acknowledge(String),

    #[error("partition {partition} out of range (topic has {partitions})")]
    InvalidPartition { partition: u32, partitions: u32 },
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// A message to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Partitioning key (the aggregate id)
    pub key: Uuid,

    /// Id the broker may use to drop duplicates
    pub dedup_id: String,

    /// Serialized [`crate::events::StoredEvent`]
    pub payload: Vec<u8>,
}

/// Settles one delivery with the broker
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Processing finished; never redeliver
    async fn ack(self: Box<Self>) -> BrokerResult<()>;

    /// Processing failed; redeliver this message
    async fn nak(self: Box<Self>) -> BrokerResult<()>;
}

/// A message received from one partition
pub struct Delivery {
    pub key: Uuid,
    pub partition: u32,
    pub payload: Vec<u8>,

    /// 1-based number of times this message has been delivered to the group
    pub attempt: u64,

    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(
        key: Uuid,
        partition: u32,
        payload: Vec<u8>,
        attempt: u64,
        acker: Box<dyn Acknowledge>,
    ) -> Self {
        Self {
            key,
            partition,
            payload,
            attempt,
            acker,
        }
    }

    pub async fn ack(self) -> BrokerResult<()> {
        self.acker.ack().await
    }

    pub async fn nak(self) -> BrokerResult<()> {
        self.acker.nak().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("key", &self.key)
            .field("partition", &self.partition)
            .field("payload_len", &self.payload.len())
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Ordered stream of deliveries from one partition
pub type DeliveryStream = BoxStream<'static, BrokerResult<Delivery>>;

/// Partitioned, at-least-once message broker
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a message; its partition is derived from `message.key`
    async fn publish(&self, topic: &str, message: OutboundMessage) -> BrokerResult<()>;

    /// Subscribe a consumer group to one partition of a topic
    ///
    /// The stream resumes after the group's last acknowledged message.
    async fn subscribe(&self, topic: &str, group: &str, partition: u32)
        -> BrokerResult<DeliveryStream>;

    /// Number of partitions per topic
    fn partition_count(&self) -> u32;
}

impl fmt::Debug for dyn Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Broker(partitions={})", self.partition_count())
    }
}
