// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS JetStream broker
//!
//! Each topic is a JetStream stream over `<topic>.>`. A message with key `k`
//! goes to subject `<topic>.p<k mod N>.<k>`. A consumer group gets one durable
//! pull consumer per partition, filtered to that partition and limited to one
//! unacknowledged message so the partition is processed strictly in order.

use async_nats::jetstream::{self, consumer::pull, stream::Stream, AckKind};
use async_nats::HeaderMap;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{
    Acknowledge, Broker, BrokerError, BrokerResult, Delivery, DeliveryStream, OutboundMessage,
};
use crate::jetstream::{ensure_stream, StreamSettings};
use crate::nats::NatsClient;
use crate::subjects::{consumer_name, partition_filter, partition_for, partition_subject};

/// How long JetStream waits for an ack before redelivering
const ACK_WAIT: Duration = Duration::from_secs(30);

/// Broker backed by NATS JetStream
pub struct JetStreamBroker {
    jetstream: jetstream::Context,
    partitions: u32,
    streams: Mutex<HashMap<String, Stream>>,
}

impl JetStreamBroker {
    pub fn new(client: &NatsClient, partitions: u32) -> Self {
        Self {
            jetstream: client.jetstream().clone(),
            partitions: partitions.max(1),
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Stream backing a topic, created on first use
    async fn topic_stream(&self, topic: &str) -> BrokerResult<Stream> {
        let mut streams = self.streams.lock().await;
        if let Some(stream) = streams.get(topic) {
            return Ok(stream.clone());
        }

        let stream = ensure_stream(&self.jetstream, StreamSettings::topic(topic))
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        streams.insert(topic.to_string(), stream.clone());
        Ok(stream)
    }

    /// Durable consumer for one partition of a group
    async fn partition_consumer(
        &self,
        stream: &Stream,
        topic: &str,
        group: &str,
        partition: u32,
    ) -> BrokerResult<jetstream::consumer::PullConsumer> {
        let name = consumer_name(group, partition);

        if let Ok(consumer) = stream.get_consumer(&name).await {
            debug!(consumer = %name, "Found existing consumer");
            return Ok(consumer);
        }

        info!(consumer = %name, topic = %topic, partition = partition, "Creating durable consumer");
        stream
            .create_consumer(pull::Config {
                durable_name: Some(name),
                filter_subject: partition_filter(topic, partition),
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                ack_wait: ACK_WAIT,
                max_ack_pending: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))
    }
}

struct JetStreamAck {
    message: jetstream::Message,
}

#[async_trait]
impl Acknowledge for JetStreamAck {
    async fn ack(self: Box<Self>) -> BrokerResult<()> {
        self.message
            .ack()
            .await
            .map_err(|e| BrokerError::Acknowledge(e.to_string()))
    }

    async fn nak(self: Box<Self>) -> BrokerResult<()> {
        self.message
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| BrokerError::Acknowledge(e.to_string()))
    }
}

/// Aggregate id carried in the last token of a partition subject
fn key_from_subject(subject: &str) -> BrokerResult<Uuid> {
    subject
        .rsplit('.')
        .next()
        .and_then(|token| Uuid::parse_str(token).ok())
        .ok_or_else(|| {
            BrokerError::Subscribe(format!("subject '{}' carries no aggregate id", subject))
        })
}

/// Turn a JetStream message into a delivery
fn to_delivery(message: jetstream::Message, key: Uuid, partition: u32) -> Delivery {
    let attempt = message
        .info()
        .map(|info| info.delivered.max(1) as u64)
        .unwrap_or(1);
    let payload = message.payload.to_vec();

    Delivery::new(key, partition, payload, attempt, Box::new(JetStreamAck { message }))
}

/// Delivery for a received message; messages without an aggregate id are terminated
async fn receive(
    message: Result<jetstream::Message, String>,
    partition: u32,
) -> BrokerResult<Delivery> {
    let message = message.map_err(BrokerError::Subscribe)?;

    match key_from_subject(message.subject.as_str()) {
        Ok(key) => Ok(to_delivery(message, key, partition)),
        Err(e) => {
            warn!(
                subject = %message.subject,
                partition = partition,
                "Terminating message without aggregate id"
            );
            if let Err(term) = message.ack_with(AckKind::Term).await {
                warn!(error = %term, "Failed to terminate message");
            }
            Err(e)
        }
    }
}

#[async_trait]
impl Broker for JetStreamBroker {
    async fn publish(&self, topic: &str, message: OutboundMessage) -> BrokerResult<()> {
        self.topic_stream(topic).await?;

        let partition = partition_for(message.key, self.partitions);
        let subject = partition_subject(topic, partition, message.key);

        let mut headers = HeaderMap::new();
        headers.insert("Nats-Msg-Id", message.dedup_id.as_str());

        self.jetstream
            .publish_with_headers(subject, headers, message.payload.into())
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        partition: u32,
    ) -> BrokerResult<DeliveryStream> {
        if partition >= self.partitions {
            return Err(BrokerError::InvalidPartition {
                partition,
                partitions: self.partitions,
            });
        }

        let stream = self.topic_stream(topic).await?;
        let consumer = self.partition_consumer(&stream, topic, group, partition).await?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        let deliveries = messages
            .then(move |message| receive(message.map_err(|e| e.to_string()), partition));

        Ok(deliveries.boxed())
    }

    fn partition_count(&self) -> u32 {
        self.partitions
    }
}
