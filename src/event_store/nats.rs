// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS JetStream Event Store Implementation
//!
//! Each append is published as a single JetStream message holding the whole
//! [`Commit`] on the aggregate's log subject (`users.log.<id>`):
//!
//! - the stream sequence of that message is the commit's log position
//! - `Nats-Msg-Id` carries the commit id, so a retried publish is deduplicated
//! - `Nats-Expected-Last-Subject-Sequence` makes the server reject an append
//!   that raced with another writer on the same aggregate

use async_nats::jetstream::{self, consumer::DeliverPolicy, consumer::PullConsumer, stream::Stream};
use async_nats::HeaderMap;
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::errors::{RegistryError, RegistryResult};
use crate::event_store::{Commit, EventStore};
use crate::events::{StoredEvent, UserEvent};
use crate::jetstream::{ensure_stream, StreamSettings};
use crate::nats::NatsClient;
use crate::subjects::{log_subject, log_wildcard};

/// Messages requested per fetch while reading the log
const BATCH_SIZE: usize = 256;

/// Headers for one log append
///
/// The last-subject-sequence check is only requested when the caller asked
/// for an optimistic concurrency check.
fn append_headers(commit_id: Uuid, expected_last_sequence: Option<u64>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Nats-Msg-Id", commit_id.to_string().as_str());
    if let Some(sequence) = expected_last_sequence {
        headers.insert(
            "Nats-Expected-Last-Subject-Sequence",
            sequence.to_string().as_str(),
        );
    }
    headers
}

/// NATS JetStream-backed event store
///
/// # Example
///
/// ```rust,no_run
/// use cim_user_registry::{event_store::NatsEventStore, nats::NatsClient, RegistryConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = RegistryConfig::default();
///     let client = NatsClient::connect(&config.nats).await?;
///     let store = NatsEventStore::from_config(&client, &config).await?;
///     Ok(())
/// }
/// ```
pub struct NatsEventStore {
    jetstream: jetstream::Context,

    /// JetStream stream holding the log
    stream: Stream,

    /// Log subject prefix (e.g., "users.log")
    subject_prefix: String,
}

impl NatsEventStore {
    /// Open (creating if needed) the log stream
    pub async fn new(
        client: &NatsClient,
        stream_name: &str,
        subject_prefix: &str,
    ) -> RegistryResult<Self> {
        let jetstream = client.jetstream().clone();
        let stream = ensure_stream(&jetstream, StreamSettings::event_log(stream_name, subject_prefix)).await?;

        Ok(Self {
            jetstream,
            stream,
            subject_prefix: subject_prefix.to_string(),
        })
    }

    pub async fn from_config(client: &NatsClient, config: &RegistryConfig) -> RegistryResult<Self> {
        Self::new(client, &config.event_stream, &config.log_subject_prefix).await
    }

    /// Ephemeral, unacknowledged reader over part of the log
    async fn reader(
        &self,
        filter_subject: String,
        deliver_policy: DeliverPolicy,
    ) -> RegistryResult<PullConsumer> {
        self.stream
            .create_consumer(jetstream::consumer::pull::Config {
                filter_subject,
                deliver_policy,
                ack_policy: jetstream::consumer::AckPolicy::None,
                ..Default::default()
            })
            .await
            .map_err(|e| RegistryError::Persistence(e.to_string()))
    }

    /// Read up to `limit` commits from a reader
    async fn drain(consumer: &PullConsumer, limit: usize) -> RegistryResult<Vec<Commit>> {
        let mut commits = Vec::new();

        while commits.len() < limit {
            let wanted = BATCH_SIZE.min(limit - commits.len());
            let mut messages = consumer
                .fetch()
                .max_messages(wanted)
                .messages()
                .await
                .map_err(|e| RegistryError::Persistence(e.to_string()))?;

            let mut batch_count = 0;
            while let Some(message) = messages.next().await {
                let msg = message.map_err(|e| RegistryError::Persistence(e.to_string()))?;
                let position = msg
                    .info()
                    .map_err(|e| RegistryError::Persistence(e.to_string()))?
                    .stream_sequence;

                let commit: Commit = serde_json::from_slice(&msg.payload)
                    .map_err(|e| RegistryError::Deserialization(e.to_string()))?;
                commits.push(commit.at_position(position));
                batch_count += 1;
            }

            // Fewer than requested means the reader caught up with the log
            if batch_count < wanted {
                break;
            }
        }

        Ok(commits)
    }

    /// Most recent commit of one aggregate
    async fn last_commit(&self, aggregate_id: Uuid) -> RegistryResult<Option<Commit>> {
        let consumer = self
            .reader(
                log_subject(&self.subject_prefix, aggregate_id),
                DeliverPolicy::LastPerSubject,
            )
            .await?;
        Ok(Self::drain(&consumer, 1).await?.pop())
    }
}

#[async_trait]
impl EventStore for NatsEventStore {
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: Option<u64>,
        events: Vec<UserEvent>,
    ) -> RegistryResult<Commit> {
        if events.is_empty() {
            return Err(RegistryError::Validation(
                "append requires at least one event".to_string(),
            ));
        }

        let last = self.last_commit(aggregate_id).await?;
        let current = last.as_ref().map(|c| c.version).unwrap_or(0);
        let last_subject_sequence = last.as_ref().map(|c| c.position).unwrap_or(0);

        if let Some(expected) = expected_version {
            if expected != current {
                return Err(RegistryError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual: current,
                });
            }
        }

        let commit = Commit::new(aggregate_id, current, events, Utc::now());
        let payload = serde_json::to_vec(&commit)?;

        let headers = append_headers(
            commit.commit_id,
            expected_version.map(|_| last_subject_sequence),
        );

        let ack = self
            .jetstream
            .publish_with_headers(
                log_subject(&self.subject_prefix, aggregate_id),
                headers,
                payload.into(),
            )
            .await
            .map_err(|e| RegistryError::Persistence(e.to_string()))?
            .await;

        let ack = match ack {
            Ok(ack) => ack,
            Err(e) if e.to_string().to_lowercase().contains("wrong last sequence") => {
                let actual = self.get_version(aggregate_id).await?;
                warn!(
                    aggregate_id = %aggregate_id,
                    expected = current,
                    actual = actual,
                    "Concurrent append rejected by the log"
                );
                return Err(RegistryError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version.unwrap_or(current),
                    actual,
                });
            }
            Err(e) => return Err(RegistryError::Persistence(e.to_string())),
        };

        debug!(
            aggregate_id = %aggregate_id,
            position = ack.sequence,
            version = commit.version,
            duplicate = ack.duplicate,
            "Appended commit"
        );
        Ok(commit.at_position(ack.sequence))
    }

    async fn read_events(&self, aggregate_id: Uuid) -> RegistryResult<Vec<StoredEvent>> {
        let consumer = self
            .reader(log_subject(&self.subject_prefix, aggregate_id), DeliverPolicy::All)
            .await?;

        let mut events: Vec<StoredEvent> = Self::drain(&consumer, usize::MAX)
            .await?
            .into_iter()
            .flat_map(|commit| commit.events)
            .collect();

        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    async fn read_all_from(&self, from_position: u64, limit: usize) -> RegistryResult<Vec<Commit>> {
        let consumer = self
            .reader(
                log_wildcard(&self.subject_prefix),
                DeliverPolicy::ByStartSequence {
                    start_sequence: from_position.max(1),
                },
            )
            .await?;
        Self::drain(&consumer, limit).await
    }

    async fn get_version(&self, aggregate_id: Uuid) -> RegistryResult<u64> {
        Ok(self
            .last_commit(aggregate_id)
            .await?
            .map(|commit| commit.version)
            .unwrap_or(0))
    }
}
