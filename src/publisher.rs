// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event publisher
//!
//! Hands committed events to the broker. Each event is published as its
//! serialized [`StoredEvent`], keyed by aggregate id (so it lands on the
//! aggregate's partition) and deduplicated by event id.
//!
//! Publishing a whole commit runs under one timeout budget. The publisher
//! never retries: the command path reports the commit as deferred and the
//! outbox relay picks it up.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use crate::broker::{Broker, OutboundMessage};
use crate::errors::{RegistryError, RegistryResult};
use crate::event_store::Commit;
use crate::events::StoredEvent;

/// Publishes committed events to a broker topic
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn Broker>,
    topic: String,
    timeout: Duration,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            broker,
            topic: topic.into(),
            timeout,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a single stored event
    pub async fn publish_event(&self, event: &StoredEvent) -> RegistryResult<()> {
        let message = OutboundMessage {
            key: event.aggregate_id,
            dedup_id: event.event_id.to_string(),
            payload: serde_json::to_vec(event)?,
        };

        self.broker
            .publish(&self.topic, message)
            .await
            .map_err(|e| RegistryError::Publish {
                aggregate_id: event.aggregate_id,
                message: e.to_string(),
            })
    }

    /// Publish every event of a commit in sequence order, within the budget
    pub async fn publish_commit(&self, commit: &Commit) -> RegistryResult<()> {
        let publish_all = async {
            for event in &commit.events {
                self.publish_event(event).await?;
            }
            Ok::<(), RegistryError>(())
        };

        match timeout(self.timeout, publish_all).await {
            Ok(result) => {
                result?;
                debug!(
                    aggregate_id = %commit.aggregate_id,
                    position = commit.position,
                    events = commit.events.len(),
                    "Published commit"
                );
                Ok(())
            }
            Err(_) => Err(RegistryError::Timeout(format!(
                "publishing commit {} exceeded {:?}",
                commit.position, self.timeout
            ))),
        }
    }
}
