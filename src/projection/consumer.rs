// Copyright (c) 2025 - Cowboy AI, Inc.
//! Projection consumer
//!
//! Subscribes a consumer group to every partition of the topic and runs one
//! worker per partition. A worker handles its deliveries strictly one at a
//! time, so events of one aggregate are applied in order.
//!
//! Per delivery:
//! - applied (or duplicate) → ack
//! - transient store failure → retry with backoff, then nak for redelivery
//! - inconsistency → ack, log, report on the fault channel (rebuild needed)
//! - undecodable payload → ack and log (redelivery cannot fix it)

use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::{Broker, Delivery, DeliveryStream};
use crate::errors::{RegistryError, RegistryResult};
use crate::events::StoredEvent;
use crate::projection::{DynProjection, ProjectionError};
use crate::retry::{retry_with_backoff, RetryConfig};

/// An inconsistency observed while projecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionFault {
    pub aggregate_id: Uuid,
    pub sequence: u64,
    pub reason: String,
}

impl From<ProjectionFault> for RegistryError {
    fn from(fault: ProjectionFault) -> Self {
        RegistryError::ProjectionInconsistency {
            aggregate_id: fault.aggregate_id,
            sequence: fault.sequence,
            reason: fault.reason,
        }
    }
}

/// Runs a projection against a broker topic
#[derive(Clone)]
pub struct ProjectionConsumer {
    broker: Arc<dyn Broker>,
    projection: DynProjection,
    topic: String,
    group: String,
    retry: RetryConfig,
}

/// Running consumer: fault channel, counters, shutdown
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    faults: mpsc::UnboundedReceiver<ProjectionFault>,
    processed: Arc<AtomicU64>,
}

impl ConsumerHandle {
    /// Wait for the next reported inconsistency
    pub async fn next_fault(&mut self) -> Option<ProjectionFault> {
        self.faults.recv().await
    }

    /// Reported inconsistency, if one is pending
    pub fn try_next_fault(&mut self) -> Option<ProjectionFault> {
        self.faults.try_recv().ok()
    }

    /// Deliveries settled so far (acked for any reason)
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Stop all workers and wait for them to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Projection worker panicked");
            }
        }
    }
}

struct Worker {
    consumer: ProjectionConsumer,
    partition: u32,
    faults: mpsc::UnboundedSender<ProjectionFault>,
    processed: Arc<AtomicU64>,
}

impl ProjectionConsumer {
    pub fn new(
        broker: Arc<dyn Broker>,
        projection: DynProjection,
        topic: impl Into<String>,
        group: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            broker,
            projection,
            topic: topic.into(),
            group: group.into(),
            retry,
        }
    }

    /// Subscribe every partition and spawn the workers
    pub async fn start(&self) -> RegistryResult<ConsumerHandle> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        let processed = Arc::new(AtomicU64::new(0));

        let partitions = self.broker.partition_count();
        let mut workers = Vec::with_capacity(partitions as usize);

        for partition in 0..partitions {
            let deliveries = self
                .broker
                .subscribe(&self.topic, &self.group, partition)
                .await
                .map_err(|e| RegistryError::Persistence(e.to_string()))?;

            let worker = Worker {
                consumer: self.clone(),
                partition,
                faults: fault_tx.clone(),
                processed: processed.clone(),
            };
            workers.push(tokio::spawn(worker.run(deliveries, shutdown_rx.clone())));
        }

        info!(
            projection = %self.projection.name(),
            topic = %self.topic,
            group = %self.group,
            partitions = partitions,
            "Projection consumer started"
        );

        Ok(ConsumerHandle {
            shutdown: shutdown_tx,
            workers,
            faults: fault_rx,
            processed,
        })
    }
}

impl Worker {
    async fn run(self, mut deliveries: DeliveryStream, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => self.handle(delivery).await,
                    Some(Err(e)) => {
                        error!(partition = self.partition, error = %e, "Error receiving delivery");
                        tokio::time::sleep(self.consumer.retry.initial_backoff).await;
                    }
                    None => {
                        warn!(partition = self.partition, "Delivery stream ended");
                        break;
                    }
                },
            }
        }
        debug!(partition = self.partition, "Projection worker stopped");
    }

    async fn handle(&self, delivery: Delivery) {
        let event: StoredEvent = match serde_json::from_slice(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    partition = self.partition,
                    key = %delivery.key,
                    error = %e,
                    "Undecodable delivery, dropping"
                );
                self.settle(delivery).await;
                return;
            }
        };

        let projection = self.consumer.projection.clone();
        let result = retry_with_backoff(
            || {
                let projection = projection.clone();
                let event = event.clone();
                async move { projection.project(event).await }
            },
            ProjectionError::is_transient,
            &self.consumer.retry,
            "project_user_event",
        )
        .await;

        match result {
            Ok(outcome) => {
                debug!(
                    partition = self.partition,
                    aggregate_id = %event.aggregate_id,
                    sequence = event.sequence,
                    attempt = delivery.attempt,
                    outcome = ?outcome,
                    "Delivery applied"
                );
                self.settle(delivery).await;
            }
            Err(ProjectionError::Inconsistency {
                aggregate_id,
                sequence,
                reason,
            }) => {
                error!(
                    partition = self.partition,
                    aggregate_id = %aggregate_id,
                    sequence = sequence,
                    reason = %reason,
                    "Read model inconsistent, rebuild required"
                );
                let _ = self.faults.send(ProjectionFault {
                    aggregate_id,
                    sequence,
                    reason,
                });
                self.settle(delivery).await;
            }
            Err(e) if e.is_transient() => {
                warn!(
                    partition = self.partition,
                    aggregate_id = %event.aggregate_id,
                    sequence = event.sequence,
                    error = %e,
                    "Retries exhausted, leaving delivery for redelivery"
                );
                if let Err(e) = delivery.nak().await {
                    error!(partition = self.partition, error = %e, "Failed to nak delivery");
                }
                tokio::time::sleep(self.consumer.retry.initial_backoff).await;
            }
            Err(e) => {
                error!(
                    partition = self.partition,
                    aggregate_id = %event.aggregate_id,
                    error = %e,
                    "Event cannot be projected, dropping"
                );
                self.settle(delivery).await;
            }
        }
    }

    async fn settle(&self, delivery: Delivery) {
        if let Err(e) = delivery.ack().await {
            error!(partition = self.partition, error = %e, "Failed to acknowledge delivery");
            return;
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
    }
}
