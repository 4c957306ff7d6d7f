// Copyright (c) 2025 - Cowboy AI, Inc.
//! Outbox relay
//!
//! Closes the gap between "appended" and "published". The command path
//! appends first and publishes second; if the publish fails or times out the
//! commit is only in the log. The relay tails the log and publishes whatever
//! the command path did not.
//!
//! ```text
//!            checkpoint
//!                │
//! log:  [1][2][3][4][5][6]
//!                 │  │  └─ younger than grace period: stop, retry next pass
//!                 │  └──── in ledger: already published, skip
//!                 └─────── not in ledger, old enough: republish
//! ```
//!
//! The checkpoint only moves over commits known to be published, so a
//! failed republish is retried on the next pass and log order is kept.
//!
//! # Ledger
//!
//! The [`PublicationLedger`] is shared by every command process and the
//! relay. Over NATS it lives in a KV bucket ([`KvLedger`]), so a relay in
//! another process or after a restart skips what was already published.
//! A contiguous run of published positions starting at the checkpoint is
//! folded into the checkpoint as soon as it is recorded; without a relay
//! the ledger only holds positions after the first unpublished commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::OutboxConfig;
use crate::errors::RegistryResult;
use crate::event_store::{Commit, EventStore};
use crate::projection::Clock;
use crate::publisher::EventPublisher;

pub mod kv;
pub mod memory;

pub use kv::KvLedger;
pub use memory::InMemoryLedger;

/// Which log positions have been published, shared by the command path and the relay
///
/// Positions start at 1; a fresh ledger has its checkpoint at 1.
#[async_trait]
pub trait PublicationLedger: Send + Sync {
    /// Next position the relay will examine
    async fn checkpoint(&self) -> RegistryResult<u64>;

    /// Whether the command path may publish a commit of this aggregate now
    ///
    /// `false` while older commits of the aggregate wait for the relay, so
    /// publishing would overtake them.
    async fn may_publish(&self, aggregate_id: Uuid) -> RegistryResult<bool>;

    /// The command path published the commit at `position`
    async fn record_published(&self, position: u64) -> RegistryResult<()>;

    /// The command path could not publish the commit at `position`
    async fn record_deferred(&self, aggregate_id: Uuid, position: u64) -> RegistryResult<()>;

    /// Published by anyone: below the checkpoint or recorded ahead of it
    async fn is_published(&self, position: u64) -> RegistryResult<bool>;

    /// Move the checkpoint past a published commit and release its aggregate
    async fn advance_past(&self, commit: &Commit) -> RegistryResult<()>;
}

/// Result of one relay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Commits read from the log
    pub examined: usize,
    /// Commits the command path had already published
    pub skipped: usize,
    /// Commits published by the relay
    pub republished: usize,
    /// Stopped at a commit still inside the grace period
    pub held_back: bool,
    /// Stopped at a commit whose publish failed
    pub failed: bool,
    /// Checkpoint after the pass
    pub checkpoint: u64,
}

/// Publishes committed events the command path did not
#[derive(Clone)]
pub struct OutboxRelay {
    event_store: Arc<dyn EventStore>,
    publisher: EventPublisher,
    ledger: Arc<dyn PublicationLedger>,
    config: OutboxConfig,
    clock: Clock,
}

impl OutboxRelay {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        publisher: EventPublisher,
        ledger: Arc<dyn PublicationLedger>,
        config: OutboxConfig,
        clock: Clock,
    ) -> Self {
        Self {
            event_store,
            publisher,
            ledger,
            config,
            clock,
        }
    }

    fn within_grace(&self, recorded_at: DateTime<Utc>) -> bool {
        let age = (self.clock)().signed_duration_since(recorded_at);
        match age.to_std() {
            Ok(age) => age < self.config.grace_period,
            // recorded in the future relative to our clock
            Err(_) => !self.config.grace_period.is_zero(),
        }
    }

    /// Examine one batch of the log from the checkpoint
    pub async fn run_once(&self) -> RegistryResult<RelayReport> {
        let checkpoint = self.ledger.checkpoint().await?;
        let commits = self
            .event_store
            .read_all_from(checkpoint, self.config.batch_size)
            .await?;

        let mut report = RelayReport {
            examined: commits.len(),
            ..RelayReport::default()
        };

        for commit in &commits {
            if self.ledger.is_published(commit.position).await? {
                self.ledger.advance_past(commit).await?;
                report.skipped += 1;
                continue;
            }

            if self.within_grace(commit.recorded_at) {
                report.held_back = true;
                break;
            }

            match self.publisher.publish_commit(commit).await {
                Ok(()) => {
                    self.ledger.advance_past(commit).await?;
                    report.republished += 1;
                    debug!(
                        aggregate_id = %commit.aggregate_id,
                        position = commit.position,
                        "Relayed commit"
                    );
                }
                Err(e) => {
                    warn!(
                        aggregate_id = %commit.aggregate_id,
                        position = commit.position,
                        error = %e,
                        "Relay publish failed, will retry"
                    );
                    report.failed = true;
                    break;
                }
            }
        }

        report.checkpoint = self.ledger.checkpoint().await?;
        if report.republished > 0 {
            info!(
                republished = report.republished,
                checkpoint = report.checkpoint,
                "Outbox relay published deferred commits"
            );
        }
        Ok(report)
    }

    /// Run passes until `shutdown` flips to `true`
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                poll_interval_ms = self.config.poll_interval.as_millis() as u64,
                grace_ms = self.config.grace_period.as_millis() as u64,
                "Starting outbox relay"
            );

            loop {
                // Drain whole batches back to back; sleep once caught up
                let caught_up = match self.run_once().await {
                    Ok(report) => {
                        report.examined < self.config.batch_size || report.held_back || report.failed
                    }
                    Err(e) => {
                        error!(error = %e, "Outbox relay pass failed");
                        true
                    }
                };

                if caught_up {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                } else if *shutdown.borrow() {
                    break;
                }
            }

            info!("Outbox relay stopped");
        })
    }
}
