// Copyright (c) 2025 - Cowboy AI, Inc.
//! Command handlers
//!
//! Each handler runs one load → mutate → append → publish cycle:
//!
//! ```text
//! Command → load(id) → UserAggregate → mutate → append (timeout) → publish (timeout)
//!                                                    │                  │
//!                                                 failure           failure
//!                                                    ▼                  ▼
//!                                            command fails     receipt: Deferred
//! ```
//!
//! Nothing reaches the broker before the append succeeded. A failed publish
//! does not fail the command; the outbox relay delivers the commit later.
//! Neither does a failing publication ledger: a commit the ledger never
//! heard of stays ahead of the relay checkpoint and is relayed after the
//! grace period.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::{CreateUserCommand, DeleteUserCommand, UpdateUserCommand, UserAggregate};
use crate::errors::{RegistryError, RegistryResult};
use crate::event_store::{Commit, EventStore};
use crate::outbox::PublicationLedger;
use crate::publisher::EventPublisher;

/// What happened to the events of a command on the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    /// Published by the command itself
    Published,
    /// Appended but not published; the outbox relay will deliver it
    Deferred,
    /// The command produced no events
    NotRequired,
}

/// Result of a successful command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandReceipt {
    pub aggregate_id: Uuid,
    /// Aggregate version after the command
    pub version: u64,
    pub publish: PublishStatus,
}

/// Handles one command type
#[async_trait]
pub trait CommandHandler<C: Send + 'static>: Send + Sync {
    async fn handle(&self, command: C) -> RegistryResult<CommandReceipt>;

    /// Name used in logs and spans
    fn name(&self) -> &'static str;
}

/// Loads and saves user aggregates
#[derive(Clone)]
pub struct UserRepository {
    event_store: Arc<dyn EventStore>,
    publisher: EventPublisher,
    ledger: Arc<dyn PublicationLedger>,
    append_timeout: Duration,
}

impl UserRepository {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        publisher: EventPublisher,
        ledger: Arc<dyn PublicationLedger>,
        append_timeout: Duration,
    ) -> Self {
        Self {
            event_store,
            publisher,
            ledger,
            append_timeout,
        }
    }

    /// Reconstruct an aggregate from its history (empty history → NonExistent)
    pub async fn load(&self, aggregate_id: Uuid) -> RegistryResult<UserAggregate> {
        let history = self.event_store.read_events(aggregate_id).await?;
        Ok(UserAggregate::from_history(
            aggregate_id,
            history.iter().map(|stored| &stored.data),
        ))
    }

    /// Append pending events, then publish them
    pub async fn save(&self, aggregate: &mut UserAggregate) -> RegistryResult<CommandReceipt> {
        let aggregate_id = aggregate.id();

        if !aggregate.has_uncommitted() {
            return Ok(CommandReceipt {
                aggregate_id,
                version: aggregate.version(),
                publish: PublishStatus::NotRequired,
            });
        }

        let append = self.event_store.append(
            aggregate_id,
            Some(aggregate.version()),
            aggregate.uncommitted_events().to_vec(),
        );
        let commit = timeout(self.append_timeout, append)
            .await
            .map_err(|_| {
                RegistryError::Timeout(format!(
                    "append for {} exceeded {:?}",
                    aggregate_id, self.append_timeout
                ))
            })??;

        aggregate.mark_committed(commit.version);

        let publish = match self.ledger.may_publish(aggregate_id).await {
            Ok(true) => self.publish(&commit).await,
            Ok(false) => {
                // Older commits of this aggregate are still waiting for the relay
                warn!(
                    aggregate_id = %aggregate_id,
                    position = commit.position,
                    "Earlier commits pending, deferring publish to outbox relay"
                );
                self.defer(&commit).await
            }
            Err(e) => {
                warn!(
                    aggregate_id = %aggregate_id,
                    position = commit.position,
                    error = %e,
                    "Publication ledger unavailable, leaving commit to outbox relay"
                );
                PublishStatus::Deferred
            }
        };

        Ok(CommandReceipt {
            aggregate_id,
            version: commit.version,
            publish,
        })
    }

    async fn publish(&self, commit: &Commit) -> PublishStatus {
        match self.publisher.publish_commit(commit).await {
            Ok(()) => {
                if let Err(e) = self.ledger.record_published(commit.position).await {
                    // The relay will publish it again; consumers skip the duplicate
                    warn!(
                        position = commit.position,
                        error = %e,
                        "Could not record published commit"
                    );
                }
                PublishStatus::Published
            }
            Err(e) => {
                warn!(
                    aggregate_id = %commit.aggregate_id,
                    position = commit.position,
                    error = %e,
                    "Publish failed after append, deferring to outbox relay"
                );
                self.defer(commit).await
            }
        }
    }

    async fn defer(&self, commit: &Commit) -> PublishStatus {
        if let Err(e) = self
            .ledger
            .record_deferred(commit.aggregate_id, commit.position)
            .await
        {
            warn!(
                aggregate_id = %commit.aggregate_id,
                position = commit.position,
                error = %e,
                "Could not record deferred commit"
            );
        }
        PublishStatus::Deferred
    }
}

/// Handles [`CreateUserCommand`]
pub struct CreateUserHandler {
    repository: UserRepository,
}

impl CreateUserHandler {
    pub fn new(repository: UserRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler<CreateUserCommand> for CreateUserHandler {
    async fn handle(&self, command: CreateUserCommand) -> RegistryResult<CommandReceipt> {
        let aggregate_id = command.id.unwrap_or_else(Uuid::now_v7);

        let mut user = self.repository.load(aggregate_id).await?;
        user.create(&command.name, &command.email)?;

        let receipt = self.repository.save(&mut user).await?;
        info!(aggregate_id = %aggregate_id, "User created");
        Ok(receipt)
    }

    fn name(&self) -> &'static str {
        "create_user"
    }
}

/// Handles [`UpdateUserCommand`]
pub struct UpdateUserHandler {
    repository: UserRepository,
}

impl UpdateUserHandler {
    pub fn new(repository: UserRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler<UpdateUserCommand> for UpdateUserHandler {
    async fn handle(&self, command: UpdateUserCommand) -> RegistryResult<CommandReceipt> {
        let mut user = self.repository.load(command.id).await?;

        let changed = user.update(command.name.as_deref(), command.email.as_deref())?;
        if !changed {
            info!(aggregate_id = %command.id, "Update changes nothing");
        }

        self.repository.save(&mut user).await
    }

    fn name(&self) -> &'static str {
        "update_user"
    }
}

/// Handles [`DeleteUserCommand`]
pub struct DeleteUserHandler {
    repository: UserRepository,
}

impl DeleteUserHandler {
    pub fn new(repository: UserRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler<DeleteUserCommand> for DeleteUserHandler {
    async fn handle(&self, command: DeleteUserCommand) -> RegistryResult<CommandReceipt> {
        let mut user = self.repository.load(command.id).await?;
        user.mark_deleted()?;

        let receipt = self.repository.save(&mut user).await?;
        info!(aggregate_id = %command.id, "User deleted");
        Ok(receipt)
    }

    fn name(&self) -> &'static str {
        "delete_user"
    }
}
