// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Store Abstraction
//!
//! This module defines the event log interface and its implementations for
//! persisting and retrieving user events.
//!
//! # Architecture
//!
//! ```text
//! Command → Aggregate → Events → EventStore → Persistent Storage
//!                                    ↓
//!                         Publisher / Outbox relay
//! ```
//!
//! # Event Store Requirements
//!
//! 1. **Append-Only**: Events are never updated or deleted
//! 2. **Ordered**: `sequence` is 1-based and contiguous within an aggregate
//! 3. **Atomic**: One append is one log record; all of its events become
//!    visible together or not at all
//! 4. **Positioned**: Every commit gets a strictly increasing log position
//! 5. **Replay**: The whole log can be read back in position order
//!
//! # Example
//!
//! ```rust,no_run
//! use cim_user_registry::event_store::{EventStore, InMemoryEventStore};
//! use cim_user_registry::events::{UserCreated, UserEvent};
//!
//! # async fn example() -> cim_user_registry::RegistryResult<()> {
//! let store = InMemoryEventStore::new();
//! let id = uuid::Uuid::now_v7();
//! let created = UserEvent::Created(UserCreated {
//!     id,
//!     name: "Alice".into(),
//!     email: "alice@x.com".into(),
//! });
//!
//! let commit = store.append(id, Some(0), vec![created]).await?;
//! assert_eq!(commit.version, 1);
//!
//! let events = store.read_events(id).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::RegistryResult;
use crate::events::{StoredEvent, UserEvent};

pub mod memory;
pub mod nats;

pub use memory::InMemoryEventStore;
pub use nats::NatsEventStore;

/// Result of a successful append
///
/// One commit is one log record. Its events share `position` and carry the
/// commit id as their `correlation_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub commit_id: Uuid,

    pub aggregate_id: Uuid,

    /// Log position (strictly increasing across the whole log)
    pub position: u64,

    /// Aggregate version after this commit (sequence of the last event)
    pub version: u64,

    /// When the log recorded the commit
    pub recorded_at: DateTime<Utc>,

    /// Stored envelopes in sequence order
    pub events: Vec<StoredEvent>,
}

impl Commit {
    /// Build a commit for events appended after `current_version`
    ///
    /// `position` is left at zero until the log assigns one.
    pub(crate) fn new(
        aggregate_id: Uuid,
        current_version: u64,
        events: Vec<UserEvent>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let commit_id = Uuid::now_v7();
        let events: Vec<StoredEvent> = events
            .into_iter()
            .zip(current_version + 1..)
            .map(|(event, sequence)| StoredEvent::new(event, sequence, 0, commit_id, recorded_at))
            .collect();

        Self {
            commit_id,
            aggregate_id,
            position: 0,
            version: current_version + events.len() as u64,
            recorded_at,
            events,
        }
    }

    /// Stamp the log position on the commit and every event in it
    pub(crate) fn at_position(mut self, position: u64) -> Self {
        self.position = position;
        for event in &mut self.events {
            event.position = position;
        }
        self
    }
}

/// Event Store trait for persisting and retrieving user events
///
/// Implementations must ensure:
///
/// - **Atomicity**: Appending events succeeds or fails as a unit
/// - **Consistency**: Event ordering is maintained
/// - **Durability**: Events survive system failures
/// - **Replay**: Events can be read back in order
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events to an aggregate's event stream
    ///
    /// # Arguments
    ///
    /// * `aggregate_id` - The aggregate these events belong to
    /// * `expected_version` - Version the caller loaded; `None` skips the check
    /// * `events` - Events to append (at least one)
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if `expected_version` doesn't match
    /// - `Persistence` if writing to storage fails
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: Option<u64>,
        events: Vec<UserEvent>,
    ) -> RegistryResult<Commit>;

    /// Read all events for an aggregate in sequence order
    async fn read_events(&self, aggregate_id: Uuid) -> RegistryResult<Vec<StoredEvent>>;

    /// Read commits with `position >= from_position`, in log order
    ///
    /// At most `limit` commits are returned.
    async fn read_all_from(&self, from_position: u64, limit: usize) -> RegistryResult<Vec<Commit>>;

    /// Current version of an aggregate (0 when it has no events)
    async fn get_version(&self, aggregate_id: Uuid) -> RegistryResult<u64>;
}
