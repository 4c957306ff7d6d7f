// Copyright (c) 2025 - Cowboy AI, Inc.

//! Projection - Events → Read Store
//!
//! A projection maps the event stream onto read-store state:
//!
//! ```text
//! EventStream ────F──────> ReadStore
//!    │                        │
//!    │ Events                 │ Row changes
//!    ▼                        ▼
//! [e1, e2, e3]  ──>  [c1, c2, c3]
//! ```
//!
//! Implementations must preserve:
//! - **Event order**: events of one aggregate are applied in sequence
//! - **Idempotency**: re-applying an already applied event changes nothing
//! - **Consistency**: a missing predecessor is reported, never papered over
//!
//! # Pieces
//!
//! - [`user_read`]: the read-model projection (pure decision + store writes)
//! - [`consumer`]: broker subscription, one worker per partition
//! - [`rebuild`]: full replay of the event log into an emptied store

pub mod consumer;
pub mod rebuild;
pub mod user_read;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::RegistryError;

pub use consumer::{ConsumerHandle, ProjectionConsumer, ProjectionFault};
pub use rebuild::{rebuild_read_model, RebuildReport};
pub use user_read::{decide, RowChange, UserReadProjection};

/// Source of "now" for `lastUpdated`
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Wall clock
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// What applying one event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// A new row was written
    Inserted,
    /// An existing row was overwritten
    Updated,
    /// A row was replaced by a tombstone
    Removed,
    /// The event was already applied
    Duplicate,
    /// Nothing to do (e.g., deleting an absent row)
    NoOp,
}

/// Projection Adapter trait
///
/// Shared by all partition workers, so `project` takes `&self`.
#[async_trait]
pub trait ProjectionAdapter: Send + Sync {
    /// The event type this projection handles
    type Event: Send + Sync;

    /// Error type for projection operations
    type Error: std::error::Error + Send + Sync;

    /// Project an event into the target store
    ///
    /// Calling `project` with the same event multiple times must be safe.
    async fn project(&self, event: Self::Event) -> Result<ProjectionOutcome, Self::Error>;

    /// Clear all projected state
    ///
    /// Destructive; used only for rebuilding projections.
    async fn reset(&self) -> Result<(), Self::Error>;

    /// Get the name of this projection
    fn name(&self) -> &str;
}

/// Errors that can occur during projection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    /// Projection target is not available (retry may help)
    #[error("Projection target unavailable: {0}")]
    TargetUnavailable(String),

    /// Event cannot be projected (malformed payload)
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Read store does not hold the state this event builds on
    #[error("Inconsistent read model for {aggregate_id} at sequence {sequence}: {reason}")]
    Inconsistency {
        aggregate_id: Uuid,
        sequence: u64,
        reason: String,
    },
}

impl ProjectionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProjectionError::TargetUnavailable(_))
    }
}

impl From<ProjectionError> for RegistryError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::TargetUnavailable(msg) => RegistryError::Persistence(msg),
            ProjectionError::InvalidEvent(msg) => RegistryError::Deserialization(msg),
            ProjectionError::Inconsistency {
                aggregate_id,
                sequence,
                reason,
            } => RegistryError::ProjectionInconsistency {
                aggregate_id,
                sequence,
                reason,
            },
        }
    }
}

/// The projection type the consumer and rebuild operate on
pub type DynProjection = Arc<
    dyn ProjectionAdapter<Event = crate::events::StoredEvent, Error = ProjectionError>,
>;
