// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for the user registry
//!
//! Every handler, store and broker adapter surfaces failures as a
//! [`RegistryError`]. Storage and transport errors are converted to strings at
//! the adapter boundary so callers never see raw NATS or serde errors.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur anywhere in the registry pipeline
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Command or query targets a user that does not exist (or was deleted)
    #[error("User not found: {0}")]
    NotFound(Uuid),

    /// Mutation violates the aggregate state machine
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Command input rejected before any event was produced
    #[error("Validation error: {0}")]
    Validation(String),

    /// Event log or read store failed at the storage boundary
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Broker rejected or could not take a committed event
    #[error("Publish error for aggregate {aggregate_id}: {message}")]
    Publish { aggregate_id: Uuid, message: String },

    /// Projection observed an event whose prior state is missing from the read store
    #[error("Projection inconsistency for aggregate {aggregate_id} at sequence {sequence}: {reason}")]
    ProjectionInconsistency {
        aggregate_id: Uuid,
        sequence: u64,
        reason: String,
    },

    /// Append raced with another writer on the same aggregate
    #[error("Concurrency conflict on {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: u64,
        actual: u64,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl RegistryError {
    /// Whether a retry of the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistryError::Persistence(_) | RegistryError::Publish { .. } | RegistryError::Timeout(_)
        )
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Serialization(err.to_string())
    }
}
