// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stored event envelope
//!
//! Wraps a domain event with the ordering and identity metadata assigned by
//! the event log at append time. The same envelope travels over the broker,
//! so consumers can use `sequence` for duplicate and gap detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserEvent;

/// Current schema version of [`UserEvent`] payloads
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Stored event envelope with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent<E = UserEvent> {
    /// Unique event ID (UUID v7 for time-ordering)
    pub event_id: Uuid,

    /// Aggregate ID this event belongs to
    pub aggregate_id: Uuid,

    /// Sequence number within the aggregate stream (1-based, contiguous)
    pub sequence: u64,

    /// Log position of the commit that wrote this event
    ///
    /// All events appended in one call share the same position.
    pub position: u64,

    /// When the log recorded the event
    pub timestamp: DateTime<Utc>,

    /// Commit ID shared by every event of one append
    pub correlation_id: Uuid,

    /// Event type name
    pub event_type: String,

    /// Schema version of `data`
    pub event_version: u32,

    /// The domain event
    pub data: E,
}

impl StoredEvent<UserEvent> {
    /// Wrap a freshly produced event
    pub fn new(
        data: UserEvent,
        sequence: u64,
        position: u64,
        correlation_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_id: data.aggregate_id(),
            sequence,
            position,
            timestamp,
            correlation_id,
            event_type: data.event_type().to_string(),
            event_version: EVENT_SCHEMA_VERSION,
            data,
        }
    }
}
