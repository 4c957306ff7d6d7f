// Copyright (c) 2025 - Cowboy AI, Inc.
//! User lifecycle events

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User lifecycle events
///
/// Internally tagged by `type` so the serialized form is flat:
/// `{"type":"Created","id":…,"name":…,"email":…}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserEvent {
    /// User was registered
    Created(UserCreated),

    /// One or more profile fields changed
    Updated(UserUpdated),

    /// User was removed (terminal)
    Deleted(UserDeleted),
}

impl UserEvent {
    /// Aggregate this event belongs to
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            UserEvent::Created(e) => e.id,
            UserEvent::Updated(e) => e.id,
            UserEvent::Deleted(e) => e.id,
        }
    }

    /// Discriminant without the payload
    pub fn event_type(&self) -> UserEventType {
        match self {
            UserEvent::Created(_) => UserEventType::Created,
            UserEvent::Updated(_) => UserEventType::Updated,
            UserEvent::Deleted(_) => UserEventType::Deleted,
        }
    }
}

/// User was registered with its initial profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Partial update: only the fields that changed are present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdated {
    pub id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserUpdated {
    /// True when the event carries no field change at all
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

/// User was deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    pub id: Uuid,
}

/// Event type names as they appear in subjects and envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserEventType {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for UserEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserEventType::Created => write!(f, "Created"),
            UserEventType::Updated => write!(f, "Updated"),
            UserEventType::Deleted => write!(f, "Deleted"),
        }
    }
}
