// Copyright (c) 2025 - Cowboy AI, Inc.
//! User Aggregate
//!
//! ```text
//! Command → handle_*() → Result<Event, CommandError>
//!                              ↓
//! Events → apply_event() → New State
//! ```

use uuid::Uuid;

use crate::aggregate::entity::{EventSourced, EventSourcedState};
use crate::aggregate::handlers::{
    handle_create_user, handle_delete_user, handle_update_user, CommandError,
};
use crate::events::UserEvent;

/// Lifecycle position of a user aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserLifecycle {
    /// No events folded yet
    #[default]
    NonExistent,
    /// Created and not deleted
    Active,
    /// Terminal
    Deleted,
}

/// User state reconstructed from events
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserState {
    pub lifecycle: UserLifecycle,
    pub name: String,
    pub email: String,
}

impl UserState {
    /// Reconstruct state from an event stream
    ///
    /// ```text
    /// State = fold(Events, Default, apply_event)
    /// ```
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a UserEvent>,
    {
        events.into_iter().fold(Self::default(), apply_event)
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == UserLifecycle::Active
    }
}

/// Apply event to state (pure function)
///
/// # Invariants
/// - Same event + same state = same result
/// - Never fails (events are facts that happened)
pub fn apply_event(state: UserState, event: &UserEvent) -> UserState {
    match event {
        UserEvent::Created(e) => UserState {
            lifecycle: UserLifecycle::Active,
            name: e.name.clone(),
            email: e.email.clone(),
        },

        UserEvent::Updated(e) => UserState {
            name: e.name.clone().unwrap_or(state.name),
            email: e.email.clone().unwrap_or(state.email),
            ..state
        },

        UserEvent::Deleted(_) => UserState {
            lifecycle: UserLifecycle::Deleted,
            ..state
        },
    }
}

impl EventSourcedState for UserState {
    type Event = UserEvent;

    fn apply(self, event: &UserEvent) -> Self {
        apply_event(self, event)
    }
}

/// Event-sourced user aggregate root
pub type UserAggregate = EventSourced<UserState>;

impl EventSourced<UserState> {
    /// Record a `Created` event
    pub fn create(&mut self, name: &str, email: &str) -> Result<(), CommandError> {
        let event = handle_create_user(self.state(), self.id(), name, email)?;
        self.record(UserEvent::Created(event));
        Ok(())
    }

    /// Record an `Updated` event carrying only changed fields
    ///
    /// Returns `false` when nothing changed and no event was recorded.
    pub fn update(&mut self, name: Option<&str>, email: Option<&str>) -> Result<bool, CommandError> {
        match handle_update_user(self.state(), self.id(), name, email)? {
            Some(event) => {
                self.record(UserEvent::Updated(event));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Record the terminal `Deleted` event
    pub fn mark_deleted(&mut self) -> Result<(), CommandError> {
        let event = handle_delete_user(self.state(), self.id())?;
        self.record(UserEvent::Deleted(event));
        Ok(())
    }

    pub fn lifecycle(&self) -> UserLifecycle {
        self.state().lifecycle
    }
}

/// Convenience for building a fresh aggregate
pub fn new_user(id: Uuid) -> UserAggregate {
    EventSourced::new(id)
}
