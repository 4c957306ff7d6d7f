// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Functional Command Handlers for the User Aggregate
//!
//! ```text
//! handle_command(State, Input) → Result<Event, CommandError>
//! ```
//!
//! All handlers are **pure functions**: no I/O, no clock, no mutation.
//! They enforce the lifecycle rules and input constraints; the caller decides
//! what to do with the produced event.

use uuid::Uuid;

use crate::aggregate::user::{UserLifecycle, UserState};
use crate::errors::RegistryError;
use crate::events::{UserCreated, UserDeleted, UserUpdated};

/// Command validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Create on an id that already has history
    #[error("User {0} already exists")]
    AlreadyExists(Uuid),

    /// Mutation on an id with no history
    #[error("User {0} has not been created")]
    NotCreated(Uuid),

    /// Mutation after the terminal Deleted event
    #[error("User {0} has been deleted")]
    AlreadyDeleted(Uuid),

    /// Input rejected
    #[error("Invalid input: {0}")]
    Validation(String),
}

/// Callers see a missing or deleted user as `NotFound`
impl From<CommandError> for RegistryError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::AlreadyExists(_) => RegistryError::InvalidState(err.to_string()),
            CommandError::NotCreated(id) | CommandError::AlreadyDeleted(id) => {
                RegistryError::NotFound(id)
            }
            CommandError::Validation(msg) => RegistryError::Validation(msg),
        }
    }
}

/// Reject mutations unless the aggregate is Active
fn require_active(state: &UserState, aggregate_id: Uuid) -> Result<(), CommandError> {
    match state.lifecycle {
        UserLifecycle::Active => Ok(()),
        UserLifecycle::NonExistent => Err(CommandError::NotCreated(aggregate_id)),
        UserLifecycle::Deleted => Err(CommandError::AlreadyDeleted(aggregate_id)),
    }
}

/// Handle CreateUser
///
/// # Business Rules
/// - Aggregate must have no history
/// - `name` and `email` must be non-empty after trimming
pub fn handle_create_user(
    state: &UserState,
    aggregate_id: Uuid,
    name: &str,
    email: &str,
) -> Result<UserCreated, CommandError> {
    if state.lifecycle != UserLifecycle::NonExistent {
        return Err(CommandError::AlreadyExists(aggregate_id));
    }

    let name = name.trim();
    let email = email.trim();
    if name.is_empty() {
        return Err(CommandError::Validation("name must not be empty".to_string()));
    }
    if email.is_empty() {
        return Err(CommandError::Validation("email must not be empty".to_string()));
    }

    Ok(UserCreated {
        id: aggregate_id,
        name: name.to_string(),
        email: email.to_string(),
    })
}

/// Handle UpdateUser
///
/// # Business Rules
/// - Aggregate must be Active
/// - Absent, blank, or unchanged fields are dropped from the event
///
/// # Returns
/// - `Ok(None)` when nothing would change
pub fn handle_update_user(
    state: &UserState,
    aggregate_id: Uuid,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<Option<UserUpdated>, CommandError> {
    require_active(state, aggregate_id)?;

    let changed = |candidate: Option<&str>, current: &str| {
        candidate
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != current)
            .map(str::to_string)
    };

    let event = UserUpdated {
        id: aggregate_id,
        name: changed(name, &state.name),
        email: changed(email, &state.email),
    };

    if event.is_empty() {
        return Ok(None);
    }
    Ok(Some(event))
}

/// Handle DeleteUser
///
/// # Business Rules
/// - Aggregate must be Active
pub fn handle_delete_user(
    state: &UserState,
    aggregate_id: Uuid,
) -> Result<UserDeleted, CommandError> {
    require_active(state, aggregate_id)?;
    Ok(UserDeleted { id: aggregate_id })
}
