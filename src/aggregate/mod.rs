// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event-Sourced User Aggregate
//!
//! This module provides the functional aggregate pattern for event sourcing:
//! - State reconstruction via event folding: [Event] → State
//! - Command handlers as pure functions: State → Command → Result<Event, Error>
//! - A composed-in [`EventSourced`] value that tracks uncommitted events
//!
//! # Event Sourcing Pattern
//!
//! ```text
//! Command → Aggregate → Events → Event Store
//!    ↓          ↓          ↓
//! Intent   Validation  Facts
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! NonExistent ──Created──▶ Active ──Deleted──▶ Deleted
//!                            │  ▲
//!                            └──┘ Updated
//! ```
//!
//! `Deleted` is terminal: every mutation on a deleted (or never created)
//! aggregate fails with [`CommandError`].
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let events = event_store.read_events(id).await?;
//! let mut user = UserAggregate::from_history(id, events.iter().map(|e| &e.data));
//!
//! user.update(Some("Bob"), None)?;
//! event_store.append(id, Some(user.version()), user.uncommitted_events().to_vec()).await?;
//! ```

pub mod commands;
pub mod entity;
pub mod handlers;
pub mod user;

pub use commands::{CreateUserCommand, DeleteUserCommand, UpdateUserCommand};
pub use entity::{EventSourced, EventSourcedState};
pub use handlers::{handle_create_user, handle_delete_user, handle_update_user, CommandError};
pub use user::{apply_event, UserAggregate, UserLifecycle, UserState};
