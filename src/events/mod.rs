// Copyright (c) 2025 - Cowboy AI, Inc.
//! User Domain Events
//!
//! Events are immutable facts about a user's lifecycle. They are the only
//! thing the event log stores and the only thing the read side consumes.
//!
//! # Event Flow
//!
//! ```text
//! Command → Aggregate → UserEvent → EventStore → StoredEvent → Broker → Projection
//! ```
//!
//! # Wire Contract
//!
//! The JSON shape of [`UserEvent`] is a durable contract shared by the
//! producer, every consumer, and every future replay of the log:
//!
//! ```text
//! {"type":"Created","id":"…","name":"…","email":"…"}
//! {"type":"Updated","id":"…","name":"…"}            (name/email optional)
//! {"type":"Deleted","id":"…"}
//! ```
//!
//! Renaming a field or a variant is a breaking schema change. New optional
//! fields must bump [`EVENT_SCHEMA_VERSION`].

pub mod envelope;
pub mod user;

pub use envelope::{StoredEvent, EVENT_SCHEMA_VERSION};
pub use user::{UserCreated, UserDeleted, UserEvent, UserEventType, UserUpdated};
