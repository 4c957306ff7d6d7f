// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event-sourced user registry for the Composable Information Machine
//!
//! Commands are validated against an aggregate rebuilt from the event log,
//! appended atomically, then published to a partitioned topic. A projection
//! consumer applies the events idempotently to a read store that serves all
//! queries. An outbox relay publishes commits the command path could not.
//!
//! Every capability sits behind a trait (`EventStore`, `Broker`, `ReadStore`)
//! with an in-memory adapter and a NATS JetStream adapter.

pub mod aggregate;
pub mod broker;
pub mod config;
pub mod errors;
pub mod event_store;
pub mod events;
pub mod jetstream;
pub mod nats;
pub mod outbox;
pub mod projection;
pub mod publisher;
pub mod read_store;
pub mod retry;
pub mod service;
pub mod subjects;

// Re-export commonly used types
pub use config::{OutboxConfig, RegistryConfig};
pub use errors::{RegistryError, RegistryResult};
pub use events::{StoredEvent, UserEvent};
pub use nats::{NatsClient, NatsConfig};
pub use read_store::UserRead;
pub use service::{Command, CommandReceipt, PublishStatus, Query, UserRegistry};
