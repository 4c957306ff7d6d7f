// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service Layer for the User Registry
//!
//! Orchestrates the aggregate, the event log, the broker and the read store.
//!
//! # Architecture
//!
//! ```text
//! execute(Command)                          query(Query)
//!     ↓                                         ↓
//! Traced<CommandHandler>                    Traced<QueryHandler>
//!     ↓                                         ↓
//! load → UserAggregate → append → publish   ReadStore
//!                          │          │         ▲
//!                     Event Log     Broker ─→ Projection Consumer
//!                          │                    ▲
//!                          └──── Outbox Relay ──┘ (deferred commits)
//! ```
//!
//! Writes and reads never share a store: a query sees a command's effect only
//! after the projection consumer has applied it.

pub mod commands;
pub mod middleware;
pub mod queries;
pub mod registry;

pub use commands::{
    CommandHandler, CommandReceipt, CreateUserHandler, DeleteUserHandler, PublishStatus,
    UpdateUserHandler, UserRepository,
};
pub use middleware::Traced;
pub use queries::{GetUser, GetUserHandler, ListUsers, ListUsersHandler, QueryHandler};
pub use registry::{Command, Query, UserRegistry, UserRegistryBuilder};
