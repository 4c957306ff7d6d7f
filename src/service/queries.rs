// Copyright (c) 2025 - Cowboy AI, Inc.
//! Query handlers
//!
//! Read-only access to the read store. No business logic, and no waiting for
//! projection work: a query returns whatever the read store holds right now.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{RegistryError, RegistryResult};
use crate::read_store::{ReadStore, UserRead};

/// Every user in the read model (no ordering guarantee)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListUsers;

/// One user by id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetUser {
    pub id: Uuid,
}

/// Handles one query type
#[async_trait]
pub trait QueryHandler<Q: Send + 'static>: Send + Sync {
    type Output: Send;

    async fn handle(&self, query: Q) -> RegistryResult<Self::Output>;

    /// Name used in logs and spans
    fn name(&self) -> &'static str;
}

/// Handles [`ListUsers`]
pub struct ListUsersHandler {
    store: Arc<dyn ReadStore>,
}

impl ListUsersHandler {
    pub fn new(store: Arc<dyn ReadStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl QueryHandler<ListUsers> for ListUsersHandler {
    type Output = Vec<UserRead>;

    async fn handle(&self, _query: ListUsers) -> RegistryResult<Vec<UserRead>> {
        self.store.list().await
    }

    fn name(&self) -> &'static str {
        "list_users"
    }
}

/// Handles [`GetUser`]
pub struct GetUserHandler {
    store: Arc<dyn ReadStore>,
}

impl GetUserHandler {
    pub fn new(store: Arc<dyn ReadStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl QueryHandler<GetUser> for GetUserHandler {
    type Output = UserRead;

    async fn handle(&self, query: GetUser) -> RegistryResult<UserRead> {
        self.store
            .find(query.id)
            .await?
            .ok_or(RegistryError::NotFound(query.id))
    }

    fn name(&self) -> &'static str {
        "get_user"
    }
}
