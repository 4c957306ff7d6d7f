// Copyright (c) 2025 - Cowboy AI, Inc.
//! Read Store
//!
//! Denormalized, query-only view of current user state. The projection
//! consumer is its only writer; query handlers only read it. It is a
//! disposable cache: dropping it and replaying the event log rebuilds it.
//!
//! A deleted user leaves a tombstone: an inactive row carrying the sequence
//! of the `Deleted` event. Queries never see tombstones; the projection reads
//! them through [`ReadStore::find_entry`] so a stale `Created` or `Updated`
//! delivered after the delete cannot bring the row back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::RegistryResult;

pub mod kv;
pub mod memory;

pub use kv::KvReadStore;
pub use memory::InMemoryReadStore;

/// One user as served to queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRead {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub last_updated: DateTime<Utc>,

    /// Sequence of the last event applied to this row
    pub version: u64,
}

impl UserRead {
    /// Inactive row left behind by a `Deleted` event at `version`
    pub fn tombstone(id: Uuid, version: u64, last_updated: DateTime<Utc>) -> Self {
        Self {
            id,
            name: String::new(),
            email: String::new(),
            is_active: false,
            last_updated,
            version,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        !self.is_active
    }
}

/// Storage for [`UserRead`] rows keyed by user id
#[async_trait]
pub trait ReadStore: Send + Sync {
    /// Stored entry for one user, tombstones included
    async fn find_entry(&self, id: Uuid) -> RegistryResult<Option<UserRead>>;

    /// Active row for one user
    async fn find(&self, id: Uuid) -> RegistryResult<Option<UserRead>> {
        Ok(self.find_entry(id).await?.filter(|row| !row.is_tombstone()))
    }

    /// Insert or replace an entry
    async fn upsert(&self, row: UserRead) -> RegistryResult<()>;

    /// Remove an entry outright; removing an absent entry succeeds
    async fn delete(&self, id: Uuid) -> RegistryResult<()>;

    /// Every active row, in no particular order
    async fn list(&self) -> RegistryResult<Vec<UserRead>>;

    /// Remove every entry, tombstones included (rebuild only)
    async fn clear(&self) -> RegistryResult<()>;
}
