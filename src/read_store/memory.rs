// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory read store with failure injection

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::{RegistryError, RegistryResult};
use crate::read_store::{ReadStore, UserRead};

#[derive(Default)]
pub struct InMemoryReadStore {
    rows: RwLock<HashMap<Uuid, UserRead>>,
    unavailable: AtomicBool,
    failing_writes: AtomicU32,
}

impl InMemoryReadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every operation until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `count` writes with a persistence error
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Active rows
    pub async fn len(&self) -> usize {
        self.rows
            .read()
            .await
            .values()
            .filter(|row| !row.is_tombstone())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Entries of any kind, tombstones included
    pub async fn entry_count(&self) -> usize {
        self.rows.read().await.len()
    }

    fn check_available(&self) -> RegistryResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::Persistence("read store unavailable".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> RegistryResult<()> {
        self.check_available()?;
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(RegistryError::Persistence("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReadStore for InMemoryReadStore {
    async fn find_entry(&self, id: Uuid) -> RegistryResult<Option<UserRead>> {
        self.check_available()?;
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn upsert(&self, row: UserRead) -> RegistryResult<()> {
        self.check_write()?;
        self.rows.write().await.insert(row.id, row);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RegistryResult<()> {
        self.check_write()?;
        self.rows.write().await.remove(&id);
        Ok(())
    }

    async fn list(&self) -> RegistryResult<Vec<UserRead>> {
        self.check_available()?;
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|row| !row.is_tombstone())
            .cloned()
            .collect())
    }

    async fn clear(&self) -> RegistryResult<()> {
        self.check_write()?;
        self.rows.write().await.clear();
        Ok(())
    }
}
