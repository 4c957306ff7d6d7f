// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory publication ledger
//!
//! Shared within one process only. Used by the in-memory registry and tests.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::RegistryResult;
use crate::event_store::Commit;
use crate::outbox::PublicationLedger;

#[derive(Debug)]
struct LedgerState {
    /// Next log position the relay will examine
    checkpoint: u64,
    /// Positions after the checkpoint the command path already published
    published: BTreeSet<u64>,
    /// Aggregates with unpublished commits, and the latest such position
    deferred: HashMap<Uuid, u64>,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            checkpoint: 1,
            published: BTreeSet::new(),
            deferred: HashMap::new(),
        }
    }
}

impl LedgerState {
    /// Fold published positions that directly follow the checkpoint into it
    fn compact(&mut self) {
        while self.published.remove(&self.checkpoint) {
            self.checkpoint += 1;
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positions and aggregates still tracked individually
    pub async fn pending(&self) -> usize {
        let state = self.state.lock().await;
        state.published.len() + state.deferred.len()
    }
}

#[async_trait]
impl PublicationLedger for InMemoryLedger {
    async fn checkpoint(&self) -> RegistryResult<u64> {
        Ok(self.state.lock().await.checkpoint)
    }

    async fn may_publish(&self, aggregate_id: Uuid) -> RegistryResult<bool> {
        Ok(!self.state.lock().await.deferred.contains_key(&aggregate_id))
    }

    async fn record_published(&self, position: u64) -> RegistryResult<()> {
        let mut state = self.state.lock().await;
        if position >= state.checkpoint {
            state.published.insert(position);
            state.compact();
        }
        Ok(())
    }

    async fn record_deferred(&self, aggregate_id: Uuid, position: u64) -> RegistryResult<()> {
        let mut state = self.state.lock().await;
        let latest = state.deferred.entry(aggregate_id).or_insert(position);
        *latest = (*latest).max(position);
        Ok(())
    }

    async fn is_published(&self, position: u64) -> RegistryResult<bool> {
        let state = self.state.lock().await;
        Ok(position < state.checkpoint || state.published.contains(&position))
    }

    async fn advance_past(&self, commit: &Commit) -> RegistryResult<()> {
        let mut state = self.state.lock().await;
        state.checkpoint = state.checkpoint.max(commit.position + 1);
        let checkpoint = state.checkpoint;
        state.published = state.published.split_off(&checkpoint);
        state.compact();

        if let Some(&latest) = state.deferred.get(&commit.aggregate_id) {
            if latest <= commit.position {
                state.deferred.remove(&commit.aggregate_id);
            }
        }
        Ok(())
    }
}
