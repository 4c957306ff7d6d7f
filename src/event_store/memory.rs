// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory event store
//!
//! Process-local log used by tests and embedded setups. Supports failure
//! injection so the command path can be exercised against storage outages.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{RegistryError, RegistryResult};
use crate::event_store::{Commit, EventStore};
use crate::events::{StoredEvent, UserEvent};

#[derive(Default)]
struct Log {
    /// Commits in position order; position = index + 1
    commits: Vec<Commit>,
    /// Commit indexes per aggregate
    by_aggregate: HashMap<Uuid, Vec<usize>>,
}

impl Log {
    fn version_of(&self, aggregate_id: Uuid) -> u64 {
        self.by_aggregate
            .get(&aggregate_id)
            .and_then(|indexes| indexes.last())
            .map(|&index| self.commits[index].version)
            .unwrap_or(0)
    }
}

/// Event log held in process memory
#[derive(Default)]
pub struct InMemoryEventStore {
    log: RwLock<Log>,
    fail_appends: AtomicBool,
    append_delay_ms: AtomicU64,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every append fail with a persistence error
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Delay every append (for timeout tests)
    pub fn set_append_delay(&self, delay: Duration) {
        self.append_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of commits in the log
    pub async fn commit_count(&self) -> usize {
        self.log.read().await.commits.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: Option<u64>,
        events: Vec<UserEvent>,
    ) -> RegistryResult<Commit> {
        let delay = self.append_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(RegistryError::Persistence(
                "event log unavailable".to_string(),
            ));
        }
        if events.is_empty() {
            return Err(RegistryError::Validation(
                "append requires at least one event".to_string(),
            ));
        }

        let mut log = self.log.write().await;

        let current = log.version_of(aggregate_id);
        if let Some(expected) = expected_version {
            if expected != current {
                return Err(RegistryError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual: current,
                });
            }
        }

        let position = log.commits.len() as u64 + 1;
        let commit = Commit::new(aggregate_id, current, events, Utc::now()).at_position(position);

        let index = log.commits.len();
        log.commits.push(commit.clone());
        log.by_aggregate.entry(aggregate_id).or_default().push(index);

        debug!(
            aggregate_id = %aggregate_id,
            position = position,
            version = commit.version,
            "Appended commit"
        );
        Ok(commit)
    }

    async fn read_events(&self, aggregate_id: Uuid) -> RegistryResult<Vec<StoredEvent>> {
        let log = self.log.read().await;
        let events = log
            .by_aggregate
            .get(&aggregate_id)
            .into_iter()
            .flatten()
            .flat_map(|&index| log.commits[index].events.iter().cloned())
            .collect();
        Ok(events)
    }

    async fn read_all_from(&self, from_position: u64, limit: usize) -> RegistryResult<Vec<Commit>> {
        let log = self.log.read().await;
        let start = from_position.saturating_sub(1) as usize;
        Ok(log.commits.iter().skip(start).take(limit).cloned().collect())
    }

    async fn get_version(&self, aggregate_id: Uuid) -> RegistryResult<u64> {
        Ok(self.log.read().await.version_of(aggregate_id))
    }
}
