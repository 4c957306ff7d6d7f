// Copyright (c) 2025 - Cowboy AI, Inc.
//! JetStream key-value publication ledger
//!
//! Shared by every process running commands and by the relay in the
//! projector. Keys in the bucket:
//!
//! | Key                   | Value                                  |
//! |-----------------------|----------------------------------------|
//! | `checkpoint`          | next position the relay will examine   |
//! | `published.<pos>`     | present while `pos` is past checkpoint |
//! | `deferred.<user id>`  | latest unpublished position of a user  |
//!
//! The checkpoint is only ever raised, with compare-and-set on the entry
//! revision, so concurrent writers never move it backwards.

use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{RegistryError, RegistryResult};
use crate::event_store::Commit;
use crate::nats::NatsClient;
use crate::outbox::PublicationLedger;

const CHECKPOINT_KEY: &str = "checkpoint";

/// Compare-and-set rounds before giving up on a contended checkpoint
const CAS_ATTEMPTS: usize = 16;

fn storage_error(e: impl std::fmt::Display) -> RegistryError {
    RegistryError::Persistence(e.to_string())
}

fn published_key(position: u64) -> String {
    format!("published.{}", position)
}

fn deferred_key(aggregate_id: Uuid) -> String {
    format!("deferred.{}", aggregate_id)
}

fn encode(position: u64) -> String {
    position.to_string()
}

fn decode(key: &str, bytes: &[u8]) -> RegistryResult<u64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| {
            RegistryError::Deserialization(format!("ledger entry '{}' is not a position", key))
        })
}

/// Ledger backed by a JetStream KV bucket
pub struct KvLedger {
    store: kv::Store,
}

impl KvLedger {
    /// Open the bucket, creating it if needed
    pub async fn open(client: &NatsClient, bucket: &str) -> RegistryResult<Self> {
        let jetstream = client.jetstream();

        let store = match jetstream.get_key_value(bucket).await {
            Ok(store) => store,
            Err(_) => {
                info!(bucket = %bucket, "Creating publication ledger bucket");
                jetstream
                    .create_key_value(kv::Config {
                        bucket: bucket.to_string(),
                        history: 1,
                        storage: jetstream::stream::StorageType::File,
                        ..Default::default()
                    })
                    .await
                    .map_err(storage_error)?
            }
        };

        Ok(Self { store })
    }

    async fn read_position(&self, key: &str) -> RegistryResult<Option<u64>> {
        let entry = self.store.get(key).await.map_err(storage_error)?;
        entry.map(|bytes| decode(key, &bytes)).transpose()
    }

    /// Raise the checkpoint to at least `target`; returns the stored value
    async fn raise_checkpoint(&self, target: u64) -> RegistryResult<u64> {
        for _ in 0..CAS_ATTEMPTS {
            let written = match self.store.entry(CHECKPOINT_KEY).await.map_err(storage_error)? {
                Some(entry) => {
                    let current = decode(CHECKPOINT_KEY, &entry.value)?;
                    if current >= target {
                        return Ok(current);
                    }
                    self.store
                        .update(CHECKPOINT_KEY, encode(target).into(), entry.revision)
                        .await
                        .map_err(|e| e.to_string())
                }
                None => self
                    .store
                    .create(CHECKPOINT_KEY, encode(target).into())
                    .await
                    .map_err(|e| e.to_string()),
            };

            match written {
                Ok(_) => return Ok(target),
                Err(e) => debug!(
                    checkpoint = target,
                    error = %e,
                    "Checkpoint moved concurrently, retrying"
                ),
            }
        }

        Err(RegistryError::Persistence(format!(
            "could not raise ledger checkpoint to {} after {} attempts",
            target, CAS_ATTEMPTS
        )))
    }

    /// Fold published positions that directly follow the checkpoint into it
    async fn compact(&self) -> RegistryResult<()> {
        let mut checkpoint = self.checkpoint().await?;
        while self
            .store
            .get(published_key(checkpoint))
            .await
            .map_err(storage_error)?
            .is_some()
        {
            let next = self.raise_checkpoint(checkpoint + 1).await?;
            self.store
                .purge(published_key(checkpoint))
                .await
                .map_err(storage_error)?;
            checkpoint = next;
        }
        Ok(())
    }
}

#[async_trait]
impl PublicationLedger for KvLedger {
    async fn checkpoint(&self) -> RegistryResult<u64> {
        Ok(self.read_position(CHECKPOINT_KEY).await?.unwrap_or(1))
    }

    async fn may_publish(&self, aggregate_id: Uuid) -> RegistryResult<bool> {
        Ok(self.read_position(&deferred_key(aggregate_id)).await?.is_none())
    }

    async fn record_published(&self, position: u64) -> RegistryResult<()> {
        if position < self.checkpoint().await? {
            return Ok(());
        }
        self.store
            .put(published_key(position), encode(position).into())
            .await
            .map_err(storage_error)?;
        self.compact().await
    }

    async fn record_deferred(&self, aggregate_id: Uuid, position: u64) -> RegistryResult<()> {
        let key = deferred_key(aggregate_id);
        let latest = match self.read_position(&key).await? {
            Some(existing) => existing.max(position),
            None => position,
        };
        self.store
            .put(key, encode(latest).into())
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn is_published(&self, position: u64) -> RegistryResult<bool> {
        if position < self.checkpoint().await? {
            return Ok(true);
        }
        Ok(self
            .store
            .get(published_key(position))
            .await
            .map_err(storage_error)?
            .is_some())
    }

    async fn advance_past(&self, commit: &Commit) -> RegistryResult<()> {
        let key = published_key(commit.position);
        if self.store.get(&key).await.map_err(storage_error)?.is_some() {
            self.store.purge(&key).await.map_err(storage_error)?;
        }
        self.raise_checkpoint(commit.position + 1).await?;
        self.compact().await?;

        let key = deferred_key(commit.aggregate_id);
        if let Some(latest) = self.read_position(&key).await? {
            if latest <= commit.position {
                self.store.purge(&key).await.map_err(storage_error)?;
            }
        }
        Ok(())
    }
}
