// Copyright (c) 2025 - Cowboy AI, Inc.
//! JetStream key-value read store
//!
//! One KV entry per user, keyed by the user id, holding the JSON row.
//! Tombstones are ordinary entries with `isActive: false`.

use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{RegistryError, RegistryResult};
use crate::nats::NatsClient;
use crate::read_store::{ReadStore, UserRead};

fn storage_error(e: impl std::fmt::Display) -> RegistryError {
    RegistryError::Persistence(e.to_string())
}

/// Read store backed by a JetStream KV bucket
pub struct KvReadStore {
    store: kv::Store,
}

impl KvReadStore {
    /// Open the bucket, creating it if needed
    pub async fn open(client: &NatsClient, bucket: &str) -> RegistryResult<Self> {
        let jetstream = client.jetstream();

        let store = match jetstream.get_key_value(bucket).await {
            Ok(store) => store,
            Err(_) => {
                info!(bucket = %bucket, "Creating read model bucket");
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

    async fn all_keys(&self) -> RegistryResult<Vec<String>> {
        let mut keys = self.store.keys().await.map_err(storage_error)?;
        let mut collected = Vec::new();
        while let Some(key) = keys.next().await {
            collected.push(key.map_err(storage_error)?);
        }
        Ok(collected)
    }
}

#[async_trait]
impl ReadStore for KvReadStore {
    async fn find_entry(&self, id: Uuid) -> RegistryResult<Option<UserRead>> {
        let entry = self.store.get(id.to_string()).await.map_err(storage_error)?;
        entry
            .map(|bytes| {
                serde_json::from_slice(&bytes)
                    .map_err(|e| RegistryError::Deserialization(e.to_string()))
            })
            .transpose()
    }

    async fn upsert(&self, row: UserRead) -> RegistryResult<()> {
        let payload = serde_json::to_vec(&row)?;
        self.store
            .put(row.id.to_string(), payload.into())
            .await
            .map_err(storage_error)?;
        debug!(user_id = %row.id, version = row.version, "Upserted read row");
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RegistryResult<()> {
        self.store
            .purge(id.to_string())
            .await
            .map_err(storage_error)
    }

    async fn list(&self) -> RegistryResult<Vec<UserRead>> {
        let mut rows = Vec::new();
        for key in self.all_keys().await? {
            if let Some(bytes) = self.store.get(key).await.map_err(storage_error)? {
                let row: UserRead = serde_json::from_slice(&bytes)
                    .map_err(|e| RegistryError::Deserialization(e.to_string()))?;
                if !row.is_tombstone() {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }

    async fn clear(&self) -> RegistryResult<()> {
        for key in self.all_keys().await? {
            self.store.purge(key).await.map_err(storage_error)?;
        }
        Ok(())
    }
}
