// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS connection handling
//!
//! Thin wrapper over `async_nats` shared by the JetStream-backed event store,
//! broker and read store.

use async_nats::{jetstream, Client, ConnectOptions};
use std::time::Duration;
use tracing::info;

use crate::errors::{RegistryError, RegistryResult};

/// Configuration for NATS connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatsConfig {
    /// NATS server URLs
    pub servers: Vec<String>,
    /// Client name
    pub name: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout
    pub request_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "user-registry".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Connected NATS client with JetStream access
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    /// Connect with the given configuration
    pub async fn connect(config: &NatsConfig) -> RegistryResult<Self> {
        let connect_options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout));

        let client = async_nats::connect_with_options(config.servers.join(","), connect_options)
            .await
            .map_err(|e| RegistryError::Persistence(format!("NATS connection failed: {}", e)))?;

        info!(servers = ?config.servers, "Connected to NATS");

        let jetstream = jetstream::new(client.clone());
        Ok(Self { client, jetstream })
    }

    /// JetStream context for streams, consumers and KV buckets
    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Get the underlying NATS client for advanced operations
    pub fn inner(&self) -> &Client {
        &self.client
    }
}
