// Copyright (c) 2025 - Cowboy AI, Inc.

//! JetStream stream setup
//!
//! Both the event log and the broker topic live in JetStream streams:
//! - **Event log**: `USER_EVENTS` over `users.log.>`, limits retention, never expires
//! - **Topic**: one stream per topic over `<topic>.>`, limits retention with max age
//!
//! # Example
//!
//! ```rust,no_run
//! use cim_user_registry::jetstream::{StreamSettings, ensure_stream};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = async_nats::connect("nats://localhost:4222").await?;
//!     let jetstream = async_nats::jetstream::new(client);
//!
//!     let settings = StreamSettings::event_log("USER_EVENTS", "users.log");
//!     let stream = ensure_stream(&jetstream, settings).await?;
//!
//!     Ok(())
//! }
//! ```

use async_nats::jetstream::{self, stream::Stream};
use std::time::Duration;
use tracing::debug;

use crate::errors::{RegistryError, RegistryResult};
use crate::subjects::{log_wildcard, topic_wildcard};

/// Storage type for JetStream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// File-based storage (persistent across restarts)
    File,
    /// Memory-based storage (faster, but lost on restart)
    Memory,
}

/// Settings for one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub stream_name: String,

    /// Subjects captured by the stream
    pub subjects: Vec<String>,

    /// Maximum age of messages; zero keeps them forever
    pub max_age: Duration,

    /// Window in which `Nats-Msg-Id` duplicates are dropped
    pub duplicate_window: Duration,

    pub storage: StorageType,

    /// Number of replicas (for clustered NATS)
    pub replicas: usize,
}

impl StreamSettings {
    /// Event log stream: kept forever, the source of truth
    pub fn event_log(stream_name: &str, subject_prefix: &str) -> Self {
        Self {
            stream_name: stream_name.to_string(),
            subjects: vec![log_wildcard(subject_prefix)],
            max_age: Duration::ZERO,
            duplicate_window: Duration::from_secs(120),
            storage: StorageType::File,
            replicas: 1,
        }
    }

    /// Broker topic stream: transport only, expires after 7 days
    pub fn topic(topic: &str) -> Self {
        Self {
            stream_name: topic_stream_name(topic),
            subjects: vec![topic_wildcard(topic)],
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            duplicate_window: Duration::from_secs(120),
            storage: StorageType::File,
            replicas: 1,
        }
    }
}

/// Stream name backing a topic (`users.events` → `USERS_EVENTS`)
pub fn topic_stream_name(topic: &str) -> String {
    topic.replace(['.', '-'], "_").to_uppercase()
}

/// Create the stream, or return it if it already exists
pub async fn ensure_stream(
    jetstream: &jetstream::Context,
    settings: StreamSettings,
) -> RegistryResult<Stream> {
    let storage = match settings.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let stream_config = jetstream::stream::Config {
        name: settings.stream_name.clone(),
        subjects: settings.subjects,
        max_age: settings.max_age,
        duplicate_window: settings.duplicate_window,
        storage,
        num_replicas: settings.replicas,
        retention: jetstream::stream::RetentionPolicy::Limits,
        ..Default::default()
    };

    let stream = jetstream
        .get_or_create_stream(stream_config)
        .await
        .map_err(|e| RegistryError::Persistence(format!("stream {}: {}", settings.stream_name, e)))?;

    debug!(stream = %settings.stream_name, "JetStream stream ready");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_settings() {
        let settings = StreamSettings::event_log("USER_EVENTS", "users.log");
        assert_eq!(settings.subjects, vec!["users.log.>".to_string()]);
        assert!(settings.max_age.is_zero());
    }

    #[test]
    fn test_topic_stream_name() {
        assert_eq!(topic_stream_name("users.events"), "USERS_EVENTS");
        assert_eq!(StreamSettings::topic("users.events").subjects, vec!["users.events.>"]);
    }
}
