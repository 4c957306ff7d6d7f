// Copyright (c) 2025 - Cowboy AI, Inc.
//! Registry configuration
//!
//! All settings have defaults suitable for a local NATS server. The projector
//! binary loads overrides from `USER_REGISTRY_*` environment variables:
//!
//! | Variable                              | Default                 |
//! |---------------------------------------|-------------------------|
//! | `USER_REGISTRY_NATS_URL`              | `nats://localhost:4222` |
//! | `USER_REGISTRY_EVENT_STREAM`          | `USER_EVENTS`           |
//! | `USER_REGISTRY_LOG_SUBJECT_PREFIX`    | `users.log`             |
//! | `USER_REGISTRY_TOPIC`                 | `users.events`          |
//! | `USER_REGISTRY_PARTITIONS`            | `8`                     |
//! | `USER_REGISTRY_CONSUMER_GROUP`        | `user-read-projection`  |
//! | `USER_REGISTRY_READ_BUCKET`           | `USER_READ`             |
//! | `USER_REGISTRY_APPEND_TIMEOUT_MS`     | `5000`                  |
//! | `USER_REGISTRY_PUBLISH_TIMEOUT_MS`    | `2000`                  |
//! | `USER_REGISTRY_OUTBOX_INTERVAL_MS`    | `1000`                  |
//! | `USER_REGISTRY_OUTBOX_BATCH`          | `100`                   |
//! | `USER_REGISTRY_OUTBOX_GRACE_MS`       | `5000`                  |
//! | `USER_REGISTRY_OUTBOX_BUCKET`         | `USER_OUTBOX`           |
//! | `USER_REGISTRY_RETRY_MAX_ATTEMPTS`    | `3`                     |
//! | `USER_REGISTRY_RETRY_INITIAL_MS`      | `100`                   |
//! | `USER_REGISTRY_RETRY_MAX_MS`          | `30000`                 |

use std::str::FromStr;
use std::time::Duration;

use crate::errors::{RegistryError, RegistryResult};
use crate::nats::NatsConfig;
use crate::retry::RetryConfig;

const ENV_PREFIX: &str = "USER_REGISTRY_";

/// Outbox relay tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxConfig {
    /// Delay between relay passes
    pub poll_interval: Duration,
    /// Maximum commits read from the log per pass
    pub batch_size: usize,
    /// Commits younger than this are left to the command path
    pub grace_period: Duration,
    /// KV bucket holding the publication ledger
    pub ledger_bucket: String,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            grace_period: Duration::from_secs(5),
            ledger_bucket: "USER_OUTBOX".to_string(),
        }
    }
}

/// Complete configuration for the registry and the projector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub nats: NatsConfig,

    /// JetStream stream holding the event log
    pub event_stream: String,

    /// Log subject prefix; each aggregate writes to `<prefix>.<id>`
    pub log_subject_prefix: String,

    /// Broker topic carrying committed events
    pub topic: String,

    /// Number of topic partitions
    pub partitions: u32,

    /// Consumer group of the read-model projection
    pub consumer_group: String,

    /// KV bucket holding the read model
    pub read_model_bucket: String,

    /// Budget for one event log append
    pub append_timeout: Duration,

    /// Budget for publishing one commit
    pub publish_timeout: Duration,

    pub outbox: OutboxConfig,

    /// Backoff for transient read-store failures in the projection
    pub retry: RetryConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig::default(),
            event_stream: "USER_EVENTS".to_string(),
            log_subject_prefix: "users.log".to_string(),
            topic: "users.events".to_string(),
            partitions: 8,
            consumer_group: "user-read-projection".to_string(),
            read_model_bucket: "USER_READ".to_string(),
            append_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(2),
            outbox: OutboxConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> RegistryResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Keys are the full variable names (`USER_REGISTRY_TOPIC`, ...).
    pub fn from_lookup<F>(lookup: F) -> RegistryResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        let nats = NatsConfig {
            servers: match get("NATS_URL") {
                Some(urls) => urls.split(',').map(|s| s.trim().to_string()).collect(),
                None => defaults.nats.servers.clone(),
            },
            ..defaults.nats.clone()
        };

        let config = Self {
            nats,
            event_stream: get("EVENT_STREAM").unwrap_or(defaults.event_stream),
            log_subject_prefix: get("LOG_SUBJECT_PREFIX").unwrap_or(defaults.log_subject_prefix),
            topic: get("TOPIC").unwrap_or(defaults.topic),
            partitions: parse_or(get("PARTITIONS"), "PARTITIONS", defaults.partitions)?,
            consumer_group: get("CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            read_model_bucket: get("READ_BUCKET").unwrap_or(defaults.read_model_bucket),
            append_timeout: millis_or(
                get("APPEND_TIMEOUT_MS"),
                "APPEND_TIMEOUT_MS",
                defaults.append_timeout,
            )?,
            publish_timeout: millis_or(
                get("PUBLISH_TIMEOUT_MS"),
                "PUBLISH_TIMEOUT_MS",
                defaults.publish_timeout,
            )?,
            outbox: OutboxConfig {
                poll_interval: millis_or(
                    get("OUTBOX_INTERVAL_MS"),
                    "OUTBOX_INTERVAL_MS",
                    defaults.outbox.poll_interval,
                )?,
                batch_size: parse_or(get("OUTBOX_BATCH"), "OUTBOX_BATCH", defaults.outbox.batch_size)?,
                grace_period: millis_or(
                    get("OUTBOX_GRACE_MS"),
                    "OUTBOX_GRACE_MS",
                    defaults.outbox.grace_period,
                )?,
                ledger_bucket: get("OUTBOX_BUCKET").unwrap_or(defaults.outbox.ledger_bucket),
            },
            retry: RetryConfig {
                max_attempts: parse_or(
                    get("RETRY_MAX_ATTEMPTS"),
                    "RETRY_MAX_ATTEMPTS",
                    defaults.retry.max_attempts,
                )?,
                initial_backoff: millis_or(
                    get("RETRY_INITIAL_MS"),
                    "RETRY_INITIAL_MS",
                    defaults.retry.initial_backoff,
                )?,
                max_backoff: millis_or(
                    get("RETRY_MAX_MS"),
                    "RETRY_MAX_MS",
                    defaults.retry.max_backoff,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> RegistryResult<()> {
        if self.partitions == 0 {
            return Err(invalid("partitions must be at least 1"));
        }
        if self.nats.servers.iter().all(|s| s.is_empty()) {
            return Err(invalid("at least one NATS server is required"));
        }
        for (field, value) in [
            ("event_stream", &self.event_stream),
            ("consumer_group", &self.consumer_group),
            ("read_model_bucket", &self.read_model_bucket),
            ("outbox.ledger_bucket", &self.outbox.ledger_bucket),
        ] {
            if value.is_empty() || value.contains(['.', ' ', '*', '>']) {
                return Err(invalid(&format!("{} '{}' is not a valid name", field, value)));
            }
        }
        for (field, value) in [
            ("topic", &self.topic),
            ("log_subject_prefix", &self.log_subject_prefix),
        ] {
            if value.is_empty() || value.contains([' ', '*', '>']) || value.ends_with('.') {
                return Err(invalid(&format!("{} '{}' is not a valid subject", field, value)));
            }
        }
        if self.append_timeout.is_zero() || self.publish_timeout.is_zero() {
            return Err(invalid("timeouts must be greater than zero"));
        }
        if self.outbox.batch_size == 0 {
            return Err(invalid("outbox batch size must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry max attempts must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> RegistryError {
    RegistryError::Configuration(message.to_string())
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &str, default: T) -> RegistryResult<T> {
    match raw {
        Some(value) => value.trim().parse().map_err(|_| {
            RegistryError::Configuration(format!("{}{} has invalid value '{}'", ENV_PREFIX, name, value))
        }),
        None => Ok(default),
    }
}

fn millis_or(raw: Option<String>, name: &str, default: Duration) -> RegistryResult<Duration> {
    match raw {
        Some(_) => parse_or(raw, name, 0u64).map(Duration::from_millis),
        None => Ok(default),
    }
}
