// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-user-registry
//!
//! Deterministic ids, timestamps and event envelopes, plus an in-memory
//! registry whose adapters stay reachable for failure injection.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use cim_user_registry::broker::InMemoryBroker;
use cim_user_registry::event_store::InMemoryEventStore;
use cim_user_registry::outbox::InMemoryLedger;
use cim_user_registry::events::{StoredEvent, UserCreated, UserDeleted, UserEvent, UserUpdated};
use cim_user_registry::projection::Clock;
use cim_user_registry::read_store::InMemoryReadStore;
use cim_user_registry::retry::RetryConfig;
use cim_user_registry::{OutboxConfig, RegistryConfig, UserRegistry};

pub const USER_ID_1: &str = "01934f4a-1000-7000-8000-000000001000";
pub const USER_ID_2: &str = "01934f4a-1001-7000-8000-000000001001";
pub const USER_ID_3: &str = "01934f4a-1002-7000-8000-000000001002";

pub const COMMIT_ID_1: &str = "01934f4a-c001-7000-8000-00000000c001";

// Fixed test timestamp (2026-01-19T12:00:00Z)
pub const FIXED_TIMESTAMP: &str = "2026-01-19T12:00:00Z";

/// Parse a fixed UUID from a constant string
pub fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).expect("Invalid UUID in test fixture")
}

pub fn user_id_1() -> Uuid {
    parse_uuid(USER_ID_1)
}

pub fn user_id_2() -> Uuid {
    parse_uuid(USER_ID_2)
}

pub fn user_id_3() -> Uuid {
    parse_uuid(USER_ID_3)
}

/// Parse the fixed timestamp
pub fn fixed_timestamp() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(FIXED_TIMESTAMP)
        .expect("Invalid timestamp in test fixture")
        .with_timezone(&Utc)
}

/// Clock frozen at [`FIXED_TIMESTAMP`]
pub fn fixed_clock() -> Clock {
    Arc::new(fixed_timestamp)
}

/// Clock starting at [`FIXED_TIMESTAMP`] that moves one second per reading
pub fn ticking_clock() -> Clock {
    let ticks = Arc::new(AtomicI64::new(0));
    Arc::new(move || {
        let tick = ticks.fetch_add(1, Ordering::SeqCst);
        fixed_timestamp() + chrono::Duration::seconds(tick)
    })
}

fn envelope(data: UserEvent, sequence: u64) -> StoredEvent {
    StoredEvent::new(
        data,
        sequence,
        sequence,
        parse_uuid(COMMIT_ID_1),
        fixed_timestamp(),
    )
}

pub fn created(id: Uuid, name: &str, email: &str, sequence: u64) -> StoredEvent {
    envelope(
        UserEvent::Created(UserCreated {
            id,
            name: name.to_string(),
            email: email.to_string(),
        }),
        sequence,
    )
}

pub fn updated(id: Uuid, name: Option<&str>, email: Option<&str>, sequence: u64) -> StoredEvent {
    envelope(
        UserEvent::Updated(UserUpdated {
            id,
            name: name.map(str::to_string),
            email: email.map(str::to_string),
        }),
        sequence,
    )
}

pub fn deleted(id: Uuid, sequence: u64) -> StoredEvent {
    envelope(UserEvent::Deleted(UserDeleted { id }), sequence)
}

/// Configuration tuned for tests: small partitions, no grace, fast retries
pub fn test_config() -> RegistryConfig {
    RegistryConfig {
        partitions: 4,
        publish_timeout: Duration::from_millis(500),
        outbox: OutboxConfig {
            poll_interval: Duration::from_millis(10),
            batch_size: 2,
            grace_period: Duration::ZERO,
            ..OutboxConfig::default()
        },
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
        ..RegistryConfig::default()
    }
}

/// In-memory registry with handles on every adapter
pub struct TestRegistry {
    pub registry: UserRegistry,
    pub event_store: Arc<InMemoryEventStore>,
    pub broker: InMemoryBroker,
    pub read_store: Arc<InMemoryReadStore>,
    pub ledger: Arc<InMemoryLedger>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self::build(config, fixed_clock())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self::build(test_config(), clock)
    }

    fn build(config: RegistryConfig, clock: Clock) -> Self {
        let event_store = Arc::new(InMemoryEventStore::new());
        let broker = InMemoryBroker::new(config.partitions);
        let read_store = Arc::new(InMemoryReadStore::new());
        let ledger = Arc::new(InMemoryLedger::new());

        let registry = UserRegistry::builder()
            .with_config(config)
            .event_store(event_store.clone())
            .broker(Arc::new(broker.clone()))
            .read_store(read_store.clone())
            .ledger(ledger.clone())
            .clock(clock)
            .build()
            .expect("test registry must build");

        Self {
            registry,
            event_store,
            broker,
            read_store,
            ledger,
        }
    }

    /// Second registry over the same log, broker and ledger, as another process would see them
    pub fn sibling(&self) -> UserRegistry {
        UserRegistry::builder()
            .with_config(test_config())
            .event_store(self.event_store.clone())
            .broker(Arc::new(self.broker.clone()))
            .read_store(self.read_store.clone())
            .ledger(self.ledger.clone())
            .clock(fixed_clock())
            .build()
            .expect("sibling registry must build")
    }
}

/// Poll `check` until it returns `true`, failing the test after two seconds
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
