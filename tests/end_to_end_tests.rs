// Copyright (c) 2025 - Cowboy AI, Inc.
//! End-to-end tests over the in-memory adapters
//!
//! Commands go through the registry, events through the broker and the
//! projection consumer, and queries read what the consumer wrote.

mod fixtures;

use fixtures::*;
use pretty_assertions::assert_eq;
use std::time::Duration;
use uuid::Uuid;

use cim_user_registry::aggregate::{CreateUserCommand, DeleteUserCommand, UpdateUserCommand};
use cim_user_registry::event_store::EventStore;
use cim_user_registry::events::UserEvent;
use cim_user_registry::outbox::PublicationLedger;
use cim_user_registry::publisher::EventPublisher;
use cim_user_registry::read_store::ReadStore;
use cim_user_registry::{Command, PublishStatus, Query, RegistryError, UserRead};

async fn user(test: &TestRegistry, id: Uuid) -> Option<UserRead> {
    test.registry.get_user(id).await.ok()
}

/// The user's read entry is a tombstone at `version`
async fn tombstoned_at(test: &TestRegistry, id: Uuid, version: u64) -> bool {
    let entry = test.read_store.find_entry(id).await.ok().flatten();
    entry.map(|row| row.is_tombstone() && row.version == version) == Some(true)
}

fn create(id: Uuid, name: &str, email: &str) -> Command {
    Command::Create(CreateUserCommand::new(name, email, "hunter2").with_id(id))
}

#[tokio::test]
async fn test_create_rename_delete_scenario() {
    let test = TestRegistry::with_clock(ticking_clock());
    let t = &test;
    let consumer = test.registry.projection_consumer().start().await.unwrap();
    let id = user_id_1();

    // Create Alice
    let receipt = test
        .registry
        .execute(create(id, "Alice", "alice@x.com"))
        .await
        .unwrap();
    assert_eq!(receipt.aggregate_id, id);
    assert_eq!(receipt.version, 1);
    assert_eq!(receipt.publish, PublishStatus::Published);

    eventually("Alice projected", || async move { user(t, id).await.is_some() }).await;
    let alice = user(t, id).await.unwrap();
    let users = test.registry.query(Query::ListUsers).await.unwrap();
    assert_eq!(
        users,
        vec![UserRead {
            id,
            name: "Alice".to_string(),
            email: "alice@x.com".to_string(),
            is_active: true,
            last_updated: alice.last_updated,
            version: 1,
        }]
    );

    // Rename to Bob; email is untouched, lastUpdated moves on
    test.registry
        .execute(Command::Update(UpdateUserCommand::new(id).name("Bob")))
        .await
        .unwrap();

    eventually("rename projected", || async move {
        user(t, id).await.map(|u| u.name) == Some("Bob".to_string())
    })
    .await;
    let bob = user(t, id).await.unwrap();
    assert_eq!(bob.email, "alice@x.com");
    assert_eq!(bob.version, 2);
    assert!(bob.last_updated > alice.last_updated);

    // Delete
    test.registry
        .execute(Command::Delete(DeleteUserCommand::new(id)))
        .await
        .unwrap();

    eventually("row removed", || async move { user(t, id).await.is_none() }).await;
    assert!(test.registry.query(Query::ListUsers).await.unwrap().is_empty());

    let history = test.event_store.read_events(id).await.unwrap();
    let kinds: Vec<&str> = history.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(kinds, vec!["Created", "Updated", "Deleted"]);

    consumer.shutdown().await;
}

#[tokio::test]
async fn test_mutating_unknown_user_is_not_found() {
    let test = TestRegistry::new();
    let id = user_id_2();

    let update = test
        .registry
        .execute(Command::Update(UpdateUserCommand::new(id).email("x@y.z")))
        .await;
    let delete = test
        .registry
        .execute(Command::Delete(DeleteUserCommand::new(id)))
        .await;

    assert!(matches!(update, Err(RegistryError::NotFound(missing)) if missing == id));
    assert!(matches!(delete, Err(RegistryError::NotFound(missing)) if missing == id));
    assert_eq!(test.event_store.commit_count().await, 0);
}

#[tokio::test]
async fn test_create_on_existing_id_is_invalid_state() {
    let test = TestRegistry::new();
    let id = user_id_1();

    test.registry
        .execute(create(id, "Alice", "alice@x.com"))
        .await
        .unwrap();
    let again = test.registry.execute(create(id, "Eve", "eve@x.com")).await;

    assert!(matches!(again, Err(RegistryError::InvalidState(_))));
    assert_eq!(test.event_store.get_version(id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_deleted_user_rejects_further_commands() {
    let test = TestRegistry::new();
    let id = user_id_1();

    test.registry
        .execute(create(id, "Alice", "alice@x.com"))
        .await
        .unwrap();
    test.registry
        .execute(Command::Delete(DeleteUserCommand::new(id)))
        .await
        .unwrap();

    let result = test
        .registry
        .execute(Command::Update(UpdateUserCommand::new(id).name("Bob")))
        .await;

    assert!(matches!(result, Err(RegistryError::NotFound(_))));
}

#[tokio::test]
async fn test_noop_update_appends_nothing() {
    let test = TestRegistry::new();
    let id = user_id_1();
    test.registry
        .execute(create(id, "Alice", "alice@x.com"))
        .await
        .unwrap();

    let receipt = test
        .registry
        .execute(Command::Update(UpdateUserCommand::new(id).name("Alice").email("")))
        .await
        .unwrap();

    assert_eq!(receipt.publish, PublishStatus::NotRequired);
    assert_eq!(receipt.version, 1);
    assert_eq!(test.event_store.commit_count().await, 1);
}

#[tokio::test]
async fn test_failed_append_publishes_nothing() {
    let test = TestRegistry::new();
    test.event_store.set_fail_appends(true);

    let result = test
        .registry
        .execute(create(user_id_1(), "Alice", "alice@x.com"))
        .await;

    assert!(matches!(result, Err(RegistryError::Persistence(_))));
    assert_eq!(test.broker.published_count("users.events").await, 0);
}

#[tokio::test]
async fn test_slow_append_times_out() {
    let mut config = test_config();
    config.append_timeout = Duration::from_millis(20);
    let test = TestRegistry::with_config(config);
    test.event_store.set_append_delay(Duration::from_millis(200));

    let result = test
        .registry
        .execute(create(user_id_1(), "Alice", "alice@x.com"))
        .await;

    assert!(matches!(result, Err(RegistryError::Timeout(_))));
}

#[tokio::test]
async fn test_publish_failure_is_deferred_and_relayed() {
    let test = TestRegistry::new();
    let t = &test;
    let consumer = test.registry.projection_consumer().start().await.unwrap();
    let id = user_id_1();

    test.broker.set_available(false);
    let receipt = test
        .registry
        .execute(create(id, "Alice", "alice@x.com"))
        .await
        .unwrap();

    assert_eq!(receipt.publish, PublishStatus::Deferred);
    assert_eq!(test.event_store.commit_count().await, 1);
    assert!(user(t, id).await.is_none());

    test.broker.set_available(true);
    let report = test.registry.outbox_relay().run_once().await.unwrap();
    assert_eq!(report.republished, 1);

    eventually("relayed commit projected", || async move {
        user(t, id).await.is_some()
    })
    .await;

    consumer.shutdown().await;
}

#[tokio::test]
async fn test_later_commits_wait_behind_deferred_ones() {
    let test = TestRegistry::new();
    let id = user_id_1();

    test.broker.set_available(false);
    test.registry
        .execute(create(id, "Alice", "alice@x.com"))
        .await
        .unwrap();
    test.broker.set_available(true);

    // Broker is back, but publishing now would overtake the Created event
    let receipt = test
        .registry
        .execute(Command::Update(UpdateUserCommand::new(id).name("Bob")))
        .await
        .unwrap();
    assert_eq!(receipt.publish, PublishStatus::Deferred);
    assert_eq!(test.broker.published_count("users.events").await, 0);

    let report = test.registry.outbox_relay().run_once().await.unwrap();
    assert_eq!(report.republished, 2);

    let partition = cim_user_registry::subjects::partition_for(id, test_config().partitions);
    let log = test.broker.partition_log("users.events", partition).await;
    let sequences: Vec<u64> = log
        .iter()
        .map(|m| {
            serde_json::from_slice::<cim_user_registry::StoredEvent>(&m.payload)
                .unwrap()
                .sequence
        })
        .collect();
    assert_eq!(sequences, vec![1, 2]);

    // Released: the next command publishes directly again
    let receipt = test
        .registry
        .execute(Command::Delete(DeleteUserCommand::new(id)))
        .await
        .unwrap();
    assert_eq!(receipt.publish, PublishStatus::Published);
}

#[tokio::test]
async fn test_relay_spawned_task_delivers_deferred_commits() {
    let test = TestRegistry::new();
    let t = &test;
    let consumer = test.registry.projection_consumer().start().await.unwrap();
    let (stop, stop_rx) = tokio::sync::watch::channel(false);
    let relay = test.registry.outbox_relay().spawn(stop_rx);

    test.broker.set_available(false);
    for id in [user_id_1(), user_id_2(), user_id_3()] {
        test.registry
            .execute(create(id, "User", "user@x.com"))
            .await
            .unwrap();
    }
    test.broker.set_available(true);

    eventually("all relayed users projected", || async move {
        t.read_store.len().await == 3
    })
    .await;

    stop.send(true).unwrap();
    relay.await.unwrap();
    consumer.shutdown().await;
}

#[tokio::test]
async fn test_relay_in_another_process_skips_published_commits() {
    let test = TestRegistry::new();
    let id = user_id_1();
    test.registry
        .execute(create(id, "Alice", "alice@x.com"))
        .await
        .unwrap();
    test.registry
        .execute(Command::Delete(DeleteUserCommand::new(id)))
        .await
        .unwrap();
    assert_eq!(test.broker.published_count("users.events").await, 2);

    let report = test.sibling().outbox_relay().run_once().await.unwrap();

    assert_eq!(report.republished, 0);
    assert_eq!(report.checkpoint, 3);
    assert_eq!(test.broker.published_count("users.events").await, 2);
}

#[tokio::test]
async fn test_stale_created_after_delete_keeps_user_deleted() {
    let test = TestRegistry::new();
    let t = &test;
    let consumer = test.registry.projection_consumer().start().await.unwrap();
    let id = user_id_1();

    test.registry
        .execute(create(id, "Alice", "alice@x.com"))
        .await
        .unwrap();
    test.registry
        .execute(Command::Delete(DeleteUserCommand::new(id)))
        .await
        .unwrap();
    eventually("delete projected", || async move { tombstoned_at(t, id, 2).await }).await;

    // A republished Created arriving after the Deleted
    let publisher = EventPublisher::new(
        std::sync::Arc::new(test.broker.clone()),
        "users.events",
        Duration::from_secs(1),
    );
    publisher
        .publish_event(&created(id, "Alice", "alice@x.com", 1))
        .await
        .unwrap();

    let c = &consumer;
    eventually("stale Created consumed", || async move { c.processed() == 3 }).await;
    assert!(user(t, id).await.is_none());
    assert!(test.registry.query(Query::ListUsers).await.unwrap().is_empty());

    consumer.shutdown().await;
}

#[tokio::test]
async fn test_ledger_stays_bounded_without_a_relay() {
    let test = TestRegistry::new();

    for _ in 0..50 {
        let receipt = test
            .registry
            .execute(create(Uuid::now_v7(), "User", "user@x.com"))
            .await
            .unwrap();
        assert_eq!(receipt.publish, PublishStatus::Published);
    }

    assert_eq!(test.ledger.pending().await, 0);
    assert_eq!(test.registry.ledger().checkpoint().await.unwrap(), 51);
}

#[tokio::test]
async fn test_transient_read_store_failures_are_retried() {
    let test = TestRegistry::new();
    let t = &test;
    let consumer = test.registry.projection_consumer().start().await.unwrap();
    test.read_store.fail_next_writes(2);

    let id = user_id_1();
    test.registry
        .execute(create(id, "Alice", "alice@x.com"))
        .await
        .unwrap();

    eventually("projected after retries", || async move {
        user(t, id).await.is_some()
    })
    .await;

    consumer.shutdown().await;
}

#[tokio::test]
async fn test_update_without_row_reports_fault() {
    let test = TestRegistry::new();
    let t = &test;
    let mut consumer = test.registry.projection_consumer().start().await.unwrap();
    let id = user_id_3();

    let publisher = EventPublisher::new(
        std::sync::Arc::new(test.broker.clone()),
        "users.events",
        Duration::from_secs(1),
    );
    publisher
        .publish_event(&updated(id, Some("Ghost"), None, 2))
        .await
        .unwrap();

    let fault = tokio::time::timeout(Duration::from_secs(2), consumer.next_fault())
        .await
        .expect("fault must be reported")
        .expect("fault channel open");

    assert_eq!(fault.aggregate_id, id);
    assert_eq!(fault.sequence, 2);
    assert!(user(t, id).await.is_none());

    consumer.shutdown().await;
}

#[tokio::test]
async fn test_rebuild_matches_live_projection() {
    let test = TestRegistry::new();
    let t = &test;
    let consumer = test.registry.projection_consumer().start().await.unwrap();

    let (alice, bob, carol) = (user_id_1(), user_id_2(), user_id_3());
    for (id, name) in [(alice, "Alice"), (bob, "Bob"), (carol, "Carol")] {
        test.registry
            .execute(create(id, name, &format!("{}@x.com", name.to_lowercase())))
            .await
            .unwrap();
    }
    test.registry
        .execute(Command::Update(UpdateUserCommand::new(bob).email("robert@x.com")))
        .await
        .unwrap();
    test.registry
        .execute(Command::Delete(DeleteUserCommand::new(carol)))
        .await
        .unwrap();

    eventually("live projection settled", || async move {
        user(t, carol).await.is_none()
            && user(t, bob).await.map(|u| u.version) == Some(2)
            && user(t, alice).await.is_some()
    })
    .await;
    consumer.shutdown().await;

    let mut live = test.registry.query(Query::ListUsers).await.unwrap();
    live.sort_by_key(|u| u.id);

    let report = test.registry.rebuild_read_model().await.unwrap();
    assert_eq!(report.commits, 5);
    assert_eq!(report.events, 5);

    let mut rebuilt = test.registry.query(Query::ListUsers).await.unwrap();
    rebuilt.sort_by_key(|u| u.id);

    assert_eq!(live, rebuilt);
}

#[tokio::test]
async fn test_password_never_reaches_events_or_rows() {
    let test = TestRegistry::new();
    let id = user_id_1();
    test.registry
        .execute(create(id, "Alice", "alice@x.com"))
        .await
        .unwrap();

    let history = test.event_store.read_events(id).await.unwrap();
    let json = serde_json::to_string(&history).unwrap();

    assert!(!json.contains("hunter2"));
    assert!(matches!(history[0].data, UserEvent::Created(_)));
}
