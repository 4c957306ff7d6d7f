// Copyright (c) 2025 - Cowboy AI, Inc.
//! User aggregate tests
//!
//! Replay, command validity and the wire shape of the events.

mod fixtures;

use fixtures::*;
use pretty_assertions::assert_eq;
use serde_json::json;

use cim_user_registry::aggregate::{
    apply_event, handle_create_user, CommandError, UserAggregate, UserLifecycle, UserState,
};
use cim_user_registry::events::{UserCreated, UserEvent, UserUpdated};

fn created_event(name: &str, email: &str) -> UserEvent {
    UserEvent::Created(UserCreated {
        id: user_id_1(),
        name: name.to_string(),
        email: email.to_string(),
    })
}

#[test]
fn test_replay_applies_partial_updates() {
    let history = vec![
        created_event("A", "a@x"),
        UserEvent::Updated(UserUpdated {
            id: user_id_1(),
            name: Some("B".to_string()),
            email: None,
        }),
    ];

    let state = UserState::from_events(&history);

    assert_eq!(
        state,
        UserState {
            lifecycle: UserLifecycle::Active,
            name: "B".to_string(),
            email: "a@x".to_string(),
        }
    );
}

#[test]
fn test_replay_is_a_left_fold() {
    let history = vec![
        created_event("A", "a@x"),
        UserEvent::Updated(UserUpdated {
            id: user_id_1(),
            name: None,
            email: Some("b@x".to_string()),
        }),
    ];

    let folded = history.iter().fold(UserState::default(), apply_event);

    assert_eq!(folded, UserState::from_events(&history));
}

#[test]
fn test_loaded_aggregate_tracks_version() {
    let history = vec![created_event("Alice", "alice@x.com")];

    let user = UserAggregate::from_history(user_id_1(), &history);

    assert_eq!(user.version(), 1);
    assert!(user.state().is_active());
    assert!(!user.has_uncommitted());
}

#[test]
fn test_commands_on_empty_history() {
    let mut user = UserAggregate::new(user_id_1());

    assert_eq!(
        user.update(Some("Bob"), None),
        Err(CommandError::NotCreated(user_id_1()))
    );
    assert_eq!(user.mark_deleted(), Err(CommandError::NotCreated(user_id_1())));
    assert!(!user.has_uncommitted());
}

#[test]
fn test_create_on_existing_history() {
    let state = UserState::from_events(&[created_event("Alice", "alice@x.com")]);

    let result = handle_create_user(&state, user_id_1(), "Eve", "eve@x.com");

    assert_eq!(result, Err(CommandError::AlreadyExists(user_id_1())));
}

#[test]
fn test_wire_format_is_tagged_by_type() {
    let event = created_event("Alice", "alice@x.com");
    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        json!({"type": "Created", "id": USER_ID_1, "name": "Alice", "email": "alice@x.com"})
    );

    let update: UserEvent =
        serde_json::from_value(json!({"type": "Updated", "id": USER_ID_1, "name": "Bob"})).unwrap();
    assert_eq!(
        update,
        UserEvent::Updated(UserUpdated {
            id: user_id_1(),
            name: Some("Bob".to_string()),
            email: None,
        })
    );

    let delete: UserEvent =
        serde_json::from_value(json!({"type": "Deleted", "id": USER_ID_1})).unwrap();
    assert_eq!(delete.aggregate_id(), user_id_1());
}

#[test]
fn test_envelope_carries_metadata() {
    let envelope = created(user_id_1(), "Alice", "alice@x.com", 1);

    let value = serde_json::to_value(&envelope).unwrap();

    assert_eq!(value["aggregate_id"], json!(USER_ID_1));
    assert_eq!(value["sequence"], json!(1));
    assert_eq!(value["event_type"], json!("Created"));
    assert_eq!(value["data"]["type"], json!("Created"));
}
