// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Projection Idempotence
//!
//! At-least-once delivery means any event may arrive more than once. The read
//! row must end up the same as if every event had arrived exactly once.

use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use super::replay::history_strategy;
use crate::fixtures::{fixed_clock, fixed_timestamp, user_id_1, COMMIT_ID_1};
use cim_user_registry::aggregate::UserState;
use cim_user_registry::events::{StoredEvent, UserEvent};
use cim_user_registry::projection::{DynProjection, ProjectionAdapter, UserReadProjection};
use cim_user_registry::read_store::{InMemoryReadStore, ReadStore, UserRead};

fn envelopes(history: &[UserEvent]) -> Vec<StoredEvent> {
    let commit_id = Uuid::parse_str(COMMIT_ID_1).unwrap();
    history
        .iter()
        .zip(1u64..)
        .map(|(event, sequence)| {
            StoredEvent::new(event.clone(), sequence, sequence, commit_id, fixed_timestamp())
        })
        .collect()
}

/// Project the deliveries in order and return the resulting row
fn project(deliveries: Vec<StoredEvent>) -> Option<UserRead> {
    tokio_test::block_on(async {
        let store = Arc::new(InMemoryReadStore::new());
        let projection: DynProjection =
            Arc::new(UserReadProjection::new(store.clone(), fixed_clock()));

        for event in deliveries {
            projection
                .project(event)
                .await
                .expect("in-order deliveries never hit an inconsistency");
        }
        store.find(user_id_1()).await.expect("in-memory store is available")
    })
}

proptest! {
    #[test]
    fn prop_immediate_duplicates_are_harmless(history in history_strategy()) {
        let once = envelopes(&history);
        let twice: Vec<StoredEvent> = once
            .iter()
            .flat_map(|event| [event.clone(), event.clone()])
            .collect();

        prop_assert_eq!(project(twice), project(once));
    }

    #[test]
    fn prop_full_redelivery_converges(history in history_strategy()) {
        let once = envelopes(&history);
        let replayed: Vec<StoredEvent> = once.iter().chain(once.iter()).cloned().collect();

        prop_assert_eq!(project(replayed), project(once));
    }

    #[test]
    fn prop_late_redelivery_of_any_event_changes_nothing(
        history in history_strategy(),
        pick in any::<prop::sample::Index>(),
    ) {
        let once = envelopes(&history);
        let mut late = once.clone();
        late.push(once[pick.index(once.len())].clone());

        prop_assert_eq!(project(late), project(once));
    }

    #[test]
    fn prop_projection_agrees_with_replay(history in history_strategy()) {
        let state = UserState::from_events(&history);
        let row = project(envelopes(&history));

        match row {
            Some(row) => {
                prop_assert!(state.is_active());
                prop_assert_eq!(row.name, state.name);
                prop_assert_eq!(row.email, state.email);
                prop_assert_eq!(row.version, history.len() as u64);
            }
            None => prop_assert!(!state.is_active()),
        }
    }
}
