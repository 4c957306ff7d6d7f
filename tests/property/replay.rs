// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Aggregate Replay
//!
//! Histories are generated by running random command sequences through the
//! aggregate, so every generated history is one the command path could write.

use proptest::prelude::*;

use crate::fixtures::user_id_1;
use cim_user_registry::aggregate::{apply_event, UserAggregate, UserLifecycle, UserState};
use cim_user_registry::events::UserEvent;

#[derive(Debug, Clone)]
pub enum Step {
    Update {
        name: Option<String>,
        email: Option<String>,
    },
    Delete,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (
            proptest::option::of("[A-Z][a-z]{0,5}"),
            proptest::option::of("[a-z]{1,4}@x"),
        )
            .prop_map(|(name, email)| Step::Update { name, email }),
        1 => Just(Step::Delete),
    ]
}

/// A valid history: one Created, then whatever the commands produced
pub fn history_strategy() -> impl Strategy<Value = Vec<UserEvent>> {
    (
        "[A-Z][a-z]{0,5}",
        "[a-z]{1,4}@x",
        prop::collection::vec(step_strategy(), 0..12),
    )
        .prop_map(|(name, email, steps)| {
            let mut user = UserAggregate::new(user_id_1());
            user.create(&name, &email)
                .expect("fresh aggregate accepts create");
            for step in steps {
                // Rejected commands (after Delete) record nothing
                let _ = match step {
                    Step::Update { name, email } => user
                        .update(name.as_deref(), email.as_deref())
                        .map(|_| ()),
                    Step::Delete => user.mark_deleted(),
                };
            }
            user.uncommitted_events().to_vec()
        })
}

proptest! {
    #[test]
    fn prop_replay_is_deterministic(history in history_strategy()) {
        prop_assert_eq!(UserState::from_events(&history), UserState::from_events(&history));
    }

    #[test]
    fn prop_replay_composes_over_prefixes(history in history_strategy(), split in 0usize..16) {
        let split = split.min(history.len());
        let (prefix, rest) = history.split_at(split);

        let resumed = rest.iter().fold(UserState::from_events(prefix), apply_event);

        prop_assert_eq!(resumed, UserState::from_events(&history));
    }

    #[test]
    fn prop_history_has_one_create_and_terminal_delete(history in history_strategy()) {
        prop_assert!(matches!(history[0], UserEvent::Created(_)));
        let creates = history.iter().filter(|e| matches!(e, UserEvent::Created(_))).count();
        prop_assert_eq!(creates, 1);

        if let Some(position) = history.iter().position(|e| matches!(e, UserEvent::Deleted(_))) {
            prop_assert_eq!(position, history.len() - 1);
            prop_assert_eq!(UserState::from_events(&history).lifecycle, UserLifecycle::Deleted);
        }
    }

    #[test]
    fn prop_last_written_fields_win(history in history_strategy()) {
        let mut name = String::new();
        let mut email = String::new();
        for event in &history {
            match event {
                UserEvent::Created(e) => {
                    name = e.name.clone();
                    email = e.email.clone();
                }
                UserEvent::Updated(e) => {
                    if let Some(n) = &e.name {
                        name = n.clone();
                    }
                    if let Some(m) = &e.email {
                        email = m.clone();
                    }
                }
                UserEvent::Deleted(_) => {}
            }
        }

        let state = UserState::from_events(&history);
        prop_assert_eq!(state.name, name);
        prop_assert_eq!(state.email, email);
    }
}
