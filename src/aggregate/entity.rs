// Copyright (c) 2025 - Cowboy AI, Inc.
//! Generic event-sourced entity
//!
//! [`EventSourced`] composes an aggregate state with the bookkeeping every
//! aggregate needs: the committed version and the list of events recorded
//! since load. The state itself only changes through [`EventSourcedState::apply`].

use uuid::Uuid;

/// State that can be rebuilt by folding its events
///
/// `apply` must be pure and total: the same state and event always produce
/// the same result, and applying never fails (events are facts).
pub trait EventSourcedState: Clone + Default {
    /// Event type folded into this state
    type Event: Clone;

    /// Fold one event into the state
    fn apply(self, event: &Self::Event) -> Self;
}

/// Aggregate root wrapper holding state plus pending events
#[derive(Debug, Clone, PartialEq)]
pub struct EventSourced<S: EventSourcedState> {
    id: Uuid,
    state: S,
    version: u64,
    uncommitted: Vec<S::Event>,
}

impl<S: EventSourcedState> EventSourced<S> {
    /// Empty aggregate (no history)
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: S::default(),
            version: 0,
            uncommitted: Vec::new(),
        }
    }

    /// Reconstruct from committed history in log order
    pub fn from_history<'a, I>(id: Uuid, history: I) -> Self
    where
        I: IntoIterator<Item = &'a S::Event>,
        S::Event: 'a,
    {
        let mut version = 0;
        let state = history.into_iter().fold(S::default(), |state, event| {
            version += 1;
            state.apply(event)
        });

        Self {
            id,
            state,
            version,
            uncommitted: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Number of committed events folded into this aggregate
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Events recorded since load that have not been appended yet
    pub fn uncommitted_events(&self) -> &[S::Event] {
        &self.uncommitted
    }

    pub fn has_uncommitted(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Apply a new event and queue it for commit
    pub fn record(&mut self, event: S::Event) {
        self.state = std::mem::take(&mut self.state).apply(&event);
        self.uncommitted.push(event);
    }

    /// Clear pending events after a successful append
    pub fn mark_committed(&mut self, new_version: u64) {
        self.version = new_version;
        self.uncommitted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counter {
        total: i64,
    }

    impl EventSourcedState for Counter {
        type Event = i64;

        fn apply(self, event: &i64) -> Self {
            Counter {
                total: self.total + event,
            }
        }
    }

    #[test]
    fn test_from_history_counts_version() {
        let history = vec![1, 2, 3];
        let entity: EventSourced<Counter> = EventSourced::from_history(Uuid::now_v7(), &history);

        assert_eq!(entity.state().total, 6);
        assert_eq!(entity.version(), 3);
        assert!(!entity.has_uncommitted());
    }

    #[test]
    fn test_record_applies_and_queues() {
        let mut entity: EventSourced<Counter> = EventSourced::new(Uuid::now_v7());
        entity.record(5);
        entity.record(-2);

        assert_eq!(entity.state().total, 3);
        assert_eq!(entity.uncommitted_events(), &[5, -2]);
        assert_eq!(entity.version(), 0);

        entity.mark_committed(2);
        assert!(!entity.has_uncommitted());
        assert_eq!(entity.version(), 2);
        assert_eq!(entity.state().total, 3);
    }
}
