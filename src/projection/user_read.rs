// Copyright (c) 2025 - Cowboy AI, Inc.
//! User read-model projection
//!
//! Split in two, pure decision then execution:
//!
//! ```text
//! (current row, event, now) ──decide()──▶ RowChange ──UserReadProjection──▶ ReadStore
//! ```
//!
//! # Rules
//!
//! | Event   | Row state                 | Change                           |
//! |---------|---------------------------|----------------------------------|
//! | Created | absent                    | insert, `version = sequence`     |
//! | Created | present or tombstone      | duplicate, skip                  |
//! | Updated | absent                    | inconsistency                    |
//! | Updated | `sequence <= version`     | duplicate, skip                  |
//! | Updated | tombstone, newer sequence | inconsistency (after delete)     |
//! | Updated | `sequence > version + 1`  | inconsistency (gap)              |
//! | Updated | `sequence == version + 1` | overwrite carried fields         |
//! | Deleted | present                   | replace with tombstone           |
//! | Deleted | tombstone                 | duplicate, skip                  |
//! | Deleted | absent                    | no-op                            |
//!
//! "Row state" here includes tombstones; queries never see them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::RegistryError;
use crate::events::{StoredEvent, UserEvent};
use crate::projection::{Clock, ProjectionAdapter, ProjectionError, ProjectionOutcome};
use crate::read_store::{ReadStore, UserRead};

/// Change to apply to one read row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowChange {
    /// Write the row (insert or overwrite)
    Upsert {
        row: UserRead,
        outcome: ProjectionOutcome,
    },
    /// Leave the store untouched
    Skip(ProjectionOutcome),
}

/// Decide how an event changes the current row (pure)
pub fn decide(
    current: Option<&UserRead>,
    event: &StoredEvent,
    now: DateTime<Utc>,
) -> Result<RowChange, ProjectionError> {
    let sequence = event.sequence;

    match (&event.data, current) {
        (UserEvent::Created(_), Some(_)) => Ok(RowChange::Skip(ProjectionOutcome::Duplicate)),

        (UserEvent::Created(created), None) => Ok(RowChange::Upsert {
            row: UserRead {
                id: created.id,
                name: created.name.clone(),
                email: created.email.clone(),
                is_active: true,
                last_updated: now,
                version: sequence,
            },
            outcome: ProjectionOutcome::Inserted,
        }),

        (UserEvent::Updated(updated), None) => Err(ProjectionError::Inconsistency {
            aggregate_id: updated.id,
            sequence,
            reason: "update for a user with no read row".to_string(),
        }),

        (UserEvent::Updated(_), Some(row)) if sequence <= row.version => {
            Ok(RowChange::Skip(ProjectionOutcome::Duplicate))
        }

        (UserEvent::Updated(updated), Some(row)) if row.is_tombstone() => {
            Err(ProjectionError::Inconsistency {
                aggregate_id: updated.id,
                sequence,
                reason: format!("user was deleted at version {}", row.version),
            })
        }

        (UserEvent::Updated(updated), Some(row)) if sequence > row.version + 1 => {
            Err(ProjectionError::Inconsistency {
                aggregate_id: updated.id,
                sequence,
                reason: format!("read row is at version {}, events are missing", row.version),
            })
        }

        (UserEvent::Updated(updated), Some(row)) => {
            let mut row = row.clone();
            if let Some(name) = &updated.name {
                row.name = name.clone();
            }
            if let Some(email) = &updated.email {
                row.email = email.clone();
            }
            row.last_updated = now;
            row.version = sequence;
            Ok(RowChange::Upsert {
                row,
                outcome: ProjectionOutcome::Updated,
            })
        }

        (UserEvent::Deleted(_), Some(row)) if row.is_tombstone() => {
            Ok(RowChange::Skip(ProjectionOutcome::Duplicate))
        }

        (UserEvent::Deleted(deleted), Some(_)) => Ok(RowChange::Upsert {
            row: UserRead::tombstone(deleted.id, sequence, now),
            outcome: ProjectionOutcome::Removed,
        }),

        (UserEvent::Deleted(_), None) => Ok(RowChange::Skip(ProjectionOutcome::NoOp)),
    }
}

fn unavailable(err: RegistryError) -> ProjectionError {
    ProjectionError::TargetUnavailable(err.to_string())
}

/// Projects user events into a [`ReadStore`]
pub struct UserReadProjection {
    store: Arc<dyn ReadStore>,
    clock: Clock,
}

impl UserReadProjection {
    pub fn new(store: Arc<dyn ReadStore>, clock: Clock) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl ProjectionAdapter for UserReadProjection {
    type Event = StoredEvent;
    type Error = ProjectionError;

    async fn project(&self, event: StoredEvent) -> Result<ProjectionOutcome, ProjectionError> {
        let aggregate_id = event.aggregate_id;
        let current = self
            .store
            .find_entry(aggregate_id)
            .await
            .map_err(unavailable)?;

        let change = decide(current.as_ref(), &event, (self.clock)()).map_err(|e| {
            warn!(
                aggregate_id = %aggregate_id,
                sequence = event.sequence,
                error = %e,
                "Projection inconsistency"
            );
            e
        })?;

        let outcome = match change {
            RowChange::Upsert { row, outcome } => {
                self.store.upsert(row).await.map_err(unavailable)?;
                outcome
            }
            RowChange::Skip(outcome) => outcome,
        };

        debug!(
            aggregate_id = %aggregate_id,
            sequence = event.sequence,
            event_type = %event.event_type,
            outcome = ?outcome,
            "Projected event"
        );
        Ok(outcome)
    }

    async fn reset(&self) -> Result<(), ProjectionError> {
        self.store.clear().await.map_err(unavailable)
    }

    fn name(&self) -> &str {
        "user-read-model"
    }
}
