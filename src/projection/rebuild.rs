// Copyright (c) 2025 - Cowboy AI, Inc.
//! Read-model rebuild
//!
//! The read store is disposable: reset it, then replay the whole event log
//! through the projection in log order.
//!
//! ```text
//! ReadStore = fold(EventLog, ∅, project)
//! ```
//!
//! Run it with the projection consumer stopped. Events the consumer sees
//! again afterwards are skipped as duplicates by row version.

use tracing::info;

use crate::errors::{RegistryError, RegistryResult};
use crate::event_store::EventStore;
use crate::projection::DynProjection;

/// Summary of a rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub commits: u64,
    pub events: u64,
    /// Position of the last commit replayed (0 for an empty log)
    pub last_position: u64,
}

/// Reset the projection and replay every commit of the log into it
pub async fn rebuild_read_model(
    event_store: &dyn EventStore,
    projection: &DynProjection,
    batch_size: usize,
) -> RegistryResult<RebuildReport> {
    if batch_size == 0 {
        return Err(RegistryError::Configuration(
            "rebuild batch size must be at least 1".to_string(),
        ));
    }

    info!(projection = %projection.name(), "Rebuilding read model from event log");
    projection.reset().await?;

    let mut report = RebuildReport::default();
    let mut next_position = 1;

    loop {
        let commits = event_store.read_all_from(next_position, batch_size).await?;
        let fetched = commits.len();

        for commit in commits {
            for event in commit.events {
                projection.project(event).await?;
                report.events += 1;
            }
            report.commits += 1;
            report.last_position = commit.position;
            next_position = commit.position + 1;
        }

        if fetched < batch_size {
            break;
        }
    }

    info!(
        commits = report.commits,
        events = report.events,
        last_position = report.last_position,
        "Read model rebuilt"
    );
    Ok(report)
}
