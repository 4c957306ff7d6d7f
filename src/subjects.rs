// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS subject layout and partition assignment
//!
//! # Subject Pattern
//!
//! ```text
//! <log_prefix>.<aggregate_id>               event log, one subject per aggregate
//! <topic>.p<partition>.<aggregate_id>       broker topic, one subject per message
//! ```
//!
//! This allows for:
//! - Per-aggregate optimistic concurrency on the log subject
//! - Per-partition consumers (`users.events.p3.>`)
//! - Whole-log replay (`users.log.>`)
//!
//! # Examples
//!
//! ```rust
//! use cim_user_registry::subjects::{partition_for, partition_subject, partition_filter};
//! use uuid::Uuid;
//!
//! let id = Uuid::from_u128(10);
//! assert_eq!(partition_for(id, 4), 2);
//! assert_eq!(partition_subject("users.events", 2, id), format!("users.events.p2.{}", id));
//! assert_eq!(partition_filter("users.events", 2), "users.events.p2.>");
//! ```

use uuid::Uuid;

/// Partition owning an aggregate: `aggregate_id mod partitions`
///
/// Stable for a given partition count, so every event of one aggregate lands
/// on the same partition.
pub fn partition_for(aggregate_id: Uuid, partitions: u32) -> u32 {
    let partitions = partitions.max(1);
    (aggregate_id.as_u128() % partitions as u128) as u32
}

/// Concrete subject for one message on a partitioned topic
pub fn partition_subject(topic: &str, partition: u32, aggregate_id: Uuid) -> String {
    format!("{}.p{}.{}", topic, partition, aggregate_id)
}

/// Wildcard matching every message of one partition
pub fn partition_filter(topic: &str, partition: u32) -> String {
    format!("{}.p{}.>", topic, partition)
}

/// Wildcard matching every partition of a topic
pub fn topic_wildcard(topic: &str) -> String {
    format!("{}.>", topic)
}

/// Event log subject of one aggregate
pub fn log_subject(prefix: &str, aggregate_id: Uuid) -> String {
    format!("{}.{}", prefix, aggregate_id)
}

/// Wildcard matching the whole event log
pub fn log_wildcard(prefix: &str) -> String {
    format!("{}.>", prefix)
}

/// Durable consumer name for one partition of a group
///
/// Consumer names may not contain dots.
pub fn consumer_name(group: &str, partition: u32) -> String {
    format!("{}-p{}", group.replace('.', "_"), partition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 8 => 0)]
    #[test_case(9, 8 => 1)]
    #[test_case(15, 8 => 7)]
    #[test_case(15, 1 => 0)]
    #[test_case(15, 0 => 0 ; "zero partitions treated as one")]
    fn test_partition_for(raw: u128, partitions: u32) -> u32 {
        partition_for(Uuid::from_u128(raw), partitions)
    }

    #[test]
    fn test_partition_is_stable_per_aggregate() {
        let id = Uuid::now_v7();
        let first = partition_for(id, 8);
        assert!((0..10).all(|_| partition_for(id, 8) == first));
        assert!(first < 8);
    }

    #[test]
    fn test_log_subjects() {
        let id = Uuid::from_u128(1);
        assert_eq!(log_subject("users.log", id), format!("users.log.{}", id));
        assert_eq!(log_wildcard("users.log"), "users.log.>");
        assert_eq!(topic_wildcard("users.events"), "users.events.>");
    }

    #[test]
    fn test_consumer_name_has_no_dots() {
        assert_eq!(consumer_name("read.model", 3), "read_model-p3");
    }
}
