//! Key Routing
//!
//! Derives the `(identity, UTC day)` partition key from an accepted
//! record and owns the deterministic object naming for a partition.
//! Day truncation always uses UTC so partitioning is reproducible
//! across deployments in different time zones.

use crate::pipeline::record::ParsedRecord;
use chrono::NaiveDate;

/// The unit of independent buffering and flushing
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    /// Producer identity
    pub identity: String,
    /// UTC calendar date of the observation
    pub day: NaiveDate,
}

impl PartitionKey {
    pub fn new(identity: impl Into<String>, day: NaiveDate) -> Self {
        PartitionKey {
            identity: identity.into(),
            day,
        }
    }

    /// The durable append-only object for this partition
    pub fn daily_object(&self) -> String {
        format!("{}/{}/data.jsonl", self.identity, self.day)
    }

    /// A transient part object for one flush attempt
    pub fn part_object(&self, token: &str) -> String {
        format!("{}/{}/parts/{}.jsonl", self.identity, self.day, token)
    }

    /// A transient compose target for one flush attempt
    pub fn compose_object(&self, token: &str) -> String {
        format!("{}/{}/.compose-{}", self.identity, self.day, token)
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.identity, self.day)
    }
}

/// Derive the partition key for an accepted record
pub fn partition_key(record: &ParsedRecord) -> PartitionKey {
    PartitionKey {
        identity: record.identity.clone(),
        day: record.observed_at.date_naive(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::record::ParsedRecord;
    use chrono::{DateTime, Utc};

    fn record(identity: &str, ts: &str) -> ParsedRecord {
        ParsedRecord {
            identity: identity.to_string(),
            observed_at: DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
        }
    }

    #[test]
    fn test_partition_key_truncates_to_utc_day() {
        let key = partition_key(&record("TRUCK-001", "2025-01-01T23:59:59Z"));
        assert_eq!(key.identity, "TRUCK-001");
        assert_eq!(key.day.to_string(), "2025-01-01");
    }

    #[test]
    fn test_offset_timestamp_uses_utc_day() {
        // 01:30 at +05:00 is 20:30 the previous day in UTC
        let key = partition_key(&record("TRUCK-001", "2025-01-01T01:30:00+05:00"));
        assert_eq!(key.day.to_string(), "2024-12-31");
    }

    #[test]
    fn test_same_identity_different_days_differ() {
        let a = partition_key(&record("T1", "2025-01-01T23:59:59Z"));
        let b = partition_key(&record("T1", "2025-01-02T00:00:00Z"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_object_names() {
        let key = partition_key(&record("TRUCK-001", "2025-01-01T12:00:00Z"));
        assert_eq!(key.daily_object(), "TRUCK-001/2025-01-01/data.jsonl");
        assert_eq!(
            key.part_object("1735732800000-000001"),
            "TRUCK-001/2025-01-01/parts/1735732800000-000001.jsonl"
        );
        assert_eq!(
            key.compose_object("1735732800000-000001"),
            "TRUCK-001/2025-01-01/.compose-1735732800000-000001"
        );
    }
}
