use crate::models::{IdentityKey, PartitionRow};
use std::collections::HashSet;
use tracing::debug;

/// Result of merging a batch into a partition
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Existing rows untouched, followed by the appended ones
    pub merged: Vec<PartitionRow>,
    pub appended: usize,
    /// Incoming rows dropped because their key was already present
    pub duplicates: usize,
}

impl MergeOutcome {
    /// Nothing new; the partition must not be rewritten
    pub fn is_noop(&self) -> bool {
        self.appended == 0
    }
}

pub struct DataMerger;

impl DataMerger {
    pub fn new() -> Self {
        Self
    }

    /// Append every incoming row whose identity key is not yet present.
    ///
    /// Existing rows keep their position and content. Incoming rows keep
    /// their delivered order, and a key repeated within `incoming` is kept
    /// once (first occurrence).
    pub fn merge(&self, existing: Vec<PartitionRow>, incoming: Vec<PartitionRow>) -> MergeOutcome {
        let mut seen: HashSet<IdentityKey> = existing.iter().map(|row| row.key.clone()).collect();

        let mut merged = existing;
        merged.reserve(incoming.len());

        let mut appended = 0;
        let mut duplicates = 0;
        for row in incoming {
            if seen.insert(row.key.clone()) {
                merged.push(row);
                appended += 1;
            } else {
                duplicates += 1;
            }
        }

        debug!(
            existing = merged.len() - appended,
            appended, duplicates, "Merged batch into partition"
        );

        MergeOutcome {
            merged,
            appended,
            duplicates,
        }
    }
}

impl Default for DataMerger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(acquired: &str, valid: &str, temp: &str) -> PartitionRow {
        PartitionRow::new(
            IdentityKey::new(Some(acquired.to_string()), valid, 36.1833, 139.7167),
            vec![acquired.to_string(), valid.to_string(), temp.to_string()],
        )
    }

    fn batch() -> Vec<PartitionRow> {
        vec![
            row("2026-01-08T21:00:00+09:00", "2026-01-09T00:00:00+09:00", "1.0"),
            row("2026-01-08T21:00:00+09:00", "2026-01-09T01:00:00+09:00", "0.5"),
            row("2026-01-08T21:00:00+09:00", "2026-01-09T02:00:00+09:00", "0.1"),
        ]
    }

    #[test]
    fn test_merge_into_empty_partition() {
        let outcome = DataMerger::new().merge(vec![], batch());
        assert_eq!(outcome.appended, 3);
        assert_eq!(outcome.merged, batch());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let merger = DataMerger::new();
        let first = merger.merge(vec![], batch());
        let second = merger.merge(first.merged.clone(), batch());

        assert_eq!(second.appended, 0);
        assert_eq!(second.duplicates, 3);
        assert!(second.is_noop());
        assert_eq!(second.merged, first.merged);
    }

    #[test]
    fn test_duplicates_within_batch_collapse() {
        let mut incoming = batch();
        incoming.push(row("2026-01-08T21:00:00+09:00", "2026-01-09T00:00:00+09:00", "9.9"));

        let outcome = DataMerger::new().merge(vec![], incoming);
        assert_eq!(outcome.appended, 3);
        assert_eq!(outcome.duplicates, 1);
        // first occurrence wins
        assert_eq!(outcome.merged[0].values[2], "1.0");
    }

    #[test]
    fn test_existing_rows_keep_order_and_content() {
        let existing = vec![
            row("2026-01-08T21:00:00+09:00", "2026-01-09T05:00:00+09:00", "3.0"),
            row("2026-01-08T21:00:00+09:00", "2026-01-09T01:00:00+09:00", "0.5"),
        ];
        let incoming = vec![
            row("2026-01-08T21:00:00+09:00", "2026-01-09T01:00:00+09:00", "7.7"),
            row("2026-01-08T21:00:00+09:00", "2026-01-09T00:00:00+09:00", "1.0"),
        ];

        let outcome = DataMerger::new().merge(existing.clone(), incoming);
        assert_eq!(&outcome.merged[..2], &existing[..]);
        assert_eq!(outcome.merged[1].values[2], "0.5");
        assert_eq!(outcome.merged[2].values[1], "2026-01-09T00:00:00+09:00");
        assert_eq!(outcome.appended, 1);
    }

    #[test]
    fn test_new_acquisition_time_appends() {
        let existing = batch();
        let incoming = vec![row("2026-01-09T03:00:00+09:00", "2026-01-09T00:00:00+09:00", "1.2")];

        let outcome = DataMerger::new().merge(existing, incoming);
        assert_eq!(outcome.appended, 1);
        assert_eq!(outcome.merged.len(), 4);
    }

    #[test]
    fn test_empty_incoming_is_noop() {
        let outcome = DataMerger::new().merge(batch(), vec![]);
        assert!(outcome.is_noop());
        assert_eq!(outcome.merged, batch());
    }
}
