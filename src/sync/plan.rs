// ABOUTME: Three-way diff between the document set and the table set
// ABOUTME: Applies a change set through an open transaction, deletes first, one row per write

use serde::Deserialize;

use crate::error::SyncError;
use crate::model::{Key, KeyedSet, Record};
use crate::table::TableTransaction;

/// When to rewrite `Description` for a key present in both the document and the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdatePolicy {
    /// Update every matching row, even when the description is unchanged.
    #[default]
    Always,
    /// Skip rows whose description already matches the document.
    ChangedOnly,
}

/// Writes needed to make the table match the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Keys in the table but not in the document
    pub deletes: Vec<Key>,
    /// Document records whose key is already in the table
    pub updates: Vec<Record>,
    /// Document records whose key is not in the table
    pub inserts: Vec<Record>,
    /// Matching keys skipped under `UpdatePolicy::ChangedOnly`
    pub unchanged: usize,
}

impl ChangeSet {
    /// Diff `document` (authoritative) against `table`.
    pub fn plan(document: &KeyedSet, table: &KeyedSet, policy: UpdatePolicy) -> Self {
        let mut changes = ChangeSet {
            deletes: table
                .keys()
                .filter(|key| !document.contains_key(key))
                .cloned()
                .collect(),
            ..ChangeSet::default()
        };

        for record in document.records() {
            match table.get(record.key()) {
                Some(current)
                    if policy == UpdatePolicy::ChangedOnly
                        && current.description() == record.description() =>
                {
                    changes.unchanged += 1;
                }
                Some(_) => changes.updates.push(record.clone()),
                None => changes.inserts.push(record.clone()),
            }
        }

        changes
    }

    pub fn write_count(&self) -> usize {
        self.deletes.len() + self.updates.len() + self.inserts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.write_count() == 0
    }
}

/// Row counts written by [`apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub deleted: usize,
    pub updated: usize,
    pub inserted: usize,
}

/// Apply `changes` through `tx`: all deletes, then updates, then inserts.
///
/// Each write must touch exactly one row. The first failure is returned as-is; the
/// caller owns `tx` and decides whether to roll back.
pub async fn apply<T: TableTransaction>(
    tx: &mut T,
    changes: &ChangeSet,
) -> Result<ApplyStats, SyncError> {
    let mut stats = ApplyStats::default();

    for key in &changes.deletes {
        expect_one_row(tx.delete(key).await?, "delete", key)?;
        stats.deleted += 1;
    }

    for record in &changes.updates {
        expect_one_row(tx.update_description(record).await?, "update", record.key())?;
        stats.updated += 1;
    }

    for record in &changes.inserts {
        expect_one_row(tx.insert(record).await?, "insert", record.key())?;
        stats.inserted += 1;
    }

    Ok(stats)
}

fn expect_one_row(affected: u64, operation: &str, key: &Key) -> Result<(), SyncError> {
    if affected == 1 {
        return Ok(());
    }
    Err(SyncError::data_access_msg(format!(
        "Expected {} of {} to affect 1 row, affected {}",
        operation, key, affected
    )))
}
