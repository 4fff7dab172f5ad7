// ABOUTME: Reconciler - makes the departments table match an XML document exactly
// ABOUTME: Loads both keyed sets, diffs them and applies the changes in one transaction

use std::fmt;
use std::path::Path;

use super::plan::{apply, ChangeSet, UpdatePolicy};
use crate::error::SyncError;
use crate::model::KeyedSet;
use crate::table::{DepartmentTable, TableTransaction};
use crate::xml::{read_departments, RawDepartment};

/// Options for one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub update_policy: UpdatePolicy,
    /// Compute and report the change set, then roll back instead of writing
    pub dry_run: bool,
}

/// Outcome of a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub document_records: usize,
    pub table_records: usize,
    pub deleted: usize,
    pub updated: usize,
    pub inserted: usize,
    pub unchanged: usize,
    /// False for dry runs
    pub committed: bool,
}

impl SyncReport {
    /// True when the run wrote (or would have written) nothing.
    pub fn is_noop(&self) -> bool {
        self.deleted == 0 && self.updated == 0 && self.inserted == 0
    }
}

/// Progress of one sync invocation, logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    LoadingDocument,
    LoadingTable,
    Diffing,
    Applying,
    Committed,
    RolledBack,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::LoadingDocument => "loading document",
            SyncPhase::LoadingTable => "loading table",
            SyncPhase::Diffing => "diffing",
            SyncPhase::Applying => "applying",
            SyncPhase::Committed => "committed",
            SyncPhase::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

fn enter(phase: SyncPhase) {
    tracing::debug!("Sync phase: {}", phase);
}

/// Makes the table match a document: the document is authoritative.
///
/// Nothing is kept between runs; every call builds both keyed sets from scratch.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    options: SyncOptions,
}

impl Reconciler {
    pub fn new(options: SyncOptions) -> Self {
        Self { options }
    }

    /// Sync the table from the document at `source`.
    ///
    /// # Errors
    ///
    /// - `FileNotFound`, `Io`, `Parse`: the document could not be read; nothing written
    /// - `DuplicateKey`, `InvalidKey`: the document is corrupt; nothing written
    /// - `DataAccess`: a table read or write failed; the transaction was rolled back
    pub async fn sync<T: DepartmentTable>(
        &self,
        table: &mut T,
        source: &Path,
    ) -> Result<SyncReport, SyncError> {
        enter(SyncPhase::LoadingDocument);
        let raw = read_departments(source)?;
        tracing::info!("Read {} department records from {}", raw.len(), source.display());
        self.sync_records(table, raw).await
    }

    /// Sync the table from already parsed document records, in document order.
    pub async fn sync_records<T: DepartmentTable>(
        &self,
        table: &mut T,
        raw: Vec<RawDepartment>,
    ) -> Result<SyncReport, SyncError> {
        let document = KeyedSet::from_document(raw.into_iter().map(RawDepartment::into_record))?;

        let mut tx = table.begin().await?;
        match self.reconcile(&mut tx, &document).await {
            Ok(report) if self.options.dry_run => {
                tx.rollback().await?;
                enter(SyncPhase::RolledBack);
                tracing::info!(
                    "Dry run: would delete {}, update {}, insert {} ({} unchanged)",
                    report.deleted,
                    report.updated,
                    report.inserted,
                    report.unchanged
                );
                Ok(report)
            }
            Ok(mut report) => {
                if let Err(err) = tx.commit().await {
                    enter(SyncPhase::RolledBack);
                    tracing::warn!("Sync rolled back: {}", err);
                    return Err(err);
                }
                enter(SyncPhase::Committed);
                report.committed = true;
                tracing::info!(
                    "Sync committed: deleted {}, updated {}, inserted {} ({} unchanged)",
                    report.deleted,
                    report.updated,
                    report.inserted,
                    report.unchanged
                );
                Ok(report)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("Rollback after failed sync also failed: {}", rollback_err);
                }
                enter(SyncPhase::RolledBack);
                tracing::warn!("Sync rolled back: {}", err);
                Err(err)
            }
        }
    }

    async fn reconcile<X: TableTransaction>(
        &self,
        tx: &mut X,
        document: &KeyedSet,
    ) -> Result<SyncReport, SyncError> {
        enter(SyncPhase::LoadingTable);
        let current = KeyedSet::from_table(tx.read_all().await?)?;

        enter(SyncPhase::Diffing);
        let changes = ChangeSet::plan(document, &current, self.options.update_policy);
        tracing::info!(
            "Document has {} records, table has {}: {} to delete, {} to update, {} to insert",
            document.len(),
            current.len(),
            changes.deletes.len(),
            changes.updates.len(),
            changes.inserts.len()
        );

        let mut report = SyncReport {
            document_records: document.len(),
            table_records: current.len(),
            unchanged: changes.unchanged,
            ..SyncReport::default()
        };

        if self.options.dry_run {
            report.deleted = changes.deletes.len();
            report.updated = changes.updates.len();
            report.inserted = changes.inserts.len();
            return Ok(report);
        }

        enter(SyncPhase::Applying);
        let stats = apply(tx, &changes).await?;
        report.deleted = stats.deleted;
        report.updated = stats.updated;
        report.inserted = stats.inserted;
        Ok(report)
    }
}
