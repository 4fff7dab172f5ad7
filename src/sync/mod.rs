// ABOUTME: Export and sync between the departments table and an XML document
// ABOUTME: Reconciler drives the diff/apply cycle; exporter is the read-only direction

pub mod exporter;
pub mod plan;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod memory;

pub use exporter::{export, ExportReport};
pub use plan::{apply, ApplyStats, ChangeSet, UpdatePolicy};
pub use reconciler::{Reconciler, SyncOptions, SyncPhase, SyncReport};
