// ABOUTME: Library entry point for dept-sync
// ABOUTME: Reconciles the departments table with an XML document in either direction

pub mod config;
pub mod error;
pub mod model;
pub mod sync;
pub mod table;
pub mod xml;

pub use error::SyncError;
pub use model::{Key, KeyedSet, Record};
pub use sync::{export, ExportReport, Reconciler, SyncOptions, SyncReport, UpdatePolicy};
pub use table::{connect, Backend, DepartmentTable, TableTransaction};
