// ABOUTME: Exporter - dumps the departments table into an XML document
// ABOUTME: Read-only on the table; the target file is replaced only after a complete write

use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::table::DepartmentTable;
use crate::xml::write_departments;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub records: usize,
    pub target: PathBuf,
}

/// Write every row of the table to `target`, ordered by `(DepCode, DepJob)`.
///
/// # Errors
///
/// `DataAccess` if the table cannot be read, `Io` if the target cannot be written.
pub async fn export<T: DepartmentTable>(
    table: &mut T,
    target: &Path,
) -> Result<ExportReport, SyncError> {
    let records = table.read_all().await?;
    tracing::info!(
        "Exporting {} department records to {}",
        records.len(),
        target.display()
    );

    write_departments(target, &records)?;

    Ok(ExportReport {
        records: records.len(),
        target: target.to_path_buf(),
    })
}
