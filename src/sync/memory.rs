// ABOUTME: In-memory departments table for unit tests
// ABOUTME: Stages writes per transaction and can fail the N-th write on demand

use std::collections::BTreeMap;

use crate::error::SyncError;
use crate::model::{Key, Record};
use crate::table::{DepartmentTable, TableTransaction};

#[derive(Debug, Default)]
pub struct MemoryTable {
    rows: BTreeMap<Key, String>,
    /// 1-based index of the write (within one transaction) that fails
    fail_on_write: Option<usize>,
    fail_on_commit: bool,
    log: Vec<String>,
    pub begun: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

impl MemoryTable {
    pub fn with_rows(rows: &[(&str, &str, &str)]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|(code, job, description)| {
                    (Key::new(*code, *job).unwrap(), description.to_string())
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing_on_write(mut self, n: usize) -> Self {
        self.fail_on_write = Some(n);
        self
    }

    pub fn failing_on_commit(mut self) -> Self {
        self.fail_on_commit = true;
        self
    }

    /// Committed rows as `(DepCode, DepJob, Description)`, in key order.
    pub fn snapshot(&self) -> Vec<(String, String, String)> {
        self.rows
            .iter()
            .map(|(key, description)| {
                (
                    key.dep_code().to_string(),
                    key.dep_job().to_string(),
                    description.clone(),
                )
            })
            .collect()
    }

    /// Every write attempted, as `"<op> <code>/<job>"`.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    fn records(rows: &BTreeMap<Key, String>) -> Vec<Record> {
        rows.iter()
            .map(|(key, description)| Record::from_key(key.clone(), description.clone()))
            .collect()
    }
}

impl DepartmentTable for MemoryTable {
    type Transaction<'a> = MemoryTransaction<'a>;

    async fn read_all(&mut self) -> Result<Vec<Record>, SyncError> {
        Ok(Self::records(&self.rows))
    }

    async fn begin(&mut self) -> Result<MemoryTransaction<'_>, SyncError> {
        self.begun += 1;
        let staged = self.rows.clone();
        Ok(MemoryTransaction {
            table: self,
            staged,
            writes: 0,
        })
    }
}

pub struct MemoryTransaction<'a> {
    table: &'a mut MemoryTable,
    staged: BTreeMap<Key, String>,
    writes: usize,
}

impl MemoryTransaction<'_> {
    fn record_write(&mut self, op: &str, key: &Key) -> Result<(), SyncError> {
        self.writes += 1;
        self.table
            .log
            .push(format!("{} {}/{}", op, key.dep_code(), key.dep_job()));
        if self.table.fail_on_write == Some(self.writes) {
            return Err(SyncError::data_access_msg(format!(
                "injected failure on write {}",
                self.writes
            )));
        }
        Ok(())
    }
}

impl TableTransaction for MemoryTransaction<'_> {
    async fn read_all(&mut self) -> Result<Vec<Record>, SyncError> {
        Ok(MemoryTable::records(&self.staged))
    }

    async fn delete(&mut self, key: &Key) -> Result<u64, SyncError> {
        self.record_write("delete", key)?;
        Ok(self.staged.remove(key).map_or(0, |_| 1))
    }

    async fn update_description(&mut self, record: &Record) -> Result<u64, SyncError> {
        self.record_write("update", record.key())?;
        match self.staged.get_mut(record.key()) {
            Some(description) => {
                *description = record.description().to_string();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert(&mut self, record: &Record) -> Result<u64, SyncError> {
        self.record_write("insert", record.key())?;
        if self.staged.contains_key(record.key()) {
            return Err(SyncError::data_access_msg(format!(
                "unique constraint violated by {}",
                record.key()
            )));
        }
        self.staged
            .insert(record.key().clone(), record.description().to_string());
        Ok(1)
    }

    async fn commit(self) -> Result<(), SyncError> {
        if self.table.fail_on_commit {
            return Err(SyncError::data_access_msg("injected commit failure"));
        }
        self.table.rows = self.staged;
        self.table.commits += 1;
        Ok(())
    }

    async fn rollback(self) -> Result<(), SyncError> {
        self.table.rollbacks += 1;
        Ok(())
    }
}
