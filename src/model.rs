// ABOUTME: Department record, composite key and keyed record set
// ABOUTME: The keyed set only accepts new keys; a repeated key is reported, never overwritten

use std::collections::btree_map::{self, Entry};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::SyncError;

/// Composite identity of a department record: `(DepCode, DepJob)`.
///
/// Ordering and equality are byte-wise on both fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    dep_code: String,
    dep_job: String,
}

impl Key {
    /// Build a key, rejecting empty fields.
    pub fn new(dep_code: impl Into<String>, dep_job: impl Into<String>) -> Result<Self, SyncError> {
        let dep_code = dep_code.into();
        let dep_job = dep_job.into();
        if dep_code.is_empty() || dep_job.is_empty() {
            return Err(SyncError::InvalidKey { dep_code, dep_job });
        }
        Ok(Self { dep_code, dep_job })
    }

    pub fn dep_code(&self) -> &str {
        &self.dep_code
    }

    pub fn dep_job(&self) -> &str {
        &self.dep_job
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(DepCode={}, DepJob={})", self.dep_code, self.dep_job)
    }
}

/// One row of the `departments` table or one `Department` block of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    key: Key,
    description: String,
}

impl Record {
    pub fn new(
        dep_code: impl Into<String>,
        dep_job: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, SyncError> {
        Ok(Self {
            key: Key::new(dep_code, dep_job)?,
            description: description.into(),
        })
    }

    pub fn from_key(key: Key, description: impl Into<String>) -> Self {
        Self {
            key,
            description: description.into(),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn dep_code(&self) -> &str {
        self.key.dep_code()
    }

    pub fn dep_job(&self) -> &str {
        self.key.dep_job()
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Records indexed by their composite key, with unique keys.
///
/// Iteration is in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyedSet {
    records: BTreeMap<Key, Record>,
}

impl KeyedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record whose key is not yet present.
    ///
    /// Returns `SyncError::DuplicateKey` and leaves the set untouched if the key exists.
    pub fn try_insert(&mut self, record: Record) -> Result<(), SyncError> {
        match self.records.entry(record.key.clone()) {
            Entry::Occupied(occupied) => Err(SyncError::DuplicateKey(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(())
            }
        }
    }

    /// Build the document set from records in document order.
    ///
    /// Stops at the first repeated key.
    pub fn from_document<I>(records: I) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = Result<Record, SyncError>>,
    {
        let mut set = Self::new();
        for record in records {
            set.try_insert(record?)?;
        }
        Ok(set)
    }

    /// Build the table set from rows read from the database.
    ///
    /// The table's unique constraint makes a repeated key impossible; if one shows up
    /// anyway it is reported as a data access failure.
    pub fn from_table(rows: Vec<Record>) -> Result<Self, SyncError> {
        let mut set = Self::new();
        for row in rows {
            set.try_insert(row).map_err(|err| match err {
                SyncError::DuplicateKey(key) => SyncError::data_access_msg(format!(
                    "Table departments returned key {} more than once",
                    key
                )),
                other => other,
            })?;
        }
        Ok(set)
    }

    pub fn get(&self, key: &Key) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, Key, Record> {
        self.records.keys()
    }

    pub fn records(&self) -> btree_map::Values<'_, Key, Record> {
        self.records.values()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records.into_values().collect()
    }
}
