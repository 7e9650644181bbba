//! Log replay.
//!
//! Replay rebuilds every table as raw key and value bytes. Typed tables are
//! materialized later from these images, so replay needs no knowledge of key
//! or value types.

use crate::error::CoreResult;
use crate::index::ENGINE_VERSION;
use crate::wal::hash_table::HashTableOperation;
use crate::wal::iterator::TornTail;
use crate::wal::log::OperationLog;
use std::collections::{BTreeSet, HashMap};

/// Byte-level image of one table after replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveredTable {
    /// Engine version from the table's create record.
    pub engine_version: u32,
    /// Capacity hint from the latest resize record.
    pub capacity: u64,
    /// Encoded entries.
    pub entries: HashMap<Vec<u8>, Vec<u8>>,
}

/// Every table rebuilt by replay, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct RecoveredTables {
    tables: HashMap<String, RecoveredTable>,
}

impl RecoveredTables {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one record. Applying the same record twice has no further
    /// effect.
    pub fn apply(&mut self, op: &HashTableOperation) {
        if let HashTableOperation::Create(create) = op {
            self.tables
                .entry(op.name().to_owned())
                .or_insert_with(|| RecoveredTable {
                    engine_version: create.engine_version,
                    ..RecoveredTable::default()
                });
            return;
        }

        let table = self
            .tables
            .entry(op.name().to_owned())
            .or_insert_with(|| RecoveredTable {
                engine_version: ENGINE_VERSION,
                ..RecoveredTable::default()
            });
        match op {
            HashTableOperation::Put(put) => {
                table.entries.insert(put.key.clone(), put.value.clone());
            }
            HashTableOperation::Remove(remove) => {
                table.entries.remove(&remove.key);
            }
            HashTableOperation::Resize(resize) => {
                table.capacity = resize.new_capacity;
            }
            HashTableOperation::Create(_) => {}
        }
    }

    /// Returns the image of table `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RecoveredTable> {
        self.tables.get(name)
    }

    /// Removes and returns the image of table `name`.
    pub fn take(&mut self, name: &str) -> Option<RecoveredTable> {
        self.tables.remove(name)
    }

    /// Number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True if no table was recovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Table names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Summary of one replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records decoded and applied.
    pub records_applied: u64,
    /// Offset where clean data ends.
    pub valid_end: u64,
    /// Discarded tail, if the log ended mid-frame.
    pub torn_tail: Option<TornTail>,
    /// Highest operation unit epoch seen.
    pub max_epoch: Option<u64>,
    /// Names of tables the log touched, sorted.
    pub tables: BTreeSet<String>,
}

/// Replays `log` from the start.
///
/// # Errors
///
/// Fails on corruption before the tail of the log and on storage errors. A
/// torn tail is not an error; it is reported in [`RecoveryReport::torn_tail`].
pub fn replay(log: &OperationLog) -> CoreResult<(RecoveredTables, RecoveryReport)> {
    let mut tables = RecoveredTables::new();
    let mut report = RecoveryReport::default();

    let mut scanner = log.scan()?;
    for item in scanner.by_ref() {
        let (_, op) = item?;
        let epoch = op.operation_unit_id().epoch();
        report.max_epoch = Some(report.max_epoch.map_or(epoch, |max| max.max(epoch)));
        if !report.tables.contains(op.name()) {
            report.tables.insert(op.name().to_owned());
        }
        tables.apply(&op);
        report.records_applied += 1;
    }
    report.valid_end = scanner.valid_end();
    report.torn_tail = scanner.torn_tail().cloned();
    drop(scanner);

    if let Some(torn) = &report.torn_tail {
        tracing::warn!(
            offset = torn.offset,
            discarded = torn.discarded,
            cause = %torn.cause,
            "discarding torn log tail"
        );
    }
    tracing::info!(
        records = report.records_applied,
        tables = report.tables.len(),
        valid_end = report.valid_end,
        "log replay complete"
    );
    Ok((tables, report))
}
