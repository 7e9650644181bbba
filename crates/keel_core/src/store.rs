//! Store that owns the operation log and hands out durable tables.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::index::{HashIndexEngine, IndexKey, IndexValue, LocalHashTable, ENGINE_VERSION};
use crate::types::{OperationUnitId, OperationUnitIds};
use crate::wal::{
    replay, CreateTable, HashTableOperation, LocalHashTableOperation, OperationLog,
    RecoveredTable, RecoveredTables, RecoveryReport,
};
use keel_storage::{FileBackend, StorageBackend};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// File name of the log inside a store directory.
pub const LOG_FILE_NAME: &str = "index.log";

/// Recovered state for every hash table sharing one operation log.
///
/// Opening a store replays its log, so tables come back with every mutation
/// that reached the log before a crash.
///
/// # Example
///
/// ```rust
/// use keel_core::{Config, IndexEngine, IndexStore};
/// use keel_storage::InMemoryBackend;
///
/// let store = IndexStore::open(Box::new(InMemoryBackend::new()), Config::default()).unwrap();
/// let emails = store.open_table::<String, u64>("users_by_email").unwrap();
/// emails.put("ada@example.org".into(), 1).unwrap();
/// assert_eq!(emails.get(&"ada@example.org".into()).unwrap(), Some(1));
/// ```
pub struct IndexStore {
    config: Config,
    log: Arc<OperationLog>,
    ids: Arc<OperationUnitIds>,
    recovered: Mutex<RecoveredTables>,
    opened: Mutex<BTreeSet<String>>,
    report: RecoveryReport,
}

impl IndexStore {
    /// Opens a store over `backend`, replaying whatever it holds.
    ///
    /// # Errors
    ///
    /// Fails on corruption before the end of the log and on storage errors.
    pub fn open(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        let log = OperationLog::new(backend, &config);
        let (tables, report) = replay(&log)?;

        if let Some(torn) = &report.torn_tail {
            if config.truncate_torn_tail {
                log.truncate(torn.offset)?;
                tracing::warn!(
                    offset = torn.offset,
                    discarded = torn.discarded,
                    "truncated torn log tail"
                );
            }
        }

        let ids = OperationUnitIds::after(report.max_epoch);
        tracing::info!(
            epoch = ids.epoch(),
            records = report.records_applied,
            tables = tables.len(),
            "opened index store"
        );

        Ok(Self {
            config,
            log: Arc::new(log),
            ids: Arc::new(ids),
            recovered: Mutex::new(tables),
            opened: Mutex::new(BTreeSet::new()),
            report,
        })
    }

    /// Opens the store kept in directory `path`, creating it if missing.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_dir(path: &Path, config: Config) -> CoreResult<Self> {
        let backend = FileBackend::open_with_create_dirs(&path.join(LOG_FILE_NAME))?;
        Self::open(Box::new(backend), config)
    }

    /// Opens table `name`, restoring its recovered entries or creating it.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if the table is already open in this store
    /// - `InvalidArgument` if `name` is empty
    /// - `InvalidFormat` if the recovered table was written by another engine
    ///   version or its entries do not decode as `K` and `V`
    pub fn open_table<K: IndexKey, V: IndexValue>(
        &self,
        name: &str,
    ) -> CoreResult<LocalHashTable<K, V>> {
        if name.is_empty() {
            return Err(CoreError::invalid_argument("table name must not be empty"));
        }

        let mut opened = self.opened.lock();
        if opened.contains(name) {
            return Err(CoreError::invalid_operation(format!(
                "table '{name}' is already open"
            )));
        }

        let mut recovered = self.recovered.lock();
        let engine = match recovered.get(name) {
            Some(image) => {
                let engine = self.materialize(name, image)?;
                recovered.take(name);
                tracing::debug!(table = name, entries = engine.len(), "restored table");
                engine
            }
            None => {
                let create = CreateTable {
                    base: LocalHashTableOperation::new(self.ids.next_id(), name),
                    engine_version: ENGINE_VERSION,
                };
                self.log.append(&HashTableOperation::Create(create))?;
                tracing::debug!(table = name, "created table");
                HashIndexEngine::new(self.config.effective_stripes())
            }
        };
        drop(recovered);

        opened.insert(name.to_owned());
        Ok(LocalHashTable::new(
            name,
            engine,
            Arc::clone(&self.log),
            Arc::clone(&self.ids),
        ))
    }

    fn materialize<K: IndexKey, V: IndexValue>(
        &self,
        name: &str,
        image: &RecoveredTable,
    ) -> CoreResult<HashIndexEngine<K, V>> {
        if image.engine_version != ENGINE_VERSION {
            return Err(CoreError::invalid_format(format!(
                "table '{name}' uses engine version {}, expected {ENGINE_VERSION}",
                image.engine_version
            )));
        }

        let mut entries = Vec::with_capacity(image.entries.len());
        for (key, value) in &image.entries {
            entries.push((K::from_bytes(key)?, V::from_bytes(value)?));
        }
        let engine = HashIndexEngine::with_entries(self.config.effective_stripes(), entries);
        // Capacity is a hint; a resize this machine cannot honor is skipped.
        if let Ok(total) = usize::try_from(image.capacity) {
            if total > 0 {
                if let Err(err) = engine.reserve(total) {
                    tracing::warn!(table = name, error = %err, "skipping recovered capacity");
                }
            }
        }
        Ok(engine)
    }

    /// Names of every table the store knows: recovered or opened.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.opened.lock().clone();
        names.extend(self.recovered.lock().names());
        names.into_iter().collect()
    }

    /// Issues a fresh id for grouping mutations with
    /// [`LocalHashTable::in_unit`].
    pub fn next_unit_id(&self) -> OperationUnitId {
        self.ids.next_id()
    }

    /// Epoch of every id issued by this store instance.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.ids.epoch()
    }

    /// What replay found when the store was opened.
    #[must_use]
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.report
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current log size in bytes.
    pub fn log_size(&self) -> CoreResult<u64> {
        self.log.size()
    }

    /// Forces the log to disk.
    pub fn sync(&self) -> CoreResult<()> {
        self.log.sync()
    }
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("epoch", &self.ids.epoch())
            .field("config", &self.config)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{validators, IndexEngine};
    use crate::wal::{encode_frame, TornTailCause};
    use keel_storage::InMemoryBackend;
    use tempfile::tempdir;

    fn open(backend: &InMemoryBackend) -> IndexStore {
        IndexStore::open(Box::new(backend.clone()), Config::default()).unwrap()
    }

    #[test]
    fn tables_survive_reopen() {
        let backend = InMemoryBackend::new();
        {
            let store = open(&backend);
            let t = store.open_table::<String, u64>("t").unwrap();
            t.put("a".into(), 1).unwrap();
            t.put("b".into(), 2).unwrap();
            t.remove(&"a".into()).unwrap();
            t.update("b".into(), &|n: Option<&u64>| n.copied().unwrap_or(0) * 10)
                .unwrap();
        }

        let store = open(&backend);
        let t = store.open_table::<String, u64>("t").unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(&"a".into()).unwrap(), None);
        assert_eq!(t.get(&"b".into()).unwrap(), Some(20));
    }

    #[test]
    fn oversized_logged_resize_still_opens() {
        use crate::types::OperationUnitId;
        use crate::wal::{LocalHashTableOperation, ResizeTable};

        let backend = InMemoryBackend::new();
        {
            let store = open(&backend);
            let t = store.open_table::<u64, u64>("t").unwrap();
            t.put(1, 1).unwrap();
        }
        // A resize no machine can honor, as an older build could log it.
        let resize = ResizeTable {
            base: LocalHashTableOperation::new(OperationUnitId::new(1, 99), "t"),
            old_capacity: 0,
            new_capacity: u64::MAX,
        };
        backend.extend(&encode_frame(&resize.into(), usize::MAX).unwrap());

        let store = open(&backend);
        assert_eq!(store.recovery_report().records_applied, 3);
        let t = store.open_table::<u64, u64>("t").unwrap();
        assert_eq!(t.get(&1).unwrap(), Some(1));
    }

    #[test]
    fn epoch_advances_each_open() {
        let backend = InMemoryBackend::new();
        let first = open(&backend);
        assert_eq!(first.epoch(), 1);
        first.open_table::<u64, u64>("t").unwrap();
        drop(first);

        let second = open(&backend);
        assert_eq!(second.recovery_report().max_epoch, Some(1));
        assert_eq!(second.epoch(), 2);
        assert_eq!(second.next_unit_id().epoch(), 2);
    }

    #[test]
    fn new_table_logs_create_once() {
        let backend = InMemoryBackend::new();
        let store = open(&backend);
        store.open_table::<u64, String>("names").unwrap();
        let size = store.log_size().unwrap();
        assert!(size > 0);
        drop(store);

        let store = open(&backend);
        assert_eq!(store.table_names(), vec!["names"]);
        let t = store.open_table::<u64, String>("names").unwrap();
        assert!(t.is_empty());
        assert_eq!(store.log_size().unwrap(), size);
    }

    #[test]
    fn open_twice_is_invalid_operation() {
        let store = open(&InMemoryBackend::new());
        let _t = store.open_table::<u64, u64>("t").unwrap();
        let err = store.open_table::<u64, u64>("t").unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn empty_name_is_rejected() {
        let store = open(&InMemoryBackend::new());
        assert!(matches!(
            store.open_table::<u64, u64>("").unwrap_err(),
            CoreError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn engine_version_mismatch_is_invalid_format() {
        let backend = InMemoryBackend::new();
        let log = OperationLog::new(Box::new(backend.clone()), &Config::default());
        log.append(
            &CreateTable {
                base: LocalHashTableOperation::new(OperationUnitId::new(1, 1), "old"),
                engine_version: ENGINE_VERSION + 1,
            }
            .into(),
        )
        .unwrap();
        drop(log);

        let store = open(&backend);
        let err = store.open_table::<u64, u64>("old").unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat { .. }));
        // The image is kept, so the failure is repeatable.
        assert!(store.open_table::<u64, u64>("old").is_err());
    }

    #[test]
    fn wrong_types_are_invalid_format() {
        let backend = InMemoryBackend::new();
        {
            let store = open(&backend);
            let t = store.open_table::<String, String>("t").unwrap();
            t.put("k".into(), "not eight bytes".into()).unwrap();
        }
        let store = open(&backend);
        assert!(matches!(
            store.open_table::<String, u64>("t").unwrap_err(),
            CoreError::InvalidFormat { .. }
        ));
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let backend = InMemoryBackend::new();
        {
            let store = open(&backend);
            let t = store.open_table::<u64, u64>("t").unwrap();
            t.put(1, 1).unwrap();
        }
        let clean = backend.data().len() as u64;

        let frame = encode_frame(
            &CreateTable {
                base: LocalHashTableOperation::new(OperationUnitId::new(9, 9), "x"),
                engine_version: 0,
            }
            .into(),
            usize::MAX,
        )
        .unwrap();
        backend.extend(&frame[..frame.len() - 1]);

        let store = open(&backend);
        let torn = store.recovery_report().torn_tail.clone().unwrap();
        assert_eq!(torn.offset, clean);
        assert_eq!(torn.cause, TornTailCause::ShortFrame);
        assert_eq!(store.log_size().unwrap(), clean);

        // New appends follow clean data and survive the next open.
        let t = store.open_table::<u64, u64>("t").unwrap();
        t.put(2, 2).unwrap();
        drop(t);
        drop(store);

        let store = open(&backend);
        assert!(store.recovery_report().torn_tail.is_none());
        let t = store.open_table::<u64, u64>("t").unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn torn_tail_kept_when_truncation_disabled() {
        let backend = InMemoryBackend::new();
        drop(open(&backend));
        backend.extend(b"KHW");

        let config = Config::default().truncate_torn_tail(false);
        let store = IndexStore::open(Box::new(backend.clone()), config).unwrap();
        assert!(store.recovery_report().torn_tail.is_some());
        assert_eq!(store.log_size().unwrap(), 3);
    }

    #[test]
    fn mid_log_corruption_fails_open() {
        let backend = InMemoryBackend::new();
        {
            let store = open(&backend);
            let t = store.open_table::<u64, u64>("t").unwrap();
            for i in 0..4 {
                t.put(i, i).unwrap();
            }
        }
        backend.corrupt_byte(20, 0xFF);

        let err = IndexStore::open(Box::new(backend), Config::default()).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn validated_put_survives_reopen() {
        let backend = InMemoryBackend::new();
        {
            let store = open(&backend);
            let t = store.open_table::<String, u64>("unique").unwrap();
            assert!(t
                .validated_put("k".into(), 1, &validators::insert_if_absent())
                .unwrap());
            assert!(!t
                .validated_put("k".into(), 2, &validators::insert_if_absent())
                .unwrap());
        }
        let store = open(&backend);
        let t = store.open_table::<String, u64>("unique").unwrap();
        assert_eq!(t.get(&"k".into()).unwrap(), Some(1));
    }

    #[test]
    fn unit_shared_across_tables() {
        let backend = InMemoryBackend::new();
        let store = open(&backend);
        let a = store.open_table::<u64, u64>("a").unwrap();
        let b = store.open_table::<u64, u64>("b").unwrap();

        let unit = store.next_unit_id();
        a.in_unit(unit).put(1, 1).unwrap();
        b.in_unit(unit).put(1, 1).unwrap();

        let log = OperationLog::new(Box::new(backend), &Config::default());
        let units: Vec<_> = log
            .scan()
            .unwrap()
            .map(|item| item.unwrap().1)
            .filter(|op| matches!(op, HashTableOperation::Put(_)))
            .map(|op| op.operation_unit_id())
            .collect();
        assert_eq!(units, vec![unit, unit]);
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempdir().unwrap();
        {
            let store = IndexStore::open_dir(dir.path(), Config::default()).unwrap();
            let t = store.open_table::<i64, Vec<u8>>("blobs").unwrap();
            t.put(-5, vec![1, 2, 3]).unwrap();
            store.sync().unwrap();
        }
        assert!(dir.path().join(LOG_FILE_NAME).exists());

        let store = IndexStore::open_dir(dir.path(), Config::default()).unwrap();
        let t = store.open_table::<i64, Vec<u8>>("blobs").unwrap();
        assert_eq!(t.get(&-5).unwrap(), Some(vec![1, 2, 3]));
    }
}
