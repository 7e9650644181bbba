//! Test fixtures and store helpers.
//!
//! A [`TestStore`] keeps a handle on the bytes under its store so tests can
//! reopen it, which is how recovery is exercised.

use keel_core::{Config, IndexStore};
use keel_storage::InMemoryBackend;
use std::path::Path;
use tempfile::TempDir;

enum Medium {
    Memory(InMemoryBackend),
    File(TempDir),
}

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: IndexStore,
    config: Config,
    medium: Medium,
}

impl TestStore {
    /// Creates a store over an in-memory log.
    pub fn memory() -> Self {
        Self::memory_with(Config::default())
    }

    /// Creates a store over an in-memory log with `config`.
    pub fn memory_with(config: Config) -> Self {
        let backend = InMemoryBackend::new();
        let store = IndexStore::open(Box::new(backend.clone()), config.clone())
            .expect("Failed to open in-memory store");
        Self {
            store,
            config,
            medium: Medium::Memory(backend),
        }
    }

    /// Creates a store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config::default();
        let store = IndexStore::open_dir(temp_dir.path(), config.clone())
            .expect("Failed to open file store");
        Self {
            store,
            config,
            medium: Medium::File(temp_dir),
        }
    }

    /// Returns the store directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        match &self.medium {
            Medium::File(dir) => Some(dir.path()),
            Medium::Memory(_) => None,
        }
    }

    /// Returns the raw log bytes.
    pub fn log_bytes(&self) -> Vec<u8> {
        match &self.medium {
            Medium::Memory(backend) => backend.data(),
            Medium::File(dir) => std::fs::read(dir.path().join(keel_core::LOG_FILE_NAME))
                .expect("Failed to read log file"),
        }
    }

    /// Closes the store and opens it again from the same log, as after a
    /// restart. Tables opened from the old store must be dropped first.
    pub fn reopen(self) -> Self {
        let Self {
            store,
            config,
            medium,
        } = self;
        drop(store);

        let store = match &medium {
            Medium::Memory(backend) => IndexStore::open(Box::new(backend.clone()), config.clone()),
            Medium::File(dir) => IndexStore::open_dir(dir.path(), config.clone()),
        }
        .expect("Failed to reopen store");
        Self {
            store,
            config,
            medium,
        }
    }

    /// Returns the in-memory backend, for corrupting bytes in place.
    pub fn memory_backend(&self) -> Option<&InMemoryBackend> {
        match &self.medium {
            Medium::Memory(backend) => Some(backend),
            Medium::File(_) => None,
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = IndexStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust
/// use keel_core::IndexEngine;
/// use keel_testkit::with_temp_store;
///
/// with_temp_store(|store| {
///     let table = store.open_table::<u64, u64>("t").unwrap();
///     table.put(1, 2).unwrap();
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&IndexStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary file-based store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&IndexStore, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store.path().expect("File store should have a path");
    f(&test_store.store, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::IndexEngine;

    #[test]
    fn memory_store_reopens() {
        let ts = TestStore::memory();
        {
            let t = ts.open_table::<String, String>("names").unwrap();
            t.put("a".into(), "alpha".into()).unwrap();
        }
        let ts = ts.reopen();
        let t = ts.open_table::<String, String>("names").unwrap();
        assert_eq!(t.get(&"a".into()).unwrap(), Some("alpha".to_string()));
        assert!(!ts.log_bytes().is_empty());
    }

    #[test]
    fn file_store_reopens() {
        let ts = TestStore::file();
        assert!(ts.path().is_some());
        {
            let t = ts.open_table::<u64, u64>("t").unwrap();
            t.put(1, 1).unwrap();
        }
        let ts = ts.reopen();
        assert_eq!(ts.recovery_report().records_applied, 2);
        assert_eq!(&ts.log_bytes()[..4], b"KHWL");
    }

    #[test]
    fn with_file_store_passes_path() {
        with_file_store(|store, path| {
            assert!(path.exists());
            store.open_table::<u64, u64>("t").unwrap();
        });
    }
}
