//! Crash simulation for the operation log.
//!
//! [`CrashableBackend`] wraps another backend and "loses power" once a byte
//! budget is used up: the append that crosses the budget writes only the
//! bytes that fit and fails, and every later write or truncate fails. The stored bytes
//! are then exactly what a real crash mid-append could leave behind.
//!
//! ## Usage
//!
//! ```rust
//! use keel_core::{Config, IndexEngine, IndexStore};
//! use keel_storage::InMemoryBackend;
//! use keel_testkit::crash::CrashableBackend;
//!
//! let disk = InMemoryBackend::new();
//! let backend = CrashableBackend::new(Box::new(disk.clone()));
//! let switch = backend.switch();
//!
//! let store = IndexStore::open(Box::new(backend), Config::default()).unwrap();
//! let table = store.open_table::<u64, u64>("t").unwrap();
//! table.put(1, 1).unwrap();
//!
//! switch.crash_after(5);
//! assert!(table.put(2, 2).is_err());
//! drop((table, store));
//!
//! let store = IndexStore::open(Box::new(disk), Config::default()).unwrap();
//! assert!(store.recovery_report().torn_tail.is_some());
//! ```

use keel_storage::{StorageBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct CrashState {
    budget: AtomicUsize,
    crashed: AtomicBool,
    fail_on_flush: AtomicBool,
}

/// Shared control over a [`CrashableBackend`] after it has been boxed.
#[derive(Debug, Clone)]
pub struct CrashSwitch {
    state: Arc<CrashState>,
}

impl CrashSwitch {
    /// Crashes once `bytes` more bytes have been appended.
    pub fn crash_after(&self, bytes: usize) {
        self.state.budget.store(bytes, Ordering::SeqCst);
    }

    /// Makes flush and sync fail.
    pub fn set_fail_on_flush(&self, fail: bool) {
        self.state.fail_on_flush.store(fail, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    /// Clears the crash and removes the byte budget.
    pub fn reset(&self) {
        self.state.budget.store(usize::MAX, Ordering::SeqCst);
        self.state.crashed.store(false, Ordering::SeqCst);
        self.state.fail_on_flush.store(false, Ordering::SeqCst);
    }
}

/// A storage backend wrapper that can simulate crashes.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    state: Arc<CrashState>,
}

impl CrashableBackend {
    /// Wraps `inner` with no crash scheduled.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            state: Arc::new(CrashState {
                budget: AtomicUsize::new(usize::MAX),
                crashed: AtomicBool::new(false),
                fail_on_flush: AtomicBool::new(false),
            }),
        }
    }

    /// Returns a handle that keeps working after the backend is boxed.
    pub fn switch(&self) -> CrashSwitch {
        CrashSwitch {
            state: Arc::clone(&self.state),
        }
    }

    fn crash(&self, what: &str) -> StorageError {
        self.state.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(self.crash("write"));
        }

        let budget = self.state.budget.load(Ordering::SeqCst);
        if data.len() > budget {
            if budget > 0 {
                let _ = self.inner.append(&data[..budget]);
            }
            self.state.budget.store(0, Ordering::SeqCst);
            return Err(self.crash("partial write"));
        }

        if budget != usize::MAX {
            self.state.budget.store(budget - data.len(), Ordering::SeqCst);
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.state.fail_on_flush.load(Ordering::SeqCst) {
            return Err(self.crash("flush"));
        }
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.state.fail_on_flush.load(Ordering::SeqCst) {
            return Err(self.crash("sync"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(self.crash("truncate"));
        }
        self.inner.truncate(new_size)
    }
}

impl std::fmt::Debug for CrashableBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashableBackend")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Outcome of replaying a log that crashed at one cut point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashPointResult {
    /// Bytes of the final frame that reached storage.
    pub cut: usize,
    /// Entries recovered for the table.
    pub recovered: Vec<(u64, u64)>,
    /// Whether replay reported a torn tail.
    pub torn: bool,
}

/// Writes `committed` puts, then crashes during one more put at every
/// possible byte of its frame, reopening the store each time.
///
/// Every result must hold exactly the committed entries.
pub fn crash_at_every_byte(committed: &[(u64, u64)], last: (u64, u64)) -> Vec<CrashPointResult> {
    use keel_core::{Config, IndexEngine, IndexStore};
    use keel_storage::InMemoryBackend;

    // Learn the size of the final frame from a clean run.
    let frame_len = {
        let disk = InMemoryBackend::new();
        let store = IndexStore::open(Box::new(disk.clone()), Config::default())
            .expect("open clean store");
        let table = store.open_table::<u64, u64>("t").expect("open table");
        for &(k, v) in committed {
            table.put(k, v).expect("put");
        }
        let before = disk.data().len();
        table.put(last.0, last.1).expect("put");
        disk.data().len() - before
    };

    (0..frame_len)
        .map(|cut| {
            let disk = InMemoryBackend::new();
            let backend = CrashableBackend::new(Box::new(disk.clone()));
            let switch = backend.switch();
            {
                let store =
                    IndexStore::open(Box::new(backend), Config::default()).expect("open store");
                let table = store.open_table::<u64, u64>("t").expect("open table");
                for &(k, v) in committed {
                    table.put(k, v).expect("put");
                }
                switch.crash_after(cut);
                assert!(table.put(last.0, last.1).is_err());
            }

            let store =
                IndexStore::open(Box::new(disk), Config::default()).expect("reopen after crash");
            let torn = store.recovery_report().torn_tail.is_some();
            let table = store.open_table::<u64, u64>("t").expect("reopen table");
            let mut recovered = table.entries();
            recovered.sort_unstable();
            CrashPointResult {
                cut,
                recovered,
                torn,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_storage::InMemoryBackend;

    #[test]
    fn partial_write_keeps_prefix() {
        let disk = InMemoryBackend::new();
        let mut backend = CrashableBackend::new(Box::new(disk.clone()));
        let switch = backend.switch();

        backend.append(b"abc").unwrap();
        switch.crash_after(2);
        assert!(backend.append(b"defg").is_err());
        assert!(switch.has_crashed());
        assert!(backend.append(b"h").is_err());
        assert_eq!(disk.data(), b"abcde");

        switch.reset();
        backend.append(b"!").unwrap();
        assert_eq!(disk.data(), b"abcde!");
    }

    #[test]
    fn flush_failure() {
        let mut backend = CrashableBackend::new(Box::new(InMemoryBackend::new()));
        backend.switch().set_fail_on_flush(true);
        assert!(backend.flush().is_err());
        assert!(backend.sync().is_err());
    }

    #[test]
    fn crashed_log_refuses_writes_after_reset() {
        use keel_core::{Config, CoreError, IndexEngine, IndexStore};

        let disk = InMemoryBackend::new();
        let backend = CrashableBackend::new(Box::new(disk.clone()));
        let switch = backend.switch();
        let store = IndexStore::open(Box::new(backend), Config::default()).unwrap();
        let table = store.open_table::<u64, u64>("t").unwrap();
        table.put(1, 1).unwrap();

        switch.crash_after(5);
        assert!(table.put(2, 2).is_err());

        // The torn bytes could not be cut off, so nothing may follow them.
        switch.reset();
        let err = table.put(3, 3).unwrap_err();
        assert!(matches!(err, CoreError::LogPoisoned { .. }));
        assert!(table.put(4, 4).is_err());
        assert_eq!(table.get(&3).unwrap(), None);
        drop((table, store));

        let store = IndexStore::open(Box::new(disk), Config::default()).unwrap();
        assert!(store.recovery_report().torn_tail.is_some());
        let table = store.open_table::<u64, u64>("t").unwrap();
        assert_eq!(table.entries(), vec![(1, 1)]);

        // A fresh open works normally again.
        table.put(3, 3).unwrap();
        assert_eq!(table.get(&3).unwrap(), Some(3));
    }

    #[test]
    fn every_cut_recovers_committed_entries() {
        let committed = [(1, 10), (2, 20), (3, 30)];
        let results = crash_at_every_byte(&committed, (4, 40));
        assert!(!results.is_empty());

        for result in &results {
            assert_eq!(result.recovered, committed.to_vec(), "cut at {}", result.cut);
            assert_eq!(result.torn, result.cut > 0, "cut at {}", result.cut);
        }
    }
}
