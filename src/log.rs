//! The log manager: an external collaborator that provides a
//! flush-log-up-to-LSN operation invoked before writing a dirty page (WAL).
//! Recovery and log-record iteration are out of scope for this core; only
//! the narrow interface the pool calls is implemented.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::block::BlockId;
use crate::page::Page;
use crate::storage::BlockStore;

pub type Lsn = usize;

/// Narrow WAL interface the pool core depends on.
pub trait LogSink: std::fmt::Debug + Send + Sync {
    /// Ensure every log record up to and including `lsn` is durable.
    fn flush_through(&self, lsn: Lsn);
}

/// A minimal, real log manager: records are appended to a single growing
/// log file and `flush_through` writes the current log page out once the
/// requested LSN has already been assigned but not yet persisted.
#[derive(Debug)]
pub struct FileLogManager {
    store: std::sync::Arc<dyn BlockStore>,
    log_file: String,
    inner: Mutex<LogState>,
    latest_lsn: AtomicUsize,
}

#[derive(Debug)]
struct LogState {
    page: Page,
    current_block: BlockId,
    last_saved_lsn: Lsn,
}

impl FileLogManager {
    pub fn new(store: std::sync::Arc<dyn BlockStore>, log_file: impl Into<String>) -> std::io::Result<Self> {
        let log_file = log_file.into();
        let mut page = Page::new();
        let existing_blocks = store.length(&log_file)?;
        let current_block = if existing_blocks == 0 {
            Self::append_new_block(&store, &log_file, &mut page)?
        } else {
            let block = BlockId::new(log_file.clone(), existing_blocks - 1);
            store.read(&block, &mut page)?;
            block
        };
        Ok(Self {
            store,
            log_file,
            inner: Mutex::new(LogState {
                page,
                current_block,
                last_saved_lsn: 0,
            }),
            latest_lsn: AtomicUsize::new(0),
        })
    }

    fn append_new_block(
        store: &std::sync::Arc<dyn BlockStore>,
        log_file: &str,
        page: &mut Page,
    ) -> std::io::Result<BlockId> {
        let block_id = store.append(log_file)?;
        page.set_int(0, store.block_size() as i32);
        store.write(&block_id, page)?;
        Ok(block_id)
    }

    /// Append a log record, returning its assigned LSN.
    pub fn append(&self, record: &[u8]) -> std::io::Result<Lsn> {
        let mut state = self.inner.lock().unwrap();
        let bytes_needed = record.len() + 4;
        let mut boundary = state.page.get_int(0) as usize;
        if boundary.saturating_sub(bytes_needed) < 4 {
            self.flush_locked(&mut state)?;
            state.current_block = Self::append_new_block(&self.store, &self.log_file, &mut state.page)?;
            boundary = state.page.get_int(0) as usize;
        }
        let record_pos = boundary - bytes_needed;
        state.page.set_bytes(record_pos, record);
        state.page.set_int(0, record_pos as i32);
        let lsn = self.latest_lsn.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(lsn)
    }

    fn flush_locked(&self, state: &mut LogState) -> std::io::Result<()> {
        self.store.write(&state.current_block, &state.page)?;
        self.store.sync(&self.log_file)?;
        state.last_saved_lsn = self.latest_lsn.load(Ordering::Acquire);
        Ok(())
    }

    /// Flush unconditionally, returning any I/O error instead of swallowing
    /// it (used by `flush_through`, which has no error channel of its own).
    pub fn try_flush_through(&self, lsn: Lsn) -> std::io::Result<()> {
        let mut state = self.inner.lock().unwrap();
        if state.last_saved_lsn >= lsn {
            return Ok(());
        }
        self.flush_locked(&mut state)
    }
}

impl LogSink for FileLogManager {
    fn flush_through(&self, lsn: Lsn) {
        // WAL discipline treats the log manager as a trusted collaborator
        // with no error channel of its own; a flush failure here is
        // unusual enough (full disk, I/O fault on the log device) that
        // panicking to surface it loudly beats silently writing a dirty
        // page whose WAL record never made it to disk.
        self.try_flush_through(lsn)
            .expect("log flush_through failed");
    }
}

/// A no-op sink for tests that don't care about WAL ordering, only that it
/// was invoked.
#[derive(Debug, Default)]
pub struct CountingLogSink {
    pub flushes: AtomicUsize,
    pub last_lsn: AtomicUsize,
}

impl CountingLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }
}

impl LogSink for CountingLogSink {
    fn flush_through(&self, lsn: Lsn) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.last_lsn.store(lsn, Ordering::Relaxed);
    }
}
