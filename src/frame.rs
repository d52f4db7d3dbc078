//! A single buffer pool slot.
//!
//! The page bytes live behind their own `RwLock` so that the pin holder(s)
//! of a resident frame can read/write page contents without contending the
//! frame's swap_lock on every access. `FrameMeta` — block identity, pin
//! count, dirty flag, clock bit — lives behind the actual swap_lock:
//! transitions that change identity, pin count, or dirty state all require
//! holding it.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use crate::block::BlockId;
use crate::error::PoolResult;
use crate::log::{LogSink, Lsn};
use crate::page::Page;
use crate::storage::BlockStore;

/// Per-frame metadata guarded by the swap_lock.
#[derive(Debug)]
pub struct FrameMeta {
    pub(crate) block: Option<BlockId>,
    pub(crate) pins: usize,
    pub(crate) dirty: bool,
    pub(crate) recent: bool,
    pub(crate) lsn: Option<Lsn>,
}

impl FrameMeta {
    fn new() -> Self {
        Self {
            block: None,
            pins: 0,
            dirty: false,
            recent: false,
            lsn: None,
        }
    }

    /// Returns `true` if the pin count was zero before this call (i.e. the
    /// frame is transitioning from available to in-use).
    pub fn pin(&mut self) -> bool {
        let was_unpinned = self.pins == 0;
        self.pins += 1;
        self.recent = true;
        was_unpinned
    }

    /// Returns `true` if the pin count became zero (i.e. the frame is now
    /// available for eviction).
    pub fn unpin(&mut self) -> bool {
        assert!(self.pins > 0, "unpin on a frame with zero pins");
        self.pins -= 1;
        self.pins == 0
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    /// Atomically read and clear the clock bit.
    pub fn check_recent_and_reset(&mut self) -> bool {
        let prior = self.recent;
        self.recent = false;
        prior
    }
}

#[derive(Debug)]
pub struct Frame {
    page: RwLock<Page>,
    meta: Mutex<FrameMeta>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            meta: Mutex::new(FrameMeta::new()),
        }
    }

    /// Acquire the swap_lock, blocking.
    pub fn lock(&self) -> MutexGuard<'_, FrameMeta> {
        self.meta.lock().unwrap()
    }

    /// Non-blocking swap_lock acquisition, used only by the replacement
    /// scanner: it skips any frame whose lock isn't immediately free rather
    /// than waiting behind a swap in progress.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, FrameMeta>> {
        match self.meta.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(p)) => Some(p.into_inner()),
        }
    }

    pub fn read_page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read().unwrap()
    }

    pub fn write_page(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write().unwrap()
    }

    /// Record that a pin holder modified the page at the given LSN.
    pub fn mark_dirty(&self, lsn: Lsn) {
        let mut meta = self.lock();
        meta.dirty = true;
        meta.lsn = Some(lsn);
    }

    pub fn pin_count(&self) -> usize {
        self.lock().pins
    }

    pub fn block_id(&self) -> Option<BlockId> {
        self.lock().block.clone()
    }

    #[cfg(test)]
    pub fn is_pinned(&self) -> bool {
        self.lock().pins > 0
    }

    /// Flush if dirty: WAL-flush through the page's LSN, then write the
    /// page to storage, then clear dirty. No-op when clean or when the
    /// frame holds no block.
    pub fn flush_locked(
        &self,
        meta: &mut FrameMeta,
        store: &dyn BlockStore,
        log: &dyn LogSink,
    ) -> PoolResult<()> {
        if !meta.dirty {
            return Ok(());
        }
        let Some(block_id) = meta.block.clone() else {
            return Ok(());
        };
        if let Some(lsn) = meta.lsn {
            log.flush_through(lsn);
        }
        let page = self.page.read().unwrap();
        store.write(&block_id, &page)?;
        drop(page);
        meta.dirty = false;
        meta.lsn = None;
        Ok(())
    }

    /// Load `block_id` into this frame. Caller must have already flushed
    /// any prior dirty contents and removed the old identity from the
    /// resident index. A failed read here clears the frame's identity so
    /// it is never left pointing at stale data under a stale index entry.
    pub fn load_block_locked(
        &self,
        meta: &mut FrameMeta,
        block_id: &BlockId,
        store: &dyn BlockStore,
    ) -> PoolResult<()> {
        meta.block = None;
        let mut page = self.page.write().unwrap();
        if let Err(err) = store.read(block_id, &mut page) {
            drop(page);
            return Err(err.into());
        }
        drop(page);
        meta.block = Some(block_id.clone());
        meta.dirty = false;
        meta.recent = false;
        meta.lsn = None;
        Ok(())
    }

    /// Append a new block to `file` and initialize it via `formatter`. The
    /// freshly appended page is dirty by construction: its formatted
    /// contents have never been written back.
    pub fn assign_to_new_locked<F>(
        &self,
        meta: &mut FrameMeta,
        file: &str,
        formatter: F,
        store: &dyn BlockStore,
    ) -> PoolResult<BlockId>
    where
        F: FnOnce(&mut Page),
    {
        let block_id = store.append(file)?;
        let mut page = self.page.write().unwrap();
        formatter(&mut page);
        drop(page);
        meta.block = Some(block_id.clone());
        meta.dirty = true;
        meta.recent = false;
        meta.lsn = None;
        Ok(block_id)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
