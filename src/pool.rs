//! The pool manager: orchestrates `pin`, `pin_new`, `unpin`, `flush_all`,
//! `available`, and `hit_rate` over the frame array, the striped latches,
//! the resident index, and the clock scanner.
//!
//! Fixed-size striped latches serialize only the requests that collide on
//! a stripe; `pin` makes a single attempt per call and loops explicitly on
//! a stale lookup instead of recursing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::block::BlockId;
use crate::error::PoolResult;
use crate::frame::Frame;
use crate::latches::{StripedLatches, DEFAULT_STRIPES};
use crate::log::LogSink;
use crate::page::Page;
use crate::replacement::ClockScanner;
use crate::storage::BlockStore;

const RESIDENT_SHARDS: usize = 16;

/// The resident index: a concurrent mapping from block identity to the
/// frame currently holding it. Sharded into fixed buckets so lookups on
/// unrelated blocks don't contend a single map's lock.
#[derive(Debug)]
struct ResidentIndex {
    shards: Vec<Mutex<HashMap<BlockId, Arc<Frame>>>>,
}

impl ResidentIndex {
    fn new() -> Self {
        Self {
            shards: (0..RESIDENT_SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard_of(&self, block_id: &BlockId) -> usize {
        fnv1a(block_id) % self.shards.len()
    }

    fn get(&self, block_id: &BlockId) -> Option<Arc<Frame>> {
        self.shards[self.shard_of(block_id)]
            .lock()
            .unwrap()
            .get(block_id)
            .cloned()
    }

    fn insert(&self, block_id: BlockId, frame: Arc<Frame>) {
        let shard = self.shard_of(&block_id);
        self.shards[shard].lock().unwrap().insert(block_id, frame);
    }

    fn remove(&self, block_id: &BlockId) {
        let shard = self.shard_of(block_id);
        self.shards[shard].lock().unwrap().remove(block_id);
    }
}

/// FNV-1a hash over a block identity, used to pick its resident-index shard.
fn fnv1a(block_id: &BlockId) -> usize {
    let mut h = 0xcbf29ce484222325u64;
    for &byte in block_id.filename.as_bytes() {
        h ^= byte as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h ^= block_id.block_num as u64;
    h = h.wrapping_mul(0x100000001b3);
    h as usize
}

/// Rolling pin-request / miss counters.
#[derive(Debug, Default)]
struct BufferStats {
    total: AtomicUsize,
    misses: AtomicUsize,
}

impl BufferStats {
    fn record_request(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads and zeroes both counters, so each call reports the rate since
    /// the previous call rather than an ever-growing cumulative total.
    fn drain_hit_rate(&self) -> f64 {
        let total = self.total.swap(0, Ordering::AcqRel);
        let misses = self.misses.swap(0, Ordering::AcqRel);
        if total == 0 {
            1.0
        } else {
            1.0 - (misses as f64 / total as f64)
        }
    }
}

#[derive(Debug)]
pub struct BufferPool {
    frames: Vec<Arc<Frame>>,
    num_available: AtomicUsize,
    block_latches: StripedLatches,
    file_latches: StripedLatches,
    index: ResidentIndex,
    scanner: ClockScanner,
    store: Arc<dyn BlockStore>,
    log: Arc<dyn LogSink>,
    stats: BufferStats,
}

impl BufferPool {
    pub fn new(num_buffers: usize, store: Arc<dyn BlockStore>, log: Arc<dyn LogSink>) -> Self {
        assert!(num_buffers >= 2, "buffer pool requires at least 2 buffers");
        let frames = (0..num_buffers).map(|_| Arc::new(Frame::new())).collect();
        Self {
            frames,
            num_available: AtomicUsize::new(num_buffers),
            block_latches: StripedLatches::new(DEFAULT_STRIPES),
            file_latches: StripedLatches::new(DEFAULT_STRIPES),
            index: ResidentIndex::new(),
            scanner: ClockScanner::new(),
            store,
            log,
            stats: BufferStats::default(),
        }
    }

    pub fn available(&self) -> usize {
        self.num_available.load(Ordering::Acquire)
    }

    /// Reads and resets the rolling hit/miss counters. Returns `1.0` when
    /// no requests have been made since the last call.
    pub fn hit_rate(&self) -> f64 {
        self.stats.drain_hit_rate()
    }

    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    pub fn log(&self) -> &Arc<dyn LogSink> {
        &self.log
    }

    /// Pin `block_id`, returning a shared, pinned frame handle, or `None` if
    /// the replacement scanner finds no victim on this attempt. Running out
    /// of victims is a soft failure, not an error — the caller decides
    /// whether and when to retry.
    pub fn pin(&self, block_id: &BlockId) -> PoolResult<Option<Arc<Frame>>> {
        self.stats.record_request();
        let stripe = self.block_latches.index_for(block_id);

        loop {
            let latch = self.block_latches.lock(stripe);

            if let Some(frame) = self.index.get(block_id) {
                let mut meta = frame.lock();
                // Release the block latch early: subsequent pinners for this
                // block will find the same frame and take the same path.
                drop(latch);

                if meta.block() != Some(block_id) {
                    // A concurrent eviction reassigned this frame between our
                    // lookup and acquiring its swap_lock. Restart from the
                    // top rather than recursing.
                    drop(meta);
                    continue;
                }

                let was_unpinned = meta.pin();
                if was_unpinned {
                    self.num_available.fetch_sub(1, Ordering::AcqRel);
                }
                drop(meta);
                return Ok(Some(frame));
            }

            self.stats.record_miss();

            let Some((victim_idx, mut meta)) = self.scanner.evict(&self.frames) else {
                return Ok(None);
            };
            let frame = Arc::clone(&self.frames[victim_idx]);

            // Flush before touching the index: if this fails, the old
            // identity and its index entry must both survive untouched.
            frame.flush_locked(&mut meta, self.store.as_ref(), self.log.as_ref())?;
            if let Some(old_block) = meta.block().cloned() {
                self.index.remove(&old_block);
            }

            // A failed read clears the frame's identity internally and
            // propagates before we ever insert the new index entry.
            frame.load_block_locked(&mut meta, block_id, self.store.as_ref())?;

            let became_pinned = meta.pin();
            debug_assert!(became_pinned, "freshly loaded frame must have zero pins");
            drop(meta);

            self.index.insert(block_id.clone(), Arc::clone(&frame));
            self.num_available.fetch_sub(1, Ordering::AcqRel);
            return Ok(Some(frame));
        }
    }

    /// Append a new block to `file`, format it, and return a pinned frame
    /// holding it.
    pub fn pin_new<F>(&self, file: &str, formatter: F) -> PoolResult<Option<Arc<Frame>>>
    where
        F: FnOnce(&mut Page),
    {
        let stripe = self.file_latches.index_for(file);
        let _latch = self.file_latches.lock(stripe);

        let Some((victim_idx, mut meta)) = self.scanner.evict(&self.frames) else {
            return Ok(None);
        };
        let frame = Arc::clone(&self.frames[victim_idx]);

        frame.flush_locked(&mut meta, self.store.as_ref(), self.log.as_ref())?;
        if let Some(old_block) = meta.block().cloned() {
            self.index.remove(&old_block);
        }

        let block_id = frame.assign_to_new_locked(&mut meta, file, formatter, self.store.as_ref())?;
        let became_pinned = meta.pin();
        debug_assert!(became_pinned, "freshly appended frame must have zero pins");
        drop(meta);

        self.index.insert(block_id, Arc::clone(&frame));
        self.num_available.fetch_sub(1, Ordering::AcqRel);
        Ok(Some(frame))
    }

    /// Unpin a single frame.
    pub fn unpin(&self, frame: &Arc<Frame>) {
        let mut meta = frame.lock();
        if meta.unpin() {
            self.num_available.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Unpin several frames. Each is independent; no cross-frame atomicity
    /// is required.
    pub fn unpin_many<'a>(&self, frames: impl IntoIterator<Item = &'a Arc<Frame>>) {
        for frame in frames {
            self.unpin(frame);
        }
    }

    /// Flush every frame. Not a barrier: concurrent writers may re-dirty a
    /// frame after it is flushed here.
    pub fn flush_all(&self) -> PoolResult<()> {
        for frame in &self.frames {
            let mut meta = frame.lock();
            frame.flush_locked(&mut meta, self.store.as_ref(), self.log.as_ref())?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn assert_buffer_count_invariant(&self) {
        let available = self.available();
        let pinned = self.frames.iter().filter(|f| f.is_pinned()).count();
        assert_eq!(
            available + pinned,
            self.frames.len(),
            "available={available}, pinned={pinned}, total={}",
            self.frames.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::CountingLogSink;
    use crate::storage::MemBlockStore;
    use std::sync::Barrier;
    use std::thread;

    fn pool(num_buffers: usize) -> BufferPool {
        let store: Arc<dyn BlockStore> = Arc::new(MemBlockStore::new());
        let log: Arc<dyn LogSink> = Arc::new(CountingLogSink::new());
        BufferPool::new(num_buffers, store, log)
    }

    fn precreate(store: &Arc<dyn BlockStore>, file: &str, count: usize) {
        for _ in 0..count {
            store.append(file).unwrap();
        }
    }

    #[test]
    fn fills_pool_with_distinct_blocks() {
        let bp = pool(3);
        precreate(bp.store(), "f", 3);
        let f1 = bp.pin(&BlockId::new("f", 0)).unwrap().unwrap();
        let f2 = bp.pin(&BlockId::new("f", 1)).unwrap().unwrap();
        let f3 = bp.pin(&BlockId::new("f", 2)).unwrap().unwrap();

        assert!(!Arc::ptr_eq(&f1, &f2));
        assert!(!Arc::ptr_eq(&f2, &f3));
        assert_eq!(bp.available(), 0);
        assert_eq!(bp.hit_rate(), 0.0); // 3 requests, 3 misses
    }

    #[test]
    fn exhaustion_then_recovery_via_unpin() {
        let bp = pool(3);
        precreate(bp.store(), "f", 4);
        let b1 = BlockId::new("f", 0);
        let f1 = bp.pin(&b1).unwrap().unwrap();
        bp.pin(&BlockId::new("f", 1)).unwrap().unwrap();
        bp.pin(&BlockId::new("f", 2)).unwrap().unwrap();

        assert!(bp.pin(&BlockId::new("f", 3)).unwrap().is_none());

        bp.unpin(&f1);
        let f4 = bp.pin(&BlockId::new("f", 3)).unwrap().expect("should evict b1's frame");
        assert_eq!(bp.available(), 0);
        assert!(Arc::ptr_eq(&f1, &f4), "the same frame slot should now hold b4");
        assert_eq!(f4.block_id(), Some(BlockId::new("f", 3)));
    }

    #[test]
    fn concurrent_pin_of_same_block_shares_one_frame() {
        let bp = Arc::new(pool(2));
        precreate(bp.store(), "f", 1);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let bp = Arc::clone(&bp);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    bp.pin(&BlockId::new("f", 0)).unwrap().unwrap()
                })
            })
            .collect();

        let frames: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(Arc::ptr_eq(&frames[0], &frames[1]));
        assert_eq!(frames[0].pin_count(), 2);
        assert_eq!(bp.hit_rate(), 0.5); // 2 requests, 1 miss
    }

    #[test]
    fn second_chance_gives_one_reprieve() {
        let bp = pool(1);
        precreate(bp.store(), "f", 2);
        let b1 = BlockId::new("f", 0);
        let b2 = BlockId::new("f", 1);

        let f1 = bp.pin(&b1).unwrap().unwrap();
        bp.unpin(&f1); // unpinned but recent == true

        // first scan clears the bit without evicting
        assert!(bp.pin(&b2).unwrap().is_none());
        // second scan evicts it
        let f2 = bp.pin(&b2).unwrap().expect("second attempt should evict b1");
        assert_eq!(f2.block_id(), Some(b2));
    }

    #[test]
    fn pin_new_appends_and_formats() {
        let bp = pool(2);
        let frame = bp
            .pin_new("f", |page| page.set_int(0, 99))
            .unwrap()
            .expect("fresh pool should have a victim available");

        assert_eq!(frame.block_id(), Some(BlockId::new("f", 0)));
        assert_eq!(frame.read_page().get_int(0), 99);
        assert_eq!(bp.available(), 1);
    }

    #[test]
    fn flush_all_respects_wal_and_is_idempotent() {
        let store: Arc<dyn BlockStore> = Arc::new(MemBlockStore::new());
        let log = Arc::new(CountingLogSink::new());
        let bp = BufferPool::new(2, Arc::clone(&store), log.clone() as Arc<dyn LogSink>);
        precreate(&store, "f", 1);

        let b1 = BlockId::new("f", 0);
        let frame = bp.pin(&b1).unwrap().unwrap();
        frame.write_page().set_int(0, 123);
        frame.mark_dirty(1);
        bp.unpin(&frame);

        bp.flush_all().unwrap();
        assert_eq!(log.flush_count(), 1);

        let mut read_back = Page::new();
        store.read(&b1, &mut read_back).unwrap();
        assert_eq!(read_back.get_int(0), 123);

        // second flush_all issues no further writes/flushes: already clean
        bp.flush_all().unwrap();
        assert_eq!(log.flush_count(), 1);
    }

    #[test]
    fn unpin_restores_available_count_to_pre_pin_value() {
        let bp = pool(3);
        precreate(bp.store(), "f", 1);
        let before = bp.available();
        let frame = bp.pin(&BlockId::new("f", 0)).unwrap().unwrap();
        bp.unpin(&frame);
        assert_eq!(bp.available(), before);
    }

    #[test]
    fn io_failure_on_victim_load_leaves_pool_coherent() {
        let store = Arc::new(MemBlockStore::new());
        let block_a = store.append("f").unwrap();
        let block_b = store.append("f").unwrap();
        store.fail_next_read(block_b.clone());

        let log: Arc<dyn LogSink> = Arc::new(CountingLogSink::new());
        let bp = BufferPool::new(2, store as Arc<dyn BlockStore>, log);

        let other_file_block = BlockId::new("g", 0);
        bp.store().append("g").unwrap();
        let _other = bp.pin(&other_file_block).unwrap().unwrap();
        bp.unpin(&_other);

        let _a = bp.pin(&block_a).unwrap().unwrap();
        bp.unpin(&_a);

        // Both frames still carry the clock bit set by their last pin, so
        // the first scan only clears it and reports no victim. The second
        // scan finds both frames unreferenced and proceeds to evict one,
        // which is where the injected failure on block_b's read surfaces.
        assert!(bp.pin(&block_b).unwrap().is_none());
        let result = bp.pin(&block_b);
        assert!(result.is_err());
        // pool must still be usable afterwards
        bp.assert_buffer_count_invariant();
    }
}
