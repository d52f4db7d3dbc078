//! Clock (second-chance) replacement scanner.
//!
//! The clock hand is a bare `AtomicUsize` read/written with
//! `Ordering::Relaxed`: a lost race here produces at worst a duplicate scan
//! start point, not a correctness issue. Candidate acquisition uses
//! `try_lock`, so the scanner never blocks behind a frame another thread is
//! actively swapping.
//!
//! This is the only replacement policy; there is no adaptive switching
//! between policies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, MutexGuard};

use crate::frame::{Frame, FrameMeta};

#[derive(Debug)]
pub struct ClockScanner {
    cursor: AtomicUsize,
}

impl ClockScanner {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }

    /// Sweep once around the ring starting at `(cursor + 1) mod len`,
    /// stopping before revisiting the start. Returns the victim's index and
    /// its locked metadata, or `None` if no unpinned, non-recently-pinned
    /// frame was found in this pass.
    pub fn evict<'a>(&self, frames: &'a [Arc<Frame>]) -> Option<(usize, MutexGuard<'a, FrameMeta>)> {
        let len = frames.len();
        if len == 0 {
            return None;
        }
        let start = (self.cursor.load(Ordering::Relaxed) + 1) % len;
        for step in 0..len {
            let idx = (start + step) % len;
            let Some(mut meta) = frames[idx].try_lock() else {
                continue;
            };
            // The recent bit must be consumed on every frame the scan
            // actually reaches, pinned or not: a frame pinned since the
            // last full pass has "used up" its reprieve by the time it is
            // next visited unpinned, rather than starting a fresh one.
            let was_recent = meta.check_recent_and_reset();
            if meta.is_pinned() || was_recent {
                continue;
            }
            self.cursor.store(idx, Ordering::Relaxed);
            return Some((idx, meta));
        }
        None
    }
}

impl Default for ClockScanner {
    fn default() -> Self {
        Self::new()
    }
}
