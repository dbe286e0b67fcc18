//! Per-thread memoization of "no breakpoint here", so that a thread executing
//! a hot loop with no breakpoints in scope pays for a cheap cache hit instead
//! of a full breakpoint-table scan on every line.
//!
//! The cache is never shared across threads and needs no internal locking: it
//! lives on the [`crate::suspend::ThreadDebugInfo`] that owns it. It is
//! invalidated wholesale whenever the store's epoch advances past the value
//! the cache last observed, which happens on any breakpoint mutation from any
//! thread.

use std::collections::HashMap;

/// Tri-state result for a cache slot, mirroring the source's `-1`/`0`/`1`
/// encoding: unknown entries are absent from the map; only a confirmed "no
/// breakpoint" (`NoMatch`) short-circuits the caller. A confirmed
/// `HasMatch` never short-circuits — it forces the full check, because the
/// full check is also where conditions and log expressions are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSlot {
    NoMatch,
    HasMatch,
}

#[derive(Debug, Default)]
pub struct SkipCache {
    observed_epoch: u64,
    frame_scope: HashMap<(u64, String), CacheSlot>,
    line_scope: HashMap<(u64, String, u32), CacheSlot>,
}

impl SkipCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all memoized entries if the store has changed since we last
    /// looked. Cheap: a single integer compare on the hot path.
    pub fn refresh(&mut self, current_epoch: u64) {
        if current_epoch != self.observed_epoch {
            self.frame_scope.clear();
            self.line_scope.clear();
            self.observed_epoch = current_epoch;
        }
    }

    #[must_use]
    pub fn frame_slot(&self, frame_key: u64, file: &str) -> Option<CacheSlot> {
        self.frame_scope.get(&(frame_key, file.to_string())).copied()
    }

    pub fn set_frame_slot(&mut self, frame_key: u64, file: &str, slot: CacheSlot) {
        self.frame_scope.insert((frame_key, file.to_string()), slot);
    }

    #[must_use]
    pub fn line_slot(&self, frame_key: u64, file: &str, line: u32) -> Option<CacheSlot> {
        self.line_scope.get(&(frame_key, file.to_string(), line)).copied()
    }

    pub fn set_line_slot(&mut self, frame_key: u64, file: &str, line: u32, slot: CacheSlot) {
        self.line_scope.insert((frame_key, file.to_string(), line), slot);
    }

    /// Drop every entry belonging to a retired frame. Called when a `return`
    /// event for that frame is processed, so the maps do not grow unbounded
    /// across a long-running thread's call history.
    pub fn forget_frame(&mut self, frame_key: u64) {
        self.frame_scope.retain(|(k, _), _| *k != frame_key);
        self.line_scope.retain(|(k, _, _), _| *k != frame_key);
    }
}
