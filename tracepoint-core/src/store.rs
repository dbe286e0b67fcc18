//! The breakpoint store: single-writer, many-reader tables of line and
//! exception breakpoints, plus the derived line index the hot path reads.
//!
//! Writers (the debugger API) hold the write lock only for the duration of a
//! mutation and then call [`BreakpointStore::consolidate`]; readers
//! (dispatcher threads) take the read lock for the duration of a single
//! lookup. The `epoch` counter lets each thread's skip cache notice a
//! mutation happened anywhere without taking a lock on every event.

use crate::breakpoint::{Breakpoint, ExceptionBreakpoint, PluginRegistry};
use crate::error::StoreError;
use crate::ids::BreakpointId;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// `file -> line -> breakpoint id`. Rebuilt wholesale by `consolidate`;
/// collisions on a line resolve to the last-added id, matching the source
/// behavior of iterating the id map in insertion order.
type LineIndex = HashMap<u32, BreakpointId>;

#[derive(Default)]
struct FileTable {
    by_id: HashMap<BreakpointId, Breakpoint>,
    by_line: LineIndex,
}

pub struct BreakpointStore {
    files: DashMap<String, FileTable>,
    caught: RwLock<HashMap<String, ExceptionBreakpoint>>,
    uncaught: RwLock<HashMap<String, ExceptionBreakpoint>>,
    epoch: AtomicU64,
    plugins: Arc<PluginRegistry>,
    /// Paths known to exist, so `add` can report `FileNotFound` without a
    /// real filesystem dependency; the host binding populates this.
    known_files: DashMap<String, ()>,
}

impl BreakpointStore {
    #[must_use]
    pub fn new(plugins: Arc<PluginRegistry>) -> Self {
        Self {
            files: DashMap::new(),
            caught: RwLock::new(HashMap::new()),
            uncaught: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(1),
            plugins,
            known_files: DashMap::new(),
        }
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Record that `file` is resolvable. Until a file is marked known, `add`
    /// rejects breakpoints for it with `FileNotFound` rather than installing
    /// them.
    pub fn mark_file_known(&self, file: &str) {
        self.known_files.insert(file.to_string(), ());
    }

    /// Insert or replace a breakpoint. Returns `Ok(None)` on a clean install,
    /// `Err` when the breakpoint kind itself is not registered, and
    /// `Ok(Some(FileNotFound))` without installing anything when the file
    /// does not resolve — unlike `FileExcluded` (reported by the caller,
    /// since exclusion is advisory and the breakpoint is still installed),
    /// a file that doesn't exist has nothing to install a breakpoint into.
    pub fn add(&self, bp: Breakpoint) -> Result<Option<StoreError>, crate::error::ApiError> {
        if !self.plugins.is_known_kind(&bp.kind) {
            return Err(crate::error::ApiError::UnsupportedBreakpointKind(bp.kind));
        }

        let file = bp.file.clone();
        if !self.known_files.contains_key(&file) {
            return Ok(Some(StoreError::FileNotFound(file)));
        }

        {
            let mut table = self.files.entry(file.clone()).or_default();
            table.by_id.insert(bp.id, bp);
        }
        self.consolidate(&file);
        Ok(None)
    }

    pub fn remove(&self, file: &str, id: BreakpointId) {
        if let Some(mut table) = self.files.get_mut(file) {
            if table.by_id.remove(&id).is_none() {
                tracing::warn!(file, id = id.raw(), "remove_breakpoint: unknown id");
            }
        }
        self.consolidate(file);
    }

    pub fn remove_all(&self, file: Option<&str>) {
        match file {
            Some(file) => {
                self.files.remove(file);
            }
            None => self.files.clear(),
        }
        self.bump_epoch();
    }

    /// Rebuild `by_line` from `by_id`. Idempotent: calling it twice with no
    /// intervening mutation produces the identical index.
    pub fn consolidate(&self, file: &str) {
        if let Some(mut table) = self.files.get_mut(file) {
            let mut by_line = LineIndex::new();
            let mut ids: Vec<_> = table.by_id.keys().copied().collect();
            ids.sort_unstable();
            for id in ids {
                let bp = &table.by_id[&id];
                by_line.insert(bp.line, id);
            }
            table.by_line = by_line;
        }
        self.bump_epoch();
    }

    #[must_use]
    pub fn has_any_breakpoints(&self, file: &str) -> bool {
        self.files.get(file).is_some_and(|t| !t.by_id.is_empty())
    }

    #[must_use]
    pub fn breakpoint_at_line(&self, file: &str, line: u32) -> Option<Breakpoint> {
        let table = self.files.get(file)?;
        let id = table.by_line.get(&line)?;
        table.by_id.get(id).cloned()
    }

    /// Find the best-matching breakpoint for a frame at `(file, line)` whose
    /// function scope matches `function_name`. Unlike `breakpoint_at_line`
    /// (which only resolves the single breakpoint the line index keeps),
    /// this is used by the frame-scope scan (dispatch step 8) that walks
    /// every breakpoint registered for the file.
    #[must_use]
    pub fn any_breakpoint_matches_frame(&self, file: &str, line: u32, function_name: &str) -> bool {
        let Some(table) = self.files.get(file) else {
            return false;
        };
        table.by_id.values().any(|bp| {
            self.plugins
                .get(&bp.kind)
                .is_some_and(|plugin| plugin.matches(bp, file, line, function_name))
        })
    }

    pub fn update_breakpoint(&self, file: &str, id: BreakpointId, f: impl FnOnce(&mut Breakpoint)) {
        if let Some(mut table) = self.files.get_mut(file) {
            if let Some(bp) = table.by_id.get_mut(&id) {
                f(bp);
            }
        }
    }

    pub fn add_exception(&self, bp: ExceptionBreakpoint, unhandled_table: bool) {
        let mut table = if unhandled_table { self.uncaught.write() } else { self.caught.write() };
        table.insert(bp.qualified_name.clone(), bp);
        drop(table);
        self.bump_epoch();
    }

    pub fn remove_exception(&self, qualified_name: &str) {
        self.caught.write().remove(qualified_name);
        self.uncaught.write().remove(qualified_name);
        self.bump_epoch();
    }

    pub fn remove_all_exceptions(&self) {
        self.caught.write().clear();
        self.uncaught.write().clear();
        self.bump_epoch();
    }

    #[must_use]
    pub fn lookup_caught_exception(&self, qualified_name: &str) -> Option<ExceptionBreakpoint> {
        self.caught.read().get(qualified_name).cloned()
    }

    #[must_use]
    pub fn has_exception_breakpoints(&self) -> bool {
        !self.caught.read().is_empty() || !self.uncaught.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::SuspendPolicy;

    fn store() -> BreakpointStore {
        let store = BreakpointStore::new(Arc::new(PluginRegistry::new()));
        store.mark_file_known("a.py");
        store
    }

    #[test]
    fn add_then_remove_restores_prestate() {
        let store = store();
        assert!(!store.has_any_breakpoints("a.py"));

        let bp = Breakpoint::new(BreakpointId::new(1), "line", "a.py", 10);
        store.add(bp).unwrap();
        assert!(store.has_any_breakpoints("a.py"));
        assert!(store.breakpoint_at_line("a.py", 10).is_some());

        store.remove("a.py", BreakpointId::new(1));
        assert!(!store.has_any_breakpoints("a.py"));
        assert!(store.breakpoint_at_line("a.py", 10).is_none());
    }

    #[test]
    fn consolidate_is_idempotent() {
        let store = store();
        store.add(Breakpoint::new(BreakpointId::new(1), "line", "a.py", 10)).unwrap();
        let epoch_after_add = store.epoch();

        store.consolidate("a.py");
        let epoch_after_first = store.epoch();
        store.consolidate("a.py");
        let epoch_after_second = store.epoch();

        assert!(epoch_after_first > epoch_after_add);
        assert!(epoch_after_second > epoch_after_first);
        assert_eq!(store.breakpoint_at_line("a.py", 10).unwrap().id, BreakpointId::new(1));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let store = store();
        let bp = Breakpoint::new(BreakpointId::new(1), "django-line", "a.py", 10);
        assert!(store.add(bp).is_err());
    }

    #[test]
    fn unresolved_file_is_rejected_without_installing() {
        let store = BreakpointStore::new(Arc::new(PluginRegistry::new()));
        let bp = Breakpoint::new(BreakpointId::new(1), "line", "missing.py", 10);
        let advisory = store.add(bp).unwrap();
        assert!(matches!(advisory, Some(StoreError::FileNotFound(_))));
        assert!(!store.has_any_breakpoints("missing.py"));
        assert!(store.breakpoint_at_line("missing.py", 10).is_none());
    }

    #[test]
    fn remove_all_breakpoints_clears_every_file() {
        let store = store();
        store.add(Breakpoint::new(BreakpointId::new(1), "line", "a.py", 10)).unwrap();
        store.remove_all(None);
        assert!(!store.has_any_breakpoints("a.py"));
    }

    #[test]
    fn last_added_id_wins_line_collision() {
        let store = store();
        store.add(Breakpoint::new(BreakpointId::new(1), "line", "a.py", 10)).unwrap();
        store.add(Breakpoint::new(BreakpointId::new(2), "line", "a.py", 10)).unwrap();
        assert_eq!(store.breakpoint_at_line("a.py", 10).unwrap().id, BreakpointId::new(2));
    }

    #[test]
    fn exception_breakpoint_round_trip() {
        let store = store();
        let mut eb = ExceptionBreakpoint::new("ValueError");
        eb.notify_on_first_raise_only = true;
        store.add_exception(eb, false);
        assert!(store.lookup_caught_exception("ValueError").is_some());
        store.remove_exception("ValueError");
        assert!(store.lookup_caught_exception("ValueError").is_none());
    }

    #[test]
    fn suspend_policy_defaults_to_current() {
        let bp = Breakpoint::new(BreakpointId::new(1), "line", "a.py", 10);
        assert_eq!(bp.suspend_policy, SuspendPolicy::Current);
    }
}
