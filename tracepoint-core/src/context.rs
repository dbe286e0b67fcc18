//! The bundle of process-wide mutable state the dispatcher and API share,
//! passed around by reference instead of hidden behind singletons.

use crate::breakpoint::PluginRegistry;
use crate::config::TracerConfig;
use crate::eval::{ConditionEvaluator, LogSink, NullEvaluator};
use crate::exception::IgnoreLineCache;
use crate::filters::ProjectFilters;
use crate::ids::{FrameId, IdAllocator, ThreadId};
use crate::protocol::Protocol;
use crate::store::BreakpointStore;
use crate::suspend::ThreadDebugInfo;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shadow storage for captured return values, keyed by the frame the value
/// is attributed to (the step-over's parent frame, per the design note in
/// §4.1 step 11 — this never touches the frame's real locals, which the
/// `Frame` trait does not expose mutable access to).
#[derive(Debug, Default)]
pub struct ReturnValueStore {
    values: DashMap<FrameId, String>,
}

impl ReturnValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, frame: FrameId, repr: String) {
        self.values.insert(frame, repr);
    }

    #[must_use]
    pub fn get(&self, frame: FrameId) -> Option<String> {
        self.values.get(&frame).map(|v| v.clone())
    }

    /// Clears the shadow entry for one frame. Called on the
    /// `remove_return_values_flag` signal for that frame.
    pub fn clear(&self, frame: FrameId) {
        self.values.remove(&frame);
    }

    pub fn clear_all(&self) {
        self.values.clear();
    }
}

/// A no-op [`LogSink`] used until an embedder wires up a real one; logpoint
/// output silently goes nowhere rather than panicking.
#[derive(Debug, Default)]
struct NullLogSink;

impl LogSink for NullLogSink {
    fn log_message(&self, _thread: ThreadId, _message: &str) {}
}

pub struct DebuggerContext {
    pub ids: IdAllocator,
    pub store: Arc<BreakpointStore>,
    pub filters: Arc<ProjectFilters>,
    pub ignore_lines: Arc<IgnoreLineCache>,
    pub evaluator: Arc<dyn ConditionEvaluator>,
    pub log_sink: Arc<dyn LogSink>,
    pub threads: DashMap<ThreadId, Arc<ThreadDebugInfo>>,
    pub protocol: RwLock<Protocol>,
    pub ready_to_run: AtomicBool,
    pub finish_debugging_session: AtomicBool,
    pub notify_threads: AtomicBool,
    pub same_context_skip: AtomicBool,
    pub ignore_system_exit: AtomicBool,
    pub ignored_system_exit_codes: RwLock<Vec<i32>>,
    pub show_return_values: AtomicBool,
    pub return_values: ReturnValueStore,
}

impl DebuggerContext {
    #[must_use]
    pub fn new(config: &TracerConfig) -> Self {
        let plugins = Arc::new(PluginRegistry::new());
        let filters = Arc::new(ProjectFilters::new());
        filters.set_project_roots(config.filters.project_roots.clone());
        filters.set_use_libraries_filter(config.filters.use_libraries_filter);

        Self {
            ids: IdAllocator::new(),
            store: Arc::new(BreakpointStore::new(plugins)),
            filters,
            ignore_lines: Arc::new(IgnoreLineCache::new()),
            evaluator: Arc::new(NullEvaluator),
            log_sink: Arc::new(NullLogSink),
            threads: DashMap::new(),
            protocol: RwLock::new(Protocol::Legacy),
            ready_to_run: AtomicBool::new(false),
            finish_debugging_session: AtomicBool::new(false),
            notify_threads: AtomicBool::new(true),
            same_context_skip: AtomicBool::new(config.exceptions.same_context_skip),
            ignore_system_exit: AtomicBool::new(config.exceptions.ignore_system_exit),
            ignored_system_exit_codes: RwLock::new(config.exceptions.ignore_system_exit_codes.clone()),
            show_return_values: AtomicBool::new(config.stepping.show_return_values),
            return_values: ReturnValueStore::new(),
        }
    }

    pub fn set_evaluator(&mut self, evaluator: Arc<dyn ConditionEvaluator>) {
        self.evaluator = evaluator;
    }

    pub fn set_log_sink(&mut self, sink: Arc<dyn LogSink>) {
        self.log_sink = sink;
    }

    /// Get-or-create the debug info record for a thread. Lazily created on
    /// the first trace event delivered for a thread id.
    pub fn thread_info(&self, id: ThreadId) -> Arc<ThreadDebugInfo> {
        self.threads
            .entry(id)
            .or_insert_with(|| Arc::new(ThreadDebugInfo::new(id)))
            .clone()
    }

    pub fn remove_thread(&self, id: ThreadId) {
        self.threads.remove(&id);
    }

    #[must_use]
    pub fn list_thread_ids(&self) -> Vec<ThreadId> {
        self.threads.iter().map(|entry| *entry.key()).collect()
    }

    pub fn mark_finished(&self) {
        self.finish_debugging_session.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finish_debugging_session.load(Ordering::SeqCst)
    }
}
