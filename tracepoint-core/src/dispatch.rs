//! The frame dispatcher: the top-level per-event routine called by the host
//! runtime for every `call`/`line`/`return`/`exception` event. This is the
//! hot path of the whole crate — it must stay wait-free and allocation-light
//! whenever there is nothing to stop for.

use crate::breakpoint::SuspendPolicy;
use crate::context::DebuggerContext;
use crate::error::ConditionError;
use crate::exception::{self, ExceptionContext, ExceptionDecision};
use crate::frame::{EventKind, ExceptionInfo, Frame, NextTracer};
use crate::ids::FrameId;
use crate::skip_cache::CacheSlot;
use crate::step::{should_stop, StepCmd, StepEventKind};
use crate::suspend::{RunState, SuspendReason};
use std::sync::atomic::Ordering;

/// RAII guard clearing `is_tracing` on every exit path, including early
/// returns and panics unwinding out of evaluator callbacks.
struct TracingGuard<'a>(&'a std::sync::atomic::AtomicBool);

impl Drop for TracingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Entry point called by the host runtime binding for every trace event.
///
/// `exc_info` must be `Some` when `event == EventKind::Exception` and `None`
/// otherwise. `return_value` carries the textual representation of the
/// returned value when `event == EventKind::Return` and a host binding can
/// produce one; used only by the return-value-capture step when
/// `show_return_values` is active.
#[must_use]
pub fn dispatch(
    ctx: &DebuggerContext,
    frame: &dyn Frame,
    event: EventKind,
    exc_info: Option<&ExceptionInfo>,
    return_value: Option<&str>,
) -> NextTracer {
    if ctx.is_finished() {
        return NextTracer::None;
    }

    let thread = ctx.thread_info(frame.thread_id());

    if thread.is_tracing.swap(true, Ordering::Acquire) {
        // Reentrant call (e.g. from inside condition evaluation). No-op.
        return NextTracer::Dispatch;
    }
    let _guard = TracingGuard(&thread.is_tracing);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        dispatch_inner(ctx, frame, event, exc_info, return_value, &thread)
    }));

    match result {
        Ok(next) => next,
        Err(_) => {
            tracing::error!(thread = %frame.thread_id(), "dispatcher panicked, continuing without stopping");
            NextTracer::Dispatch
        }
    }
}

fn dispatch_inner(
    ctx: &DebuggerContext,
    frame: &dyn Frame,
    event: EventKind,
    exc_info: Option<&ExceptionInfo>,
    return_value: Option<&str>,
    thread: &crate::suspend::ThreadDebugInfo,
) -> NextTracer {
    // An externally requested pause (a plain `suspend()` from the API, or a
    // sibling thread swept in by `SuspendPolicy::All`/a pause hit) only sets
    // `state=SUSPEND`; it does not itself block anything, since it runs on
    // the API caller's thread, not the debuggee's. The invariant that
    // `state=SUSPEND` implies the thread is parked in `wait_suspend` is
    // restored here: the very next trace event this debuggee thread
    // delivers notices the flag and blocks before doing anything else.
    if thread.state() == RunState::Suspend {
        thread.wait_suspend();
    }

    if event == EventKind::Exception {
        if let Some(info) = exc_info {
            if handle_exception_event(ctx, frame, info, thread) {
                return NextTracer::Dispatch;
            }
            apply_generator_exit_normalization(frame, info, thread);
        }
    }

    let is_return = event == EventKind::Return;
    let is_line = event == EventKind::Line;
    let is_call = event == EventKind::Call;

    // Only resolved on a `return` event: it is the only event kind that
    // needs the caller's location (step-table `INTO` row, ascend-on-stop).
    let parent_ctx = if is_return { frame.parent_context() } else { None };

    apply_step_exit_normalization(frame, is_return, thread);

    let mut step = thread.step.lock();
    let cmd = step.cmd;
    let step_stop_frame = step.stop_frame;

    let show_return_values = ctx.show_return_values.load(Ordering::Relaxed);
    let is_return_capture_target =
        show_return_values && matches!(cmd, Some(c) if c.is_over_family()) && step_stop_frame == frame.parent();

    let can_skip = match cmd {
        None => step_stop_frame.is_none(),
        Some(c) if c.is_over_family() => step_stop_frame != Some(frame.id()),
        Some(_) => false,
    } && !is_return_capture_target;
    drop(step);

    if can_skip && !ctx.store.has_any_breakpoints(frame.file()) {
        return if ctx.store.has_exception_breakpoints() {
            NextTracer::TraceExceptionOnly
        } else if show_return_values {
            NextTracer::TraceReturnOnly
        } else {
            NextTracer::None
        };
    }

    let frame_key = frame.id().raw();
    let mut cache = thread.skip_cache.lock();
    cache.refresh(ctx.store.epoch());

    let has_frame_match = match cache.frame_slot(frame_key, frame.file()) {
        Some(CacheSlot::NoMatch) if can_skip => false,
        Some(slot) => slot == CacheSlot::HasMatch,
        None => {
            let matched = ctx.store.any_breakpoint_matches_frame(frame.file(), frame.line(), frame.function_name());
            cache.set_frame_slot(frame_key, frame.file(), if matched { CacheSlot::HasMatch } else { CacheSlot::NoMatch });
            matched
        }
    };

    let mut stop_reason: Option<SuspendReason> = None;
    let mut stop_policy = SuspendPolicy::Current;

    let line_cache_says_empty =
        cache.line_slot(frame_key, frame.file(), frame.line()) == Some(CacheSlot::NoMatch);
    let mut bp_found_at_line = false;

    if is_line && has_frame_match && !line_cache_says_empty {
        if let Some(mut bp) = ctx.store.breakpoint_at_line(frame.file(), frame.line()) {
            bp_found_at_line = true;
            if bp.func_scope.matches(frame.function_name()) {
                let targeted_by_step_over = step_stop_frame == Some(frame.id())
                    && matches!(cmd, Some(c) if c.is_over_family());

                let condition_ok = bp.condition.as_ref().map_or(true, |expr| {
                    ctx.evaluator.eval_condition(expr, frame).unwrap_or_else(|err: ConditionError| {
                        tracing::warn!(error = %err, "breakpoint condition failed, treating as false");
                        false
                    })
                });

                if condition_ok {
                    let hit_ok = bp.hit_condition.as_ref().map_or(true, |expr| {
                        ctx.evaluator.eval_hit_condition(expr, bp.hit_count + 1).unwrap_or_else(|err| {
                            tracing::warn!(error = %err, "hit condition failed, treating as false");
                            false
                        })
                    });

                    if hit_ok {
                        bp.record_hit();
                        ctx.store.update_breakpoint(frame.file(), bp.id, |stored| stored.record_hit());

                        if bp.is_logpoint() {
                            if let Some(expr) = &bp.log_expression {
                                match ctx.evaluator.render_log_expression(expr, frame) {
                                    Ok(message) => ctx.log_sink.log_message(frame.thread_id(), &message),
                                    Err(err) => tracing::warn!(error = %err, "log expression failed"),
                                }
                            }
                        } else if !targeted_by_step_over {
                            stop_reason = Some(SuspendReason::Breakpoint);
                            stop_policy = bp.suspend_policy;
                        }
                    }
                }
            }
        }
    }

    if is_call && matches!(frame.function_name(), "<module>" | "<lambda>") {
        // Defer to the subsequent `line` event; calling into a module or
        // lambda body is never itself a stop point.
    } else if stop_reason.is_none() {
        let kind = if is_line {
            Some(StepEventKind::Line)
        } else if is_return {
            Some(StepEventKind::Return)
        } else {
            None
        };
        if let Some(kind) = kind {
            let step = thread.step.lock();
            let my_code_excludes = step
                .cmd
                .is_some_and(|c| c.is_my_code_variant() && ctx.filters.apply_files_filter(frame.file(), true));
            let parent_stoppable = is_return && parent_ctx.as_ref().is_some_and(|p| parent_is_stoppable(ctx, p));
            if !my_code_excludes && should_stop(&step, frame.id(), frame.function_name(), kind, parent_stoppable) {
                stop_reason = Some(SuspendReason::Step);
            }
        }
    }

    if is_line && !line_cache_says_empty && !bp_found_at_line {
        cache.set_line_slot(frame_key, frame.file(), frame.line(), CacheSlot::NoMatch);
    }
    drop(cache);

    if is_return {
        thread.skip_cache.lock().forget_frame(frame_key);

        if is_return_capture_target {
            if let (Some(parent), Some(repr)) = (frame.parent(), return_value) {
                ctx.return_values.record(parent, repr.to_string());
            }
        }
    }

    if let Some(reason) = stop_reason {
        // Per the step table's "ascend one frame" behavior: a step-driven
        // stop on a `return` event reports the caller's location, since the
        // callee is already on its way out.
        let ascended = if reason == SuspendReason::Step { parent_ctx.as_ref() } else { None };
        suspend_thread(ctx, frame, reason, stop_policy, thread, ascended);
    }

    NextTracer::Dispatch
}

/// True when `parent` is a frame the step engine is allowed to stop in or
/// report: not a debugger-internal file, and not the specific
/// `(file, function)` pair that marks the debugger's own bootstrap frame.
fn parent_is_stoppable(ctx: &DebuggerContext, parent: &crate::frame::ParentFrameContext) -> bool {
    ctx.filters.file_type(&parent.file) != crate::filters::FileType::DebuggerInternal
        && !crate::filters::ProjectFilters::is_debug_start_frame(&parent.file, &parent.function_name)
}

/// If `frame` is the step engine's current stop target and the active
/// command is one of the `_OVER`/`_RETURN` family, rewrite it to the plain
/// `INTO` equivalent and drop the stop-frame target. Shared by the two
/// frame-exit rewrites (§4.1 steps 4 and 5): a stepped-over frame that is
/// exiting — whether via an ordinary `return` or a generator's
/// `StopIteration`/`GeneratorExit` — must not let the engine lose control of
/// the step.
fn rewrite_step_on_frame_exit(thread: &crate::suspend::ThreadDebugInfo, frame_id: FrameId) {
    let mut step = thread.step.lock();
    if step.stop_frame == Some(frame_id) {
        if let Some(cmd) = step.cmd {
            if cmd.is_over_family() {
                let rewritten = if cmd.is_my_code_variant() { StepCmd::IntoMyCode } else { StepCmd::Into };
                step.cmd = Some(rewritten);
                step.stop_frame = None;
            }
        }
    }
}

/// Step-exit normalization (§4.1 step 4): if the stepped-over frame is
/// returning, rewrite the step so the engine doesn't lose control when the
/// targeted frame exits unexpectedly. Generator frames are excluded — their
/// exhaustion is signaled by `StopIteration`/`GeneratorExit` instead, handled
/// by [`apply_generator_exit_normalization`].
fn apply_step_exit_normalization(frame: &dyn Frame, is_return: bool, thread: &crate::suspend::ThreadDebugInfo) {
    if !is_return || frame.is_generator() {
        return;
    }
    rewrite_step_on_frame_exit(thread, frame.id());
}

/// Generator/`StopIteration` fix (§4.1 step 5): a generator frame signals its
/// own exhaustion via a `StopIteration` (or `GeneratorExit`) exception with no
/// traceback yet, rather than an ordinary `return` event. Apply the same
/// step-exit rewrite in that case so a step-over targeting the generator's
/// frame doesn't leak a stray stop once the exception unwinds further.
fn apply_generator_exit_normalization(
    frame: &dyn Frame,
    info: &ExceptionInfo,
    thread: &crate::suspend::ThreadDebugInfo,
) {
    if info.traceback_linked {
        return;
    }
    if matches!(info.qualified_name.as_str(), "StopIteration" | "GeneratorExit") {
        rewrite_step_on_frame_exit(thread, frame.id());
    }
}

/// Returns `true` if the exception event was fully handled (stop or skip
/// decided by the exception engine) and the caller should not also run the
/// step engine over it.
fn handle_exception_event(
    ctx: &DebuggerContext,
    frame: &dyn Frame,
    info: &ExceptionInfo,
    thread: &crate::suspend::ThreadDebugInfo,
) -> bool {
    let Some(bp) = ctx.store.lookup_caught_exception(&info.qualified_name) else {
        return false;
    };

    let in_library = ctx.filters.apply_files_filter(frame.file(), false);

    let condition_true = bp.condition.as_ref().map_or(true, |expr| {
        ctx.evaluator.eval_condition(expr, frame).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "exception condition failed, treating as false");
            false
        })
    });

    let ignored_by_marker = ctx.ignore_lines.is_ignored(frame.file(), frame.line(), 0, 0, "");
    let ignored_exit_codes = ctx.ignored_system_exit_codes.read();

    let exc_ctx = ExceptionContext {
        info,
        already_suspended: thread.state() == RunState::Suspend,
        in_library,
        condition_true,
        ignored_by_marker,
        two_frames_up_from_raise: !info.raised_here,
        same_context_skip_enabled: ctx.same_context_skip.load(Ordering::Relaxed),
        ignore_system_exit: ctx.ignore_system_exit.load(Ordering::Relaxed),
        ignored_system_exit_codes: &ignored_exit_codes,
    };

    match exception::decide(&bp, &exc_ctx) {
        ExceptionDecision::Skip => true,
        ExceptionDecision::Stop => {
            if let Some(expr) = &bp.log_expression {
                if let Ok(message) = ctx.evaluator.render_log_expression(expr, frame) {
                    ctx.log_sink.log_message(frame.thread_id(), &message);
                }
            } else {
                thread.set_exception(frame.id());
                suspend_thread(ctx, frame, SuspendReason::Exception, SuspendPolicy::Current, thread, None);
                thread.clear_exception();
            }
            true
        }
    }
}

/// `ascended`, when given, is the caller frame the step engine stopped the
/// user in instead of the frame that actually produced the event — the
/// "ascend one frame" behavior for a step-driven stop on a `return` event.
fn suspend_thread(
    ctx: &DebuggerContext,
    frame: &dyn Frame,
    reason: SuspendReason,
    policy: SuspendPolicy,
    thread: &crate::suspend::ThreadDebugInfo,
    ascended: Option<&crate::frame::ParentFrameContext>,
) {
    let message = match (reason, ascended) {
        (SuspendReason::Breakpoint, _) => Some(format!("breakpoint at {}:{}", frame.file(), frame.line())),
        (SuspendReason::Exception, _) => Some("exception".to_string()),
        (SuspendReason::Step, Some(parent)) => Some(format!("step at {}:{}", parent.file, parent.line)),
        (SuspendReason::Step, None) | (SuspendReason::Pause, _) | (SuspendReason::Entry, _) => None,
    };
    thread.mark_suspended(reason, message);

    // Per the suspension protocol, a suspend_policy of ALL or a pause hit
    // also marks every other thread SUSPEND, not just the one that hit the
    // stop condition.
    if policy == SuspendPolicy::All || reason == SuspendReason::Pause {
        for id in ctx.list_thread_ids() {
            if id != frame.thread_id() {
                ctx.thread_info(id).mark_suspended(SuspendReason::Pause, None);
            }
        }
    }

    thread.wait_suspend();
}
