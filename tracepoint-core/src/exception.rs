//! Decides whether an `exception` event should suspend the thread, applying
//! the first-raise-only, same-context, condition and library-ignore policies.

use crate::breakpoint::ExceptionBreakpoint;
use crate::frame::ExceptionInfo;
use dashmap::DashMap;
use regex::Regex;
use std::sync::OnceLock;

fn ignore_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^#]*#.*@IgnoreException").expect("static pattern is valid"))
}

/// Caches, per source file, whether a given line carries an `@IgnoreException`
/// marker comment. Keyed on `(file, size, mtime)` so a file edit invalidates
/// just that file's entries rather than the whole cache.
#[derive(Default)]
pub struct IgnoreLineCache {
    entries: DashMap<(String, u64, u64), bool>,
    /// Lines marked as ignored directly by the client, merged on top of the
    /// file-sourced markers.
    user_ignored: DashMap<(String, u32), bool>,
}

impl IgnoreLineCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_user_ignored(&self, file: &str, line: u32, ignored: bool) {
        self.user_ignored.insert((file.to_string(), line), ignored);
    }

    /// `line_source` is the exact text of the line (the caller is responsible
    /// for sourcing it, e.g. via a line-cache keyed on the same
    /// `(size, mtime)` pair — reading files is out of scope for this crate).
    #[must_use]
    pub fn is_ignored(&self, file: &str, line: u32, size: u64, mtime: u64, line_source: &str) -> bool {
        if self.user_ignored.get(&(file.to_string(), line)).is_some_and(|v| *v) {
            return true;
        }
        *self
            .entries
            .entry((file.to_string(), size, mtime))
            .or_insert_with(|| ignore_tag().is_match(line_source))
    }
}

pub struct ExceptionContext<'a> {
    pub info: &'a ExceptionInfo,
    /// Step 1 of the decision algorithm: the thread is already suspended
    /// (e.g. parked at a breakpoint, or mid-`wait_suspend` for an earlier
    /// event on this same thread) — any exception event arriving in that
    /// state is skipped outright.
    pub already_suspended: bool,
    pub in_library: bool,
    pub condition_true: bool,
    pub ignored_by_marker: bool,
    /// Whether the raise traceback has reached two frames up from the raise
    /// site — the `notify_on_first_raise_only` + same-context-skip stop
    /// point.
    pub two_frames_up_from_raise: bool,
    pub same_context_skip_enabled: bool,
    /// Master switch for the `SystemExit` exit-code skip rule.
    pub ignore_system_exit: bool,
    /// Exit codes treated as "not interesting" when `ignore_system_exit` is
    /// set; configurable rather than hard-coded to the conventional `0`.
    pub ignored_system_exit_codes: &'a [i32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionDecision {
    Skip,
    Stop,
}

/// Evaluate the exception-break policy for one event. `bp` must already be
/// the result of `lookup_caught_exception`; callers short-circuit before
/// calling this when there is no matching breakpoint.
#[must_use]
pub fn decide(bp: &ExceptionBreakpoint, ctx: &ExceptionContext<'_>) -> ExceptionDecision {
    if ctx.already_suspended {
        return ExceptionDecision::Skip;
    }
    if !ctx.info.traceback_linked {
        return ExceptionDecision::Skip;
    }
    if let Some(code) = ctx.info.exit_code {
        if ctx.ignore_system_exit
            && is_system_exit(&bp.qualified_name)
            && is_ignored_exit_code(code, ctx.ignored_system_exit_codes)
        {
            return ExceptionDecision::Skip;
        }
    }
    if !ctx.condition_true {
        return ExceptionDecision::Skip;
    }
    if bp.ignore_libraries && ctx.in_library {
        return ExceptionDecision::Skip;
    }
    if ctx.ignored_by_marker {
        return ExceptionDecision::Skip;
    }
    if ctx.same_context_skip_enabled && ctx.info.raised_here {
        return ExceptionDecision::Skip;
    }

    if bp.notify_on_first_raise_only {
        let stop = if ctx.same_context_skip_enabled {
            !ctx.info.raised_here && ctx.two_frames_up_from_raise
        } else {
            ctx.info.raised_here
        };
        return if stop { ExceptionDecision::Stop } else { ExceptionDecision::Skip };
    }

    ExceptionDecision::Stop
}

fn is_system_exit(qualified_name: &str) -> bool {
    qualified_name == "SystemExit"
}

/// Whether `code` is in the configured set of "not interesting" exit codes.
/// A host with no such convention simply never sets `ExceptionInfo.exit_code`
/// for those cases; an empty `ignored` set makes every exit code stop.
fn is_ignored_exit_code(code: i32, ignored: &[i32]) -> bool {
    ignored.contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(traceback_linked: bool, raised_here: bool) -> ExceptionInfo {
        ExceptionInfo {
            qualified_name: "ValueError".to_string(),
            value_repr: String::new(),
            traceback_linked,
            raised_here,
            exit_code: None,
        }
    }

    #[test]
    fn unlinked_traceback_always_skips() {
        let bp = ExceptionBreakpoint::new("ValueError");
        let exc = info(false, true);
        let ctx = ExceptionContext {
            info: &exc,
            already_suspended: false,
            in_library: false,
            condition_true: true,
            ignored_by_marker: false,
            two_frames_up_from_raise: false,
            same_context_skip_enabled: false,
            ignore_system_exit: true,
            ignored_system_exit_codes: &[0],
        };
        assert_eq!(decide(&bp, &ctx), ExceptionDecision::Skip);
    }

    #[test]
    fn first_raise_only_with_same_context_skip_stops_one_frame_up() {
        let mut bp = ExceptionBreakpoint::new("ValueError");
        bp.notify_on_first_raise_only = true;

        let exc_at_raise = info(true, true);
        let ctx_at_raise = ExceptionContext {
            info: &exc_at_raise,
            already_suspended: false,
            in_library: false,
            condition_true: true,
            ignored_by_marker: false,
            two_frames_up_from_raise: false,
            same_context_skip_enabled: true,
            ignore_system_exit: true,
            ignored_system_exit_codes: &[0],
        };
        assert_eq!(decide(&bp, &ctx_at_raise), ExceptionDecision::Skip);

        let exc_one_up = info(true, false);
        let ctx_one_up = ExceptionContext {
            info: &exc_one_up,
            already_suspended: false,
            in_library: false,
            condition_true: true,
            ignored_by_marker: false,
            two_frames_up_from_raise: true,
            same_context_skip_enabled: true,
            ignore_system_exit: true,
            ignored_system_exit_codes: &[0],
        };
        assert_eq!(decide(&bp, &ctx_one_up), ExceptionDecision::Stop);
    }

    #[test]
    fn already_suspended_thread_skips_regardless_of_everything_else() {
        let mut bp = ExceptionBreakpoint::new("ValueError");
        bp.notify_on_first_raise_only = false;
        let exc = info(true, true);
        let ctx = ExceptionContext {
            info: &exc,
            already_suspended: true,
            in_library: false,
            condition_true: true,
            ignored_by_marker: false,
            two_frames_up_from_raise: false,
            same_context_skip_enabled: false,
            ignore_system_exit: true,
            ignored_system_exit_codes: &[0],
        };
        assert_eq!(decide(&bp, &ctx), ExceptionDecision::Skip);
    }

    #[test]
    fn library_raise_is_skipped_when_ignore_libraries_set() {
        let mut bp = ExceptionBreakpoint::new("ValueError");
        bp.ignore_libraries = true;
        let exc = info(true, true);
        let ctx = ExceptionContext {
            info: &exc,
            already_suspended: false,
            in_library: true,
            condition_true: true,
            ignored_by_marker: false,
            two_frames_up_from_raise: false,
            same_context_skip_enabled: false,
            ignore_system_exit: true,
            ignored_system_exit_codes: &[0],
        };
        assert_eq!(decide(&bp, &ctx), ExceptionDecision::Skip);
    }

    #[test]
    fn ignore_line_cache_merges_user_and_file_markers() {
        let cache = IgnoreLineCache::new();
        assert!(!cache.is_ignored("a.py", 10, 100, 1, "x = 1"));
        assert!(cache.is_ignored("a.py", 11, 100, 1, "x = 1  # @IgnoreException"));

        cache.set_user_ignored("a.py", 10, true);
        assert!(cache.is_ignored("a.py", 10, 100, 1, "x = 1"));
    }

    #[test]
    fn system_exit_with_zero_code_is_skipped() {
        let bp = ExceptionBreakpoint::new("SystemExit");
        let mut exc = info(true, true);
        exc.qualified_name = "SystemExit".to_string();
        exc.exit_code = Some(0);
        let ctx = ExceptionContext {
            info: &exc,
            already_suspended: false,
            in_library: false,
            condition_true: true,
            ignored_by_marker: false,
            two_frames_up_from_raise: false,
            same_context_skip_enabled: false,
            ignore_system_exit: true,
            ignored_system_exit_codes: &[0],
        };
        assert_eq!(decide(&bp, &ctx), ExceptionDecision::Skip);
    }

    #[test]
    fn system_exit_with_a_code_outside_the_ignored_set_stops() {
        let bp = ExceptionBreakpoint::new("SystemExit");
        let mut exc = info(true, true);
        exc.qualified_name = "SystemExit".to_string();
        exc.exit_code = Some(1);
        let ctx = ExceptionContext {
            info: &exc,
            already_suspended: false,
            in_library: false,
            condition_true: true,
            ignored_by_marker: false,
            two_frames_up_from_raise: false,
            same_context_skip_enabled: false,
            ignore_system_exit: true,
            ignored_system_exit_codes: &[0],
        };
        assert_eq!(decide(&bp, &ctx), ExceptionDecision::Stop);
    }

    #[test]
    fn system_exit_skip_rule_is_disabled_by_the_master_switch() {
        let bp = ExceptionBreakpoint::new("SystemExit");
        let mut exc = info(true, true);
        exc.qualified_name = "SystemExit".to_string();
        exc.exit_code = Some(0);
        let ctx = ExceptionContext {
            info: &exc,
            already_suspended: false,
            in_library: false,
            condition_true: true,
            ignored_by_marker: false,
            two_frames_up_from_raise: false,
            same_context_skip_enabled: false,
            ignore_system_exit: false,
            ignored_system_exit_codes: &[0],
        };
        assert_eq!(decide(&bp, &ctx), ExceptionDecision::Stop);
    }

    #[test]
    fn configured_ignored_exit_codes_beyond_zero_are_honored() {
        let bp = ExceptionBreakpoint::new("SystemExit");
        let mut exc = info(true, true);
        exc.qualified_name = "SystemExit".to_string();
        exc.exit_code = Some(2);
        let ctx = ExceptionContext {
            info: &exc,
            already_suspended: false,
            in_library: false,
            condition_true: true,
            ignored_by_marker: false,
            two_frames_up_from_raise: false,
            same_context_skip_enabled: false,
            ignore_system_exit: true,
            ignored_system_exit_codes: &[0, 2],
        };
        assert_eq!(decide(&bp, &ctx), ExceptionDecision::Skip);
    }
}
