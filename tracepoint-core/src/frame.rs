//! The host runtime bridge: the narrow trait the dispatcher depends on instead
//! of a concrete interpreter binding, plus the trace events it is fed.

use crate::ids::{FrameId, ThreadId};
use std::fmt;

/// A trace event delivered by the host runtime for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Call,
    Line,
    Return,
    Exception,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Call => "call",
            Self::Line => "line",
            Self::Return => "return",
            Self::Exception => "exception",
        };
        f.write_str(s)
    }
}

/// Payload carried by an `exception` event. `traceback_linked` mirrors
/// `tb.next` being present on the host's traceback object: until it is, the
/// stack is not fully linked and the exception engine must not act on it yet.
#[derive(Debug, Clone)]
pub struct ExceptionInfo {
    pub qualified_name: String,
    pub value_repr: String,
    pub traceback_linked: bool,
    /// True when the raise site is this exact frame (host-equivalent of
    /// `tb.frame is frame`), used by the first-raise-only policy.
    pub raised_here: bool,
    pub exit_code: Option<i32>,
}

/// What `dispatch` hands back to the host runtime to decide whether (and with
/// which tracer) to keep tracing the frame that produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextTracer {
    /// Keep using the dispatcher for subsequent events in this frame.
    Dispatch,
    /// Only want `return`/`exception` events in this frame (no line-by-line cost).
    TraceReturnOnly,
    /// Only want `exception` events.
    TraceExceptionOnly,
    /// Stop tracing this frame entirely.
    None,
}

/// The caller's file/function/line, as far as a host binding can resolve it
/// without a separate frame registry lookup. Used by the step engine's
/// `INTO`-on-`return` rule and the "ascend one frame" suspend behavior
/// (the user should see the caller's line, not the line the callee just
/// returned from).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentFrameContext {
    pub file: String,
    pub function_name: String,
    pub line: u32,
}

/// Abstraction over a single activation record of the debuggee. The host
/// runtime binding implements this; the core never touches interpreter
/// internals directly.
pub trait Frame: Send {
    /// Stable handle for this activation, valid for the frame's lifetime.
    fn id(&self) -> FrameId;
    fn thread_id(&self) -> ThreadId;
    /// Server-normalized absolute source path.
    fn file(&self) -> &str;
    fn line(&self) -> u32;
    /// Qualified function name, `"<module>"` for module top level, `"<lambda>"`
    /// for anonymous functions.
    fn function_name(&self) -> &str;
    /// The first executable line of the function this frame is in; used to
    /// detect the special `pydevd.py:run`-style debugger bootstrap frame and
    /// to find a function's entry line for smart-step-into.
    fn first_line(&self) -> u32;
    fn parent(&self) -> Option<FrameId>;
    /// True for frames whose code object is a generator/coroutine. The only
    /// generator-specific branch in the dispatcher checks this.
    fn is_generator(&self) -> bool;
    /// Local variable names visible for condition/log-expression evaluation.
    fn local_names(&self) -> Vec<String>;

    /// See [`ParentFrameContext`]. Defaults to `None` (no caller, or the
    /// binding can't resolve one); only bindings that can answer this
    /// cheaply need to override it.
    fn parent_context(&self) -> Option<ParentFrameContext> {
        None
    }
}
