//! Per-frame trace dispatcher and debugger command API core for dynamic,
//! interpreted host languages.
//!
//! This crate implements only the decision logic: given a stream of
//! call/line/return/exception trace events from a host runtime, decide when
//! to stop, how to evaluate breakpoints and steps, and how to suspend and
//! resume a debuggee thread. Wire protocols, network I/O, source-file
//! reading, path normalization and host-object expression evaluation are
//! external collaborators consumed through the narrow traits in [`frame`]
//! and [`eval`].

pub mod api;
pub mod breakpoint;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod eval;
pub mod exception;
pub mod filters;
pub mod frame;
pub mod ids;
pub mod protocol;
pub mod skip_cache;
pub mod step;
pub mod store;
pub mod suspend;

pub use api::DebuggerApi;
pub use breakpoint::{Breakpoint, ExceptionBreakpoint, FuncScope, SuspendPolicy};
pub use config::TracerConfig;
pub use context::DebuggerContext;
pub use dispatch::dispatch;
pub use error::{ApiError, ConditionError, StoreError};
pub use eval::{ConditionEvaluator, LogSink};
pub use frame::{EventKind, ExceptionInfo, Frame, NextTracer};
pub use ids::{BreakpointId, FrameId, ThreadId};
pub use protocol::Protocol;
pub use step::StepCmd;
pub use suspend::{RunState, SuspendReason, ThreadDebugInfo};
