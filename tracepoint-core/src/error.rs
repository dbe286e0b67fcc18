//! Error taxonomy. See the error handling design: user-request errors are
//! replied to the client and never touch the debuggee; condition/evaluator
//! failures are logged and downgraded to "do not stop"; store errors are
//! attached to an add-breakpoint response rather than raised.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no breakpoint with id {0} in {1}")]
    UnknownBreakpoint(u64, String),

    #[error("unsupported breakpoint kind: {0}")]
    UnsupportedBreakpointKind(String),

    #[error("no such thread: {0}")]
    UnknownThread(u64),

    #[error("unsupported target for this operation: {0}")]
    UnsupportedTarget(String),
}

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("failed to evaluate condition {expr:?}: {reason}")]
    Evaluation { expr: String, reason: String },

    #[error("failed to evaluate log expression {expr:?}: {reason}")]
    LogExpression { expr: String, reason: String },

    #[error("failed to evaluate hit condition {expr:?}: {reason}")]
    HitCondition { expr: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file excluded by current filters: {0}")]
    FileExcluded(String),
}
