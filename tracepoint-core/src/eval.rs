//! Narrow interfaces for the two external collaborators the core calls into
//! on the hot path: expression evaluation and log-point output. Both are
//! explicitly out of scope for the core itself (see the crate's expression
//! evaluation exclusion) — the core only depends on these trait boundaries.

use crate::error::ConditionError;
use crate::frame::Frame;

/// Evaluates breakpoint conditions, log expressions and hit-conditions
/// against a live frame. Implemented by the host language binding; the core
/// never inspects host values directly.
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate `expr` as a boolean condition in the context of `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::Evaluation`] if `expr` fails to parse or
    /// raises while evaluating. Per the error handling design such failures
    /// are logged by the caller and treated as "do not stop", never
    /// propagated to the debuggee.
    fn eval_condition(&self, expr: &str, frame: &dyn Frame) -> Result<bool, ConditionError>;

    /// Evaluate `expr` as a hit-condition, e.g. `"> 3"`, against the running
    /// hit count. `@HIT@` substitution is the evaluator's responsibility.
    ///
    /// # Errors
    ///
    /// See [`ConditionEvaluator::eval_condition`].
    fn eval_hit_condition(&self, expr: &str, hit_count: u32) -> Result<bool, ConditionError>;

    /// Render a log expression (which may contain `{name}`-style
    /// interpolation of locals) to the string emitted for a logpoint.
    ///
    /// # Errors
    ///
    /// See [`ConditionEvaluator::eval_condition`].
    fn render_log_expression(&self, expr: &str, frame: &dyn Frame) -> Result<String, ConditionError>;
}

/// Where logpoint output and non-fatal evaluator errors are sent. Kept
/// separate from `tracing` so that logpoint output — which is user-visible
/// debuggee I/O, not debugger diagnostics — can be routed to the debug
/// client's own output channel.
pub trait LogSink: Send + Sync {
    fn log_message(&self, thread: crate::ids::ThreadId, message: &str);
}

/// A [`ConditionEvaluator`] that refuses every expression. Useful as the
/// default when a host binding has not wired up an evaluator yet: breakpoints
/// without conditions still work, conditional breakpoints simply never fire
/// (fail-closed, matching the "do not stop" error policy).
#[derive(Debug, Default)]
pub struct NullEvaluator;

impl ConditionEvaluator for NullEvaluator {
    fn eval_condition(&self, expr: &str, _frame: &dyn Frame) -> Result<bool, ConditionError> {
        Err(ConditionError::Evaluation {
            expr: expr.to_string(),
            reason: "no condition evaluator installed".to_string(),
        })
    }

    fn eval_hit_condition(&self, expr: &str, _hit_count: u32) -> Result<bool, ConditionError> {
        Err(ConditionError::HitCondition {
            expr: expr.to_string(),
            reason: "no condition evaluator installed".to_string(),
        })
    }

    fn render_log_expression(&self, expr: &str, _frame: &dyn Frame) -> Result<String, ConditionError> {
        Err(ConditionError::LogExpression {
            expr: expr.to_string(),
            reason: "no condition evaluator installed".to_string(),
        })
    }
}
