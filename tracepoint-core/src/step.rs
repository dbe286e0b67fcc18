//! The stepping engine: interprets the current step command against the
//! current event to decide whether a frame should stop.

use crate::ids::FrameId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCmd {
    Into,
    IntoMyCode,
    Over,
    OverMyCode,
    Return,
    ReturnMyCode,
    SmartInto,
    StopOnEntry,
}

impl StepCmd {
    #[must_use]
    pub const fn is_my_code_variant(self) -> bool {
        matches!(self, Self::IntoMyCode | Self::OverMyCode | Self::ReturnMyCode)
    }

    #[must_use]
    pub const fn is_over_family(self) -> bool {
        matches!(self, Self::Over | Self::OverMyCode | Self::Return | Self::ReturnMyCode)
    }
}

/// Mutable per-thread step state. Lives on `ThreadDebugInfo`.
#[derive(Debug, Clone, Default)]
pub struct StepState {
    pub cmd: Option<StepCmd>,
    /// Preserved across the transient rewrites dispatch applies at frame
    /// exit (step-exit normalization, the generator/`StopIteration` fix),
    /// so the original client intent survives a one-event detour.
    pub original_cmd: Option<StepCmd>,
    pub stop_frame: Option<FrameId>,
    pub smart_stop_frame: Option<FrameId>,
    pub smart_func_name: Option<String>,
}

impl StepState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, cmd: StepCmd, stop_frame: Option<FrameId>) {
        self.cmd = Some(cmd);
        self.original_cmd = Some(cmd);
        self.stop_frame = stop_frame;
    }

    pub fn clear(&mut self) {
        self.cmd = None;
        self.original_cmd = None;
        self.stop_frame = None;
        self.smart_stop_frame = None;
        self.smart_func_name = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEventKind {
    Line,
    Return,
    Exception,
}

/// Decide whether the step engine wants to stop for this event, given the
/// current frame's id, the event kind, and whether this is the first line of
/// the program's entry point (for `StopOnEntry`).
///
/// `parent_stoppable` is only consulted for `(Into|IntoMyCode, Return)`: it
/// must be `true` only when this frame has a parent and that parent is not a
/// debugger-internal/bootstrap frame, per the step table's row for stepping
/// `INTO` across a `return` event. Callers resolve it from
/// [`crate::frame::Frame::parent_context`] plus
/// [`crate::filters::ProjectFilters`] before calling this.
#[must_use]
pub fn should_stop(
    state: &StepState,
    frame_id: FrameId,
    current_function: &str,
    event: StepEventKind,
    parent_stoppable: bool,
) -> bool {
    let Some(cmd) = state.cmd else { return false };

    match (cmd, event) {
        (StepCmd::Into | StepCmd::IntoMyCode, StepEventKind::Line) => true,
        (StepCmd::Into | StepCmd::IntoMyCode, StepEventKind::Return) => parent_stoppable,
        (StepCmd::Over | StepCmd::OverMyCode, StepEventKind::Line) => state.stop_frame == Some(frame_id),
        (StepCmd::Over | StepCmd::OverMyCode, StepEventKind::Return) => false,
        (StepCmd::Return | StepCmd::ReturnMyCode, StepEventKind::Return) => state.stop_frame == Some(frame_id),
        (StepCmd::SmartInto, StepEventKind::Line | StepEventKind::Exception) => {
            state.smart_stop_frame == Some(frame_id)
                || state.smart_func_name.as_deref() == Some(current_function)
        }
        (StepCmd::StopOnEntry, _) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: u64) -> FrameId {
        FrameId::from_raw(n)
    }

    #[test]
    fn step_into_stops_on_every_line() {
        let mut state = StepState::new();
        state.set(StepCmd::Into, None);
        assert!(should_stop(&state, frame(1), "f", StepEventKind::Line, false));
        assert!(should_stop(&state, frame(2), "g", StepEventKind::Line, false));
    }

    #[test]
    fn step_into_on_return_requires_a_stoppable_parent() {
        let mut state = StepState::new();
        state.set(StepCmd::Into, None);
        assert!(!should_stop(&state, frame(1), "f", StepEventKind::Return, false));
        assert!(should_stop(&state, frame(1), "f", StepEventKind::Return, true));
    }

    #[test]
    fn step_over_only_stops_at_target_frame_on_line_events() {
        let mut state = StepState::new();
        state.set(StepCmd::Over, Some(frame(1)));
        assert!(should_stop(&state, frame(1), "f", StepEventKind::Line, false));
        assert!(!should_stop(&state, frame(2), "g", StepEventKind::Line, false));
        assert!(!should_stop(&state, frame(1), "f", StepEventKind::Return, false));
    }

    #[test]
    fn step_return_only_stops_on_return_of_target_frame() {
        let mut state = StepState::new();
        state.set(StepCmd::Return, Some(frame(1)));
        assert!(!should_stop(&state, frame(1), "f", StepEventKind::Line, false));
        assert!(should_stop(&state, frame(1), "f", StepEventKind::Return, false));
        assert!(!should_stop(&state, frame(2), "f", StepEventKind::Return, false));
    }

    #[test]
    fn smart_step_into_matches_by_frame_or_function_name() {
        let mut state = StepState::new();
        state.cmd = Some(StepCmd::SmartInto);
        state.smart_func_name = Some("target".to_string());
        assert!(should_stop(&state, frame(99), "target", StepEventKind::Line, false));
        assert!(!should_stop(&state, frame(99), "other", StepEventKind::Line, false));
    }

    #[test]
    fn no_command_never_stops() {
        let state = StepState::new();
        assert!(!should_stop(&state, frame(1), "f", StepEventKind::Line, false));
    }

    #[test]
    fn original_cmd_is_preserved_through_set() {
        let mut state = StepState::new();
        state.set(StepCmd::OverMyCode, Some(frame(3)));
        assert_eq!(state.original_cmd, Some(StepCmd::OverMyCode));
    }
}
