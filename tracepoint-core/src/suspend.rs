//! Per-thread debug state and the suspension protocol. The dispatcher itself
//! never blocks; the only blocking point in the whole crate is
//! [`ThreadDebugInfo::wait_suspend`], a condvar wait loop that also drains
//! internal commands (evaluate, get-variables, ...) queued for the suspended
//! thread.

use crate::ids::{FrameId, ThreadId};
use crate::skip_cache::SkipCache;
use crate::step::{StepCmd, StepState};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Run,
    Suspend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    Breakpoint,
    Step,
    Pause,
    Exception,
    Entry,
}

/// A unit of work queued for a suspended thread: anything the client wants
/// done on this exact thread while it is parked (inspect locals, evaluate an
/// expression, change a variable). The dispatcher never executes these
/// directly — only `wait_suspend` does, so they run on the debuggee's own
/// stack with its real frames in scope.
pub struct InternalCommand {
    pub run: Box<dyn FnOnce() + Send>,
}

impl std::fmt::Debug for InternalCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalCommand").finish_non_exhaustive()
    }
}

struct Shared {
    state: RunState,
    suspend_reason: Option<SuspendReason>,
    message: Option<String>,
    queue: VecDeque<InternalCommand>,
}

/// Per-debuggee-thread debug state. Created lazily on the first trace event
/// for a thread, destroyed with the thread.
pub struct ThreadDebugInfo {
    pub id: ThreadId,
    pub step: Mutex<StepState>,
    /// Re-entrancy guard: a reentrant call into the dispatcher for this
    /// thread (e.g. from within condition evaluation) must no-op.
    pub is_tracing: std::sync::atomic::AtomicBool,
    pub exception_frame: Mutex<Option<FrameId>>,
    pub skip_cache: Mutex<SkipCache>,
    shared: Mutex<Shared>,
    condvar: Condvar,
}

impl ThreadDebugInfo {
    #[must_use]
    pub fn new(id: ThreadId) -> Self {
        Self {
            id,
            step: Mutex::new(StepState::new()),
            is_tracing: std::sync::atomic::AtomicBool::new(false),
            exception_frame: Mutex::new(None),
            skip_cache: Mutex::new(SkipCache::new()),
            shared: Mutex::new(Shared {
                state: RunState::Run,
                suspend_reason: None,
                message: None,
                queue: VecDeque::new(),
            }),
            condvar: Condvar::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.shared.lock().state
    }

    #[must_use]
    pub fn suspend_reason(&self) -> Option<SuspendReason> {
        self.shared.lock().suspend_reason
    }

    /// Human-readable detail set alongside the suspend reason (breakpoint
    /// location, ascended step location, ...), for display at the client.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.shared.lock().message.clone()
    }

    /// Mark this thread suspended. Called from the debuggee thread itself,
    /// immediately before it parks in [`Self::wait_suspend`].
    pub fn mark_suspended(&self, reason: SuspendReason, message: Option<String>) {
        let mut shared = self.shared.lock();
        shared.state = RunState::Suspend;
        shared.suspend_reason = Some(reason);
        shared.message = message;
    }

    /// Called from the API thread to release a parked debuggee thread.
    pub fn resume(&self) {
        let mut shared = self.shared.lock();
        shared.state = RunState::Run;
        shared.suspend_reason = None;
        shared.message = None;
        drop(shared);
        self.condvar.notify_all();
    }

    pub fn queue_command(&self, cmd: InternalCommand) {
        let mut shared = self.shared.lock();
        shared.queue.push_back(cmd);
        drop(shared);
        self.condvar.notify_all();
    }

    /// Block the calling (debuggee) thread until resumed, draining any
    /// internal commands queued against it in the meantime. This is the only
    /// place in the crate that blocks an OS thread.
    pub fn wait_suspend(&self) {
        loop {
            let mut shared = self.shared.lock();
            if shared.state == RunState::Run {
                return;
            }
            if let Some(cmd) = shared.queue.pop_front() {
                drop(shared);
                (cmd.run)();
                continue;
            }
            self.condvar.wait_for(&mut shared, Duration::from_millis(250));
        }
    }

    pub fn set_exception(&self, frame: FrameId) {
        *self.exception_frame.lock() = Some(frame);
    }

    pub fn clear_exception(&self) {
        *self.exception_frame.lock() = None;
    }

    pub fn set_step(&self, cmd: StepCmd, stop_frame: Option<FrameId>) {
        self.step.lock().set(cmd, stop_frame);
    }

    pub fn clear_step(&self) {
        self.step.lock().clear();
    }
}
