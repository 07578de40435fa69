use std::sync::Arc;
use tokio::sync::watch;

/// Busy state of one triggering control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

/// The control an action is triggered from. It is disabled while an
/// invocation is `Running`, so invocations through the same control never
/// overlap. Clones share state; observers can watch transitions through
/// [`ActionControl::subscribe`].
#[derive(Debug, Clone)]
pub struct ActionControl {
    state: Arc<watch::Sender<ExecutionState>>,
}

impl Default for ActionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionControl {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ExecutionState::Idle);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> ExecutionState {
        *self.state.borrow()
    }

    pub fn is_enabled(&self) -> bool {
        !self.state().is_running()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.state.subscribe()
    }

    /// Moves the control to `Running`. Returns `None` when it already is.
    /// Dropping the guard without [`RunningGuard::finish`] settles the
    /// control as `Cancelled`.
    pub fn try_begin(&self) -> Option<RunningGuard> {
        let started = self.state.send_if_modified(|state| {
            if state.is_running() {
                false
            } else {
                *state = ExecutionState::Running;
                true
            }
        });

        started.then(|| RunningGuard {
            control: self.clone(),
            outcome: ExecutionState::Cancelled,
        })
    }
}

/// Held for the duration of one invocation.
#[derive(Debug)]
pub struct RunningGuard {
    control: ActionControl,
    outcome: ExecutionState,
}

impl RunningGuard {
    pub fn finish(mut self, outcome: ExecutionState) {
        self.outcome = outcome;
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let outcome = if self.outcome.is_running() {
            ExecutionState::Idle
        } else {
            self.outcome
        };
        self.control.state.send_replace(outcome);
    }
}
