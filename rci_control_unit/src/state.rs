//! Control state machine.
//!
//! Five states, fully connected. A request is stored and applied at the
//! next step boundary; the active state never changes mid-step. The last
//! request before a boundary wins, and requesting the active state again
//! cancels any pending request.

use rci_common::state::ControlState;

/// State change applied at a step boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ControlState,
    pub to: ControlState,
}

/// Per-instance control state holder.
#[derive(Debug, Clone)]
pub struct ControlStateMachine {
    state: ControlState,
    pending: Option<ControlState>,
    transitions: u64,
}

impl ControlStateMachine {
    /// Create a new machine in Passive.
    pub const fn new() -> Self {
        Self {
            state: ControlState::Passive,
            pending: None,
            transitions: 0,
        }
    }

    /// Active state.
    #[inline]
    pub const fn state(&self) -> ControlState {
        self.state
    }

    /// Request waiting for the next boundary.
    #[inline]
    pub const fn pending(&self) -> Option<ControlState> {
        self.pending
    }

    /// Transitions applied since creation.
    #[inline]
    pub const fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Store a request for the next boundary.
    pub fn request(&mut self, next: ControlState) {
        self.pending = if next == self.state { None } else { Some(next) };
    }

    /// Apply the pending request, if any. Called once per accepted step.
    pub fn apply_pending(&mut self) -> Option<Transition> {
        let next = self.pending.take()?;
        let transition = Transition {
            from: self.state,
            to: next,
        };
        self.state = next;
        self.transitions += 1;
        Some(transition)
    }
}

impl Default for ControlStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
