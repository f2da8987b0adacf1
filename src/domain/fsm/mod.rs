//! Finite state machines driving the conversation.
//!
//! Both machines are small hand-rolled transition tables. Firing an event
//! either moves the machine and returns the new state, or fails without
//! touching it. A *defined* transition whose target equals the current state
//! is refused as [`TransitionError::NoTransition`]; the dispatcher re-enters
//! the state manually in that case.

mod main_menu;
mod record;

use thiserror::Error;

pub use main_menu::{MainMenuEvent, MainMenuFsm, MainMenuState};
pub use record::{RecordEvent, RecordFsm, RecordState};

/// Why an event did not move a machine.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The event is defined for the current state but would not leave it.
    /// The caller re-enters the state by hand.
    #[error("event '{event}' does not leave state '{state}'")]
    NoTransition {
        state: &'static str,
        event: &'static str,
    },

    /// The event is not defined for the current state.
    #[error("event '{event}' is not allowed in state '{state}'")]
    Rejected {
        state: &'static str,
        event: &'static str,
    },
}

impl TransitionError {
    /// Returns true for the refused-self-loop case.
    pub fn is_no_transition(&self) -> bool {
        matches!(self, TransitionError::NoTransition { .. })
    }
}
