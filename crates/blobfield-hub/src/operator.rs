//! Operator controls: global pause and reset.

use serde::{Deserialize, Serialize};

use crate::session::SessionRegistry;

/// Operator flags shared by the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorState {
    /// Clock steps are skipped while set
    pub paused: bool,
    /// Reserved for the front-end; the hub never reads it
    pub safe_mode: bool,
}

/// An operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorAction {
    Pause,
    Reset,
}

/// Owner of [`OperatorState`].
#[derive(Debug, Default)]
pub struct OperatorController {
    state: OperatorState,
}

impl OperatorController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    /// Flip the pause flag and return the new state.
    pub fn toggle_pause(&mut self) -> OperatorState {
        self.state.paused = !self.state.paused;
        self.state
    }

    /// Send every session back to the welcome stage with a neutral signature.
    ///
    /// Returns the number of sessions reset. Safe to repeat.
    pub fn reset(&mut self, sessions: &mut SessionRegistry) -> usize {
        let mut count = 0;
        for session in sessions.iter_mut() {
            session.reset();
            count += 1;
        }
        count
    }
}
