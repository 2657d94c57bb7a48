//! Holder for the latest localization state reported by the engine.
//!
//! Transitions are not validated: the engine is trusted to report legal
//! sequences. The state gates anchor creation and drives restart waits.

use tracing::{info, warn};

use super::state::{LocalizationFailureReason, LocalizationState, LocalizationStateUpdate};

#[derive(Debug, Default)]
pub struct LocalizationTracker {
    current: LocalizationStateUpdate,
    transitions: u64,
}

impl LocalizationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the snapshot with an engine report. Returns the previous one.
    pub fn apply(&mut self, update: LocalizationStateUpdate) -> LocalizationStateUpdate {
        let previous = std::mem::replace(&mut self.current, update);
        self.transitions += 1;

        if update.state == LocalizationState::Failed {
            warn!(
                "Localization failed ({:?}), was {:?}",
                update.failure_reason, previous.state
            );
        } else if previous.state != update.state {
            info!("Localization state {:?} -> {:?}", previous.state, update.state);
        }

        previous
    }

    pub fn state(&self) -> LocalizationState {
        self.current.state
    }

    /// Failure reason of the current state; `None` unless the state is `Failed`.
    pub fn failure_reason(&self) -> LocalizationFailureReason {
        match self.current.state {
            LocalizationState::Failed => self.current.failure_reason,
            _ => LocalizationFailureReason::None,
        }
    }

    pub fn snapshot(&self) -> LocalizationStateUpdate {
        LocalizationStateUpdate {
            state: self.current.state,
            failure_reason: self.failure_reason(),
        }
    }

    pub fn is_localized(&self) -> bool {
        self.current.state == LocalizationState::Localized
    }

    /// Number of engine reports applied so far.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}
