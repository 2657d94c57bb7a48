//! Localization state as reported by the engine.

/// Coarse state of the localization engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalizationState {
    /// Localization is not running.
    #[default]
    Stopped,
    /// Running, no fix yet.
    Localizing,
    /// The device pose is known relative to the real world.
    Localized,
    /// Localization gave up. See the failure reason.
    Failed,
}

/// Why localization failed. Only meaningful while the state is `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalizationFailureReason {
    #[default]
    None,
    Unknown,
    /// The engine could not reach its backend.
    CloudUnavailable,
    /// No fix within the configured localization timeout.
    Timeout,
    /// The configured request time limit was exhausted.
    RequestLimitExceeded,
    /// Location services refused to start.
    LocationUnavailable,
    Canceled,
}

/// State plus failure reason, as delivered to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalizationStateUpdate {
    pub state: LocalizationState,
    pub failure_reason: LocalizationFailureReason,
}

impl LocalizationStateUpdate {
    pub fn new(state: LocalizationState) -> Self {
        Self {
            state,
            failure_reason: LocalizationFailureReason::None,
        }
    }

    pub fn failed(reason: LocalizationFailureReason) -> Self {
        Self {
            state: LocalizationState::Failed,
            failure_reason: reason,
        }
    }
}
