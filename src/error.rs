//! Errors reported by the anchor service.

use std::time::Duration;

use thiserror::Error;

use crate::anchor::AnchorId;
use crate::localization::LocalizationState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnchorError {
    #[error("no anchor with identifier {0} exists")]
    NotFound(AnchorId),

    #[error("must supply at least one pose to create an anchor for")]
    EmptyPoses,

    #[error("must supply at least one payload to restore an anchor from")]
    EmptyPayloads,

    #[error("must localize before creating anchors (state is {0:?})")]
    NotLocalized(LocalizationState),

    #[error("anchor service has been disposed")]
    Disposed,

    #[error("timed out after {waited:?} waiting for localization state {target:?}")]
    RestartTimedOut {
        target: LocalizationState,
        waited: Duration,
    },
}

pub type Result<T> = std::result::Result<T, AnchorError>;
