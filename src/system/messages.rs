//! Event types delivered to the service by its collaborators.
//!
//! These flow over `EventChannel`s and may arrive on any thread, at any time
//! relative to client calls.

use std::sync::Arc;

use crate::anchor::{Anchor, AnchorUpdate};
use crate::localization::LocalizationStateUpdate;

/// Lifecycle notifications from the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session stopped producing frames. Anchor tracking should pause.
    Paused,
    /// The session (re)started running. Anchor tracking should resume.
    Resumed,
    /// The session is gone for good.
    Deinitialized,
}

/// Notifications from the localization engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The engine's coarse localization state changed.
    LocalizationStateChanged(LocalizationStateUpdate),

    /// Anchors created by the engine became available.
    ///
    /// Anchors created through `AnchorService::create_anchors` are registered
    /// right away; anchors from the legacy deferred path are only registered
    /// once this event arrives.
    AnchorsCreated(Vec<Arc<Anchor>>),

    /// Pose, status or payload changes for existing anchors.
    AnchorsUpdated(Vec<AnchorUpdate>),
}
