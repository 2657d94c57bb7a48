//! Interfaces of the external collaborators the service is bound to.
//!
//! The service never owns the engine, session or location provider; it only
//! issues commands and listens to their event channels.

use std::sync::Arc;

use crate::anchor::{Anchor, AnchorId, AnchorPayload};
use crate::config::AnchorsConfiguration;
use crate::geometry::SE3;

use super::channel::EventChannel;
use super::messages::{EngineEvent, SessionEvent};

/// Capture session whose lifecycle the service mirrors.
pub trait Session: Send + Sync {
    fn events(&self) -> &EventChannel<SessionEvent>;
}

/// Location services used by the engine to bootstrap localization.
pub trait LocationProvider: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// Localization and anchor tracking engine.
///
/// Implementations may publish events from inside any of these calls; the
/// service never holds its own lock while calling into the engine.
pub trait LocalizationEngine: Send + Sync {
    fn start_localization(&self, config: &AnchorsConfiguration);

    fn stop_localization(&self);

    /// Request one anchor per pose. Returns the fresh identifiers in input
    /// order.
    fn create_anchors(&self, poses: &[SE3]) -> Vec<AnchorId>;

    /// Request restoration of previously created anchors. Returns one
    /// `Pending` anchor per payload, in input order.
    fn restore_anchors(&self, payloads: &[AnchorPayload]) -> Vec<Arc<Anchor>>;

    fn pause_tracking(&self, anchors: &[Arc<Anchor>]);

    fn resume_tracking(&self, anchors: &[Arc<Anchor>]);

    fn events(&self) -> &EventChannel<EngineEvent>;
}
