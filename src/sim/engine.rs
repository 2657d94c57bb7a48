//! Simulated localization engine.
//!
//! Records every command in a `CallLog` and publishes events either
//! synchronously from inside a command (per `EngineBehavior`) or when driven
//! explicitly (`localize`, `deliver_created`, `resolve`).

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::anchor::{Anchor, AnchorId, AnchorPayload, AnchorStatus, AnchorUpdate};
use crate::config::AnchorsConfiguration;
use crate::geometry::SE3;
use crate::localization::{LocalizationFailureReason, LocalizationState, LocalizationStateUpdate};
use crate::system::channel::EventChannel;
use crate::system::collaborators::LocalizationEngine;
use crate::system::messages::EngineEvent;

use super::call_log::{Call, CallLog};

/// When the engine announces anchors requested through `create_anchors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreationEvents {
    /// Never; the caller registers them itself.
    #[default]
    Never,
    /// From inside `create_anchors`.
    Immediate,
    /// On the next `deliver_created`.
    Deferred,
}

/// Scripted reactions of the simulated engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineBehavior {
    /// State reported from inside `start_localization`.
    pub on_start: Option<LocalizationState>,
    /// State reported from inside `stop_localization`.
    pub on_stop: Option<LocalizationState>,
    pub creation_events: CreationEvents,
}

impl Default for EngineBehavior {
    fn default() -> Self {
        Self {
            on_start: Some(LocalizationState::Localizing),
            on_stop: Some(LocalizationState::Stopped),
            creation_events: CreationEvents::Never,
        }
    }
}

pub struct SimulatedEngine {
    log: CallLog,
    events: EventChannel<EngineEvent>,
    behavior: Mutex<EngineBehavior>,
    deferred: Mutex<Vec<Arc<Anchor>>>,
    tracking: Mutex<HashSet<AnchorId>>,
    last_config: Mutex<Option<AnchorsConfiguration>>,
}

impl SimulatedEngine {
    pub fn new(log: CallLog) -> Self {
        Self::with_behavior(log, EngineBehavior::default())
    }

    pub fn with_behavior(log: CallLog, behavior: EngineBehavior) -> Self {
        Self {
            log,
            events: EventChannel::new(),
            behavior: Mutex::new(behavior),
            deferred: Mutex::new(Vec::new()),
            tracking: Mutex::new(HashSet::new()),
            last_config: Mutex::new(None),
        }
    }

    /// Change the scripted behavior.
    pub fn configure<F: FnOnce(&mut EngineBehavior)>(&self, f: F) {
        f(&mut *self.behavior.lock());
    }

    pub fn report_state(&self, state: LocalizationState) {
        self.events
            .publish(&EngineEvent::LocalizationStateChanged(LocalizationStateUpdate::new(state)));
    }

    pub fn report_failure(&self, reason: LocalizationFailureReason) {
        self.events
            .publish(&EngineEvent::LocalizationStateChanged(LocalizationStateUpdate::failed(reason)));
    }

    pub fn localize(&self) {
        self.report_state(LocalizationState::Localized);
    }

    /// Announce anchors held back by `CreationEvents::Deferred`.
    /// Returns how many were delivered.
    pub fn deliver_created(&self) -> usize {
        let anchors = std::mem::take(&mut *self.deferred.lock());
        let count = anchors.len();
        if count > 0 {
            self.events.publish(&EngineEvent::AnchorsCreated(anchors));
        }
        count
    }

    /// Report an anchor as resolved at `pose`, along with its payload.
    pub fn resolve(&self, id: AnchorId, pose: SE3) {
        self.events.publish(&EngineEvent::AnchorsUpdated(vec![AnchorUpdate {
            id,
            status: AnchorStatus::Success,
            pose: Some(pose),
            payload: Some(Self::payload_for(id)),
        }]));
    }

    pub fn publish(&self, event: EngineEvent) {
        self.events.publish(&event);
    }

    /// Payload the simulated engine uses for an anchor: the id's bytes.
    pub fn payload_for(id: AnchorId) -> AnchorPayload {
        AnchorPayload::from(id.as_uuid().as_bytes().as_slice())
    }

    pub fn is_tracking(&self, id: AnchorId) -> bool {
        self.tracking.lock().contains(&id)
    }

    /// Number of anchors the engine is tracking.
    pub fn tracked_count(&self) -> usize {
        self.tracking.lock().len()
    }

    pub fn last_config(&self) -> Option<AnchorsConfiguration> {
        self.last_config.lock().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    fn id_from_payload(payload: &AnchorPayload) -> AnchorId {
        Uuid::from_slice(payload.as_bytes())
            .map(AnchorId::new)
            .unwrap_or_else(|_| AnchorId::new_v4())
    }
}

impl LocalizationEngine for SimulatedEngine {
    fn start_localization(&self, config: &AnchorsConfiguration) {
        self.log.push(Call::StartLocalization);
        *self.last_config.lock() = Some(config.clone());

        let on_start = self.behavior.lock().on_start;
        if let Some(state) = on_start {
            self.report_state(state);
        }
    }

    fn stop_localization(&self) {
        self.log.push(Call::StopLocalization);

        let on_stop = self.behavior.lock().on_stop;
        if let Some(state) = on_stop {
            self.report_state(state);
        }
    }

    fn create_anchors(&self, poses: &[SE3]) -> Vec<AnchorId> {
        let ids: Vec<AnchorId> = poses.iter().map(|_| AnchorId::new_v4()).collect();
        self.log.push(Call::CreateAnchors(ids.clone()));

        let anchors: Vec<Arc<Anchor>> = ids
            .iter()
            .zip(poses)
            .map(|(id, pose)| Arc::new(Anchor::created(*id, *pose)))
            .collect();

        let mode = self.behavior.lock().creation_events;
        match mode {
            CreationEvents::Never => {}
            CreationEvents::Immediate => self.events.publish(&EngineEvent::AnchorsCreated(anchors)),
            CreationEvents::Deferred => self.deferred.lock().extend(anchors),
        }
        ids
    }

    fn restore_anchors(&self, payloads: &[AnchorPayload]) -> Vec<Arc<Anchor>> {
        let anchors: Vec<Arc<Anchor>> = payloads
            .iter()
            .map(|p| Arc::new(Anchor::restored(Self::id_from_payload(p), p.clone())))
            .collect();
        self.log.push(Call::RestoreAnchors(Call::ids(&anchors)));
        anchors
    }

    fn pause_tracking(&self, anchors: &[Arc<Anchor>]) {
        let ids = Call::ids(anchors);
        debug!("Engine pausing {} anchors", ids.len());
        {
            let mut tracking = self.tracking.lock();
            for id in &ids {
                tracking.remove(id);
            }
        }
        self.log.push(Call::PauseTracking(ids));
    }

    fn resume_tracking(&self, anchors: &[Arc<Anchor>]) {
        let ids = Call::ids(anchors);
        debug!("Engine resuming {} anchors", ids.len());
        self.tracking.lock().extend(ids.iter().copied());
        self.log.push(Call::ResumeTracking(ids));
    }

    fn events(&self) -> &EventChannel<EngineEvent> {
        &self.events
    }
}

impl std::fmt::Debug for SimulatedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedEngine")
            .field("behavior", &*self.behavior.lock())
            .field("deferred", &self.deferred.lock().len())
            .field("tracking", &self.tracking.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;

    use super::*;

    #[test]
    fn test_restore_maps_payload_back_to_id() {
        let engine = SimulatedEngine::new(CallLog::new());
        let id = AnchorId::new_v4();

        let restored = engine.restore_anchors(&[SimulatedEngine::payload_for(id)]);

        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].id(), id);
        assert_eq!(restored[0].status(), AnchorStatus::Pending);
    }

    #[test]
    fn test_foreign_payload_gets_fresh_id() {
        let engine = SimulatedEngine::new(CallLog::new());
        let restored = engine.restore_anchors(&[AnchorPayload::from(vec![1u8, 2, 3])]);
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn test_deferred_creation_is_held_until_delivered() {
        let engine = SimulatedEngine::new(CallLog::new());
        engine.configure(|b| b.creation_events = CreationEvents::Deferred);
        let (_, rx) = engine.events().subscribe_channel();

        let ids = engine.create_anchors(&[SE3::from_translation(Vector3::new(1.0, 0.0, 0.0))]);
        assert!(rx.try_recv().is_err());

        assert_eq!(engine.deliver_created(), 1);
        match rx.try_recv().unwrap() {
            EngineEvent::AnchorsCreated(anchors) => assert_eq!(anchors[0].id(), ids[0]),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(engine.deliver_created(), 0);
    }

    #[test]
    fn test_tracking_set_follows_pause_and_resume() {
        let log = CallLog::new();
        let engine = SimulatedEngine::new(log.clone());
        let anchor = Arc::new(Anchor::created(AnchorId::new_v4(), SE3::identity()));

        engine.resume_tracking(&[Arc::clone(&anchor)]);
        assert!(engine.is_tracking(anchor.id()));
        engine.pause_tracking(&[Arc::clone(&anchor)]);
        assert!(!engine.is_tracking(anchor.id()));

        assert_eq!(log.resumed(), vec![vec![anchor.id()]]);
        assert_eq!(log.paused(), vec![vec![anchor.id()]]);
    }
}
