//! Anchor entity: immutable identity plus engine-driven pose and status.

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::geometry::SE3;
use crate::system::channel::{EventChannel, SubscriptionId};

use super::types::{AnchorId, AnchorPayload, AnchorStatus};

/// Engine-reported change to a single anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorUpdate {
    pub id: AnchorId,
    pub status: AnchorStatus,
    /// New local pose. Ignored unless the status is resolved.
    pub pose: Option<SE3>,
    /// Restoration payload, delivered once the engine has produced it.
    pub payload: Option<AnchorPayload>,
}

#[derive(Debug)]
struct AnchorState {
    local_pose: Option<SE3>,
    status: AnchorStatus,
    payload: Option<AnchorPayload>,
    disposed: bool,
}

/// A persistent pose tied to a real-world location.
///
/// Anchors are shared as `Arc<Anchor>`: the registry holds the authoritative
/// handle and every client handle points at the same instance, so pose and
/// status updates are seen by all holders.
pub struct Anchor {
    id: AnchorId,
    state: RwLock<AnchorState>,
    updates: EventChannel<AnchorUpdate>,
}

impl Anchor {
    /// Anchor created from a known local pose. Resolved immediately.
    pub fn created(id: AnchorId, local_pose: SE3) -> Self {
        Self::with_state(
            id,
            AnchorState {
                local_pose: Some(local_pose),
                status: AnchorStatus::Success,
                payload: None,
                disposed: false,
            },
        )
    }

    /// Anchor restored from a payload. Pending until the engine resolves it.
    pub fn restored(id: AnchorId, payload: AnchorPayload) -> Self {
        Self::with_state(
            id,
            AnchorState {
                local_pose: None,
                status: AnchorStatus::Pending,
                payload: Some(payload),
                disposed: false,
            },
        )
    }

    fn with_state(id: AnchorId, state: AnchorState) -> Self {
        Self {
            id,
            state: RwLock::new(state),
            updates: EventChannel::new(),
        }
    }

    pub fn id(&self) -> AnchorId {
        self.id
    }

    /// Pose in the session's local frame, `None` while unresolved.
    pub fn local_pose(&self) -> Option<SE3> {
        self.state.read().local_pose
    }

    pub fn status(&self) -> AnchorStatus {
        self.state.read().status
    }

    pub fn payload(&self) -> Option<AnchorPayload> {
        self.state.read().payload.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.read().disposed
    }

    /// Follow engine updates for this anchor.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&AnchorUpdate) + Send + Sync + 'static,
    {
        self.updates.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.updates.unsubscribe(id)
    }

    /// Apply an engine update. Returns false if the update was ignored.
    ///
    /// Updates carrying a non-finite pose are dropped. A payload, once set,
    /// is never replaced.
    pub(crate) fn apply_update(&self, update: &AnchorUpdate) -> bool {
        if update.id != self.id {
            return false;
        }
        if update.pose.is_some_and(|pose| !pose.is_finite()) {
            warn!("Ignoring non-finite pose for anchor {}", self.id);
            return false;
        }

        {
            let mut state = self.state.write();
            if state.disposed {
                debug!("Ignoring update for disposed anchor {}", self.id);
                return false;
            }

            state.status = update.status;
            if update.status.is_resolved() {
                if let Some(pose) = update.pose {
                    state.local_pose = Some(pose);
                }
            } else if update.status == AnchorStatus::Pending {
                state.local_pose = None;
            }

            if state.payload.is_none() {
                state.payload = update.payload.clone();
            }
        }

        self.updates.publish(update);
        true
    }

    /// Release subscribers and stop accepting updates.
    pub(crate) fn dispose(&self) {
        self.state.write().disposed = true;
        self.updates.clear();
    }
}

impl std::fmt::Debug for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Anchor")
            .field("id", &self.id)
            .field("status", &state.status)
            .field("local_pose", &state.local_pose)
            .field("payload", &state.payload)
            .field("disposed", &state.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nalgebra::Vector3;
    use parking_lot::Mutex;

    use super::*;

    fn resolved_update(id: AnchorId) -> AnchorUpdate {
        AnchorUpdate {
            id,
            status: AnchorStatus::Success,
            pose: Some(SE3::from_translation(Vector3::new(1.0, 0.0, 0.0))),
            payload: Some(AnchorPayload::from(vec![9u8])),
        }
    }

    #[test]
    fn test_created_anchor_is_resolved() {
        let pose = SE3::from_translation(Vector3::new(0.0, 1.0, 0.0));
        let anchor = Anchor::created(AnchorId::new_v4(), pose);

        assert_eq!(anchor.status(), AnchorStatus::Success);
        assert_eq!(anchor.local_pose(), Some(pose));
        assert!(anchor.payload().is_none());
    }

    #[test]
    fn test_restored_anchor_is_pending_with_payload() {
        let payload = AnchorPayload::from(vec![1u8, 2]);
        let anchor = Anchor::restored(AnchorId::new_v4(), payload.clone());

        assert_eq!(anchor.status(), AnchorStatus::Pending);
        assert!(anchor.local_pose().is_none());
        assert_eq!(anchor.payload(), Some(payload));
    }

    #[test]
    fn test_update_resolves_pending_anchor_and_notifies() {
        let original = AnchorPayload::from(vec![1u8]);
        let anchor = Anchor::restored(AnchorId::new_v4(), original.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        anchor.subscribe(move |u| seen_in.lock().push(u.status));

        assert!(anchor.apply_update(&resolved_update(anchor.id())));

        assert_eq!(anchor.status(), AnchorStatus::Success);
        assert!(anchor.local_pose().is_some());
        // Restoration payload is immutable.
        assert_eq!(anchor.payload(), Some(original));
        assert_eq!(*seen.lock(), vec![AnchorStatus::Success]);
    }

    #[test]
    fn test_update_for_other_id_is_ignored() {
        let anchor = Anchor::restored(AnchorId::new_v4(), AnchorPayload::from(vec![1u8]));

        assert!(!anchor.apply_update(&resolved_update(AnchorId::new_v4())));
        assert_eq!(anchor.status(), AnchorStatus::Pending);
    }

    #[test]
    fn test_non_finite_pose_is_rejected() {
        let anchor = Anchor::restored(AnchorId::new_v4(), AnchorPayload::from(vec![1u8]));
        let update = AnchorUpdate {
            pose: Some(SE3::from_translation(Vector3::new(f64::NAN, 0.0, 0.0))),
            ..resolved_update(anchor.id())
        };

        assert!(!anchor.apply_update(&update));
        assert_eq!(anchor.status(), AnchorStatus::Pending);
        assert!(anchor.local_pose().is_none());
    }

    #[test]
    fn test_disposed_anchor_ignores_updates() {
        let anchor = Anchor::created(AnchorId::new_v4(), SE3::identity());
        anchor.subscribe(|_| panic!("disposed anchors must not notify"));
        anchor.dispose();

        assert!(anchor.is_disposed());
        assert!(!anchor.apply_update(&resolved_update(anchor.id())));
    }
}
