//! Bounded wait for anchors created through the legacy deferred path.
//!
//! The deferred path asks the engine for anchors and only learns about them
//! when the engine's creation event lands in the registry. Waiting never
//! fails: on timeout the caller gets whatever subset is registered.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::anchor::{Anchor, AnchorId};

use super::shared_state::SharedState;

/// Wait up to `timeout` for every id in `ids` to be registered.
///
/// Returns the registered anchors among `ids`, in request order.
pub fn await_created(
    shared: &SharedState,
    ids: &[AnchorId],
    timeout: Duration,
    poll_interval: Duration,
) -> Vec<Arc<Anchor>> {
    // Too large to represent as an instant: wait without a deadline.
    let deadline = Instant::now().checked_add(timeout);
    let complete = shared.wait_until(deadline, poll_interval, |state| {
        state.registry.contains_all(ids)
    });

    let anchors = shared.lock().registry.select(ids);
    if complete {
        debug!("All {} requested anchors registered", ids.len());
    } else {
        warn!(
            "Anchor creation timed out after {:?}: {}/{} anchors registered",
            timeout,
            anchors.len(),
            ids.len()
        );
    }
    anchors
}

/// Handle for anchors requested through the legacy deferred path.
///
/// The engine has accepted the request; `wait` blocks until the anchors are
/// registered or the creation timeout elapses.
#[derive(Debug)]
pub struct PendingAnchors {
    ids: Vec<AnchorId>,
    shared: Weak<SharedState>,
    timeout: Duration,
    poll_interval: Duration,
}

impl PendingAnchors {
    pub(crate) fn new(
        ids: Vec<AnchorId>,
        shared: &Arc<SharedState>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ids,
            shared: Arc::downgrade(shared),
            timeout,
            poll_interval,
        }
    }

    /// Identifiers assigned by the engine, in request order.
    pub fn ids(&self) -> &[AnchorId] {
        &self.ids
    }

    /// Anchors if all of them are already registered, without blocking.
    pub fn try_collect(&self) -> Option<Vec<Arc<Anchor>>> {
        let shared = self.shared.upgrade()?;
        let state = shared.lock();
        state
            .registry
            .contains_all(&self.ids)
            .then(|| state.registry.select(&self.ids))
    }

    /// Block until the anchors are registered or the creation timeout elapses.
    pub fn wait(self) -> Vec<Arc<Anchor>> {
        let timeout = self.timeout;
        self.wait_timeout(timeout)
    }

    pub fn wait_timeout(self, timeout: Duration) -> Vec<Arc<Anchor>> {
        match self.shared.upgrade() {
            Some(shared) => await_created(&shared, &self.ids, timeout, self.poll_interval),
            None => {
                warn!("Anchor service dropped before creation completed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use crate::geometry::SE3;

    use super::*;

    const POLL: Duration = Duration::from_millis(1);

    #[test]
    fn test_await_created_returns_empty_on_timeout() {
        let shared = SharedState::new();
        let ids = vec![AnchorId::new_v4(), AnchorId::new_v4()];
        let start = Instant::now();

        let anchors = await_created(&shared, &ids, Duration::from_millis(30), POLL);

        assert!(anchors.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_await_created_returns_partial_subset() {
        let shared = SharedState::new();
        let present = Arc::new(Anchor::created(AnchorId::new_v4(), SE3::identity()));
        shared.lock().registry.insert_if_absent(Arc::clone(&present));

        let ids = vec![AnchorId::new_v4(), present.id()];
        let anchors = await_created(&shared, &ids, Duration::from_millis(10), POLL);

        assert_eq!(anchors.len(), 1);
        assert!(Arc::ptr_eq(&anchors[0], &present));
    }

    #[test]
    fn test_await_created_resolves_early() {
        let shared = SharedState::new();
        let anchor = Arc::new(Anchor::created(AnchorId::new_v4(), SE3::identity()));
        let ids = vec![anchor.id()];

        let writer = Arc::clone(&shared);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            writer.lock().registry.insert_if_absent(anchor);
            writer.notify_changed();
        });

        let start = Instant::now();
        let anchors = await_created(&shared, &ids, Duration::from_secs(5), POLL);
        handle.join().unwrap();

        assert_eq!(anchors.len(), 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_await_created_with_unrepresentable_timeout() {
        let shared = SharedState::new();
        let anchor = Arc::new(Anchor::created(AnchorId::new_v4(), SE3::identity()));
        shared.lock().registry.insert_if_absent(Arc::clone(&anchor));

        let anchors = await_created(&shared, &[anchor.id()], Duration::MAX, POLL);

        assert_eq!(anchors.len(), 1);
    }

    #[test]
    fn test_pending_anchors_after_service_dropped() {
        let shared = SharedState::new();
        let pending = PendingAnchors::new(vec![AnchorId::new_v4()], &shared, Duration::from_secs(5), POLL);
        drop(shared);

        assert!(pending.try_collect().is_none());
        assert!(pending.wait().is_empty());
    }

    #[test]
    fn test_try_collect_requires_all_ids() {
        let shared = SharedState::new();
        let anchor = Arc::new(Anchor::created(AnchorId::new_v4(), SE3::identity()));
        let pending = PendingAnchors::new(
            vec![anchor.id()],
            &shared,
            Duration::from_millis(10),
            POLL,
        );
        assert!(pending.try_collect().is_none());

        shared.lock().registry.insert_if_absent(anchor);
        assert_eq!(pending.try_collect().map(|a| a.len()), Some(1));
    }
}
