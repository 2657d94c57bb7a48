//! State shared between client calls and collaborator event handlers.
//!
//! The registry and the localization tracker sit behind a single mutex, so
//! there is exactly one writer at a time. Every mutation is followed by a
//! condvar broadcast so that blocked waiters (restart, legacy creation)
//! re-check their condition.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::anchor::{Anchor, AnchorId, AnchorRegistry};
use crate::localization::LocalizationTracker;

/// Everything guarded by the service lock.
#[derive(Debug, Default)]
pub struct ServiceState {
    /// Anchors currently tracked.
    pub registry: AnchorRegistry,
    /// Latest engine-reported localization state.
    pub localization: LocalizationTracker,
    /// Anchors paused for destruction but not yet removed from the registry.
    pub removing: HashSet<AnchorId>,
}

impl ServiceState {
    /// `anchors` minus those whose removal is in progress.
    pub fn trackable(&self, anchors: &[Arc<Anchor>]) -> Vec<Arc<Anchor>> {
        anchors
            .iter()
            .filter(|a| !self.removing.contains(&a.id()))
            .cloned()
            .collect()
    }
}

/// Shared state accessible from client threads and event handlers.
pub struct SharedState {
    state: Mutex<ServiceState>,

    /// Signalled after every registry or localization change.
    changed: Condvar,

    /// Set once the service is disposed. Wakes and aborts waiters.
    disposed: AtomicBool,

    /// Set once the session reported deinitialization.
    session_deinitialized: AtomicBool,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Lock the registry and localization state.
    ///
    /// Never call a collaborator while holding the guard.
    pub fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock()
    }

    /// Wake every waiter so it re-checks its condition.
    pub fn notify_changed(&self) {
        self.changed.notify_all();
    }

    /// Block until `done` holds, the deadline passes, or the service is
    /// disposed.
    ///
    /// The condition is re-checked on every change notification and at least
    /// once per `poll_interval`. Returns whether `done` held.
    pub fn wait_until<F>(&self, deadline: Option<Instant>, poll_interval: Duration, mut done: F) -> bool
    where
        F: FnMut(&ServiceState) -> bool,
    {
        let mut guard = self.state.lock();
        loop {
            if done(&*guard) {
                return true;
            }
            if self.is_disposed() {
                return false;
            }

            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    (deadline - now).min(poll_interval)
                }
                None => poll_interval,
            };
            self.changed.wait_for(&mut guard, slice);
        }
    }

    /// Flag the service as disposed and wake waiters. Returns the previous value.
    pub fn mark_disposed(&self) -> bool {
        let was = self.disposed.swap(true, Ordering::SeqCst);
        self.notify_changed();
        was
    }

    /// True once `mark_disposed` has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Flag the session as gone. Returns the previous value.
    pub fn mark_session_deinitialized(&self) -> bool {
        self.session_deinitialized.swap(true, Ordering::SeqCst)
    }

    /// True once the session reported deinitialization.
    pub fn is_session_deinitialized(&self) -> bool {
        self.session_deinitialized.load(Ordering::SeqCst)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            state: Mutex::new(ServiceState::default()),
            changed: Condvar::new(),
            disposed: AtomicBool::new(false),
            session_deinitialized: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use crate::localization::{LocalizationState, LocalizationStateUpdate};

    use super::*;

    #[test]
    fn test_wait_until_returns_immediately_when_satisfied() {
        let shared = SharedState::new();
        assert!(shared.wait_until(None, Duration::from_millis(1), |s| s.registry.is_empty()));
    }

    #[test]
    fn test_wait_until_times_out() {
        let shared = SharedState::new();
        let start = Instant::now();
        let deadline = Some(start + Duration::from_millis(20));

        let done = shared.wait_until(deadline, Duration::from_millis(1), |s| {
            s.localization.is_localized()
        });

        assert!(!done);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_until_wakes_on_change_from_other_thread() {
        let shared = SharedState::new();
        let writer = Arc::clone(&shared);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            writer
                .lock()
                .localization
                .apply(LocalizationStateUpdate::new(LocalizationState::Localized));
            writer.notify_changed();
        });

        let deadline = Some(Instant::now() + Duration::from_secs(5));
        assert!(shared.wait_until(deadline, Duration::from_millis(50), |s| {
            s.localization.is_localized()
        }));
        handle.join().unwrap();
    }

    #[test]
    fn test_dispose_aborts_unbounded_wait() {
        let shared = SharedState::new();
        let disposer = Arc::clone(&shared);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            disposer.mark_disposed();
        });

        assert!(!shared.wait_until(None, Duration::from_millis(5), |_| false));
        handle.join().unwrap();
    }

    #[test]
    fn test_trackable_skips_anchors_being_removed() {
        use crate::geometry::SE3;

        let shared = SharedState::new();
        let kept = Arc::new(Anchor::created(AnchorId::new_v4(), SE3::identity()));
        let doomed = Arc::new(Anchor::created(AnchorId::new_v4(), SE3::identity()));

        let mut state = shared.lock();
        state.removing.insert(doomed.id());
        let trackable = state.trackable(&[Arc::clone(&kept), Arc::clone(&doomed)]);

        assert_eq!(trackable.len(), 1);
        assert!(Arc::ptr_eq(&trackable[0], &kept));
    }

    #[test]
    fn test_flags_report_previous_value() {
        let shared = SharedState::new();
        assert!(!shared.mark_disposed());
        assert!(shared.mark_disposed());
        assert!(!shared.mark_session_deinitialized());
        assert!(shared.is_session_deinitialized());
    }
}
