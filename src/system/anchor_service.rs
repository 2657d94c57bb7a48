//! AnchorService - lifecycle manager for persistent anchors.
//!
//! The service keeps the anchor registry consistent with three timelines:
//! client calls, events from the localization engine, and the lifecycle of the
//! capture session. All registry access goes through `SharedState`; engine
//! commands are issued with the lock released, in three phases:
//! - Phase 1 (COLLECT): lock, read what the command needs
//! - Phase 2 (COMMAND): no lock, call the collaborator
//! - Phase 3 (APPLY): lock, update the registry, broadcast the change
//!
//! Sequences that pause or resume tracking also hold the command lock from
//! collect to apply, so a resume never reaches the engine for an anchor that
//! another sequence is destroying.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, error, info, warn};

use crate::anchor::{Anchor, AnchorId, AnchorPayload, AnchorUpdate};
use crate::config::{AnchorsConfiguration, ServiceConfig};
use crate::error::{AnchorError, Result};
use crate::geometry::SE3;
use crate::localization::{LocalizationFailureReason, LocalizationState, LocalizationStateUpdate};

use super::channel::{EventChannel, SubscriptionId};
use super::collaborators::{LocalizationEngine, LocationProvider, Session};
use super::messages::{EngineEvent, SessionEvent};
use super::shared_state::SharedState;
use super::waiter::{PendingAnchors, await_created};

/// Live subscriptions on collaborator channels. `None` once removed.
#[derive(Debug, Default)]
struct Subscriptions {
    /// Session paused / resumed.
    session_lifecycle: Option<SubscriptionId>,
    /// Session deinitialized.
    session_deinit: Option<SubscriptionId>,
    /// All engine events.
    engine: Option<SubscriptionId>,
}

struct ServiceInner {
    shared: Arc<SharedState>,
    session: Arc<dyn Session>,
    location: Arc<dyn LocationProvider>,
    engine: Arc<dyn LocalizationEngine>,
    anchors_config: AnchorsConfiguration,
    config: ServiceConfig,
    localization_updates: EventChannel<LocalizationStateUpdate>,
    subscriptions: Mutex<Subscriptions>,
    /// Serializes tracking command sequences. Reentrant because engines may
    /// publish events from inside a command, on the calling thread.
    commands: ReentrantMutex<()>,
}

/// Creates, restores, tracks and destroys anchors while mirroring the state
/// of the localization engine.
///
/// Dropping the service disposes it.
pub struct AnchorService {
    inner: Arc<ServiceInner>,
}

impl AnchorService {
    /// Bind to the collaborators with default service settings and start
    /// localization.
    pub fn new(
        session: Arc<dyn Session>,
        location: Arc<dyn LocationProvider>,
        engine: Arc<dyn LocalizationEngine>,
        anchors_config: AnchorsConfiguration,
    ) -> Self {
        Self::with_config(session, location, engine, anchors_config, ServiceConfig::default())
    }

    /// Bind to the collaborators with explicit service settings and start
    /// localization.
    pub fn with_config(
        session: Arc<dyn Session>,
        location: Arc<dyn LocationProvider>,
        engine: Arc<dyn LocalizationEngine>,
        anchors_config: AnchorsConfiguration,
        config: ServiceConfig,
    ) -> Self {
        let inner = Arc::new(ServiceInner {
            shared: SharedState::new(),
            session,
            location,
            engine,
            anchors_config,
            config,
            localization_updates: EventChannel::new(),
            subscriptions: Mutex::new(Subscriptions::default()),
            commands: ReentrantMutex::new(()),
        });

        let session_deinit = inner.session.events().subscribe(with_inner(
            &inner,
            |inner: &ServiceInner, event: &SessionEvent| {
                if *event == SessionEvent::Deinitialized {
                    inner.handle_session_deinitialized();
                }
            },
        ));
        let engine = inner
            .engine
            .events()
            .subscribe(with_inner(&inner, ServiceInner::handle_engine_event));
        let session_lifecycle = inner.session.events().subscribe(with_inner(
            &inner,
            |inner: &ServiceInner, event: &SessionEvent| match event {
                SessionEvent::Paused => inner.handle_session_paused(),
                SessionEvent::Resumed => inner.handle_session_resumed(),
                SessionEvent::Deinitialized => {}
            },
        ));
        let subscriptions = Subscriptions {
            session_lifecycle: Some(session_lifecycle),
            session_deinit: Some(session_deinit),
            engine: Some(engine),
        };
        *inner.subscriptions.lock() = subscriptions;

        info!("Starting localization");
        inner.engine.start_localization(&inner.anchors_config);

        Self { inner }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// All tracked anchors, in no particular order.
    pub fn anchors(&self) -> Vec<Arc<Anchor>> {
        self.inner.shared.lock().registry.snapshot()
    }

    /// The tracked anchor with the given id.
    pub fn anchor(&self, id: AnchorId) -> Result<Arc<Anchor>> {
        self.inner
            .shared
            .lock()
            .registry
            .get(&id)
            .cloned()
            .ok_or(AnchorError::NotFound(id))
    }

    /// True if the anchor with `id` is tracked.
    pub fn contains(&self, id: AnchorId) -> bool {
        self.inner.shared.lock().registry.contains(&id)
    }

    /// Number of tracked anchors.
    pub fn len(&self) -> usize {
        self.inner.shared.lock().registry.len()
    }

    /// True when no anchor is tracked.
    pub fn is_empty(&self) -> bool {
        self.inner.shared.lock().registry.is_empty()
    }

    /// Latest localization state reported by the engine.
    pub fn localization_state(&self) -> LocalizationState {
        self.inner.shared.lock().localization.state()
    }

    /// Why localization failed; `None` unless the state is `Failed`.
    pub fn localization_failure_reason(&self) -> LocalizationFailureReason {
        self.inner.shared.lock().localization.failure_reason()
    }

    /// State and failure reason read together.
    pub fn localization_snapshot(&self) -> LocalizationStateUpdate {
        self.inner.shared.lock().localization.snapshot()
    }

    /// True once `dispose` ran, explicitly or on drop.
    pub fn is_disposed(&self) -> bool {
        self.inner.shared.is_disposed()
    }

    /// Service settings in effect.
    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    /// Called with every localization state reported by the engine.
    pub fn subscribe_localization<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LocalizationStateUpdate) + Send + Sync + 'static,
    {
        self.inner.localization_updates.subscribe(handler)
    }

    /// Receive localization state updates over a channel.
    pub fn localization_updates(
        &self,
    ) -> (SubscriptionId, crossbeam_channel::Receiver<LocalizationStateUpdate>) {
        self.inner.localization_updates.subscribe_channel()
    }

    /// Remove a localization subscriber. Returns false if it was already gone.
    pub fn unsubscribe_localization(&self, id: SubscriptionId) -> bool {
        self.inner.localization_updates.unsubscribe(id)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Create one anchor per pose.
    ///
    /// While not localized this is a logged no-op: nothing is sent to the
    /// engine and every returned entry is `None`.
    pub fn create_anchors(&self, poses: &[SE3]) -> Result<Vec<Option<Arc<Anchor>>>> {
        self.inner.ensure_live()?;
        if poses.is_empty() {
            return Err(AnchorError::EmptyPoses);
        }

        let mut anchors: Vec<Option<Arc<Anchor>>> = vec![None; poses.len()];

        let state = self.inner.shared.lock().localization.state();
        if state != LocalizationState::Localized {
            error!("{}", AnchorError::NotLocalized(state));
            return Ok(anchors);
        }

        let ids = self.inner.engine.create_anchors(poses);
        if ids.len() != poses.len() {
            error!(
                "Engine returned {} identifiers for {} poses",
                ids.len(),
                poses.len()
            );
        }

        {
            let mut state = self.inner.shared.lock();
            for (slot, (id, pose)) in anchors.iter_mut().zip(ids.iter().zip(poses)) {
                let anchor = Arc::new(Anchor::created(*id, *pose));
                *slot = Some(state.registry.insert_if_absent(anchor));
            }
        }
        self.inner.shared.notify_changed();

        debug!("Created {} anchors", ids.len().min(poses.len()));
        Ok(anchors)
    }

    /// Restore anchors from payloads of a previous session.
    ///
    /// Restored anchors are `Pending` until the engine resolves them. An id
    /// that is already tracked keeps its live instance, which is what the
    /// returned vector holds for it.
    pub fn restore_anchors(&self, payloads: &[AnchorPayload]) -> Result<Vec<Arc<Anchor>>> {
        self.inner.ensure_live()?;
        if payloads.is_empty() {
            return Err(AnchorError::EmptyPayloads);
        }

        let _commands = self.inner.commands();
        let restored = self.inner.engine.restore_anchors(payloads);
        let live = self.inner.register(restored);

        self.inner.resume_tracking(&live);
        debug!("Restored {} anchors", live.len());
        Ok(live)
    }

    /// Destroy the given anchors. Untracked anchors are skipped.
    pub fn destroy_anchors(&self, anchors: &[Arc<Anchor>]) -> usize {
        let ids: Vec<AnchorId> = anchors.iter().map(|a| a.id()).collect();
        self.destroy_anchor_ids(&ids)
    }

    /// Destroy anchors by id. Unknown ids are skipped.
    ///
    /// Tracking for the matching anchors is paused before they leave the
    /// registry. Returns the number of anchors destroyed.
    pub fn destroy_anchor_ids(&self, ids: &[AnchorId]) -> usize {
        self.inner.destroy(ids)
    }

    /// Stop and restart localization, then resume tracking of every anchor.
    ///
    /// Blocks until the engine reports `Stopped` and then `Localized`. Each
    /// wait is unbounded unless `ServiceConfig::restart_timeout` is set.
    /// Restarts must not run concurrently with each other.
    pub fn restart(&self) -> Result<()> {
        self.inner.ensure_live()?;
        info!("Restarting localization");

        self.inner.engine.stop_localization();
        self.inner.location.stop();
        self.inner.wait_for_state(LocalizationState::Stopped)?;

        self.inner.location.start();
        self.inner.engine.start_localization(&self.inner.anchors_config);
        self.inner.wait_for_state(LocalizationState::Localized)?;

        let _commands = self.inner.commands();
        let anchors = self.inner.shared.lock().registry.snapshot();
        self.inner.resume_tracking(&anchors);
        info!("Localization restarted, resumed {} anchors", anchors.len());
        Ok(())
    }

    /// Unsubscribe from the collaborators and destroy every anchor.
    ///
    /// Idempotent; safe after the session was deinitialized.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    // ------------------------------------------------------------------
    // Legacy creation
    // ------------------------------------------------------------------

    /// Ask the engine for anchors without registering them.
    ///
    /// The anchors are registered when the engine's creation event arrives;
    /// the returned handle waits for that.
    pub fn create_anchors_deferred(&self, poses: &[SE3]) -> Result<PendingAnchors> {
        self.inner.ensure_live()?;
        if poses.is_empty() {
            return Err(AnchorError::EmptyPoses);
        }

        let state = self.inner.shared.lock().localization.state();
        if state != LocalizationState::Localized {
            let err = AnchorError::NotLocalized(state);
            error!("{}", err);
            return Err(err);
        }

        let ids = self.inner.engine.create_anchors(poses);
        Ok(PendingAnchors::new(
            ids,
            &self.inner.shared,
            self.inner.config.creation_timeout,
            self.inner.config.poll_interval,
        ))
    }

    /// Deferred creation, blocking until the anchors are registered or the
    /// creation timeout elapses. May return fewer anchors than requested.
    pub fn create_anchors_awaiting(&self, poses: &[SE3]) -> Result<Vec<Arc<Anchor>>> {
        Ok(self.create_anchors_deferred(poses)?.wait())
    }

    /// Deferred creation delivering the anchors to `callback`.
    ///
    /// The callback is not invoked when the request is rejected.
    pub fn create_anchors_with_callback<F>(&self, poses: &[SE3], callback: F) -> Result<()>
    where
        F: FnOnce(Vec<Arc<Anchor>>),
    {
        let anchors = self.create_anchors_awaiting(poses)?;
        callback(anchors);
        Ok(())
    }

    /// Wait up to `timeout` for the given anchors to be registered.
    ///
    /// Never fails; on timeout returns the registered subset.
    pub fn await_created(&self, ids: &[AnchorId], timeout: Duration) -> Vec<Arc<Anchor>> {
        await_created(&self.inner.shared, ids, timeout, self.inner.config.poll_interval)
    }
}

impl Drop for AnchorService {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for AnchorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.shared.lock();
        f.debug_struct("AnchorService")
            .field("anchors", &state.registry.len())
            .field("localization", &state.localization.snapshot())
            .field("localization_reports", &state.localization.transitions())
            .field("disposed", &self.inner.shared.is_disposed())
            .field(
                "session_deinitialized",
                &self.inner.shared.is_session_deinitialized(),
            )
            .finish()
    }
}

/// Wrap a handler so it only holds a weak reference to the service.
///
/// Collaborators outlive the service; a strong reference from their channels
/// would keep it alive forever.
fn with_inner<E, F>(inner: &Arc<ServiceInner>, handler: F) -> impl Fn(&E) + Send + Sync + 'static
where
    E: 'static,
    F: Fn(&ServiceInner, &E) + Send + Sync + 'static,
{
    let weak: Weak<ServiceInner> = Arc::downgrade(inner);
    move |event: &E| {
        if let Some(inner) = weak.upgrade() {
            handler(&*inner, event);
        }
    }
}

impl ServiceInner {
    fn commands(&self) -> ReentrantMutexGuard<'_, ()> {
        self.commands.lock()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.shared.is_disposed() {
            return Err(AnchorError::Disposed);
        }
        Ok(())
    }

    /// Insert anchors not yet tracked. Returns the live instance per input.
    fn register(&self, anchors: Vec<Arc<Anchor>>) -> Vec<Arc<Anchor>> {
        let live: Vec<Arc<Anchor>> = {
            let mut state = self.shared.lock();
            anchors
                .into_iter()
                .map(|anchor| state.registry.insert_if_absent(anchor))
                .collect()
        };
        self.shared.notify_changed();
        live
    }

    fn pause_tracking(&self, anchors: &[Arc<Anchor>]) {
        if anchors.is_empty() {
            return;
        }
        debug!("Pausing tracking of {} anchors", anchors.len());
        self.engine.pause_tracking(anchors);
    }

    /// Resume tracking, skipping anchors whose removal is in progress.
    fn resume_tracking(&self, anchors: &[Arc<Anchor>]) {
        let anchors = self.shared.lock().trackable(anchors);
        if anchors.is_empty() {
            return;
        }
        debug!("Resuming tracking of {} anchors", anchors.len());
        self.engine.resume_tracking(&anchors);
    }

    fn destroy(&self, ids: &[AnchorId]) -> usize {
        let _commands = self.commands();

        // Phase 1: collect, and keep the targets out of resume commands
        let targets = {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            let targets: Vec<Arc<Anchor>> = state
                .registry
                .select(ids)
                .into_iter()
                .filter(|a| !state.removing.contains(&a.id()))
                .collect();
            state.removing.extend(targets.iter().map(|a| a.id()));
            targets
        };
        if targets.is_empty() {
            return 0;
        }

        // Phase 2: stop the engine tracking them
        self.pause_tracking(&targets);

        // Phase 3: remove
        let mut destroyed = Vec::with_capacity(targets.len());
        {
            let mut state = self.shared.lock();
            for anchor in &targets {
                state.removing.remove(&anchor.id());
                if let Some(removed) = state.registry.remove(&anchor.id()) {
                    destroyed.push(removed);
                }
            }
        }
        self.shared.notify_changed();

        for anchor in &destroyed {
            anchor.dispose();
        }
        debug!("Destroyed {} anchors", destroyed.len());
        destroyed.len()
    }

    fn destroy_all(&self) -> usize {
        let ids: Vec<AnchorId> = self.shared.lock().registry.ids().copied().collect();
        self.destroy(&ids)
    }

    fn wait_for_state(&self, target: LocalizationState) -> Result<()> {
        let timeout = self.config.restart_timeout;
        // An unrepresentable deadline means no deadline.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let reached = self.shared.wait_until(deadline, self.config.poll_interval, |state| {
            state.localization.state() == target
        });

        if reached {
            debug!("Localization reached {:?}", target);
            return Ok(());
        }
        if self.shared.is_disposed() {
            warn!("Service disposed while waiting for {:?}", target);
            return Err(AnchorError::Disposed);
        }

        let err = AnchorError::RestartTimedOut {
            target,
            waited: timeout.unwrap_or_default(),
        };
        warn!("{}", err);
        Err(err)
    }

    fn dispose(&self) {
        if self.shared.mark_disposed() {
            return;
        }

        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        if let Some(id) = subscriptions.session_lifecycle {
            self.session.events().unsubscribe(id);
        }
        if let Some(id) = subscriptions.session_deinit {
            self.session.events().unsubscribe(id);
        }
        if let Some(id) = subscriptions.engine {
            self.engine.events().unsubscribe(id);
        }

        let destroyed = self.destroy_all();
        self.localization_updates.clear();
        info!("Anchor service disposed, destroyed {} anchors", destroyed);
    }

    // ------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------

    fn handle_engine_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::LocalizationStateChanged(update) => {
                self.handle_localization_state_changed(*update)
            }
            EngineEvent::AnchorsCreated(anchors) => self.handle_anchors_created(anchors),
            EngineEvent::AnchorsUpdated(updates) => self.handle_anchors_updated(updates),
        }
    }

    fn handle_localization_state_changed(&self, update: LocalizationStateUpdate) {
        let snapshot = {
            let mut state = self.shared.lock();
            state.localization.apply(update);
            state.localization.snapshot()
        };
        self.shared.notify_changed();
        self.localization_updates.publish(&snapshot);
    }

    fn handle_anchors_created(&self, anchors: &[Arc<Anchor>]) {
        let _commands = self.commands();
        let live = self.register(anchors.to_vec());
        debug!("Engine delivered {} created anchors", live.len());
        self.resume_tracking(&live);
    }

    fn handle_anchors_updated(&self, updates: &[AnchorUpdate]) {
        let targets: Vec<(Arc<Anchor>, &AnchorUpdate)> = {
            let state = self.shared.lock();
            updates
                .iter()
                .filter_map(|update| match state.registry.get(&update.id) {
                    Some(anchor) => Some((Arc::clone(anchor), update)),
                    None => {
                        debug!("Ignoring update for untracked anchor {}", update.id);
                        None
                    }
                })
                .collect()
        };

        for (anchor, update) in targets {
            anchor.apply_update(update);
        }
        self.shared.notify_changed();
    }

    fn handle_session_paused(&self) {
        let _commands = self.commands();
        let anchors = self.shared.lock().registry.snapshot();
        info!("Session paused");
        self.pause_tracking(&anchors);
    }

    fn handle_session_resumed(&self) {
        let _commands = self.commands();
        let anchors = self.shared.lock().registry.snapshot();
        info!("Session resumed");
        self.resume_tracking(&anchors);
    }

    fn handle_session_deinitialized(&self) {
        if self.shared.mark_session_deinitialized() {
            return;
        }

        let destroyed = self.destroy_all();

        let mut subscriptions = self.subscriptions.lock();
        if let Some(id) = subscriptions.session_deinit.take() {
            self.session.events().unsubscribe(id);
        }
        if let Some(id) = subscriptions.engine.take() {
            self.engine.events().unsubscribe(id);
        }
        info!("Session deinitialized, destroyed {} anchors", destroyed);
    }
}
