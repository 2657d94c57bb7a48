//! Ordered record of commands received by simulated collaborators.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::anchor::{Anchor, AnchorId};

/// A command received by a simulated collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartLocalization,
    StopLocalization,
    CreateAnchors(Vec<AnchorId>),
    RestoreAnchors(Vec<AnchorId>),
    PauseTracking(Vec<AnchorId>),
    ResumeTracking(Vec<AnchorId>),
    LocationStart,
    LocationStop,
}

impl Call {
    pub(crate) fn ids(anchors: &[Arc<Anchor>]) -> Vec<AnchorId> {
        anchors.iter().map(|a| a.id()).collect()
    }
}

/// Shared, cloneable call log. Clones append to the same record.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: Call) {
        self.calls.lock().push(call);
    }

    /// Copy of every call so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Id sets of every `PauseTracking` call, in order.
    pub fn paused(&self) -> Vec<Vec<AnchorId>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::PauseTracking(ids) => Some(ids.clone()),
                _ => None,
            })
            .collect()
    }

    /// Id sets of every `ResumeTracking` call, in order.
    pub fn resumed(&self) -> Vec<Vec<AnchorId>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::ResumeTracking(ids) => Some(ids.clone()),
                _ => None,
            })
            .collect()
    }
}
