//! AnchorRegistry - the set of anchors the service currently tracks.
//!
//! An id is present iff its anchor was created or restored and has not been
//! destroyed since. Insertion never replaces a live entry.

use std::collections::HashMap;
use std::sync::Arc;

use super::anchor::Anchor;
use super::types::AnchorId;

/// Map from anchor id to the authoritative anchor handle.
#[derive(Debug, Default)]
pub struct AnchorRegistry {
    anchors: HashMap<AnchorId, Arc<Anchor>>,
}

impl AnchorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            anchors: HashMap::new(),
        }
    }

    /// Number of tracked anchors.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// True if `id` is tracked.
    pub fn contains(&self, id: &AnchorId) -> bool {
        self.anchors.contains_key(id)
    }

    /// Live handle for `id`, if tracked.
    pub fn get(&self, id: &AnchorId) -> Option<&Arc<Anchor>> {
        self.anchors.get(id)
    }

    /// Insert `anchor` unless its id is already tracked.
    ///
    /// Returns the live entry for the id: the new anchor if it was inserted,
    /// otherwise the instance that was already registered.
    pub fn insert_if_absent(&mut self, anchor: Arc<Anchor>) -> Arc<Anchor> {
        Arc::clone(self.anchors.entry(anchor.id()).or_insert(anchor))
    }

    /// Stop tracking `id`. Returns the removed handle.
    pub fn remove(&mut self, id: &AnchorId) -> Option<Arc<Anchor>> {
        self.anchors.remove(id)
    }

    /// Point-in-time copy of every tracked anchor.
    pub fn snapshot(&self) -> Vec<Arc<Anchor>> {
        self.anchors.values().cloned().collect()
    }

    /// Tracked anchors among `ids`, in the order given. Unknown and repeated
    /// ids are skipped.
    pub fn select(&self, ids: &[AnchorId]) -> Vec<Arc<Anchor>> {
        let mut selected: Vec<Arc<Anchor>> = Vec::with_capacity(ids.len());
        for id in ids {
            if selected.iter().any(|a| a.id() == *id) {
                continue;
            }
            if let Some(anchor) = self.anchors.get(id) {
                selected.push(Arc::clone(anchor));
            }
        }
        selected
    }

    /// True when every id in `ids` is tracked.
    pub fn contains_all(&self, ids: &[AnchorId]) -> bool {
        ids.iter().all(|id| self.anchors.contains_key(id))
    }

    /// Tracked ids, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &AnchorId> {
        self.anchors.keys()
    }
}
