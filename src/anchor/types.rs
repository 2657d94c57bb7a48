//! Core value types for anchors: identifiers, status codes and payloads.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an anchor.
///
/// Assigned by the localization engine when an anchor is created or restored
/// and never reused. The registry is keyed by this value alone. Serializes
/// as the bare UUID string so clients can persist it next to the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(pub Uuid);

impl AnchorId {
    /// Create an AnchorId wrapping the given UUID.
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh random identifier.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// The wrapped UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for AnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl From<Uuid> for AnchorId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Engine-reported resolution state of an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorStatus {
    /// Waiting for the engine to resolve the anchor. The pose is undefined.
    #[default]
    Pending,
    /// Resolved; the pose is valid.
    Success,
    /// The engine gave up resolving the anchor.
    Failed,
    /// Resolved with reduced accuracy.
    Limited,
}

impl AnchorStatus {
    /// True once the anchor carries a usable pose.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Success | Self::Limited)
    }
}

/// Opaque, immutable blob that lets the engine restore an anchor in a later
/// session.
///
/// Cloning is cheap: the bytes are shared.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AnchorPayload(Arc<[u8]>);

impl AnchorPayload {
    /// Wrap the bytes the engine produced.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for AnchorPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl From<&[u8]> for AnchorPayload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl std::fmt::Debug for AnchorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AnchorPayload({} bytes)", self.0.len())
    }
}
