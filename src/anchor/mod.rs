//! Anchor module - persistent spatial anchors and their registry.
//!
//! - [`Anchor`] - identity plus engine-driven pose, status and payload
//! - [`AnchorRegistry`] - the anchors currently tracked by the service
//! - [`AnchorId`], [`AnchorStatus`], [`AnchorPayload`] - value types

#[allow(clippy::module_inception)]
pub mod anchor;
pub mod registry;
pub mod types;

pub use anchor::{Anchor, AnchorUpdate};
pub use registry::AnchorRegistry;
pub use types::{AnchorId, AnchorPayload, AnchorStatus};
