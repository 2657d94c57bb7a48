//! Anchor service orchestration and collaborator plumbing.
//!
//! This module contains the top-level `AnchorService`, the shared state it
//! guards, the typed event channels connecting it to the session and the
//! localization engine, and the bounded wait used by legacy creation.

pub mod anchor_service;
pub mod channel;
pub mod collaborators;
pub mod messages;
pub mod shared_state;
pub mod waiter;

pub use anchor_service::AnchorService;
pub use channel::{EventChannel, SubscriptionId};
pub use collaborators::{LocalizationEngine, LocationProvider, Session};
pub use messages::{EngineEvent, SessionEvent};
pub use shared_state::SharedState;
pub use waiter::PendingAnchors;
