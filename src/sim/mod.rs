//! Simulated collaborators for driving the anchor service without a device.
//!
//! Used by the demo binary and the service tests. Every command reaching the
//! engine or the location provider is appended to a shared [`CallLog`], so
//! call ordering across collaborators can be checked.

pub mod call_log;
pub mod engine;
pub mod session;

pub use call_log::{Call, CallLog};
pub use engine::{CreationEvents, EngineBehavior, SimulatedEngine};
pub use session::{SimulatedLocationProvider, SimulatedSession};
